use std::path::Path;

use log::{info, warn};
use machine_learning::Classifier;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};

use super::{Strategy, TrainSummary, predict_chunked, report_progress};
use crate::{
    OrchestraErr, Result,
    collective::Communicator,
    config::{RunConfig, Settings},
    data::{self, DatasetMatrix, RowLayout},
    gather::{Partial, PredictionVector},
    partition::PartitionPlan,
};

/// Independent workers that only share data through broadcast and gather.
///
/// The coordinator loads each dataset and broadcasts it. Every worker trains its own model on
/// the whole training set, so models that start equal stay equal and no merge is needed.
/// Inference rows are partitioned, each worker predicts its share and the coordinator gathers
/// the labels back in row order.
pub struct MessagePassing<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    comm: Communicator<R, W>,
    settings: Settings,
}

impl<R, W> MessagePassing<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(comm: Communicator<R, W>, settings: Settings) -> Self {
        Self { comm, settings }
    }

    pub fn communicator(&self) -> &Communicator<R, W> {
        &self.comm
    }

    fn load_if_coordinator(&self, source: &Path, layout: RowLayout) -> Result<DatasetMatrix> {
        let capacity = self.settings.capacity.get();
        if self.comm.is_coordinator() {
            data::load(source, layout, capacity)
        } else {
            Ok(DatasetMatrix::new(capacity))
        }
    }

    /// Trains `model` on the first `rows` rows of `matrix`, once per epoch.
    fn train_rows<M: Classifier>(
        &self,
        model: &mut M,
        matrix: &DatasetMatrix,
        rows: usize,
    ) -> Result<TrainSummary> {
        let coordinator = self.comm.is_coordinator();
        let batch_size = self.settings.batch_size.get();
        let mut summary = TrainSummary::default();

        for epoch in 0..self.settings.epochs.get() {
            let mut seen = 0;

            while seen < rows {
                let end = (seen + batch_size).min(rows);
                let batch = matrix.batch(seen..end).ok_or_else(|| {
                    OrchestraErr::Protocol(format!("rows {seen}..{end} are not loaded"))
                })?;

                summary.loss = model.train(batch, self.settings.learning_rate)?;
                let partial = end - seen < batch_size;
                if partial {
                    summary.partial_batches += 1;
                } else {
                    summary.full_batches += 1;
                }

                report_progress(coordinator, end - seen, partial);
                seen = end;
            }

            summary.samples += rows;
            if coordinator {
                info!(epoch = epoch + 1, loss = summary.loss; "epoch done");
            }
        }

        Ok(summary)
    }

    fn dump_sample(&self, full: &DatasetMatrix) -> Result<()> {
        let Some(dump) = &self.settings.dump else {
            return Ok(());
        };

        match full.row(dump.index()) {
            Some(row) => dump.dump(row),
            None => {
                warn!(index = dump.index(), rows = full.len(); "no sample to dump");
                Ok(())
            }
        }
    }
}

impl<R, W> Strategy for MessagePassing<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn is_coordinator(&self) -> bool {
        self.comm.is_coordinator()
    }

    async fn agree(&mut self, config: &RunConfig) -> Result<RunConfig> {
        let spec = self.comm.broadcast_training(config.training_spec()).await?;
        let agreed = config.with_training(spec)?;
        self.settings = agreed.settings();
        Ok(agreed)
    }

    async fn train<M: Classifier>(&mut self, model: &mut M, source: &Path) -> Result<TrainSummary> {
        let mut matrix =
            task::block_in_place(|| self.load_if_coordinator(source, RowLayout::Labeled))?;
        let rows = self.comm.broadcast_len(matrix.len()).await?;
        self.comm.broadcast_rows(&mut matrix, rows).await?;

        task::block_in_place(|| self.train_rows(model, &matrix, rows))
    }

    async fn infer<M: Classifier>(
        &mut self,
        model: &M,
        source: &Path,
    ) -> Result<Option<PredictionVector>> {
        let full = task::block_in_place(|| {
            let full = self.load_if_coordinator(source, RowLayout::Unlabeled)?;
            if self.comm.is_coordinator() {
                self.dump_sample(&full)?;
            }
            Ok::<_, OrchestraErr>(full)
        })?;

        let rows = self.comm.broadcast_len(full.len()).await?;
        let plan = PartitionPlan::new(rows, self.comm.world());
        let range = plan.range(self.comm.rank());

        let mut local = DatasetMatrix::new(plan.chunk());
        self.comm.scatter_rows(&full, &plan, &mut local).await?;

        let labels = match local.features(0..local.len()) {
            Some(x) => {
                let batch_size = self.settings.batch_size.get();
                task::block_in_place(|| predict_chunked(model, x, batch_size))?
            }
            None => Vec::new(),
        };

        let partial = Partial {
            offset: range.start,
            labels,
        };

        match self.comm.gather(partial).await? {
            Some(partials) => Ok(Some(PredictionVector::assemble(&plan, partials)?)),
            None => Ok(None),
        }
    }

    async fn abort(&mut self, reason: &str) -> Result<()> {
        self.comm.abort(reason).await
    }

    async fn finish(&mut self) -> Result<()> {
        self.comm.close().await
    }
}
