use std::{num::NonZeroUsize, path::Path};

use log::{debug, info};
use machine_learning::Classifier;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use tokio::task;

use super::{Strategy, TrainSummary, report_progress};
use crate::{
    OrchestraErr, Result,
    batch::{BatchAccumulator, BatchView, Flush},
    config::{RunConfig, Settings},
    data::{RowLayout, RowStream},
    gather::PredictionVector,
    partition::PartitionPlan,
};

/// One process streaming rows into a batch buffer and fanning every batch out to a thread pool.
///
/// Threads only read the dispatched batch and each one writes its own slot, the buffer is
/// refilled once all of them are done. Training sums the per thread gradients in range order
/// and applies a single update per batch.
pub struct SharedMemory {
    pool: ThreadPool,
    settings: Settings,
}

impl SharedMemory {
    /// Creates a new `SharedMemory` strategy backed by `threads` threads.
    pub fn new(threads: NonZeroUsize, settings: Settings) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .thread_name(|i| format!("orchestra-{i}"))
            .build()?;

        Ok(Self { pool, settings })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn plan(&self, batch: &BatchView<'_>) -> PartitionPlan {
        let threads = NonZeroUsize::new(self.threads()).unwrap_or(NonZeroUsize::MIN);
        PartitionPlan::new(batch.len(), threads)
    }

    /// One gradient step over `batch`, the gradient being computed in parallel.
    fn step<M: Classifier>(&self, model: &mut M, batch: BatchView<'_>) -> Result<f32> {
        let plan = self.plan(&batch);
        let shared: &M = model;
        let ranges: Vec<_> = plan.ranges().filter(|range| !range.is_empty()).collect();

        let parts = self.pool.install(|| {
            ranges
                .into_par_iter()
                .map(|range| -> Result<(Vec<f32>, f32)> {
                    let part = batch.batch(range.clone()).ok_or_else(|| {
                        OrchestraErr::Protocol(format!("rows {range:?} are not in the batch"))
                    })?;

                    let mut grad = vec![0.0; shared.size()];
                    let loss = shared.gradient(part, &mut grad)?;
                    Ok((grad, loss))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut grad = vec![0.0; model.size()];
        let mut loss = 0.0;
        for (part, part_loss) in parts {
            for (total, g) in grad.iter_mut().zip(part) {
                *total += g;
            }
            loss += part_loss;
        }

        model.apply_gradient(&grad, batch.len(), self.settings.learning_rate)?;
        Ok(loss / batch.len() as f32)
    }

    /// Predicts `batch`, every thread writing the labels of its own range.
    fn predict<M: Classifier>(&self, model: &M, batch: BatchView<'_>) -> Result<Vec<u8>> {
        let plan = self.plan(&batch);
        let mut labels = vec![0; batch.len()];
        if labels.is_empty() {
            return Ok(labels);
        }

        self.pool.install(|| {
            labels
                .par_chunks_mut(plan.chunk())
                .enumerate()
                .try_for_each(|(thread, slot)| -> Result<()> {
                    let range = plan.range(thread);
                    let x = batch.features(range.clone()).ok_or_else(|| {
                        OrchestraErr::Protocol(format!("rows {range:?} are not in the batch"))
                    })?;

                    slot.copy_from_slice(&model.predict(x)?);
                    Ok(())
                })
        })?;

        Ok(labels)
    }

    fn train_epoch<M: Classifier>(&self, model: &mut M, source: &Path) -> Result<TrainSummary> {
        let mut acc = BatchAccumulator::new(self.settings.batch_size);
        let mut summary = TrainSummary::default();

        for sample in RowStream::open(source, RowLayout::Labeled)? {
            if let Some(batch) = acc.accumulate(&sample?) {
                summary.loss = self.step(model, batch)?;
                report_progress(true, batch.len(), false);
            }
        }

        if let Some(batch) = acc.finish() {
            summary.loss = self.step(model, batch)?;
            report_progress(true, batch.len(), batch.flush() == Flush::Partial);
        }

        let stats = acc.stats();
        summary.samples = stats.samples;
        summary.full_batches = stats.full;
        summary.partial_batches = stats.partial;
        Ok(summary)
    }

    /// Streams the unlabeled rows of `source` through the pool, in order.
    fn predict_stream<M: Classifier>(&self, model: &M, source: &Path) -> Result<PredictionVector> {
        let mut acc = BatchAccumulator::new(self.settings.batch_size);
        let mut predictions = PredictionVector::new();

        for (index, sample) in RowStream::open(source, RowLayout::Unlabeled)?.enumerate() {
            let sample = sample?;
            if let Some(dump) = &self.settings.dump {
                dump.dump_if(index, sample.features())?;
            }

            if let Some(batch) = acc.accumulate(&sample) {
                predictions.append(&self.predict(model, batch)?);
            }
        }

        if let Some(batch) = acc.finish() {
            predictions.append(&self.predict(model, batch)?);
        }

        debug!(rows = predictions.len(), batches = acc.stats().full + acc.stats().partial; "inference done");
        Ok(predictions)
    }
}

impl Strategy for SharedMemory {
    fn is_coordinator(&self) -> bool {
        true
    }

    async fn agree(&mut self, config: &RunConfig) -> Result<RunConfig> {
        self.settings = config.settings();
        Ok(config.clone())
    }

    async fn train<M: Classifier>(&mut self, model: &mut M, source: &Path) -> Result<TrainSummary> {
        let mut summary = TrainSummary::default();

        for epoch in 0..self.settings.epochs.get() {
            let epoch_summary = task::block_in_place(|| self.train_epoch(model, source))?;
            summary.samples += epoch_summary.samples;
            summary.full_batches += epoch_summary.full_batches;
            summary.partial_batches += epoch_summary.partial_batches;
            summary.loss = epoch_summary.loss;

            info!(epoch = epoch + 1, loss = summary.loss; "epoch done");
        }

        Ok(summary)
    }

    async fn infer<M: Classifier>(
        &mut self,
        model: &M,
        source: &Path,
    ) -> Result<Option<PredictionVector>> {
        let predictions = task::block_in_place(|| self.predict_stream(model, source))?;
        Ok(Some(predictions))
    }

    async fn abort(&mut self, _reason: &str) -> Result<()> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
