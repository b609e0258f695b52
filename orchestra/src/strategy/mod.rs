//! The two ways of spreading a run over workers.

mod message_passing;
mod shared_memory;

use std::path::Path;

use log::{Level, log};
use machine_learning::Classifier;
use ndarray::ArrayView2;

pub use message_passing::MessagePassing;
pub use shared_memory::SharedMemory;

use crate::{Result, config::RunConfig, gather::PredictionVector};

/// What a training phase went through, as seen by one worker.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    /// Samples trained on, summed over epochs.
    pub samples: usize,
    pub full_batches: usize,
    pub partial_batches: usize,
    /// Mean loss of the last batch.
    pub loss: f32,
}

/// A way of distributing the training and inference phases of a run.
///
/// Implementors decide where the rows come from, who trains on which rows and who ends up
/// holding the predictions.
#[allow(unused)]
#[trait_variant::make(Strategy: Send)]
pub trait LocalStrategy {
    /// Whether this worker owns the final predictions and reports.
    fn is_coordinator(&self) -> bool;

    /// Settles the training knobs of the run before any model is built.
    ///
    /// # Returns
    /// `config` with the coordinator's training knobs, the strategy trains with these from now on.
    async fn agree(&mut self, config: &RunConfig) -> Result<RunConfig>;

    /// Trains `model` on the labeled rows of `source`.
    ///
    /// Only the coordinator reads `source`, other workers get the rows from it.
    async fn train<M: Classifier>(&mut self, model: &mut M, source: &Path) -> Result<TrainSummary>;

    /// Predicts a label for every unlabeled row of `source`.
    ///
    /// # Returns
    /// The predictions in input order on the coordinator, `None` on any other worker.
    async fn infer<M: Classifier>(
        &mut self,
        model: &M,
        source: &Path,
    ) -> Result<Option<PredictionVector>>;

    /// Tells every other worker the run failed.
    async fn abort(&mut self, reason: &str) -> Result<()>;

    /// Ends a successful run.
    async fn finish(&mut self) -> Result<()>;
}

/// Progress is reported by the coordinator, other workers keep it to debug.
fn report_progress(coordinator: bool, samples: usize, partial: bool) {
    let level = if coordinator { Level::Info } else { Level::Debug };

    if partial {
        log!(level, samples = samples; "trained remaining {samples} samples");
    } else {
        log!(level, samples = samples; "trained {samples} samples");
    }
}

/// Predicts `x` in chunks of at most `batch_size` rows.
fn predict_chunked<M: Classifier>(
    model: &M,
    x: ArrayView2<'_, f32>,
    batch_size: usize,
) -> Result<Vec<u8>> {
    let mut labels = Vec::with_capacity(x.nrows());
    let mut start = 0;

    while start < x.nrows() {
        let end = (start + batch_size).min(x.nrows());
        labels.extend(model.predict(x.slice(ndarray::s![start..end, ..]))?);
        start = end;
    }

    Ok(labels)
}
