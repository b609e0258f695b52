use serde::{Deserialize, Serialize};

/// The knobs every worker of a run must agree on, as chosen by the coordinator.
///
/// Peers build their model and train from these values instead of their own configuration,
/// otherwise their share of the predictions would come from a different model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSpec {
    /// Width of the hidden layer.
    pub hidden: usize,
    pub seed: u64,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub epochs: usize,
    /// Rows a worker's matrix must be able to hold.
    pub capacity: usize,
}
