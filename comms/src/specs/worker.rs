use serde::{Deserialize, Serialize};

/// What the coordinator tells every peer once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Rank assigned by the coordinator, the coordinator itself is rank `0`.
    pub rank: usize,
    /// Total amount of workers in the group, coordinator included.
    pub world: usize,
}
