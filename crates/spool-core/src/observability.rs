use serde::{Deserialize, Serialize};

use crate::queue::QueueState;

/// Point-in-time view of a serial queue. Counters are cumulative since creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub state: QueueState,
    pub pending: usize,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl QueueSnapshot {
    /// Tasks that were dispatched and have settled.
    pub fn settled(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Idle, unpaused and nothing left to do.
    pub fn is_drained(&self) -> bool {
        self.state == QueueState::Idle && self.pending == 0
    }
}
