//! Queue state machine.

use serde::{Deserialize, Serialize};

/// Observable state of a [`SerialQueue`](super::SerialQueue).
///
/// Product of two orthogonal flags: is a task in flight, and is the queue
/// paused. State transitions:
/// - Idle -> Running (enqueue of the sole pending task, or unpause with work)
/// - Running -> Idle (task settled, nothing pending)
/// - Running -> RunningPaused (pause while a task is in flight)
/// - RunningPaused -> IdlePaused (in-flight task settled)
/// - IdlePaused -> Idle / Running (unpause)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Nothing in flight, new work starts immediately.
    #[default]
    Idle,

    /// A task is in flight.
    Running,

    /// Nothing in flight, new work is held back until unpause.
    IdlePaused,

    /// A task is still in flight, but nothing new will start after it.
    RunningPaused,
}

impl QueueState {
    pub fn from_flags(running: bool, paused: bool) -> Self {
        match (running, paused) {
            (false, false) => QueueState::Idle,
            (true, false) => QueueState::Running,
            (false, true) => QueueState::IdlePaused,
            (true, true) => QueueState::RunningPaused,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, QueueState::Running | QueueState::RunningPaused)
    }

    pub fn is_paused(self) -> bool {
        matches!(self, QueueState::IdlePaused | QueueState::RunningPaused)
    }

    /// Would an enqueue dispatch right away?
    pub fn accepts_dispatch(self) -> bool {
        matches!(self, QueueState::Idle)
    }
}
