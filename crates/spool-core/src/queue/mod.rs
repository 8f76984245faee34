//! Queue module: serial task queue, its state machine and error listeners.

mod listeners;
mod serial;
mod state;

pub use listeners::{ErrorListeners, ListenerId};
pub use serial::{SerialQueue, Task, TaskFuture};
pub use state::QueueState;
