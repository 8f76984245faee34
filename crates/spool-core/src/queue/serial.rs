//! Serial task queue implementation.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{ErrorListeners, ListenerId, QueueState};
use crate::error::TaskFailure;
use crate::observability::QueueSnapshot;

/// Future produced by a queued task.
pub type TaskFuture<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'static>>;

/// A niladic unit of work. Invoked exactly once, when it reaches the head of
/// the queue.
pub type Task<E> = Box<dyn FnOnce() -> TaskFuture<E> + Send + 'static>;

/// A task that has been popped off the pending list and owns the slot.
struct Dispatch<E> {
    seq: u64,
    task: Task<E>,
    settled: watch::Sender<bool>,
}

/// Queue bookkeeping.
///
/// Invariant: `current` is `Some` exactly while one dispatched task has not
/// settled yet.
struct SerialQueueState<E> {
    pending: VecDeque<Task<E>>,

    /// Completion signal of the in-flight task.
    current: Option<watch::Receiver<bool>>,

    paused: bool,

    dispatched: u64,
    succeeded: u64,
    failed: u64,
}

impl<E> SerialQueueState<E> {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            paused: false,
            dispatched: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    fn state(&self) -> QueueState {
        QueueState::from_flags(self.current.is_some(), self.paused)
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            state: self.state(),
            pending: self.pending.len(),
            dispatched: self.dispatched,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }

    /// Pop the head task and occupy the execution slot with it.
    fn take_next(&mut self) -> Option<Dispatch<E>> {
        debug_assert!(self.current.is_none(), "slot must be free before dispatch");
        let task = self.pending.pop_front()?;
        let (settled, rx) = watch::channel(false);
        self.current = Some(rx);
        self.dispatched += 1;
        Some(Dispatch {
            seq: self.dispatched,
            task,
            settled,
        })
    }
}

struct Inner<E> {
    state: Mutex<SerialQueueState<E>>,
    listeners: ErrorListeners<E>,
    status: watch::Sender<QueueSnapshot>,
    handle: Handle,
}

impl<E> Inner<E> {
    fn lock(&self) -> MutexGuard<'_, SerialQueueState<E>> {
        // state は bookkeeping のみなので poison されても中身は一貫している
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SerialQueueState<E>) {
        self.status.send_replace(state.snapshot());
    }
}

/// Runs asynchronous tasks one at a time, in the order they were enqueued.
///
/// - At most one task is in flight at any time.
/// - A failed (or panicking) task is reported to the `error` listeners and
///   the next pending task starts as if it had succeeded.
/// - `pause()` never interrupts the task in flight; it only withholds the
///   start of the next one until `unpause()`.
///
/// The handle is cheap to clone; every clone drives the same queue.
///
/// # Example
/// ```ignore
/// let queue: SerialQueue<String> = SerialQueue::new();
/// queue.on_error(|failure| eprintln!("{failure}"));
/// queue.enqueue(|| async { write_asset().await });
/// queue.drained().await;
/// ```
pub struct SerialQueue<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for SerialQueue<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Send + 'static> SerialQueue<E> {
    /// Create an empty, idle, unpaused queue on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime, like `tokio::spawn`.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create a queue whose tasks are spawned on `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        let (status, _) = watch::channel(QueueSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SerialQueueState::new()),
                listeners: ErrorListeners::new(),
                status,
                handle,
            }),
        }
    }

    /// Append a task. If the queue is idle, unpaused and this is the only
    /// pending task, it is dispatched right away.
    pub fn enqueue<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.enqueue_boxed(Box::new(move || Box::pin(task()) as TaskFuture<E>));
    }

    /// [`enqueue`](Self::enqueue) for an already boxed task.
    pub fn enqueue_boxed(&self, task: Task<E>) {
        let next = {
            let mut state = self.inner.lock();
            state.pending.push_back(task);
            debug!(pending = state.pending.len(), "task enqueued");

            let next = if state.state().accepts_dispatch() && state.pending.len() == 1 {
                state.take_next()
            } else {
                None
            };
            self.inner.publish(&state);
            next
        };

        if let Some(dispatch) = next {
            self.launch(dispatch);
        }
    }

    /// Drop every task that has not started yet. The task in flight, if any,
    /// is not affected.
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.inner.lock();
            let dropped = std::mem::take(&mut state.pending);
            self.inner.publish(&state);
            dropped
        };
        debug!(dropped = dropped.len(), "pending tasks cleared");
    }

    /// Stop starting new tasks.
    ///
    /// The returned future is the drain point: it settles when the task in
    /// flight settles (success or failure), or immediately if the queue is
    /// idle. Every future returned while the same task is in flight settles
    /// at the same moment.
    pub fn pause(&self) -> impl Future<Output = ()> + Send + use<E> {
        let current = {
            let mut state = self.inner.lock();
            state.paused = true;
            self.inner.publish(&state);
            state.current.clone()
        };
        debug!(in_flight = current.is_some(), "queue paused");

        async move {
            if let Some(mut settled) = current {
                // sender が drop された場合も settled とみなす
                let _ = settled.wait_for(|done| *done).await;
            }
        }
    }

    /// Resume starting tasks. If nothing is in flight, the head of the
    /// pending list is dispatched right away.
    pub fn unpause(&self) {
        let next = {
            let mut state = self.inner.lock();
            state.paused = false;
            let next = if state.current.is_none() {
                state.take_next()
            } else {
                None
            };
            self.inner.publish(&state);
            next
        };
        debug!(dispatching = next.is_some(), "queue unpaused");

        if let Some(dispatch) = next {
            self.launch(dispatch);
        }
    }

    /// Resolves once the queue is idle, unpaused and has nothing pending.
    ///
    /// A paused queue never counts as drained; use [`pause`](Self::pause)
    /// for a drain point that ignores pending work.
    pub fn drained(&self) -> impl Future<Output = ()> + Send + use<E> {
        let mut status = self.inner.status.subscribe();
        async move {
            let _ = status.wait_for(QueueSnapshot::is_drained).await;
        }
    }

    fn launch(&self, dispatch: Dispatch<E>) {
        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn(drive(inner, dispatch));
    }
}

impl<E> SerialQueue<E> {
    /// Current state, derived from the in-flight slot and the pause flag.
    pub fn state(&self) -> QueueState {
        self.inner.lock().state()
    }

    /// A task is in flight (paused or not).
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// `pause()` was called and `unpause()` has not been called since.
    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    /// Tasks waiting to start, not counting the one in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// State and cumulative counters at this instant.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.lock().snapshot()
    }

    /// Receiver that observes every state change of the queue.
    pub fn watch(&self) -> watch::Receiver<QueueSnapshot> {
        self.inner.status.subscribe()
    }

    /// The `error` listener registry of this queue.
    pub fn listeners(&self) -> &ErrorListeners<E> {
        &self.inner.listeners
    }

    /// Attach an `error` listener. See [`ErrorListeners::on_error`].
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TaskFailure<E>) + Send + Sync + 'static,
    {
        self.inner.listeners.on_error(listener)
    }

    /// Detach an `error` listener. See [`ErrorListeners::remove_listener`].
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove_listener(id)
    }
}

impl<E: Send + 'static> Default for SerialQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for SerialQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("snapshot", &self.snapshot())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

/// Drive dispatched tasks until the queue goes idle or gets paused.
///
/// One driver exists per busy period. Each task body runs in its own spawned
/// tokio task so that a panic surfaces as a `JoinError` instead of killing
/// the chain.
async fn drive<E: Send + 'static>(inner: Arc<Inner<E>>, first: Dispatch<E>) {
    let mut dispatch = first;
    loop {
        let Dispatch {
            seq,
            task,
            settled,
        } = dispatch;
        debug!(seq, "task dispatched");

        let outcome = match inner.handle.spawn(async move { task().await }).await {
            Ok(result) => result.map_err(TaskFailure::Failed),
            Err(join_err) => Err(TaskFailure::from_join_error(join_err)),
        };

        // failure hook: completion hook より先に listener へ通知
        if let Err(failure) = &outcome {
            warn!(seq, panicked = failure.is_panic(), "task failed");
            inner.listeners.emit(failure);
        }

        // completion hook: slot を空けて、pause されていなければ次へ
        let next = {
            let mut state = inner.lock();
            state.current = None;
            match outcome {
                Ok(()) => state.succeeded += 1,
                Err(_) => state.failed += 1,
            }
            let next = if state.paused { None } else { state.take_next() };
            inner.publish(&state);
            next
        };
        let _ = settled.send(true);
        debug!(seq, "task settled");

        match next {
            Some(following) => dispatch = following,
            None => break,
        }
    }
}
