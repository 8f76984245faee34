//! Error-notification channel for the serial queue.
//!
//! # 設計
//! - イベントは `error` の一種類のみ（汎用 emitter にはしない）
//! - 登録順に同期的に呼び出す
//! - 呼び出し中はロックを保持しない（listener 内から登録/解除しても deadlock しない）
//! - listener の panic は捕まえて warn に落とす（残りの listener も呼ばれる）

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;
use ulid::Ulid;

use crate::error::{TaskFailure, panic_message};

/// Handle returned by [`ErrorListeners::on_error`], used to detach the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(Ulid);

impl ListenerId {
    fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Listener<E> = Arc<dyn Fn(&TaskFailure<E>) + Send + Sync>;

/// Registry of `error` listeners.
pub struct ErrorListeners<E> {
    entries: Mutex<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> ErrorListeners<E> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener<E>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a listener. It is called once per failed task, after every
    /// listener registered before it.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TaskFailure<E>) + Send + Sync + 'static,
    {
        let id = ListenerId::generate();
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Detach a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `failure` to every listener, returning how many were called.
    pub(crate) fn emit(&self, failure: &TaskFailure<E>) -> usize {
        // snapshot を取ってからロック外で呼ぶ
        let snapshot: Vec<Listener<E>> = self
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for (index, listener) in snapshot.iter().enumerate() {
            // listener の panic で driver を止めない
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(failure))) {
                warn!(index, panic = %panic_message(payload.as_ref()), "error listener panicked");
            }
        }
        snapshot.len()
    }
}

impl<E> Default for ErrorListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for ErrorListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorListeners")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(reason: &str) -> TaskFailure<String> {
        TaskFailure::Failed(reason.to_string())
    }

    #[test]
    fn emits_in_registration_order() {
        let listeners = ErrorListeners::<String>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            listeners.on_error(move |f| {
                let reason = f.reason().cloned().unwrap_or_default();
                seen.lock().unwrap().push(format!("{name}:{reason}"));
            });
        }

        let called = listeners.emit(&failure("boom"));
        assert_eq!(called, 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:boom", "second:boom", "third:boom"]
        );
    }

    #[test]
    fn removed_listener_is_not_called() {
        let listeners = ErrorListeners::<String>::new();
        let hits = Arc::new(Mutex::new(0));

        let id = {
            let hits = Arc::clone(&hits);
            listeners.on_error(move |_| *hits.lock().unwrap() += 1)
        };
        assert_eq!(listeners.len(), 1);

        assert!(listeners.remove_listener(id));
        assert!(!listeners.remove_listener(id));
        assert!(listeners.is_empty());

        assert_eq!(listeners.emit(&failure("ignored")), 0);
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn listener_may_detach_itself_while_emitting() {
        let listeners = Arc::new(ErrorListeners::<String>::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let id = {
            let registry = Arc::clone(&listeners);
            let slot = Arc::clone(&slot);
            listeners.on_error(move |_| {
                if let Some(id) = slot.lock().unwrap().take() {
                    registry.remove_listener(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        assert_eq!(listeners.emit(&failure("once")), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn panicking_listener_does_not_stop_the_others() {
        let listeners = ErrorListeners::<String>::new();
        let hits = Arc::new(Mutex::new(0));

        listeners.on_error(|_| panic!("listener bug"));
        {
            let hits = Arc::clone(&hits);
            listeners.on_error(move |_| *hits.lock().unwrap() += 1);
        }

        assert_eq!(listeners.emit(&failure("boom")), 2);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn listener_id_display_has_prefix() {
        let listeners = ErrorListeners::<String>::new();
        let id = listeners.on_error(|_| {});
        assert!(id.to_string().starts_with("listener-"));
    }
}
