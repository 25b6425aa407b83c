//! # Handle to one resolution.
//!
//! A [`TaskHandle`] observes a resolution running on the tokio runtime. Every
//! clone observes the same resolution; a manager hands out exactly one handle
//! (and its clones) per key, so concurrent readers never start a second
//! resolution.
//!
//! ```text
//! spawn_resolution ──► Completer ──send_replace(Some(result))──┐
//!                                                              ▼
//!                        watch channel: None (pending) ──► Some(Ok | Err)
//!                                                              │
//!            TaskHandle::wait() / peek() / is_finished() ◄─────┘
//! ```
//!
//! The transition pending → resolved/failed happens exactly once.

use std::fmt;

use tokio::sync::watch;

use crate::error::TaskError;
use crate::tasks::{TaskKey, TaskValue};

/// Outcome of one resolution.
pub type Resolution = Result<TaskValue, TaskError>;

/// Write side of a handle; owned by the spawned resolution.
pub(crate) struct Completer {
    tx: watch::Sender<Option<Resolution>>,
}

impl Completer {
    /// Publishes the outcome to every handle clone.
    pub(crate) fn complete(self, res: Resolution) {
        self.tx.send_replace(Some(res));
    }
}

/// Shared, cloneable handle to an in-flight or completed resolution.
#[derive(Clone)]
pub struct TaskHandle {
    key: TaskKey,
    rx: watch::Receiver<Option<Resolution>>,
}

impl TaskHandle {
    /// Creates a pending handle and its write side.
    pub(crate) fn pending(key: TaskKey) -> (Completer, Self) {
        let (tx, rx) = watch::channel(None);
        (Completer { tx }, Self { key, rx })
    }

    /// Creates an already-completed handle.
    pub fn ready(key: impl Into<TaskKey>, value: TaskValue) -> Self {
        let (_tx, rx) = watch::channel(Some(Ok(value)));
        Self {
            key: key.into(),
            rx,
        }
    }

    /// Key of the task being resolved.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the outcome without waiting, if the resolution has completed.
    pub fn peek(&self) -> Option<Resolution> {
        self.rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Returns true if both handles observe the same resolution.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.rx.same_channel(&other.rx)
    }

    /// Waits for the outcome.
    pub async fn wait(&self) -> Resolution {
        let mut rx = self.rx.clone();
        let res = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        res.unwrap_or_else(|| {
            Err(TaskError::Panicked {
                info: "resolution dropped before completion".to_string(),
            })
        })
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("key", &self.key)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn clones_share_one_outcome() {
        let (completer, handle) = TaskHandle::pending(Arc::from("a"));
        let other = handle.clone();
        assert!(handle.ptr_eq(&other));
        assert!(!handle.is_finished());

        let waiter = tokio::spawn(async move { other.wait().await });
        completer.complete(Ok(Arc::new(5u8)));

        let value = waiter.await.unwrap().unwrap();
        assert_eq!(*value.downcast::<u8>().unwrap(), 5);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn ready_handle_completes_immediately() {
        let handle = TaskHandle::ready("a", Arc::new("v"));
        assert!(handle.peek().is_some());
        assert!(handle.wait().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_completer_fails_waiters() {
        let (completer, handle) = TaskHandle::pending(Arc::from("a"));
        drop(completer);
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.as_label(), "task_panicked");
    }

    #[test]
    fn independent_handles_differ() {
        let a = TaskHandle::ready("a", Arc::new(1u8));
        let b = TaskHandle::ready("a", Arc::new(1u8));
        assert!(!a.ptr_eq(&b));
    }
}
