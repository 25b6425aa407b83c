//! # Deferred result of a task.
//!
//! `TaskManager::get` returns a [`Lazy`] immediately; the wait for the
//! resolution happens on first access. The outcome is memoized in a cell shared
//! by every clone, so later accesses are plain reads and a caller that never
//! touches the result never waits.
//!
//! ```text
//! get("stock") ──► Lazy { handle, cell: empty }
//!                       │
//!          .value() ────┴─► cell empty? ─yes─► handle.wait() ─► cell = outcome
//!                                        └no─► cell
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::core::handle::{Resolution, TaskHandle};
use crate::error::ManagerError;
use crate::tasks::{TaskKey, TaskValue};

/// Handle plus memoization cell.
#[derive(Clone)]
pub struct Lazy {
    key: TaskKey,
    handle: TaskHandle,
    cell: Arc<OnceCell<Resolution>>,
}

impl Lazy {
    pub(crate) fn new(key: TaskKey, handle: TaskHandle) -> Self {
        Self {
            key,
            handle,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Already-forced wrapper around a known value.
    pub fn ready(key: impl Into<TaskKey>, value: TaskValue) -> Self {
        let key = key.into();
        Self {
            handle: TaskHandle::ready(key.clone(), value.clone()),
            cell: Arc::new(OnceCell::new_with(Some(Ok(value)))),
            key,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The underlying resolution handle.
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    /// Returns true once the outcome has been awaited and memoized.
    pub fn is_forced(&self) -> bool {
        self.cell.initialized()
    }

    /// Forces the resolution (first call only) and returns the value.
    pub async fn value(&self) -> Result<TaskValue, ManagerError> {
        let outcome = self.cell.get_or_init(|| self.handle.wait()).await;
        self.wrap(outcome.clone())
    }

    /// Forces the resolution and downcasts the value.
    pub async fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ManagerError> {
        let value = self.value().await?;
        value.downcast::<T>().map_err(|_| ManagerError::TypeMismatch {
            key: self.key.clone(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Memoized outcome without waiting; `None` until forced.
    pub fn try_value(&self) -> Option<Result<TaskValue, ManagerError>> {
        self.cell.get().map(|outcome| self.wrap(outcome.clone()))
    }

    fn wrap(&self, outcome: Resolution) -> Result<TaskValue, ManagerError> {
        outcome.map_err(|source| ManagerError::ResolutionFailed {
            key: self.key.clone(),
            source,
        })
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("key", &self.key)
            .field("forced", &self.is_forced())
            .finish()
    }
}
