//! Error types used by the task manager, the caching layer, and tasks.
//!
//! This module defines the error enums of the crate:
//!
//! - [`TaskError`] : errors raised by an individual task resolution.
//! - [`ManagerError`] : errors raised by a manager (registration, usage, cycles, wrapped resolution failures).
//! - [`CycleError`] : a dependency cycle found by [`DependencyGraph`](crate::DependencyGraph).
//! - [`CacheError`] : errors reported by a cache store backend.
//!
//! The enums provide `as_label` for logs/events.

use std::time::Duration;
use thiserror::Error;

use crate::tasks::TaskKey;

/// # Errors produced by task resolution.
///
/// A resolution outcome is shared by every waiter of a [`TaskHandle`](crate::TaskHandle),
/// so the type is `Clone` and carries messages rather than boxed sources.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task execution failed.
    #[error("resolution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task resolved successfully but has no data to return.
    ///
    /// A valid empty state (e.g. a product without editorial content), not a failure of the backend.
    #[error("resolved with no data")]
    NoData,

    /// Resolution exceeded the configured timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The resolution future panicked.
    #[error("resolution panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The task asked for a key it did not declare in [`Task::dependencies`](crate::Task::dependencies).
    #[error("dependency {key:?} was not declared")]
    UndeclaredDependency {
        /// The requested key.
        key: TaskKey,
    },

    /// A declared dependency could not be read.
    #[error("dependency {key:?} failed: {error}")]
    Dependency {
        /// The dependency key.
        key: TaskKey,
        /// Human-readable cause.
        error: String,
    },

    /// A dependency resolved to a value of another type.
    #[error("dependency {key:?} is not a {expected}")]
    TypeMismatch {
        /// The dependency key.
        key: TaskKey,
        /// The requested type name.
        expected: &'static str,
    },

    /// The manager that started the task was dropped.
    #[error("owning manager is gone")]
    ManagerGone,
}

impl TaskError {
    /// Builds a [`TaskError::Fail`] from anything displayable.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use swrtask::TaskError;
    /// use std::time::Duration;
    ///
    /// let err = TaskError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "task_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::NoData => "task_no_data",
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::UndeclaredDependency { .. } => "task_undeclared_dependency",
            TaskError::Dependency { .. } => "task_dependency_failed",
            TaskError::TypeMismatch { .. } => "task_type_mismatch",
            TaskError::ManagerGone => "task_manager_gone",
        }
    }

    /// Indicates the "empty but valid" outcome.
    pub fn is_no_data(&self) -> bool {
        matches!(self, TaskError::NoData)
    }
}

/// # Dependency cycle.
///
/// `path` lists the recursion stack that closed the cycle; the first repeated key
/// appears twice (`a -> b -> a`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circular task dependency detected: {}", render_path(.path))]
pub struct CycleError {
    /// Keys along the cycle, in visiting order.
    pub path: Vec<TaskKey>,
}

fn render_path(path: &[TaskKey]) -> String {
    path.iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// # Errors produced by a manager.
///
/// `NotRegistered`, `NotPreloaded` and `CycleDetected` are developer errors and are
/// reported immediately; `ResolutionFailed` wraps the task's own error.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ManagerError {
    /// No task is registered for the key.
    #[error("task {key:?} is not registered")]
    NotRegistered {
        /// The unknown key.
        key: TaskKey,
    },

    /// `get` was called for a key that was never preloaded.
    #[error("task {key:?} was not preloaded; call preload() or preload_all() before get()")]
    NotPreloaded {
        /// The key that was read.
        key: TaskKey,
    },

    /// The requested batch contains a dependency cycle; nothing was started.
    #[error(transparent)]
    CycleDetected(#[from] CycleError),

    /// The task's resolution failed.
    #[error("failed to resolve task {key:?}: {source}")]
    ResolutionFailed {
        /// The failing key.
        key: TaskKey,
        /// The task's error, unchanged.
        #[source]
        source: TaskError,
    },

    /// The resolved value is not of the requested type.
    #[error("task {key:?} did not resolve to a {expected}")]
    TypeMismatch {
        /// The key that was read.
        key: TaskKey,
        /// The requested type name.
        expected: &'static str,
    },
}

impl ManagerError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::NotRegistered { .. } => "manager_not_registered",
            ManagerError::NotPreloaded { .. } => "manager_not_preloaded",
            ManagerError::CycleDetected(_) => "manager_cycle_detected",
            ManagerError::ResolutionFailed { .. } => "manager_resolution_failed",
            ManagerError::TypeMismatch { .. } => "manager_type_mismatch",
        }
    }

    /// Returns the underlying task error for `ResolutionFailed`.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            ManagerError::ResolutionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// # Errors reported by cache store backends.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The backend failed to serve the request.
    #[error("cache backend error: {error}")]
    Backend {
        /// The underlying error message.
        error: String,
    },
}

impl CacheError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            CacheError::Backend { .. } => "cache_backend",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn cycle_error_renders_path() {
        let err = CycleError {
            path: vec![Arc::from("a"), Arc::from("b"), Arc::from("a")],
        };
        assert_eq!(
            err.to_string(),
            "circular task dependency detected: a -> b -> a"
        );
    }

    #[test]
    fn resolution_failed_keeps_source() {
        let err = ManagerError::ResolutionFailed {
            key: Arc::from("stock"),
            source: TaskError::fail("boom"),
        };
        assert_eq!(err.task_error(), Some(&TaskError::fail("boom")));
        assert_eq!(err.as_label(), "manager_resolution_failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn no_data_is_distinct_from_failure() {
        assert!(TaskError::NoData.is_no_data());
        assert!(!TaskError::fail("x").is_no_data());
    }
}
