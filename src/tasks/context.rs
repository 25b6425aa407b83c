//! # Request and task contexts.
//!
//! - [`RequestContext`] is the immutable snapshot of request-varying parameters
//!   (route parameters, locale, currency, ...). It feeds task resolution and cache
//!   key/tag generation. Building it from an inbound request is up to the host.
//! - [`TaskContext`] is what a task receives in [`Task::resolve`](crate::Task::resolve):
//!   the request context plus access to its declared dependencies.
//!
//! ## Dependency access
//! ```text
//! task.resolve(ctx)
//!     └─► ctx.dependency("user")
//!           ├─ "user" not declared      ─► TaskError::UndeclaredDependency
//!           ├─ manager dropped          ─► TaskError::ManagerGone
//!           └─ manager.preload_with_handle("user") ─► handle.wait()
//!                 (same handle as every other reader of "user";
//!                  the concurrency permit is released for the wait)
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::core::{ConcurrencySlot, ManagerInner};
use crate::error::TaskError;
use crate::tasks::task::{TaskKey, TaskValue};

/// Immutable snapshot of request parameters.
///
/// Cheap to clone; safe to move into background work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Arc<str>,
    params: Arc<BTreeMap<String, String>>,
}

impl RequestContext {
    /// Creates an empty context for the given request id.
    pub fn new(request_id: impl Into<Arc<str>>) -> Self {
        Self {
            request_id: request_id.into(),
            params: Arc::new(BTreeMap::new()),
        }
    }

    /// Returns a copy with one parameter set.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.params).insert(key.into(), value.into());
        self
    }

    /// Returns a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the request identifier.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns all parameters.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("")
    }
}

/// Context handed to a single resolution.
#[derive(Clone)]
pub struct TaskContext {
    key: TaskKey,
    request: RequestContext,
    dependencies: Arc<[TaskKey]>,
    manager: Weak<ManagerInner>,
    slot: ConcurrencySlot,
}

impl TaskContext {
    pub(crate) fn new(
        key: TaskKey,
        request: RequestContext,
        dependencies: Arc<[TaskKey]>,
        manager: Weak<ManagerInner>,
        slot: ConcurrencySlot,
    ) -> Self {
        Self {
            key,
            request,
            dependencies,
            manager,
            slot,
        }
    }

    /// Context with no owning manager; dependency reads fail with [`TaskError::ManagerGone`].
    pub fn detached(key: impl Into<TaskKey>, request: RequestContext) -> Self {
        Self::new(
            key.into(),
            request,
            Arc::from(Vec::new()),
            Weak::new(),
            ConcurrencySlot::default(),
        )
    }

    /// Key of the task being resolved.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Request parameters.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Declared dependencies of the task being resolved.
    pub fn dependencies(&self) -> &[TaskKey] {
        &self.dependencies
    }

    /// Awaits the value of a declared dependency.
    ///
    /// Under a concurrency limit the caller's permit is handed back for the
    /// duration of the wait.
    pub async fn dependency(&self, key: &str) -> Result<TaskValue, TaskError> {
        let Some(dep) = self.dependencies.iter().find(|d| d.as_ref() == key).cloned() else {
            return Err(TaskError::UndeclaredDependency { key: Arc::from(key) });
        };

        let handle = {
            let manager = self.manager.upgrade().ok_or(TaskError::ManagerGone)?;
            manager
                .preload_with_handle(&dep)
                .await
                .map_err(|e| TaskError::Dependency {
                    key: dep.clone(),
                    error: e.to_string(),
                })?
        };

        self.slot.suspend().await;
        let res = handle.wait().await;
        self.slot.resume().await;

        res.map_err(|e| TaskError::Dependency {
            key: dep,
            error: e.to_string(),
        })
    }

    /// Awaits a declared dependency and downcasts it.
    pub async fn dependency_as<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, TaskError> {
        let value = self.dependency(key).await?;
        value.downcast::<T>().map_err(|_| TaskError::TypeMismatch {
            key: Arc::from(key),
            expected: std::any::type_name::<T>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_copy_on_write() {
        let base = RequestContext::new("req-1").with_param("currency", "EUR");
        let derived = base.clone().with_param("locale", "de");

        assert_eq!(base.get("locale"), None);
        assert_eq!(derived.get("currency"), Some("EUR"));
        assert_eq!(derived.get("locale"), Some("de"));
        assert_eq!(derived.request_id(), "req-1");
    }

    #[tokio::test]
    async fn undeclared_dependency_is_rejected() {
        let ctx = TaskContext::detached("page", RequestContext::default());
        let err = ctx.dependency("user").await.unwrap_err();
        assert_eq!(err.as_label(), "task_undeclared_dependency");
    }

    #[tokio::test]
    async fn detached_context_reports_missing_manager() {
        let ctx = TaskContext::new(
            Arc::from("page"),
            RequestContext::default(),
            Arc::from(vec![Arc::<str>::from("user")]),
            Weak::new(),
            ConcurrencySlot::default(),
        );
        assert_eq!(ctx.dependency("user").await.unwrap_err(), TaskError::ManagerGone);
    }
}
