//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: Fn(TaskContext) -> Fut`, producing a fresh
//! future per resolution. The closure's output type `T` is the statically declared
//! result type of the task; readers recover it with `Lazy::get::<T>()`.
//!
//! ## Concurrency semantics
//! - Each call to [`Task::resolve`] creates a **new** future owning its own state.
//! - No hidden mutation between resolutions; shared state goes through an explicit `Arc<...>`.
//!
//! ## Example
//! ```rust
//! use swrtask::{CachePolicy, CacheSpec, RequestContext, Task, TaskContext, TaskError, TaskFn, TaskRef};
//!
//! #[derive(Debug)]
//! struct Stock { quantity: u32 }
//!
//! let stock: TaskRef = TaskFn::arc("stock", |ctx: TaskContext| async move {
//!     let _sku = ctx.request().get("sku");
//!     Ok::<_, TaskError>(Stock { quantity: 3 })
//! });
//! assert_eq!(stock.key(), "stock");
//!
//! let cached = TaskFn::new("price", |_ctx: TaskContext| async { Ok::<_, TaskError>(42u32) })
//!     .with_dependencies(["stock"])
//!     .cached(CacheSpec::new(CachePolicy::new(60, 300, 3600), |ctx: &RequestContext| {
//!         vec![format!("sku_{}", ctx.get("sku").unwrap_or("none"))]
//!     }));
//! assert!(cached.cacheable().is_some());
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheSpec, Cacheable};
use crate::error::TaskError;
use crate::tasks::context::TaskContext;
use crate::tasks::task::{BoxTaskFuture, Task, TaskKey, TaskValue};

/// Function-backed task implementation.
///
/// Wraps a closure that *creates* a new future per resolution.
pub struct TaskFn<F> {
    key: TaskKey,
    dependencies: Vec<TaskKey>,
    cache: Option<CacheSpec>,
    f: F,
}

impl<F, Fut, T> TaskFn<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    T: Any + Send + Sync,
{
    /// Creates a new function-backed task.
    ///
    /// Prefer [`TaskFn::arc`] when you immediately need a [`TaskRef`](crate::TaskRef).
    pub fn new(key: impl Into<TaskKey>, f: F) -> Self {
        Self {
            key: key.into(),
            dependencies: Vec::new(),
            cache: None,
            f,
        }
    }

    /// Creates the task and returns it as a shared handle.
    pub fn arc(key: impl Into<TaskKey>, f: F) -> Arc<Self> {
        Arc::new(Self::new(key, f))
    }
}

impl<F> TaskFn<F> {
    /// Declares tasks that must be started before this one.
    pub fn with_dependencies<I, K>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<TaskKey>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Makes the task cacheable with the given spec.
    pub fn cached(mut self, spec: CacheSpec) -> Self {
        self.cache = Some(spec.for_task(self.key.clone()));
        self
    }

    /// Wraps the task into an `Arc`.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<F, Fut, T> Task for TaskFn<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    T: Any + Send + Sync,
{
    fn key(&self) -> &str {
        &self.key
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.dependencies.clone()
    }

    fn resolve(&self, ctx: TaskContext) -> BoxTaskFuture {
        let fut = (self.f)(ctx);
        Box::pin(async move {
            let value: TaskValue = Arc::new(fut.await?);
            Ok(value)
        })
    }

    fn cacheable(&self) -> Option<&dyn Cacheable> {
        self.cache.as_ref().map(|c| c as &dyn Cacheable)
    }
}
