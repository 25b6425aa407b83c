//! # Task abstraction.
//!
//! This module defines the [`Task`] trait, the unit of asynchronous data resolution.
//! The common handle type is [`TaskRef`], an `Arc<dyn Task>` suitable for sharing
//! between a [`Locator`](crate::Locator) and the managers that start it.
//!
//! A task:
//! - is identified by a stable [`key`](Task::key);
//! - may declare other keys it [depends on](Task::dependencies) (they are *started* first);
//! - produces a fresh `'static` future per [`resolve`](Task::resolve) call;
//! - may expose a [cache capability](Task::cacheable) for the caching layer.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cache::Cacheable;
use crate::error::TaskError;
use crate::tasks::context::TaskContext;

/// Stable identifier of a task.
pub type TaskKey = Arc<str>;

/// Resolved value of a task, shared by every reader.
pub type TaskValue = Arc<dyn Any + Send + Sync>;

/// Boxed future returned by [`Task::resolve`].
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<TaskValue, TaskError>> + Send + 'static>>;

/// Shared handle to a task object.
pub type TaskRef = Arc<dyn Task>;

/// # Asynchronous, keyed unit of data resolution.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use swrtask::{BoxTaskFuture, Task, TaskContext, TaskValue};
///
/// struct Greeting;
///
/// impl Task for Greeting {
///     fn key(&self) -> &str { "greeting" }
///
///     fn resolve(&self, ctx: TaskContext) -> BoxTaskFuture {
///         let name = ctx.request().get("name").unwrap_or("world").to_string();
///         Box::pin(async move {
///             let value: TaskValue = Arc::new(format!("hello, {name}"));
///             Ok(value)
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Returns the stable task key.
    fn key(&self) -> &str;

    /// Keys of tasks that must be started before this one.
    fn dependencies(&self) -> Vec<TaskKey> {
        Vec::new()
    }

    /// Creates a new future resolving the task for the given context.
    ///
    /// The future is spawned immediately by the manager and must not borrow `self`.
    fn resolve(&self, ctx: TaskContext) -> BoxTaskFuture;

    /// Cache capability, if the task's result may be cached.
    fn cacheable(&self) -> Option<&dyn Cacheable> {
        None
    }
}
