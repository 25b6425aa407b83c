//! # Task abstractions.
//!
//! This module provides the core task-related types:
//! - [`Task`] - trait for implementing keyed async resolutions
//! - [`TaskFn`] - function-backed task implementation
//! - [`TaskRef`], [`TaskKey`], [`TaskValue`] - shared handles and aliases
//! - [`RequestContext`], [`TaskContext`] - what a resolution sees
//! - [`Locator`], [`Registry`] - lookup of tasks by key

mod context;
mod registry;
mod task;
mod task_fn;

pub use context::{RequestContext, TaskContext};
pub use registry::{Locator, Registry};
pub use task::{BoxTaskFuture, Task, TaskKey, TaskRef, TaskValue};
pub use task_fn::TaskFn;
