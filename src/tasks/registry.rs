//! # Task locator contract and the default registry.
//!
//! Managers never construct tasks; they look them up by key through a [`Locator`].
//! Hosts with their own service container implement [`Locator`] directly; everyone
//! else fills a [`Registry`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::tasks::task::{TaskKey, TaskRef};

/// Lookup of task objects by key.
pub trait Locator: Send + Sync + 'static {
    /// Returns the task registered for `key`.
    fn get(&self, key: &str) -> Option<TaskRef>;

    /// Returns true if a task is registered for `key`.
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory map of tasks keyed by [`Task::key`](crate::Task::key).
#[derive(Clone, Default)]
pub struct Registry {
    tasks: HashMap<TaskKey, TaskRef>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task under its own key, returning the task it replaced.
    pub fn register(&mut self, task: TaskRef) -> Option<TaskRef> {
        let key: TaskKey = Arc::from(task.key());
        self.tasks.insert(key, task)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, task: TaskRef) -> Self {
        self.register(task);
        self
    }

    /// Returns sorted registered keys.
    pub fn keys(&self) -> Vec<TaskKey> {
        let mut keys: Vec<TaskKey> = self.tasks.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Locator for Registry {
    fn get(&self, key: &str) -> Option<TaskRef> {
        self.tasks.get(key).cloned()
    }

    fn has(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::tasks::{TaskContext, TaskFn};

    #[test]
    fn registers_by_task_key() {
        let registry = Registry::new()
            .with(TaskFn::arc("b", |_ctx: TaskContext| async { Ok::<_, TaskError>(()) }))
            .with(TaskFn::arc("a", |_ctx: TaskContext| async { Ok::<_, TaskError>(()) }));

        assert!(registry.has("a"));
        assert!(!registry.has("c"));
        assert_eq!(registry.keys(), vec![Arc::<str>::from("a"), Arc::from("b")]);
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = Registry::new();
        assert!(registry
            .register(TaskFn::arc("a", |_ctx: TaskContext| async { Ok::<_, TaskError>(1u8) }))
            .is_none());
        assert!(registry
            .register(TaskFn::arc("a", |_ctx: TaskContext| async { Ok::<_, TaskError>(2u8) }))
            .is_some());
        assert_eq!(registry.len(), 1);
    }
}
