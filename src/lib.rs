//! # swrtask
//!
//! **swrtask** resolves the keyed async tasks one request needs, speculatively
//! and in parallel, and serves cacheable ones through a stale-while-revalidate
//! cache.
//!
//! A request declares the tasks it will read. The [`TaskManager`] walks their
//! declared dependencies, rejects cycles, and starts every resolution at once,
//! most depended-upon first. Reading a value later returns a [`Lazy`] that only
//! waits if the resolution is still running. The [`CachingManager`] decorator
//! answers cacheable tasks from an [`SwrStore`], refreshing stale entries in
//! the background and falling back to stale values when a refresh fails.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   request handler
//!        │ preload_all([page, cart]) / get(key)
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  CachingManager (optional decorator)                              │
//! │  - SwrStore (entries + tags)   - RevalidationLock (one per key)   │
//! └──────┬───────────────────────────────────────────────┬────────────┘
//!        │ pass-through / miss                           │ stale
//!        ▼                                               ▼
//! ┌───────────────────────────────────────┐      detached refresh task
//! │  TaskManager (per request)            │      (awaits shared handle,
//! │  - Locator (key → Task)               │       writes fresh entry)
//! │  - DependencyGraph (order, cycles)    │
//! │  - pending: key → TaskHandle          │
//! │  - resolved: key → Lazy               │
//! └──────┬────────────────────────────────┘
//!        │ spawn_resolution (timeout, permit, catch_unwind)
//!        ▼
//!   Task::resolve(TaskContext) ── ctx.dependency(k) ──► same manager
//!        │
//!        │ publishes TaskStarting / TaskResolved / TaskFailed / Cache*
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       subscriber_listener ──► SubscriberSet
//!                                              ┌─────────┼─────────┐
//!                                              ▼         ▼         ▼
//!                                          Profiler  LogWriter   custom
//! ```
//!
//! ### Lifecycle of one key
//! ```text
//! untracked ──preload──► pending(handle) ──get──► resolved(Lazy) ──value()──► memoized
//!     ▲                                                                           │
//!     └─────────────────────────────── reset() ───────────────────────────────────┘
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Tasks**         | Keyed async resolutions with declared dependencies.           | [`Task`], [`TaskFn`], [`Registry`]          |
//! | **Manager**       | Speculative start, per-key memoization, cycle rejection.      | [`TaskManager`], [`Manager`], [`Lazy`]      |
//! | **Caching**       | Stale-while-revalidate with stale-if-error and tags.          | [`CachingManager`], [`CachePolicy`]         |
//! | **Subscriber API**| Hook into resolution and cache events.                        | [`Subscribe`], [`Profiler`]                 |
//! | **Errors**        | Typed errors for tasks, the manager, and stores.              | [`TaskError`], [`ManagerError`]             |
//! | **Configuration** | Timeout, concurrency cap, bus capacity.                       | [`Config`], [`ManagerBuilder`]              |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] that renders events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use swrtask::{
//!     CachePolicy, CacheSpec, CachingManager, Manager, MemoryLock, MemoryStore, Profiler,
//!     Registry, RequestContext, Subscribe, TaskFn, TaskManager,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stock = TaskFn::new("stock", |ctx| async move {
//!         let sku = ctx.request().get("sku").unwrap_or("none").to_string();
//!         Ok(format!("12 left of {sku}"))
//!     })
//!     .cached(CacheSpec::new(CachePolicy::new(300, 3600, 86400), |ctx| {
//!         vec![format!("sku:{}", ctx.get("sku").unwrap_or("none"))]
//!     }))
//!     .into_arc();
//!
//!     let page = TaskFn::new("page", |ctx| async move {
//!         let stock = ctx.dependency_as::<String>("stock").await?;
//!         Ok(format!("<p>{stock}</p>"))
//!     })
//!     .with_dependencies(["stock"])
//!     .into_arc();
//!
//!     let profiler = Arc::new(Profiler::new());
//!     let manager = TaskManager::builder(Arc::new(Registry::new().with(stock).with(page)))
//!         .with_context(RequestContext::new("req-1").with_param("sku", "42"))
//!         .with_subscribers(vec![profiler.clone() as Arc<dyn Subscribe>])
//!         .build();
//!
//!     let cached = CachingManager::new(manager, Arc::new(MemoryStore::new()))
//!         .with_lock(Arc::new(MemoryLock::new()));
//!
//!     cached.preload_all(&["page"]).await?;
//!     let html = cached.get("page").await?;
//!     assert_eq!(*html.get::<String>().await?, "<p>12 left of 42</p>");
//!     Ok(())
//! }
//! ```
mod cache;
mod core;
mod error;
mod events;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use cache::{
    CacheEntry, CachePolicy, CacheSpec, Cacheable, CachingManager, LockGuard, MemoryLock,
    MemoryStore, RevalidationLock, SwrStore, default_cache_key, unix_now,
};
pub use core::{
    Config, DependencyGraph, Lazy, Manager, ManagerBuilder, Resolution, TaskHandle, TaskManager,
    Tracked,
};
pub use error::{CacheError, CycleError, ManagerError, TaskError};
pub use events::{Bus, CacheStatus, Event, EventKind};
pub use subscribers::{Profiler, Subscribe, SubscriberSet, TimelineEntry, TimelineStatus};
pub use tasks::{
    BoxTaskFuture, Locator, Registry, RequestContext, Task, TaskContext, TaskFn, TaskKey, TaskRef,
    TaskValue,
};

// Optional: expose a built-in tracing subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
