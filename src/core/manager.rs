//! # Per-request task manager.
//!
//! [`TaskManager`] discovers tasks through a [`Locator`], starts their
//! resolutions speculatively in dependency-priority order, and hands out
//! [`Lazy`] wrappers whose first access waits for the result.
//!
//! ## Architecture
//! ```text
//! preload_all([page, cart])
//!     │
//!     ├─► discover: BFS over declared dependencies (NotRegistered aborts)
//!     ├─► DependencyGraph::detect_cycle()          (CycleDetected aborts)
//!     └─► start_order(): spawn_resolution() for every untracked key
//!                              │
//!                              ▼
//!                      pending: key → TaskHandle
//!                              │
//! get(key) ────────────────────┴─► resolved: key → Lazy (memoized)
//! ```
//!
//! ## Rules
//! - Each key is started at most once until [`Manager::reset`]
//! - Nothing starts when discovery or cycle detection fails
//! - `get` never starts work; it only reads what a preload started
//! - Every operation takes the state lock, so concurrent callers observe one
//!   handle per key
//!
//! ## Concurrency limit
//! With `Config::max_concurrent > 0` a resolution holds a permit only while it
//! does its own work. Waiting on a dependency through
//! [`TaskContext::dependency`] hands the permit back, so dependents never
//! starve the tasks they wait on.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, oneshot};

use crate::core::config::Config;
use crate::core::graph::DependencyGraph;
use crate::core::handle::TaskHandle;
use crate::core::lazy::Lazy;
use crate::core::runner::{ConcurrencySlot, spawn_resolution};
use crate::error::ManagerError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Locator, RequestContext, TaskContext, TaskKey, TaskRef};

/// Operations shared by [`TaskManager`] and its decorators.
#[async_trait]
pub trait Manager: Send + Sync {
    /// Starts the resolution of `key` unless it is already tracked.
    ///
    /// Unlike [`preload_all`](Manager::preload_all), dependencies are not
    /// started; they start on first access from the resolving task.
    async fn preload(&self, key: &str) -> Result<(), ManagerError>;

    /// Discovers `keys` and their transitive dependencies, rejects cycles, and
    /// starts every untracked key in dependency-priority order.
    async fn preload_all(&self, keys: &[&str]) -> Result<(), ManagerError>;

    /// Returns the deferred result of a preloaded key.
    async fn get(&self, key: &str) -> Result<Lazy, ManagerError>;

    /// Returns the shared handle of `key`, starting it if untracked.
    async fn preload_with_handle(&self, key: &str) -> Result<TaskHandle, ManagerError>;

    /// Snapshot of every tracked key.
    async fn all(&self) -> BTreeMap<TaskKey, Tracked>;

    /// Forgets every tracked key; in-flight resolutions run to completion unobserved.
    async fn reset(&self);
}

/// Tracking state of one key.
#[derive(Clone, Debug)]
pub enum Tracked {
    /// Started, not yet read through `get`.
    Pending(TaskHandle),
    /// Read through `get`; the value is memoized in the wrapper.
    Resolved(Lazy),
}

impl Tracked {
    /// The underlying resolution handle.
    pub fn handle(&self) -> &TaskHandle {
        match self {
            Tracked::Pending(handle) => handle,
            Tracked::Resolved(lazy) => lazy.handle(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Tracked::Resolved(_))
    }
}

#[derive(Default)]
struct State {
    context: RequestContext,
    pending: HashMap<TaskKey, TaskHandle>,
    resolved: HashMap<TaskKey, Lazy>,
}

impl State {
    fn is_tracked(&self, key: &str) -> bool {
        self.pending.contains_key(key) || self.resolved.contains_key(key)
    }
}

/// Shared core of a [`TaskManager`]; resolutions reach it through a weak reference.
pub(crate) struct ManagerInner {
    locator: Arc<dyn Locator>,
    cfg: Config,
    bus: Bus,
    semaphore: Option<Arc<Semaphore>>,
    state: Mutex<State>,
    /// Dropped with the manager; stops the subscriber listener.
    _listener: Option<oneshot::Sender<()>>,
}

impl ManagerInner {
    pub(crate) fn new(
        locator: Arc<dyn Locator>,
        cfg: Config,
        bus: Bus,
        context: RequestContext,
        listener: Option<oneshot::Sender<()>>,
    ) -> Self {
        let semaphore = cfg
            .concurrency_limit()
            .map(|n| Arc::new(Semaphore::new(n)));
        Self {
            locator,
            cfg,
            bus,
            semaphore,
            state: Mutex::new(State {
                context,
                ..State::default()
            }),
            _listener: listener,
        }
    }

    async fn preload(self: &Arc<Self>, key: &str) -> Result<(), ManagerError> {
        let mut state = self.state.lock().await;
        if state.is_tracked(key) {
            return Ok(());
        }
        let task = self.lookup(key)?;
        self.start(&mut state, Arc::from(key), task);
        Ok(())
    }

    async fn preload_all(self: &Arc<Self>, keys: &[&str]) -> Result<(), ManagerError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;

        let discovered = self.discover(keys)?;

        let mut graph = DependencyGraph::new();
        for (key, (_, deps)) in &discovered {
            graph.add_node(key.clone(), deps.clone());
        }
        graph.detect_cycle()?;

        for key in graph.start_order() {
            if state.is_tracked(&key) {
                continue;
            }
            if let Some((task, _)) = discovered.get(&key) {
                self.start(&mut state, key.clone(), task.clone());
            }
        }
        Ok(())
    }

    /// Breadth-first walk over declared dependencies.
    fn discover(
        &self,
        roots: &[&str],
    ) -> Result<HashMap<TaskKey, (TaskRef, Vec<TaskKey>)>, ManagerError> {
        let mut found: HashMap<TaskKey, (TaskRef, Vec<TaskKey>)> = HashMap::new();
        let mut seen: HashSet<TaskKey> = HashSet::new();
        let mut queue: VecDeque<TaskKey> = VecDeque::new();

        for root in roots {
            let root: TaskKey = Arc::from(*root);
            if seen.insert(root.clone()) {
                queue.push_back(root);
            }
        }

        while let Some(key) = queue.pop_front() {
            let task = self.lookup(&key)?;
            let deps = task.dependencies();
            for dep in &deps {
                if seen.insert(dep.clone()) {
                    queue.push_back(dep.clone());
                }
            }
            found.insert(key, (task, deps));
        }
        Ok(found)
    }

    fn lookup(&self, key: &str) -> Result<TaskRef, ManagerError> {
        self.locator
            .get(key)
            .ok_or_else(|| ManagerError::NotRegistered { key: Arc::from(key) })
    }

    /// Spawns the resolution of an untracked key and records its handle.
    fn start(self: &Arc<Self>, state: &mut State, key: TaskKey, task: TaskRef) -> TaskHandle {
        let deps: Arc<[TaskKey]> = task.dependencies().into();
        self.bus.publish(
            Event::new(EventKind::TaskStarting)
                .with_task(key.clone())
                .with_dependencies(&deps),
        );

        let slot = ConcurrencySlot::new(self.semaphore.clone());
        let ctx = TaskContext::new(
            key.clone(),
            state.context.clone(),
            deps,
            Arc::downgrade(self),
            slot.clone(),
        );
        let handle = spawn_resolution(
            key.clone(),
            task.resolve(ctx),
            self.cfg.resolution_timeout(),
            slot,
            self.bus.clone(),
        );
        state.pending.insert(key, handle.clone());
        handle
    }

    async fn get(&self, key: &str) -> Result<Lazy, ManagerError> {
        let mut state = self.state.lock().await;
        if let Some(lazy) = state.resolved.get(key) {
            return Ok(lazy.clone());
        }
        let Some((key, handle)) = state.pending.remove_entry(key) else {
            return Err(ManagerError::NotPreloaded { key: Arc::from(key) });
        };
        let lazy = Lazy::new(key.clone(), handle);
        state.resolved.insert(key, lazy.clone());
        Ok(lazy)
    }

    pub(crate) async fn preload_with_handle(
        self: &Arc<Self>,
        key: &str,
    ) -> Result<TaskHandle, ManagerError> {
        let mut state = self.state.lock().await;
        if let Some(lazy) = state.resolved.get(key) {
            return Ok(lazy.handle().clone());
        }
        if let Some(handle) = state.pending.get(key) {
            return Ok(handle.clone());
        }
        let task = self.lookup(key)?;
        Ok(self.start(&mut state, Arc::from(key), task))
    }

    async fn all(&self) -> BTreeMap<TaskKey, Tracked> {
        let state = self.state.lock().await;
        let pending = state
            .pending
            .iter()
            .map(|(k, h)| (k.clone(), Tracked::Pending(h.clone())));
        let resolved = state
            .resolved
            .iter()
            .map(|(k, l)| (k.clone(), Tracked::Resolved(l.clone())));
        pending.chain(resolved).collect()
    }

    async fn reset(&self) {
        let mut state = self.state.lock().await;
        let dropped = state.pending.len() + state.resolved.len();
        state.pending.clear();
        state.resolved.clear();
        drop(state);

        self.bus.publish(
            Event::new(EventKind::ManagerReset).with_reason(format!("tracked={dropped}")),
        );
    }
}

/// Per-request task manager.
///
/// Cheap to clone; clones share tracking state.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use swrtask::{Manager, Registry, TaskFn, TaskManager};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), swrtask::ManagerError> {
/// let registry = Registry::new()
///     .with(TaskFn::arc("user", |_ctx| async { Ok(String::from("ada")) }))
///     .with(
///         TaskFn::new("greeting", |ctx| async move {
///             let user = ctx.dependency_as::<String>("user").await?;
///             Ok(format!("hello {user}"))
///         })
///         .with_dependencies(["user"])
///         .into_arc(),
///     );
///
/// let manager = TaskManager::new(Arc::new(registry));
/// manager.preload_all(&["greeting"]).await?;
///
/// let greeting = manager.get("greeting").await?;
/// assert_eq!(*greeting.get::<String>().await?, "hello ada");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    /// Manager with default [`Config`], empty request context and no subscribers.
    pub fn new(locator: Arc<dyn Locator>) -> Self {
        crate::core::builder::ManagerBuilder::new(locator).build()
    }

    /// Starts a [`ManagerBuilder`](crate::ManagerBuilder).
    pub fn builder(locator: Arc<dyn Locator>) -> crate::core::builder::ManagerBuilder {
        crate::core::builder::ManagerBuilder::new(locator)
    }

    pub(crate) fn from_inner(inner: ManagerInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Task lookup used for discovery.
    pub fn locator(&self) -> &Arc<dyn Locator> {
        &self.inner.locator
    }

    /// Event bus shared by resolutions and decorators.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    /// Current request context.
    pub async fn context(&self) -> RequestContext {
        self.inner.state.lock().await.context.clone()
    }

    /// Replaces the request context; only resolutions started afterwards see it.
    pub async fn set_context(&self, context: RequestContext) {
        self.inner.state.lock().await.context = context;
    }
}

#[async_trait]
impl Manager for TaskManager {
    async fn preload(&self, key: &str) -> Result<(), ManagerError> {
        self.inner.preload(key).await
    }

    async fn preload_all(&self, keys: &[&str]) -> Result<(), ManagerError> {
        self.inner.preload_all(keys).await
    }

    async fn get(&self, key: &str) -> Result<Lazy, ManagerError> {
        self.inner.get(key).await
    }

    async fn preload_with_handle(&self, key: &str) -> Result<TaskHandle, ManagerError> {
        self.inner.preload_with_handle(key).await
    }

    async fn all(&self) -> BTreeMap<TaskKey, Tracked> {
        self.inner.all().await
    }

    async fn reset(&self) {
        self.inner.reset().await
    }
}
