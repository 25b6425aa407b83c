//! # Stale-while-revalidate caching over a task manager.
//!
//! [`CachingManager`] wraps a [`TaskManager`] and serves tasks that expose a
//! [`Cacheable`] policy from an [`SwrStore`]. Everything else passes through.
//!
//! ## State machine (per `get`)
//! ```text
//!                 ┌── not cacheable ────────────────────────► inner.get(key)
//! get(key) ──────►┤
//!                 └── cacheable ──► store.get(cache_key)
//!                                        │
//!      ┌──────────────────┬──────────────┴───────────┬───────────────────────┐
//!      ▼                  ▼                          ▼                       ▼
//!   fresh             stale (≤ swr)              absent                older
//!   serve             serve + refresh          resolve ──► ok ──► store + serve
//!                     in background                 └──► err ──► within sie? serve stale
//!                     (one per key with lock)                    else propagate
//! ```
//!
//! ## Rules
//! - Cache hits return an already-forced [`Lazy`]
//! - A miss resolves through the inner manager's shared handle, so a key that
//!   was preloaded is never resolved twice
//! - The background refresh outlives the request; it is never awaited and its
//!   failures are only logged
//! - Store read errors count as a miss; store write errors never fail a request

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::entry::{CacheEntry, CachePolicy, unix_now};
use crate::cache::key::Cacheable;
use crate::cache::lock::{LockGuard, RevalidationLock};
use crate::cache::store::SwrStore;
use crate::core::{Lazy, Manager, TaskHandle, TaskManager, Tracked};
use crate::error::{CacheError, ManagerError};
use crate::events::{Bus, CacheStatus, Event, EventKind};
use crate::tasks::{TaskKey, TaskValue};

/// What one cacheable `get` works on.
#[derive(Clone)]
struct Target {
    task: TaskKey,
    cache_key: Arc<str>,
    tags: Arc<[String]>,
    policy: CachePolicy,
}

impl Target {
    fn new(task: TaskKey, cacheable: &dyn Cacheable, ctx: &crate::tasks::RequestContext) -> Self {
        Self {
            cache_key: Arc::from(cacheable.cache_key(ctx)),
            tags: cacheable.cache_tags(ctx).into(),
            policy: cacheable.policy(),
            task,
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_task(self.task.clone())
            .with_cache_key(self.cache_key.clone())
    }
}

/// Caching decorator for a [`TaskManager`].
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use swrtask::{CachePolicy, CacheSpec, CachingManager, Manager, MemoryStore, Registry, TaskFn, TaskManager};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), swrtask::ManagerError> {
/// let price = TaskFn::new("price", |_ctx| async { Ok(42u32) })
///     .cached(CacheSpec::new(CachePolicy::new(300, 3600, 86400), |_ctx| {
///         vec!["price".to_string()]
///     }))
///     .into_arc();
///
/// let manager = TaskManager::new(Arc::new(Registry::new().with(price)));
/// let cached = CachingManager::new(manager, Arc::new(MemoryStore::new()));
///
/// // a miss resolves and stores; the next read is served from the store
/// assert_eq!(*cached.get("price").await?.get::<u32>().await?, 42);
/// assert_eq!(*cached.get("price").await?.get::<u32>().await?, 42);
/// # Ok(())
/// # }
/// ```
pub struct CachingManager {
    inner: TaskManager,
    store: Arc<dyn SwrStore>,
    lock: Option<Arc<dyn RevalidationLock>>,
}

impl CachingManager {
    pub fn new(inner: TaskManager, store: Arc<dyn SwrStore>) -> Self {
        Self {
            inner,
            store,
            lock: None,
        }
    }

    /// Limits background refreshes to one per cache key.
    pub fn with_lock(mut self, lock: Arc<dyn RevalidationLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// The wrapped manager.
    pub fn inner(&self) -> &TaskManager {
        &self.inner
    }

    /// Invalidates every entry carrying any of `tags`.
    pub async fn invalidate_tags(&self, tags: &[String]) -> Result<(), CacheError> {
        self.store.invalidate_tags(tags).await
    }

    fn bus(&self) -> &Bus {
        self.inner.bus()
    }

    async fn get_cached(
        &self,
        target: Target,
        started: Instant,
    ) -> Result<Lazy, ManagerError> {
        let existing = self.lookup(&target).await;
        let now = unix_now();

        if let Some(entry) = &existing {
            if entry.is_fresh_at(now) {
                debug!(key = %target.cache_key, "cache hit (fresh)");
                self.publish_hit(&target, CacheStatus::Fresh, started);
                return Ok(Lazy::ready(target.task.clone(), entry.value().clone()));
            }
            if entry.is_stale_revalidatable_at(now) {
                self.revalidate(&target).await;
                self.publish_hit(&target, CacheStatus::Stale, started);
                return Ok(Lazy::ready(target.task.clone(), entry.value().clone()));
            }
        }

        debug!(key = %target.cache_key, "cache miss");
        self.bus().publish(target.event(EventKind::CacheMiss));

        let handle = self.inner.preload_with_handle(&target.task).await?;
        match handle.wait().await {
            Ok(value) => {
                store_value(&*self.store, self.bus(), &target, value.clone()).await;
                Ok(Lazy::ready(target.task.clone(), value))
            }
            Err(source) => {
                let fallback = existing.filter(|e| e.is_stale_servable_on_error_at(unix_now()));
                if let Some(entry) = fallback {
                    warn!(key = %target.cache_key, error = %source, "serving stale due to error");
                    self.publish_hit(&target, CacheStatus::StaleError, started);
                    return Ok(Lazy::ready(target.task.clone(), entry.value().clone()));
                }
                Err(ManagerError::ResolutionFailed {
                    key: target.task.clone(),
                    source,
                })
            }
        }
    }

    /// Reads the entry; backend errors count as a miss.
    async fn lookup(&self, target: &Target) -> Option<CacheEntry> {
        match self.store.get(&target.cache_key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %target.cache_key, error = %e, "cache read failed");
                self.bus()
                    .publish(target.event(EventKind::StoreFailed).with_reason(e.to_string()));
                None
            }
        }
    }

    /// Schedules a detached refresh of a stale entry.
    async fn revalidate(&self, target: &Target) {
        let guard = match &self.lock {
            None => None,
            Some(lock) => {
                if !lock.acquire(&target.cache_key).await {
                    debug!(key = %target.cache_key, "revalidation already in flight");
                    self.bus()
                        .publish(target.event(EventKind::RevalidationSkipped));
                    return;
                }
                Some(LockGuard::acquired(lock.clone(), target.cache_key.to_string()))
            }
        };

        let handle = match self.inner.preload_with_handle(&target.task).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(key = %target.cache_key, error = %e, "background revalidation failed");
                self.bus().publish(
                    target
                        .event(EventKind::RevalidationFailed)
                        .with_reason(e.to_string()),
                );
                if let Some(guard) = guard {
                    guard.release().await;
                }
                return;
            }
        };

        debug!(key = %target.cache_key, "cache hit (stale), revalidating");
        self.bus()
            .publish(target.event(EventKind::RevalidationScheduled));

        let store = self.store.clone();
        let bus = self.bus().clone();
        let target = target.clone();
        tokio::spawn(async move {
            refresh(handle, &*store, &bus, &target).await;
            if let Some(guard) = guard {
                guard.release().await;
            }
        });
    }

    fn publish_hit(&self, target: &Target, status: CacheStatus, started: Instant) {
        self.bus().publish(
            target
                .event(EventKind::CacheHit)
                .with_cache_status(status)
                .with_elapsed(started.elapsed()),
        );
    }
}

/// Waits for the resolution and writes the new entry.
async fn refresh(handle: TaskHandle, store: &dyn SwrStore, bus: &Bus, target: &Target) {
    match handle.wait().await {
        Ok(value) => {
            if store_value(store, bus, target, value).await {
                debug!(key = %target.cache_key, "background revalidation succeeded");
                bus.publish(target.event(EventKind::RevalidationSucceeded));
            }
        }
        Err(e) => {
            warn!(key = %target.cache_key, error = %e, "background revalidation failed");
            bus.publish(
                target
                    .event(EventKind::RevalidationFailed)
                    .with_reason(e.to_string()),
            );
        }
    }
}

/// Stores `value` as a fresh entry; returns false if the backend failed.
async fn store_value(store: &dyn SwrStore, bus: &Bus, target: &Target, value: TaskValue) -> bool {
    let entry = CacheEntry::new(value, unix_now(), target.policy);
    match store.set(&target.cache_key, entry, &target.tags).await {
        Ok(()) => {
            bus.publish(target.event(EventKind::CacheStored));
            true
        }
        Err(e) => {
            warn!(key = %target.cache_key, error = %e, "cache write failed");
            bus.publish(target.event(EventKind::StoreFailed).with_reason(e.to_string()));
            false
        }
    }
}

#[async_trait]
impl Manager for CachingManager {
    async fn preload(&self, key: &str) -> Result<(), ManagerError> {
        self.inner.preload(key).await
    }

    async fn preload_all(&self, keys: &[&str]) -> Result<(), ManagerError> {
        self.inner.preload_all(keys).await
    }

    /// Serves cacheable tasks through the store; other keys pass through.
    async fn get(&self, key: &str) -> Result<Lazy, ManagerError> {
        let started = Instant::now();
        let Some(task) = self.inner.locator().get(key) else {
            return self.inner.get(key).await;
        };
        let Some(cacheable) = task.cacheable() else {
            return self.inner.get(key).await;
        };

        let ctx = self.inner.context().await;
        let target = Target::new(Arc::from(key), cacheable, &ctx);
        self.get_cached(target, started).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::broadcast;

    use crate::cache::key::{CacheSpec, default_cache_key};
    use crate::cache::lock::MemoryLock;
    use crate::cache::store::MemoryStore;
    use crate::error::TaskError;
    use crate::tasks::{Registry, RequestContext, TaskFn, TaskRef};

    const POLICY: CachePolicy = CachePolicy::new(300, 3600, 86400);

    struct Fixture {
        manager: CachingManager,
        store: Arc<MemoryStore>,
        calls: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
    }

    fn stock_task(policy: CachePolicy, calls: Arc<AtomicUsize>, failing: Arc<AtomicBool>) -> TaskRef {
        TaskFn::new("stock", move |_ctx| {
            let calls = calls.clone();
            let failing = failing.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if failing.load(Ordering::SeqCst) {
                    return Err(TaskError::fail("backend down"));
                }
                Ok(format!("stock v{n}"))
            }
        })
        .cached(CacheSpec::new(policy, |ctx| {
            vec![format!("sku:{}", ctx.get("sku").unwrap_or("-"))]
        }))
        .into_arc()
    }

    fn fixture(policy: CachePolicy) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = Arc::new(AtomicBool::new(false));
        let registry = Registry::new()
            .with(stock_task(policy, calls.clone(), failing.clone()))
            .with(TaskFn::arc("plain", |_ctx| async { Ok(7u8) }));
        let inner = TaskManager::builder(Arc::new(registry))
            .with_context(RequestContext::new("req").with_param("sku", "42"))
            .build();
        let store = Arc::new(MemoryStore::new());
        Fixture {
            manager: CachingManager::new(inner, store.clone()),
            store,
            calls,
            failing,
        }
    }

    fn cache_key() -> String {
        default_cache_key("stock", &["sku:42".to_string()])
    }

    async fn seed(store: &MemoryStore, value: &str, age: u64, policy: CachePolicy) {
        let entry = CacheEntry::new(Arc::new(value.to_string()), unix_now() - age, policy);
        store
            .set(&cache_key(), entry, &["sku:42".to_string()])
            .await
            .unwrap();
    }

    async fn value_of(lazy: Lazy) -> String {
        lazy.get::<String>().await.unwrap().as_str().to_string()
    }

    async fn wait_for_any(rx: &mut broadcast::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn wait_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let ev = rx.recv().await.unwrap();
                if ev.kind == kind {
                    return ev;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn miss_resolves_and_stores_with_tags() {
        let fx = fixture(POLICY);
        let mut rx = fx.manager.inner().bus().subscribe();

        let lazy = fx.manager.get("stock").await.unwrap();
        assert!(lazy.is_forced());
        assert_eq!(value_of(lazy).await, "stock v1");

        assert_eq!(wait_for(&mut rx, EventKind::CacheMiss).await.task.as_deref(), Some("stock"));
        wait_for(&mut rx, EventKind::CacheStored).await;
        assert_eq!(fx.store.tags(&cache_key()).await, Some(vec!["sku:42".to_string()]));

        let stored = fx.store.get(&cache_key()).await.unwrap().unwrap();
        assert_eq!(stored.policy(), POLICY);
        assert!(stored.is_fresh());
    }

    #[tokio::test]
    async fn fresh_hit_skips_resolution() {
        let fx = fixture(POLICY);
        seed(&fx.store, "cached", 10, POLICY).await;
        let mut rx = fx.manager.inner().bus().subscribe();

        let lazy = fx.manager.get("stock").await.unwrap();
        assert_eq!(value_of(lazy).await, "cached");
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);

        let hit = wait_for(&mut rx, EventKind::CacheHit).await;
        assert_eq!(hit.cache_status, Some(CacheStatus::Fresh));
    }

    #[tokio::test]
    async fn second_get_is_served_from_store() {
        let fx = fixture(POLICY);
        assert_eq!(value_of(fx.manager.get("stock").await.unwrap()).await, "stock v1");
        assert_eq!(value_of(fx.manager.get("stock").await.unwrap()).await, "stock v1");
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_is_served_and_refreshed_once() {
        let fx = fixture(POLICY);
        seed(&fx.store, "old", 400, POLICY).await;
        let mut rx = fx.manager.inner().bus().subscribe();

        fx.manager.preload_all(&["stock"]).await.unwrap();
        let lazy = fx.manager.get("stock").await.unwrap();
        assert_eq!(value_of(lazy).await, "old");

        let mut stored = 0;
        loop {
            match wait_for_any(&mut rx).await.kind {
                EventKind::CacheStored => stored += 1,
                EventKind::RevalidationSucceeded => break,
                _ => {}
            }
        }
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);

        let refreshed = fx.manager.get("stock").await.unwrap();
        assert_eq!(value_of(refreshed).await, "stock v1");

        tokio::time::sleep(Duration::from_millis(20)).await;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::CacheStored {
                stored += 1;
            }
        }
        assert_eq!(stored, 1);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn held_lock_skips_revalidation() {
        let mut fx = fixture(POLICY);
        let lock = Arc::new(MemoryLock::new());
        fx.manager = fx.manager.with_lock(lock.clone());
        seed(&fx.store, "old", 400, POLICY).await;
        let mut rx = fx.manager.inner().bus().subscribe();

        assert!(lock.acquire(&cache_key()).await);
        let lazy = fx.manager.get("stock").await.unwrap();
        assert_eq!(value_of(lazy).await, "old");

        wait_for(&mut rx, EventKind::RevalidationSkipped).await;
        assert!(fx.manager.all().await.is_empty());
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lock_is_released_after_revalidation() {
        let mut fx = fixture(POLICY);
        let lock = Arc::new(MemoryLock::new());
        fx.manager = fx.manager.with_lock(lock.clone());
        seed(&fx.store, "old", 400, POLICY).await;
        let mut rx = fx.manager.inner().bus().subscribe();

        fx.manager.get("stock").await.unwrap();
        wait_for(&mut rx, EventKind::RevalidationSucceeded).await;

        for _ in 0..50 {
            if !lock.is_held(&cache_key()).await {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("revalidation lock was not released");
    }

    #[tokio::test]
    async fn failed_revalidation_keeps_stale_entry() {
        let fx = fixture(POLICY);
        fx.failing.store(true, Ordering::SeqCst);
        seed(&fx.store, "old", 400, POLICY).await;
        let mut rx = fx.manager.inner().bus().subscribe();

        let lazy = fx.manager.get("stock").await.unwrap();
        assert_eq!(value_of(lazy).await, "old");

        let failed = wait_for(&mut rx, EventKind::RevalidationFailed).await;
        assert!(failed.reason.as_deref().unwrap_or_default().contains("backend down"));
        let kept = fx.store.get(&cache_key()).await.unwrap().unwrap();
        assert_eq!(*kept.value().clone().downcast::<String>().unwrap(), "old");
    }

    #[tokio::test]
    async fn stale_if_error_serves_old_value() {
        let policy = CachePolicy::new(300, 0, 3600);
        let fx = fixture(policy);
        fx.failing.store(true, Ordering::SeqCst);
        seed(&fx.store, "old", 1000, policy).await;
        let mut rx = fx.manager.inner().bus().subscribe();

        let lazy = fx.manager.get("stock").await.unwrap();
        assert_eq!(value_of(lazy).await, "old");

        let hit = wait_for(&mut rx, EventKind::CacheHit).await;
        assert_eq!(hit.cache_status, Some(CacheStatus::StaleError));
    }

    #[tokio::test]
    async fn error_past_every_window_propagates() {
        let policy = CachePolicy::new(300, 0, 3600);
        let fx = fixture(policy);
        fx.failing.store(true, Ordering::SeqCst);
        seed(&fx.store, "ancient", 5000, policy).await;

        let err = fx.manager.get("stock").await.unwrap_err();
        assert_eq!(err.as_label(), "manager_resolution_failed");
        assert_eq!(err.task_error(), Some(&TaskError::fail("backend down")));
    }

    #[tokio::test]
    async fn miss_without_entry_propagates_error() {
        let fx = fixture(POLICY);
        fx.failing.store(true, Ordering::SeqCst);
        assert!(fx.manager.get("stock").await.is_err());
    }

    #[tokio::test]
    async fn non_cacheable_tasks_pass_through() {
        let fx = fixture(POLICY);
        let err = fx.manager.get("plain").await.unwrap_err();
        assert!(matches!(err, ManagerError::NotPreloaded { .. }));

        fx.manager.preload("plain").await.unwrap();
        let lazy = fx.manager.get("plain").await.unwrap();
        assert_eq!(*lazy.get::<u8>().await.unwrap(), 7);
        assert!(fx.store.is_empty().await);

        let err = fx.manager.get("ghost").await.unwrap_err();
        assert!(matches!(err, ManagerError::NotPreloaded { .. }));
    }

    #[tokio::test]
    async fn invalidation_forces_a_new_resolution() {
        let fx = fixture(POLICY);
        fx.manager.get("stock").await.unwrap();
        fx.manager
            .invalidate_tags(&["sku:42".to_string()])
            .await
            .unwrap();
        assert!(fx.store.is_empty().await);

        // the inner handle is memoized for the request, reset to resolve again
        fx.manager.reset().await;
        let lazy = fx.manager.get("stock").await.unwrap();
        assert_eq!(value_of(lazy).await, "stock v2");
    }

    struct BrokenStore;

    #[async_trait]
    impl SwrStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Backend {
                error: "read refused".into(),
            })
        }

        async fn set(&self, _key: &str, _entry: CacheEntry, _tags: &[String]) -> Result<(), CacheError> {
            Err(CacheError::Backend {
                error: "write refused".into(),
            })
        }

        async fn invalidate_tags(&self, _tags: &[String]) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn store_errors_never_fail_the_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new().with(stock_task(
            POLICY,
            calls.clone(),
            Arc::new(AtomicBool::new(false)),
        ));
        let manager = CachingManager::new(TaskManager::new(Arc::new(registry)), Arc::new(BrokenStore));
        let mut rx = manager.inner().bus().subscribe();

        let lazy = manager.get("stock").await.unwrap();
        assert_eq!(value_of(lazy).await, "stock v1");

        let read = wait_for(&mut rx, EventKind::StoreFailed).await;
        assert!(read.reason.as_deref().unwrap_or_default().contains("read refused"));
        let write = wait_for(&mut rx, EventKind::StoreFailed).await;
        assert!(write.reason.as_deref().unwrap_or_default().contains("write refused"));
    }
}
