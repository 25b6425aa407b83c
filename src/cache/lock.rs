//! # Revalidation lock.
//!
//! Prevents concurrent background refreshes of the same cache key (thundering
//! herd / cache stampede) when many requests hit one stale entry at once.
//!
//! ```text
//! request A ── stale ──► acquire(key) = true  ──► revalidate ──► release(key)
//! request B ── stale ──► acquire(key) = false ──► serve stale, no refresh
//! ```
//!
//! [`LockGuard`] ties the release to scope: it is released explicitly on the
//! normal path and, if the owning future is dropped or unwinds, from `Drop`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

/// Non-blocking lock keyed by cache key.
#[async_trait]
pub trait RevalidationLock: Send + Sync + 'static {
    /// Attempts to take the lock; `false` if it is already held.
    async fn acquire(&self, key: &str) -> bool;

    /// Releases the lock.
    async fn release(&self, key: &str);
}

/// In-process [`RevalidationLock`].
#[derive(Default)]
pub struct MemoryLock {
    held: Mutex<HashSet<String>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` is currently held.
    pub async fn is_held(&self, key: &str) -> bool {
        self.held.lock().await.contains(key)
    }
}

#[async_trait]
impl RevalidationLock for MemoryLock {
    async fn acquire(&self, key: &str) -> bool {
        self.held.lock().await.insert(key.to_string())
    }

    async fn release(&self, key: &str) {
        self.held.lock().await.remove(key);
    }
}

/// Scoped ownership of an acquired revalidation lock.
///
/// Dropping the guard releases the lock on the current runtime. Outside a
/// runtime the lock stays held and a warning is logged.
pub struct LockGuard {
    lock: Option<Arc<dyn RevalidationLock>>,
    key: String,
}

impl LockGuard {
    /// Wraps a lock that was already acquired for `key`.
    pub fn acquired(lock: Arc<dyn RevalidationLock>, key: impl Into<String>) -> Self {
        Self {
            lock: Some(lock),
            key: key.into(),
        }
    }

    /// Releases the lock now.
    pub async fn release(mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release(&self.key).await;
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move { lock.release(&key).await });
            }
            Err(_) => {
                warn!(%key, "revalidation lock dropped outside a runtime; lock stays held");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_dropped_outside_runtime_keeps_lock() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let lock = Arc::new(MemoryLock::new());
        assert!(rt.block_on(lock.acquire("k")));

        let guard = LockGuard::acquired(lock.clone(), "k");
        drop(guard);

        assert!(!rt.block_on(lock.acquire("k")));
    }

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let lock = MemoryLock::new();
        assert!(lock.acquire("k").await);
        assert!(!lock.acquire("k").await);
        assert!(lock.acquire("other").await);

        lock.release("k").await;
        assert!(lock.acquire("k").await);
    }

    #[tokio::test]
    async fn guard_releases_explicitly() {
        let lock = Arc::new(MemoryLock::new());
        assert!(lock.acquire("k").await);

        LockGuard::acquired(lock.clone(), "k").release().await;
        assert!(!lock.is_held("k").await);
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let lock = Arc::new(MemoryLock::new());
        assert!(lock.acquire("k").await);

        drop(LockGuard::acquired(lock.clone(), "k"));
        for _ in 0..10 {
            if !lock.is_held("k").await {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("lock was not released on drop");
    }
}
