//! # Cache store contract and the in-memory store.
//!
//! [`SwrStore`] is the only way the caching layer touches storage. Backends
//! (Redis, a tag-aware HTTP cache, ...) implement it outside this crate; the
//! policy of *when* to read and write lives in [`CachingManager`](crate::CachingManager).
//!
//! ## Contract
//! - `get(key)` returns the entry or `None` on miss.
//! - `set(key, entry, tags)` stores the entry; the backend derives its TTL from
//!   [`CacheEntry::total_ttl`].
//! - `invalidate_tags(tags)` drops every entry carrying any of the tags.
//!
//! [`MemoryStore`] implements the contract in-process: entries past their TTL are
//! treated as absent and removed lazily.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::entry::{CacheEntry, unix_now};
use crate::error::CacheError;

/// Storage backend for SWR entries.
#[async_trait]
pub trait SwrStore: Send + Sync + 'static {
    /// Retrieves an entry by key.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores an entry with invalidation tags.
    async fn set(&self, key: &str, entry: CacheEntry, tags: &[String]) -> Result<(), CacheError>;

    /// Invalidates all entries with any of the given tags.
    async fn invalidate_tags(&self, tags: &[String]) -> Result<(), CacheError>;
}

struct Stored {
    entry: CacheEntry,
    tags: HashSet<String>,
    expires_at: u64,
}

/// Thread-safe in-memory [`SwrStore`].
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Stored>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns the tags stored with `key`, sorted.
    pub async fn tags(&self, key: &str) -> Option<Vec<String>> {
        let entries = self.entries.read().await;
        entries.get(key).map(|s| {
            let mut tags: Vec<String> = s.tags.iter().cloned().collect();
            tags.sort_unstable();
            tags
        })
    }
}

#[async_trait]
impl SwrStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = unix_now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(s) if now <= s.expires_at => return Ok(Some(s.entry.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|s| now > s.expires_at) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, entry: CacheEntry, tags: &[String]) -> Result<(), CacheError> {
        let expires_at = entry.created_at().saturating_add(entry.total_ttl());
        let stored = Stored {
            entry,
            tags: tags.iter().cloned().collect(),
            expires_at,
        };
        self.entries.write().await.insert(key.to_string(), stored);
        Ok(())
    }

    async fn invalidate_tags(&self, tags: &[String]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.retain(|_, s| !tags.iter().any(|t| s.tags.contains(t)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CachePolicy;
    use std::sync::Arc;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        let entry = CacheEntry::fresh(Arc::new(7u32), CachePolicy::new(60, 0, 0));
        store.set("k", entry, &tags(&["a"])).await.unwrap();

        let got = store.get("k").await.unwrap().expect("hit");
        assert_eq!(*got.value().clone().downcast::<u32>().unwrap(), 7);
        assert_eq!(store.tags("k").await, Some(tags(&["a"])));
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let store = MemoryStore::new();
        let old = CacheEntry::new(Arc::new(()), unix_now() - 1_000, CachePolicy::new(10, 20, 30));
        store.set("k", old, &[]).await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn invalidate_by_any_tag() {
        let store = MemoryStore::new();
        let policy = CachePolicy::new(60, 0, 0);
        store
            .set("a", CacheEntry::fresh(Arc::new(()), policy), &tags(&["product_1", "stock"]))
            .await
            .unwrap();
        store
            .set("b", CacheEntry::fresh(Arc::new(()), policy), &tags(&["product_2"]))
            .await
            .unwrap();

        store.invalidate_tags(&tags(&["stock", "unrelated"])).await.unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());
    }
}
