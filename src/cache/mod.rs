//! # Stale-while-revalidate caching layer.
//!
//! - [`CacheEntry`], [`CachePolicy`] - stored value and its freshness windows
//! - [`Cacheable`], [`CacheSpec`] - what a task declares to opt in
//! - [`SwrStore`], [`MemoryStore`] - storage backend contract and in-process store
//! - [`RevalidationLock`], [`MemoryLock`], [`LockGuard`] - one background refresh per key
//! - [`CachingManager`] - decorator serving cacheable tasks through a store
//!
//! ## Windows (seconds, from `created_at`)
//! ```text
//! 0 ──── max_age ──── max_age + swr ──── max_age + sie
//! │ fresh  │  stale, refresh  │ stale only on error │ gone
//! ```

mod decorator;
mod entry;
mod key;
mod lock;
mod store;

pub use decorator::CachingManager;
pub use entry::{CacheEntry, CachePolicy, unix_now};
pub use key::{CacheSpec, Cacheable, default_cache_key};
pub use lock::{LockGuard, MemoryLock, RevalidationLock};
pub use store::{MemoryStore, SwrStore};
