//! # Cache entries with stale-while-revalidate metadata.
//!
//! TTL semantics follow HTTP `Cache-Control`:
//! - `max_age`: fresh window (serve without revalidation)
//! - `stale_while_revalidate`: seconds after `max_age` to serve stale while revalidating
//! - `stale_if_error`: seconds after `max_age` to serve stale if resolution fails
//!
//! Both stale windows are additive offsets from `max_age`, not chained:
//! ```text
//! created_at        +max_age          +max_age+swr            +max_age+sie
//!     │── fresh ───────│── stale (revalidate) ─│                     │
//!     │── fresh ───────│── stale (on error) ──────────────────────────│
//! ```
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use swrtask::{CacheEntry, CachePolicy};
//!
//! let entry = CacheEntry::new(Arc::new("v"), 1000, CachePolicy::new(300, 3600, 86400));
//! assert!(entry.is_fresh_at(1300));
//! assert!(!entry.is_fresh_at(1301));
//! assert_eq!(entry.total_ttl(), 3900);
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::tasks::TaskValue;

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Freshness windows declared by a cacheable task, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Fresh window.
    pub max_age: u64,
    /// Stale-while-revalidate window after `max_age` (`0` disables background refresh).
    pub stale_while_revalidate: u64,
    /// Stale-if-error window after `max_age` (`0` propagates errors immediately).
    pub stale_if_error: u64,
}

impl CachePolicy {
    pub const fn new(max_age: u64, stale_while_revalidate: u64, stale_if_error: u64) -> Self {
        Self {
            max_age,
            stale_while_revalidate,
            stale_if_error,
        }
    }

    /// Storage TTL for the backend: `max_age + max(swr, sie)`.
    #[inline]
    pub fn total_ttl(&self) -> u64 {
        self.max_age
            .saturating_add(self.stale_while_revalidate.max(self.stale_if_error))
    }
}

/// Immutable cached value with SWR metadata.
///
/// A refresh produces a new entry; entries are never updated in place.
#[derive(Clone)]
pub struct CacheEntry {
    value: TaskValue,
    created_at: u64,
    policy: CachePolicy,
}

impl CacheEntry {
    pub fn new(value: TaskValue, created_at: u64, policy: CachePolicy) -> Self {
        Self {
            value,
            created_at,
            policy,
        }
    }

    /// Entry created now.
    pub fn fresh(value: TaskValue, policy: CachePolicy) -> Self {
        Self::new(value, unix_now(), policy)
    }

    pub fn value(&self) -> &TaskValue {
        &self.value
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Age in seconds at `now` (zero if `now` precedes creation).
    #[inline]
    pub fn age_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// `age ≤ max_age`
    pub fn is_fresh_at(&self, now: u64) -> bool {
        self.age_at(now) <= self.policy.max_age
    }

    /// `age ≤ max_age + stale_while_revalidate`
    pub fn is_stale_revalidatable_at(&self, now: u64) -> bool {
        self.age_at(now)
            <= self
                .policy
                .max_age
                .saturating_add(self.policy.stale_while_revalidate)
    }

    /// `age ≤ max_age + stale_if_error`
    pub fn is_stale_servable_on_error_at(&self, now: u64) -> bool {
        self.age_at(now) <= self.policy.max_age.saturating_add(self.policy.stale_if_error)
    }

    pub fn age(&self) -> u64 {
        self.age_at(unix_now())
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(unix_now())
    }

    pub fn is_stale_revalidatable(&self) -> bool {
        self.is_stale_revalidatable_at(unix_now())
    }

    pub fn is_stale_servable_on_error(&self) -> bool {
        self.is_stale_servable_on_error_at(unix_now())
    }

    /// Storage TTL for the backend.
    pub fn total_ttl(&self) -> u64 {
        self.policy.total_ttl()
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("created_at", &self.created_at)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
