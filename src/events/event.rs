//! # Events emitted by managers, resolutions, and the caching layer.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Resolution events**: task lifecycle (starting, resolved, failed, timeout)
//! - **Cache events**: hit/miss/store decisions of the caching layer
//! - **Revalidation events**: background stale-while-revalidate refreshes
//! - **Subscriber events**: delivery problems (overflow, panic)
//!
//! The [`Event`] struct carries additional metadata such as timestamps, task key,
//! cache key, reasons, and elapsed time.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use swrtask::{CacheStatus, Event, EventKind};
//!
//! let ev = Event::new(EventKind::CacheHit)
//!     .with_task("stock")
//!     .with_cache_key("stock_42")
//!     .with_cache_status(CacheStatus::Stale);
//!
//! assert_eq!(ev.kind, EventKind::CacheHit);
//! assert_eq!(ev.task.as_deref(), Some("stock"));
//! assert_eq!(ev.cache_status, Some(CacheStatus::Stale));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::tasks::TaskKey;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Resolution events ===
    /// A resolution was started.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `dependencies`: declared dependency keys
    TaskStarting,

    /// A resolution produced a value.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `elapsed_ms`: resolution time
    TaskResolved,

    /// A resolution failed (including timeout and panic).
    ///
    /// Sets:
    /// - `task`: task key
    /// - `reason`: error message
    /// - `elapsed_ms`: resolution time
    TaskFailed,

    /// A resolution exceeded its configured timeout.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `timeout_ms`: configured timeout
    TimeoutHit,

    // === Cache events ===
    /// A cached value was served.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `cache_key`: store key
    /// - `cache_status`: fresh, stale, or stale-on-error
    CacheHit,

    /// No usable cache entry; the caller waits for a resolution.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `cache_key`: store key
    CacheMiss,

    /// A new entry was written to the store.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `cache_key`: store key
    CacheStored,

    /// The store failed to read or write.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `cache_key`: store key
    /// - `reason`: backend error
    StoreFailed,

    // === Revalidation events ===
    /// A background refresh was scheduled.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `cache_key`: store key
    RevalidationScheduled,

    /// Another holder owns the revalidation lock; no refresh was scheduled.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `cache_key`: store key
    RevalidationSkipped,

    /// A background refresh stored a new entry.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `cache_key`: store key
    RevalidationSucceeded,

    /// A background refresh failed; the stale entry stays in place.
    ///
    /// Sets:
    /// - `task`: task key
    /// - `cache_key`: store key
    /// - `reason`: error message
    RevalidationFailed,

    // === Manager events ===
    /// All tracked state of a manager was cleared.
    ManagerReset,
}

/// How a cached value was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Entry within `max_age`.
    Fresh,
    /// Entry within the stale-while-revalidate window.
    Stale,
    /// Entry within the stale-if-error window, served because resolution failed.
    StaleError,
}

impl CacheStatus {
    /// Returns a short stable label for logs/timelines.
    pub fn as_label(&self) -> &'static str {
        match self {
            CacheStatus::Fresh => "cached",
            CacheStatus::Stale => "stale",
            CacheStatus::StaleError => "stale_error",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task key, if applicable.
    pub task: Option<TaskKey>,
    /// Cache key, if applicable.
    pub cache_key: Option<Arc<str>>,
    /// How a cached value was served.
    pub cache_status: Option<CacheStatus>,
    /// Declared dependencies of a starting task.
    pub dependencies: Option<Arc<[TaskKey]>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Resolution time in milliseconds (compact).
    pub elapsed_ms: Option<u32>,
    /// Resolution timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            cache_key: None,
            cache_status: None,
            dependencies: None,
            reason: None,
            elapsed_ms: None,
            timeout_ms: None,
        }
    }

    /// Attaches a task key.
    #[inline]
    pub fn with_task(mut self, task: impl Into<TaskKey>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a cache key.
    #[inline]
    pub fn with_cache_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Attaches a cache status.
    #[inline]
    pub fn with_cache_status(mut self, status: CacheStatus) -> Self {
        self.cache_status = Some(status);
        self
    }

    /// Attaches declared dependencies.
    #[inline]
    pub fn with_dependencies(mut self, deps: &[TaskKey]) -> Self {
        self.dependencies = Some(Arc::from(deps));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an elapsed duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
