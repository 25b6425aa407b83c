//! # Manager configuration.
//!
//! Provides [`Config`] centralized settings for a [`TaskManager`](crate::TaskManager).
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no semaphore created)
//! - `timeout = 0s` → no resolution timeout

use std::time::Duration;

/// Configuration for a task manager.
///
/// ## Field semantics
/// - `timeout`: Per-resolution timeout (`0s` = no timeout)
/// - `max_concurrent`: Cap on simultaneously running resolutions (`0` = unlimited)
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time a single resolution may take.
    ///
    /// - `Duration::ZERO` = no timeout
    /// - `> 0` = resolution fails with `TaskError::Timeout` once exceeded
    pub timeout: Duration,

    /// Maximum number of resolutions running at once.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` resolutions run simultaneously; the others are
    ///   started (and tracked) but wait for a permit
    pub max_concurrent: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the concurrency limit as an `Option`.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns the resolution timeout as an `Option`.
    #[inline]
    pub fn resolution_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `timeout = 0s` (no timeout)
    /// - `max_concurrent = 0` (unlimited)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            max_concurrent: 0,
            bus_capacity: 1024,
        }
    }
}
