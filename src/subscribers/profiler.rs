//! # Resolution timeline.
//!
//! [`Profiler`] turns manager events into one [`TimelineEntry`] per resolution
//! or cache hit, with times in milliseconds relative to the profiler's epoch.
//!
//! ```text
//! TaskStarting(stock)        ──► push  { stock, start=t, status=pending }
//! TaskResolved(stock)        ──► close { end=t, status=success }
//! TaskFailed(stock, reason)  ──► close { end=t, status=error, error=reason }
//! CacheHit(price, stale, Δ)  ──► push  { price, start=t-Δ, end=t, status=stale }
//! ```
//!
//! Entries stay `pending` if the terminal event is never observed (for example
//! after an overflow).

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{CacheStatus, Event, EventKind};
use crate::subscribers::Subscribe;
use crate::tasks::TaskKey;

/// Status of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineStatus {
    Pending,
    Success,
    Error,
    Cached,
    Stale,
    StaleError,
}

impl TimelineStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            TimelineStatus::Pending => "pending",
            TimelineStatus::Success => "success",
            TimelineStatus::Error => "error",
            TimelineStatus::Cached => "cached",
            TimelineStatus::Stale => "stale",
            TimelineStatus::StaleError => "stale_error",
        }
    }
}

impl From<CacheStatus> for TimelineStatus {
    fn from(status: CacheStatus) -> Self {
        match status {
            CacheStatus::Fresh => TimelineStatus::Cached,
            CacheStatus::Stale => TimelineStatus::Stale,
            CacheStatus::StaleError => TimelineStatus::StaleError,
        }
    }
}

/// Timing of one resolution or cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub task: TaskKey,
    /// Milliseconds since the profiler epoch.
    pub start_ms: f64,
    /// Milliseconds since the profiler epoch.
    pub end_ms: f64,
    pub status: TimelineStatus,
    pub error: Option<Arc<str>>,
    pub dependencies: Arc<[TaskKey]>,
}

impl TimelineEntry {
    pub fn duration_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }

    /// Last `::`-separated segment of the key, for display.
    pub fn short_name(&self) -> &str {
        self.task.rsplit("::").next().unwrap_or(&self.task)
    }
}

struct Timeline {
    epoch: SystemTime,
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    fn offset_ms(&self, at: SystemTime) -> f64 {
        at.duration_since(self.epoch)
            .map(|d| d.as_micros() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    fn close(&mut self, task: &str, end_ms: f64, status: TimelineStatus, error: Option<Arc<str>>) {
        let open = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| &*e.task == task && e.status == TimelineStatus::Pending);
        if let Some(entry) = open {
            entry.end_ms = end_ms;
            entry.status = status;
            entry.error = error;
        }
    }
}

/// Subscriber collecting a per-request timeline.
pub struct Profiler {
    timeline: RwLock<Timeline>,
}

impl Profiler {
    /// Creates a profiler whose epoch is now.
    pub fn new() -> Self {
        Self {
            timeline: RwLock::new(Timeline {
                epoch: SystemTime::now(),
                entries: Vec::new(),
            }),
        }
    }

    /// Applies one event to the timeline.
    pub async fn record(&self, ev: &Event) {
        let Some(task) = ev.task.clone() else {
            return;
        };
        let mut tl = self.timeline.write().await;
        let at = tl.offset_ms(ev.at);

        match ev.kind {
            EventKind::TaskStarting => tl.entries.push(TimelineEntry {
                task,
                start_ms: at,
                end_ms: at,
                status: TimelineStatus::Pending,
                error: None,
                dependencies: ev.dependencies.clone().unwrap_or_else(|| Arc::from([])),
            }),
            EventKind::TaskResolved => tl.close(&task, at, TimelineStatus::Success, None),
            EventKind::TaskFailed => {
                tl.close(&task, at, TimelineStatus::Error, ev.reason.clone())
            }
            EventKind::CacheHit => {
                let status = ev.cache_status.map_or(TimelineStatus::Cached, Into::into);
                let took = f64::from(ev.elapsed_ms.unwrap_or(0));
                tl.entries.push(TimelineEntry {
                    task,
                    start_ms: (at - took).max(0.0),
                    end_ms: at,
                    status,
                    error: None,
                    dependencies: Arc::from([]),
                });
            }
            _ => {}
        }
    }

    /// Snapshot of all entries in recording order.
    pub async fn entries(&self) -> Vec<TimelineEntry> {
        self.timeline.read().await.entries.clone()
    }

    /// `max(durations) / sum(durations)`; 1.0 when nothing took time.
    ///
    /// 1.0 means the longest entry dominated (full overlap); lower values mean
    /// more sequential work.
    pub async fn parallel_efficiency(&self) -> f64 {
        let tl = self.timeline.read().await;
        let (max, sum) = tl
            .entries
            .iter()
            .map(TimelineEntry::duration_ms)
            .fold((0.0_f64, 0.0_f64), |(max, sum), d| (max.max(d), sum + d));
        if sum <= 0.0 { 1.0 } else { max / sum }
    }

    /// Milliseconds from the first start to the last end.
    pub async fn total_time(&self) -> f64 {
        let tl = self.timeline.read().await;
        let first = tl.entries.iter().map(|e| e.start_ms).reduce(f64::min);
        let last = tl.entries.iter().map(|e| e.end_ms).reduce(f64::max);
        match (first, last) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Clears all entries and restarts the epoch.
    pub async fn reset(&self) {
        let mut tl = self.timeline.write().await;
        tl.entries.clear();
        tl.epoch = SystemTime::now();
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for Profiler {
    async fn on_event(&self, event: &Event) {
        self.record(event).await;
    }

    fn name(&self) -> &'static str {
        "profiler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(profiler_epoch: SystemTime, ms: u64, ev: Event) -> Event {
        Event {
            at: profiler_epoch + Duration::from_millis(ms),
            ..ev
        }
    }

    async fn epoch(p: &Profiler) -> SystemTime {
        p.timeline.read().await.epoch
    }

    #[tokio::test]
    async fn builds_entries_from_lifecycle_events() {
        let p = Profiler::new();
        let t0 = epoch(&p).await;

        p.record(&at(
            t0,
            10,
            Event::new(EventKind::TaskStarting)
                .with_task("app::Stock")
                .with_dependencies(&[Arc::from("app::Price")]),
        ))
        .await;
        p.record(&at(t0, 50, Event::new(EventKind::TaskResolved).with_task("app::Stock")))
            .await;
        p.record(&at(t0, 20, Event::new(EventKind::TaskStarting).with_task("cart")))
            .await;
        p.record(&at(
            t0,
            30,
            Event::new(EventKind::TaskFailed)
                .with_task("cart")
                .with_reason("down"),
        ))
        .await;

        let entries = p.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, TimelineStatus::Success);
        assert_eq!(entries[0].duration_ms(), 40.0);
        assert_eq!(entries[0].short_name(), "Stock");
        assert_eq!(entries[0].dependencies.len(), 1);
        assert_eq!(entries[1].status.as_label(), "error");
        assert_eq!(entries[1].error.as_deref(), Some("down"));

        assert_eq!(p.total_time().await, 40.0);
        assert_eq!(p.parallel_efficiency().await, 40.0 / 50.0);
    }

    #[tokio::test]
    async fn cache_hits_use_elapsed_as_start() {
        let p = Profiler::new();
        let t0 = epoch(&p).await;

        p.record(&at(
            t0,
            15,
            Event::new(EventKind::CacheHit)
                .with_task("price")
                .with_cache_status(CacheStatus::StaleError)
                .with_elapsed(Duration::from_millis(5)),
        ))
        .await;

        let entries = p.entries().await;
        assert_eq!(entries[0].status.as_label(), "stale_error");
        assert_eq!(entries[0].start_ms, 10.0);
        assert_eq!(entries[0].end_ms, 15.0);
    }

    #[tokio::test]
    async fn empty_profiler_is_perfectly_parallel() {
        let p = Profiler::new();
        assert_eq!(p.parallel_efficiency().await, 1.0);
        assert_eq!(p.total_time().await, 0.0);
    }

    #[tokio::test]
    async fn reset_clears_entries() {
        let p = Profiler::new();
        p.record(&Event::new(EventKind::TaskStarting).with_task("a")).await;
        assert_eq!(p.entries().await.len(), 1);

        p.reset().await;
        assert!(p.entries().await.is_empty());
    }

    #[tokio::test]
    async fn events_without_task_are_ignored() {
        let p = Profiler::new();
        p.record(&Event::new(EventKind::ManagerReset)).await;
        assert!(p.entries().await.is_empty());
    }
}
