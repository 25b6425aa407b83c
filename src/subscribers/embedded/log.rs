//! # LogWriter: events as tracing records
//!
//! Renders every [`Event`] through `tracing`, at `debug` for normal flow and
//! `warn` for failures. Enable with the `logging` feature.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG swrtask: [starting] task="stock" deps=["price"]
//! DEBUG swrtask: [resolved] task="stock" elapsed_ms=12
//! DEBUG swrtask: [cache-hit] task="price" key="price_9f8e" status="stale"
//!  WARN swrtask: [failed] task="cart" err="task failed: backend down"
//!  WARN swrtask: [revalidation-failed] task="price" key="price_9f8e" err="..."
//! ```

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let key = e.cache_key.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::TaskStarting => {
                debug!(target: "swrtask", "[starting] task={task:?} deps={:?}", e.dependencies);
            }
            EventKind::TaskResolved => {
                debug!(target: "swrtask", "[resolved] task={task:?} elapsed_ms={:?}", e.elapsed_ms);
            }
            EventKind::TaskFailed => {
                warn!(target: "swrtask", "[failed] task={task:?} err={reason:?}");
            }
            EventKind::TimeoutHit => {
                warn!(target: "swrtask", "[timeout] task={task:?} timeout_ms={:?}", e.timeout_ms);
            }
            EventKind::CacheHit => {
                let status = e.cache_status.map_or("-", |s| s.as_label());
                debug!(target: "swrtask", "[cache-hit] task={task:?} key={key:?} status={status:?}");
            }
            EventKind::CacheMiss => {
                debug!(target: "swrtask", "[cache-miss] task={task:?} key={key:?}");
            }
            EventKind::CacheStored => {
                debug!(target: "swrtask", "[cache-stored] task={task:?} key={key:?}");
            }
            EventKind::StoreFailed => {
                warn!(target: "swrtask", "[store-failed] task={task:?} key={key:?} err={reason:?}");
            }
            EventKind::RevalidationScheduled => {
                debug!(target: "swrtask", "[revalidating] task={task:?} key={key:?}");
            }
            EventKind::RevalidationSkipped => {
                debug!(target: "swrtask", "[revalidation-skipped] task={task:?} key={key:?}");
            }
            EventKind::RevalidationSucceeded => {
                debug!(target: "swrtask", "[revalidated] task={task:?} key={key:?}");
            }
            EventKind::RevalidationFailed => {
                warn!(target: "swrtask", "[revalidation-failed] task={task:?} key={key:?} err={reason:?}");
            }
            EventKind::ManagerReset => {
                debug!(target: "swrtask", "[reset] {reason}");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "swrtask", "[subscriber-overflow] {reason}");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "swrtask", "[subscriber-panicked] subscriber={task} info={reason}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
