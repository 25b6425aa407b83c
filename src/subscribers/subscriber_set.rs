//! # Non-blocking event fan-out to multiple subscribers.
//!
//! [`SubscriberSet`] hands every event to each subscriber's own bounded queue;
//! a dedicated worker per subscriber drains it.
//!
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► profiler.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► worker 2 ──► log.on_event()
//!     └──► [queue N] ──► worker N ──► custom.on_event()
//! ```
//!
//! ## Rules
//! - Per-subscriber FIFO; no ordering across subscribers
//! - `emit()` never waits: a full queue drops the event for that subscriber only
//!   and publishes `SubscriberOverflow` (overflow events themselves are never re-reported)
//! - A panicking subscriber is reported as `SubscriberPanicked` and keeps receiving events
//!
//! `AssertUnwindSafe` is used, so a subscriber that panics while holding a lock
//! may leave its own state inconsistent.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use swrtask::{Bus, Event, EventKind, Subscribe, SubscriberSet};
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Audit {
//!     async fn on_event(&self, _ev: &Event) {}
//!     fn name(&self) -> &'static str { "audit" }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let set = SubscriberSet::new(vec![Arc::new(Audit)], Bus::new(64));
//! set.emit(&Event::new(EventKind::CacheMiss).with_task("stock"));
//! set.shutdown().await;
//! # }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::core::panic_message;
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Queue {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for event subscribers.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker per subscriber.
    ///
    /// Queue capacity comes from [`Subscribe::queue_capacity`] (minimum 1).
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut queues = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let (tx, rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            queues.push(Queue {
                name: sub.name(),
                tx,
            });
            workers.push(tokio::spawn(drain(sub, rx, bus.clone())));
        }
        Self {
            queues,
            workers,
            bus,
        }
    }

    /// Emits a copy of `event` to every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a shared event to every subscriber without cloning it.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow = event.is_subscriber_overflow();

        for queue in &self.queues {
            let reason = match queue.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                self.bus
                    .publish(Event::subscriber_overflow(queue.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.queues);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Worker loop for one subscriber.
async fn drain(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let fut = sub.on_event(ev.as_ref());
        if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
            bus.publish(Event::subscriber_panicked(
                sub.name(),
                panic_message(panic.as_ref()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::events::EventKind;

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _ev: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber blew up");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(
            vec![Arc::new(Counter(a.clone())), Arc::new(Counter(b.clone()))],
            Bus::new(16),
        );

        set.emit(&Event::new(EventKind::CacheMiss));
        set.emit(&Event::new(EventKind::CacheHit));
        set.shutdown().await;

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panic_is_reported_and_isolated() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let count = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(
            vec![Arc::new(Panicky), Arc::new(Counter(count.clone()))],
            bus.clone(),
        );

        set.emit(&Event::new(EventKind::CacheMiss));
        set.shutdown().await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.task.as_deref(), Some("panicky"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber blew up"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
