//! # Manager construction.
//!
//! [`ManagerBuilder`] wires the event bus, the optional subscriber fan-out, and
//! the shared manager core.
//!
//! ```text
//! ManagerBuilder::new(locator)
//!     .with_config(cfg)            (timeout, concurrency, bus capacity)
//!     .with_context(ctx)           (request parameters)
//!     .with_subscribers(subs)      (Profiler, LogWriter, custom)
//!     .build()
//!         ├─► Bus::new(cfg.bus_capacity_clamped())
//!         ├─► subscribers? ─► SubscriberSet + listener task (Bus ─► emit)
//!         └─► TaskManager
//! ```
//!
//! The listener stops when the manager is dropped; events still queued on the
//! bus at that point are forwarded before the subscriber workers shut down.

use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, oneshot};

use crate::core::config::Config;
use crate::core::manager::{ManagerInner, TaskManager};
use crate::events::{Bus, Event};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::{Locator, RequestContext};

/// Builder for a [`TaskManager`].
pub struct ManagerBuilder {
    locator: Arc<dyn Locator>,
    cfg: Config,
    context: RequestContext,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ManagerBuilder {
    /// Creates a builder with default configuration.
    pub fn new(locator: Arc<dyn Locator>) -> Self {
        Self {
            locator,
            cfg: Config::default(),
            context: RequestContext::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the request context handed to every resolution.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive events through dedicated workers with bounded
    /// queues. Building with subscribers requires a tokio runtime.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the manager.
    pub fn build(self) -> TaskManager {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        let listener = if self.subscribers.is_empty() {
            None
        } else {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            Some(subscriber_listener(&bus, subs))
        };

        TaskManager::from_inner(ManagerInner::new(
            self.locator,
            self.cfg,
            bus,
            self.context,
            listener,
        ))
    }
}

/// Forwards bus events to the subscriber set until the returned sender is dropped.
fn subscriber_listener(bus: &Bus, subs: SubscriberSet) -> oneshot::Sender<()> {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(&ev),
                    Err(RecvError::Lagged(_)) => {
                        subs.emit(&Event::subscriber_overflow("listener", "lagged"));
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        while let Ok(ev) = rx.try_recv() {
            subs.emit(&ev);
        }
        subs.shutdown().await;
    });
    stop_tx
}
