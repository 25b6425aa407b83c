//! # Run a single resolution of a task.
//!
//! Spawns one resolution future on the tokio runtime with optional timeout and
//! concurrency permit, publishes lifecycle events to [`Bus`], and completes the
//! [`TaskHandle`] handed back to the manager.
//!
//! ## Event flow
//!
//! ```text
//! Success:
//!   future → Ok(value) → publish TaskResolved → handle = Ok(value)
//!
//! Failure:
//!   future → Err(e)    → publish TaskFailed   → handle = Err(e)
//!
//! Panic:
//!   future panics → catch_unwind → Panicked → publish TaskFailed
//!
//! Timeout:
//!   timeout exceeded → drop future → publish TimeoutHit
//!                                  → publish TaskFailed (timeout)
//!                                  → handle = Err(Timeout)
//! ```
//!
//! ## Rules
//! - Always publishes **exactly one** terminal event: `TaskResolved` or `TaskFailed`
//! - `TimeoutHit` is published **in addition to** `TaskFailed` on timeout
//! - The timeout clock starts once the permit is held
//! - The permit is handed back while the resolution waits on a dependency
//!   (see [`ConcurrencySlot`]) and taken again before it continues
//! - A panic never escapes the spawned task; waiters see `TaskError::Panicked`

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time;

use crate::core::handle::{Resolution, TaskHandle};
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{BoxTaskFuture, TaskKey};

/// Concurrency permit of one resolution, shared with its task context.
///
/// Without a semaphore every operation is a no-op.
#[derive(Clone, Default)]
pub(crate) struct ConcurrencySlot {
    semaphore: Option<Arc<Semaphore>>,
    state: Arc<Mutex<SlotState>>,
}

#[derive(Default)]
struct SlotState {
    permit: Option<OwnedSemaphorePermit>,
    /// Dependency waits in flight; the permit is away while this is non-zero.
    waiting: usize,
}

impl ConcurrencySlot {
    pub(crate) fn new(semaphore: Option<Arc<Semaphore>>) -> Self {
        Self {
            semaphore,
            state: Arc::default(),
        }
    }

    /// Waits for a permit unless one is already held.
    pub(crate) async fn acquire(&self) {
        let Some(sem) = &self.semaphore else {
            return;
        };
        let mut state = self.state.lock().await;
        if state.permit.is_none() && state.waiting == 0 {
            state.permit = sem.clone().acquire_owned().await.ok();
        }
    }

    /// Gives the permit back before waiting on a dependency.
    pub(crate) async fn suspend(&self) {
        if self.semaphore.is_none() {
            return;
        }
        let mut state = self.state.lock().await;
        state.waiting += 1;
        state.permit = None;
    }

    /// Takes a permit again once the last dependency wait is over.
    pub(crate) async fn resume(&self) {
        let Some(sem) = &self.semaphore else {
            return;
        };
        let mut state = self.state.lock().await;
        state.waiting = state.waiting.saturating_sub(1);
        if state.waiting == 0 && state.permit.is_none() {
            state.permit = sem.clone().acquire_owned().await.ok();
        }
    }

    async fn release(&self) {
        self.state.lock().await.permit = None;
    }

    #[cfg(test)]
    async fn holds_permit(&self) -> bool {
        self.state.lock().await.permit.is_some()
    }
}

/// Spawns `fut` and returns the handle observing it.
pub(crate) fn spawn_resolution(
    key: TaskKey,
    fut: BoxTaskFuture,
    timeout: Option<Duration>,
    slot: ConcurrencySlot,
    bus: Bus,
) -> TaskHandle {
    let (completer, handle) = TaskHandle::pending(key.clone());

    tokio::spawn(async move {
        slot.acquire().await;
        let res = run_once(&key, fut, timeout, &bus).await;
        slot.release().await;
        completer.complete(res);
    });
    handle
}

/// Drives one resolution to completion.
///
/// ### Timeout behavior
/// If `timeout` is `Some(dur)` and `dur > 0`, the future is dropped once `dur`
/// elapses and the resolution fails with `TaskError::Timeout`.
async fn run_once(
    key: &TaskKey,
    fut: BoxTaskFuture,
    timeout: Option<Duration>,
    bus: &Bus,
) -> Resolution {
    let started = Instant::now();
    let guarded = AssertUnwindSafe(fut).catch_unwind();

    let res = if let Some(dur) = timeout.filter(|d| *d > Duration::ZERO) {
        match time::timeout(dur, guarded).await {
            Ok(r) => r.unwrap_or_else(|panic| Err(panicked(panic))),
            Err(_elapsed) => {
                publish_timeout(bus, key, dur);
                Err(TaskError::Timeout { timeout: dur })
            }
        }
    } else {
        guarded.await.unwrap_or_else(|panic| Err(panicked(panic)))
    };

    match &res {
        Ok(_) => publish_resolved(bus, key, started.elapsed()),
        Err(e) => publish_failed(bus, key, started.elapsed(), e),
    }
    res
}

/// Converts a panic payload into `TaskError::Panicked`.
fn panicked(payload: Box<dyn Any + Send>) -> TaskError {
    TaskError::Panicked {
        info: panic_message(payload.as_ref()),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Publishes `TaskResolved`.
fn publish_resolved(bus: &Bus, key: &TaskKey, elapsed: Duration) {
    bus.publish(
        Event::new(EventKind::TaskResolved)
            .with_task(key.clone())
            .with_elapsed(elapsed),
    );
}

/// Publishes `TaskFailed` with error details.
fn publish_failed(bus: &Bus, key: &TaskKey, elapsed: Duration, err: &TaskError) {
    bus.publish(
        Event::new(EventKind::TaskFailed)
            .with_task(key.clone())
            .with_elapsed(elapsed)
            .with_reason(err.to_string()),
    );
}

/// Publishes `TimeoutHit` (always followed by `TaskFailed`).
fn publish_timeout(bus: &Bus, key: &TaskKey, dur: Duration) {
    bus.publish(
        Event::new(EventKind::TimeoutHit)
            .with_task(key.clone())
            .with_timeout(dur),
    );
}
