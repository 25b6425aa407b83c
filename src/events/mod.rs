//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by managers, resolutions, and the
//! caching layer.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`CacheStatus`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `TaskManager`, `core::runner`, `CachingManager`, background
//!   revalidations, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by `ManagerBuilder::build` (fans out to
//!   `SubscriberSet`), or any receiver obtained from [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{CacheStatus, Event, EventKind};
