//! # Event subscribers.
//!
//! Subscribers observe the [`Event`](crate::events::Event)s a manager publishes
//! on its [`Bus`](crate::events::Bus).
//!
//! ```text
//!   resolutions ──┐
//!   TaskManager ──┼── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!   caching     ──┘                                              │
//!                                                ┌───────────────┼──────────┐
//!                                                ▼               ▼          ▼
//!                                             Profiler       LogWriter    custom
//! ```
//!
//! - [`Subscribe`]: extension trait
//! - [`SubscriberSet`]: bounded, panic-isolated fan-out
//! - [`Profiler`]: per-request resolution timeline
//! - `LogWriter` (feature `logging`): events as `tracing` records

#[cfg(feature = "logging")]
mod embedded;
mod profiler;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use profiler::{Profiler, TimelineEntry, TimelineStatus};
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
