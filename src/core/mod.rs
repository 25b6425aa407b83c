//! Runtime core: dependency ordering, resolution, and tracking.
//!
//! The public API from this module is [`TaskManager`] (with its [`Manager`]
//! trait and [`ManagerBuilder`]) plus the values it hands out: [`TaskHandle`]
//! and [`Lazy`].
//!
//! Internal modules:
//! - [`graph`]: priority ordering and cycle detection over task keys;
//! - [`runner`]: executes one resolution with timeout, permit, and event publishing;
//! - [`manager`]: discovery, speculative start, and per-key memoization;
//! - [`builder`]: bus and subscriber wiring.

mod builder;
mod config;
mod graph;
mod handle;
mod lazy;
mod manager;
mod runner;

pub use builder::ManagerBuilder;
pub use config::Config;
pub use graph::DependencyGraph;
pub use handle::{Resolution, TaskHandle};
pub use lazy::Lazy;
pub use manager::{Manager, TaskManager, Tracked};

pub(crate) use manager::ManagerInner;
pub(crate) use runner::{ConcurrencySlot, panic_message};
