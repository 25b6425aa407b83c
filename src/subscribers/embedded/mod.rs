//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders events through `tracing` (debug/demo).

mod log;

pub use log::LogWriter;
