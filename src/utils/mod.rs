//! Utilities Module
//!
//! Logging setup and performance metrics.

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
