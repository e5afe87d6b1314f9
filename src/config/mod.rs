//! Configuration Module
//!
//! Settings schema and persistence.

mod settings;
mod store;

pub use settings::*;
pub use store::*;
