//! Transcription Module
//!
//! Speech-to-text across multiple providers: lifecycle tracking, ordered
//! fallback with a confidence threshold, and a single-flight result cache.

mod cache;
mod cancel;
mod error;
mod fingerprint;
mod manager;
mod orchestrator;
mod policy;
mod provider;
mod registry;
mod store;

pub use cache::*;
pub use cancel::*;
pub use error::*;
pub use fingerprint::*;
pub use manager::*;
pub use orchestrator::*;
pub use policy::*;
pub use provider::*;
pub use registry::*;
pub use store::*;
