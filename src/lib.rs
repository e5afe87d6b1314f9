//! Transcription Hub Library
//!
//! Multi-provider speech-to-text orchestration: providers are tried in a
//! configured order until one returns a confident result, and identical
//! concurrent requests share one computation.

pub mod config;
pub mod transcription;
pub mod utils;

pub use config::Settings;
pub use transcription::{
    FallbackPolicy, ProviderError, TranscriptionError, TranscriptionManager, TranscriptionProvider,
    TranscriptionRequest, TranscriptionResult,
};
