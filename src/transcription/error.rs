//! Caller-facing errors
//!
//! Only configuration problems, unreadable sources and cancellation reach the
//! caller. Provider failures are absorbed by the orchestrator and surface as
//! a [`TranscriptionResult`](super::TranscriptionResult) with an
//! `error_message`.

/// Transcription errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranscriptionError {
    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("No providers configured")]
    NoProvidersConfigured,

    #[error("Invalid confidence threshold: {0} (expected 0.0..=1.0)")]
    InvalidThreshold(f32),

    #[error("Cannot read source {path}: {reason}")]
    InvalidSource { path: String, reason: String },

    #[error("Transcription cancelled")]
    Cancelled,

    #[error("Computation aborted: {0}")]
    ComputationAborted(String),
}
