//! Transcription Provider Trait
//!
//! Common interface for transcription backends, plus the request and
//! result types that flow through it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Language used when a request carries no hint
pub const AUTO_LANGUAGE: &str = "auto";

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "opus", "flac", "aac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "avi", "mkv"];

/// Kind of media being transcribed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Infer the media kind from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Where the media comes from
#[derive(Debug, Clone)]
pub enum TranscriptionSource {
    /// A file on disk
    Path(PathBuf),
    /// An in-memory buffer with a display name (used for extension sniffing)
    Bytes { name: String, data: Arc<[u8]> },
}

impl TranscriptionSource {
    /// Human-readable label for logs
    pub fn display_name(&self) -> String {
        match self {
            TranscriptionSource::Path(path) => path.display().to_string(),
            TranscriptionSource::Bytes { name, .. } => name.clone(),
        }
    }

    fn name_path(&self) -> &Path {
        match self {
            TranscriptionSource::Path(path) => path,
            TranscriptionSource::Bytes { name, .. } => Path::new(name),
        }
    }
}

/// Immutable description of a unit of transcription work
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    source: TranscriptionSource,
    language: Option<String>,
    media_kind: Option<MediaKind>,
}

impl TranscriptionRequest {
    /// Request for a file on disk
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: TranscriptionSource::Path(path.into()),
            language: None,
            media_kind: None,
        }
    }

    /// Request for an in-memory buffer
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source: TranscriptionSource::Bytes {
                name: name.into(),
                data: data.into(),
            },
            language: None,
            media_kind: None,
        }
    }

    /// Set the target language hint (ISO 639-1, or "auto")
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Override the inferred media kind
    pub fn with_media_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = Some(kind);
        self
    }

    pub fn source(&self) -> &TranscriptionSource {
        &self.source
    }

    /// Language hint as given by the caller
    pub fn language_hint(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Language hint, trimmed and lowercased; "auto" when absent or blank
    pub fn normalized_language(&self) -> String {
        normalize_language(self.language.as_deref())
    }

    /// Explicit media kind, else inferred from the source name, else audio
    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
            .or_else(|| MediaKind::from_path(self.source.name_path()))
            .unwrap_or(MediaKind::Audio)
    }
}

/// A time-aligned chunk of transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

/// Result of transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Transcribed text
    pub text: String,
    /// Confidence in [0.0, 1.0]
    pub confidence: f32,
    /// Wall-clock processing time in seconds
    pub processing_time: f64,
    /// Provider that produced this result
    pub model_used: String,
    /// Resolved language (may differ from the requested hint)
    pub language: String,
    /// Time-ordered segments, when the provider reports them
    #[serde(default)]
    pub segments: Option<Vec<Segment>>,
    /// Present iff the attempt failed
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TranscriptionResult {
    /// Successful result with no segments
    pub fn new(
        text: impl Into<String>,
        confidence: f32,
        model_used: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            confidence,
            processing_time: 0.0,
            model_used: model_used.into(),
            language: language.into(),
            segments: None,
            error_message: None,
        }
    }

    /// Failed result: empty text, zero confidence
    pub fn failure(
        message: impl Into<String>,
        model_used: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            processing_time: 0.0,
            model_used: model_used.into(),
            language: language.into(),
            segments: None,
            error_message: Some(message.into()),
        }
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = seconds.max(0.0);
        self
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }

    /// Whether this result may become a positive cache entry
    pub fn is_cacheable(&self) -> bool {
        !self.is_error() && !self.text.trim().is_empty()
    }
}

/// Per-attempt provider failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Input too large: {size_bytes} bytes (limit {limit_bytes})")]
    InputTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}

impl ProviderError {
    /// Errors that mark the provider as degraded
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, ProviderError::ResourceExhausted(_))
    }
}

/// Free-form provider-reported metrics (accelerator availability, cache size, ...)
pub type ProviderMetrics = BTreeMap<String, serde_json::Value>;

/// Trait for transcription providers
///
/// Implementations own their own resources (models, sessions, devices) and
/// serialize access to them internally; callers only see success, error and
/// duration.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// One-time setup (model loading, client configuration)
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Transcribe the request's source
    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, ProviderError>;

    /// Get provider name
    fn name(&self) -> &str;

    /// Provider-reported metrics
    fn status(&self) -> ProviderMetrics {
        ProviderMetrics::new()
    }

    /// Release provider-internal caches
    async fn clear_cache(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Trimmed lowercase language hint, `auto` when absent or blank
pub(crate) fn normalize_language(hint: Option<&str>) -> String {
    match hint.map(str::trim) {
        Some(lang) if !lang.is_empty() => lang.to_lowercase(),
        _ => AUTO_LANGUAGE.to_string(),
    }
}
