//! Fallback Policy
//!
//! Immutable snapshot of the provider chain and acceptance rule. The manager
//! captures one per request, so policy changes only affect later requests.

use super::{TranscriptionError, TranscriptionResult};
use std::time::Duration;

pub const DEFAULT_PRIMARY_PROVIDER: &str = "distil-whisper-pt";
pub const DEFAULT_FALLBACK_PROVIDERS: &[&str] = &["faster-whisper", "gemini-hybrid"];
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_DEGRADED_COOLDOWN: Duration = Duration::from_secs(60);

/// Provider chain plus acceptance rule
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPolicy {
    primary: String,
    fallbacks: Vec<String>,
    confidence_threshold: f32,
    attempt_timeout: Option<Duration>,
    degraded_cooldown: Duration,
}

impl FallbackPolicy {
    /// Create a policy; fails if the threshold is outside [0, 1]
    pub fn new(
        primary: impl Into<String>,
        fallbacks: Vec<String>,
        confidence_threshold: f32,
    ) -> Result<Self, TranscriptionError> {
        validate_threshold(confidence_threshold)?;
        Ok(Self {
            primary: primary.into(),
            fallbacks,
            confidence_threshold,
            attempt_timeout: Some(DEFAULT_ATTEMPT_TIMEOUT),
            degraded_cooldown: DEFAULT_DEGRADED_COOLDOWN,
        })
    }

    /// Per-attempt timeout (None disables it)
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// How long a degraded provider stays deprioritized
    pub fn with_degraded_cooldown(mut self, cooldown: Duration) -> Self {
        self.degraded_cooldown = cooldown;
        self
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn fallbacks(&self) -> &[String] {
        &self.fallbacks
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    pub fn degraded_cooldown(&self) -> Duration {
        self.degraded_cooldown
    }

    pub fn set_primary(&mut self, name: impl Into<String>) {
        self.primary = name.into();
    }

    pub fn set_fallback_chain(&mut self, names: Vec<String>) {
        self.fallbacks = names;
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) -> Result<(), TranscriptionError> {
        validate_threshold(threshold)?;
        self.confidence_threshold = threshold;
        Ok(())
    }

    /// Primary followed by fallbacks; blanks and repeats dropped, first occurrence wins
    pub fn chain(&self) -> Vec<String> {
        let mut chain: Vec<String> = Vec::with_capacity(self.fallbacks.len() + 1);
        for name in std::iter::once(&self.primary).chain(self.fallbacks.iter()) {
            let name = name.trim();
            if !name.is_empty() && !chain.iter().any(|n| n == name) {
                chain.push(name.to_string());
            }
        }
        chain
    }

    /// Error-free and confident enough
    pub fn accepts(&self, result: &TranscriptionResult) -> bool {
        !result.is_error() && result.confidence >= self.confidence_threshold
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_PROVIDER.to_string(),
            fallbacks: DEFAULT_FALLBACK_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            attempt_timeout: Some(DEFAULT_ATTEMPT_TIMEOUT),
            degraded_cooldown: DEFAULT_DEGRADED_COOLDOWN,
        }
    }
}

fn validate_threshold(threshold: f32) -> Result<(), TranscriptionError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(TranscriptionError::InvalidThreshold(threshold))
    }
}
