//! Settings Definition
//!
//! Configuration schema for the fallback chain, result cache and logging.

use crate::transcription::{
    CacheConfig, FallbackPolicy, FingerprintStrategy, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_FALLBACK_PROVIDERS, DEFAULT_PRIMARY_PROVIDER,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the primary provider
pub const ENV_PRIMARY_PROVIDER: &str = "PRIMARY_PROVIDER";
/// Environment variable overriding the fallback chain (comma-separated)
pub const ENV_FALLBACK_PROVIDERS: &str = "FALLBACK_PROVIDERS";
/// Environment variable overriding the confidence threshold
pub const ENV_CONFIDENCE_THRESHOLD: &str = "CONFIDENCE_THRESHOLD";

/// Main settings structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fallback: FallbackSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        let threshold = self.fallback.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SettingsError::Invalid(format!(
                "confidence_threshold must be within 0.0..=1.0, got {}",
                threshold
            )));
        }

        let chain_empty = std::iter::once(&self.fallback.primary)
            .chain(self.fallback.fallbacks.iter())
            .all(|name| name.trim().is_empty());
        if chain_empty {
            return Err(SettingsError::Invalid("provider chain is empty".to_string()));
        }

        Ok(())
    }

    /// Load settings from disk
    pub fn load() -> Result<Self, SettingsError> {
        super::store::load_settings()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), SettingsError> {
        super::store::save_settings(self)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(primary) = lookup(ENV_PRIMARY_PROVIDER) {
            tracing::info!("Primary provider overridden from environment: {}", primary);
            self.fallback.primary = primary.trim().to_string();
        }

        if let Some(fallbacks) = lookup(ENV_FALLBACK_PROVIDERS) {
            self.fallback.fallbacks = fallbacks
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
            tracing::info!("Fallback providers overridden from environment: {:?}", self.fallback.fallbacks);
        }

        if let Some(threshold) = lookup(ENV_CONFIDENCE_THRESHOLD) {
            self.fallback.confidence_threshold = threshold.trim().parse().map_err(|_| {
                SettingsError::Invalid(format!("{} is not a number: {:?}", ENV_CONFIDENCE_THRESHOLD, threshold))
            })?;
        }

        Ok(())
    }
}

/// Provider chain and acceptance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Provider tried first
    pub primary: String,
    /// Providers tried in order after the primary
    pub fallbacks: Vec<String>,
    /// Minimum confidence for a result to be accepted
    pub confidence_threshold: f32,
    /// Per-attempt timeout in seconds (0 = none)
    pub attempt_timeout_secs: u64,
    /// Seconds a degraded provider stays at the back of the chain
    pub degraded_cooldown_secs: u64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_PROVIDER.to_string(),
            fallbacks: DEFAULT_FALLBACK_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            attempt_timeout_secs: 300,
            degraded_cooldown_secs: 60,
        }
    }
}

impl From<&FallbackSettings> for FallbackPolicy {
    /// Out-of-range thresholds are clamped; run `Settings::validate` first to reject them
    fn from(settings: &FallbackSettings) -> Self {
        let threshold = if settings.confidence_threshold.is_nan() {
            DEFAULT_CONFIDENCE_THRESHOLD
        } else {
            settings.confidence_threshold.clamp(0.0, 1.0)
        };
        let timeout = match settings.attempt_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let mut policy = FallbackPolicy::default()
            .with_attempt_timeout(timeout)
            .with_degraded_cooldown(Duration::from_secs(settings.degraded_cooldown_secs));
        policy.set_primary(settings.primary.clone());
        policy.set_fallback_chain(settings.fallbacks.clone());
        if let Err(e) = policy.set_confidence_threshold(threshold) {
            tracing::warn!("Keeping default confidence threshold: {}", e);
        }
        policy
    }
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache results at all
    pub enabled: bool,
    /// Maximum cached results (0 = unbounded)
    pub max_entries: usize,
    /// Result lifetime in seconds (0 = never expire)
    pub ttl_secs: u64,
    /// How request identity is derived
    pub fingerprint: FingerprintStrategy,
    /// Keep results on disk across restarts
    pub persistent: bool,
    /// Directory for persisted results (default: platform cache dir)
    pub directory: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl_secs: 0,
            fingerprint: FingerprintStrategy::default(),
            persistent: false,
            directory: None,
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.max_entries,
            ttl: match self.ttl_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// Directory for persisted results
    pub fn store_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(super::results_dir)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by RUST_LOG)
    pub filter: String,
    /// Also write daily log files here
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "transcription_hub=info".to_string(),
            directory: None,
        }
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),
}
