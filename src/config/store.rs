//! Configuration Storage
//!
//! Persist settings to disk.

use super::{Settings, SettingsError};
use std::path::{Path, PathBuf};

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "transcription-hub", "TranscriptionHub")
}

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| {
            // Fallback to current directory
            std::env::current_dir().unwrap_or_default().join("config")
        })
}

/// Get the configuration file path
pub fn config_file() -> PathBuf {
    config_dir().join("settings.toml")
}

/// Default directory for persisted transcription results
pub fn results_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("cache"))
        .join("results")
}

/// Load settings from the default location
pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from(&config_file())
}

/// Save settings to the default location
pub fn save_settings(settings: &Settings) -> Result<(), SettingsError> {
    save_settings_to(settings, &config_file())
}

/// Load settings from a TOML file; a missing file yields defaults
pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        tracing::info!("No settings file found at {:?}, using defaults", path);
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;

    tracing::info!("Settings loaded from {:?}", path);
    Ok(settings)
}

/// Save settings as TOML, creating parent directories
pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content)?;

    tracing::info!("Settings saved to {:?}", path);
    Ok(())
}
