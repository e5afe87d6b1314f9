//! Persistent Result Store
//!
//! Optional key→value backing for the result cache so results survive the
//! process. One JSON file per fingerprint.

use super::{Fingerprint, TranscriptionResult};
use std::path::{Path, PathBuf};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Backing store for cached results
pub trait CacheStore: Send + Sync {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<TranscriptionResult>, StoreError>;

    fn save(&self, fingerprint: &Fingerprint, result: &TranscriptionResult) -> Result<(), StoreError>;

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// Stores each result as `<directory>/<fingerprint>.json`
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `directory`
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        tracing::info!("Result store opened at {:?}", directory);
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.directory.join(format!("{}.json", fingerprint.to_hex()))
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<TranscriptionResult>, StoreError> {
        let path = self.entry_path(fingerprint);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let result: TranscriptionResult = serde_json::from_str(&content)?;
        Ok(Some(result))
    }

    fn save(&self, fingerprint: &Fingerprint, result: &TranscriptionResult) -> Result<(), StoreError> {
        let path = self.entry_path(fingerprint);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(result)?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!("Stored result {} at {:?}", fingerprint, path);
        Ok(())
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        match std::fs::remove_file(self.entry_path(fingerprint)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut removed = 0usize;
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        tracing::info!("Result store cleared ({} entries)", removed);
        Ok(())
    }
}
