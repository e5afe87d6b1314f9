//! Request Fingerprints
//!
//! Deterministic cache keys derived from content identity plus the language
//! hint. The same media transcribed into two languages is two units of work.

use super::provider::normalize_language;
use super::{TranscriptionError, TranscriptionRequest, TranscriptionSource};
use serde::{Deserialize, Serialize};
use sha2::digest::Output;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const FINGERPRINT_VERSION: &[u8] = b"transcription-hub/v1";
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// How content identity is established for files on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintStrategy {
    /// SHA-256 over the file bytes
    #[default]
    ContentHash,
    /// Canonical path, size and modification time
    Metadata,
}

/// Cache key for a transcription request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Output<Sha256>);

impl Fingerprint {
    /// Compute the fingerprint of a request
    ///
    /// File hashing runs on the blocking pool.
    pub async fn compute(
        request: &TranscriptionRequest,
        strategy: FingerprintStrategy,
    ) -> Result<Self, TranscriptionError> {
        let language = request.normalized_language();

        let content = match request.source() {
            TranscriptionSource::Bytes { data, .. } => hash_bytes(data),
            TranscriptionSource::Path(path) => {
                let path = path.clone();
                let display = path.display().to_string();
                tokio::task::spawn_blocking(move || match strategy {
                    FingerprintStrategy::ContentHash => hash_file_contents(&path),
                    FingerprintStrategy::Metadata => hash_file_metadata(&path),
                })
                .await
                .map_err(|e| TranscriptionError::InvalidSource {
                    path: display.clone(),
                    reason: format!("Task failed: {}", e),
                })?
                .map_err(|e| TranscriptionError::InvalidSource {
                    path: display,
                    reason: e.to_string(),
                })?
            }
        };

        Ok(Self::combine(&content, &language))
    }

    /// Fingerprint of in-memory media, no I/O involved
    pub fn of_bytes(data: &[u8], language_hint: Option<&str>) -> Self {
        Self::combine(&hash_bytes(data), &normalize_language(language_hint))
    }

    fn combine(content: &Output<Sha256>, language: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION);
        hasher.update([0u8]);
        hasher.update(content);
        hasher.update([0u8]);
        hasher.update(language.as_bytes());
        Self(hasher.finalize())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        format!("{:x}", self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

fn hash_bytes(data: &[u8]) -> Output<Sha256> {
    let mut hasher = Sha256::new();
    hasher.update(b"bytes");
    hasher.update(data);
    hasher.finalize()
}

fn hash_file_contents(path: &Path) -> std::io::Result<Output<Sha256>> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    hasher.update(b"content");
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

fn hash_file_metadata(path: &Path) -> std::io::Result<Output<Sha256>> {
    let canonical: PathBuf = std::fs::canonicalize(path)?;
    let metadata = std::fs::metadata(&canonical)?;
    let mtime_nanos = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(b"metadata");
    hasher.update(canonical.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(metadata.len().to_le_bytes());
    hasher.update(mtime_nanos.to_le_bytes());
    Ok(hasher.finalize())
}
