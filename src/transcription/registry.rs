//! Provider Registry
//!
//! Owns provider lifecycle state and per-provider status, and hands the
//! orchestrator initialized providers on demand.

use super::{ProviderError, ProviderMetrics, TranscriptionError, TranscriptionProvider};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Provider lifecycle
///
/// ```text
/// Uninitialized ──▶ Initializing ──▶ Ready ◀──▶ Degraded
///                        │
///                        └──▶ Failed(reason)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    /// Recent resource exhaustion; still usable but deprioritized
    Degraded(String),
    Failed(String),
}

impl LifecycleState {
    /// Initialized and able to take requests
    pub fn is_usable(&self) -> bool {
        matches!(self, LifecycleState::Ready | LifecycleState::Degraded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Degraded(_) => "degraded",
            LifecycleState::Failed(_) => "failed",
        }
    }
}

/// Attempt counters kept per provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderCounters {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,
}

/// Point-in-time view of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSnapshot {
    pub name: String,
    pub state: LifecycleState,
    pub counters: ProviderCounters,
    /// Provider-reported metrics
    pub metrics: ProviderMetrics,
}

/// Outcome of asking every usable provider to drop its caches
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClearCacheReport {
    pub cleared: Vec<String>,
    pub failed: BTreeMap<String, String>,
    /// Providers not yet initialized (nothing to clear)
    pub skipped: Vec<String>,
}

impl ClearCacheReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry record for one provider
#[derive(Clone)]
pub struct ProviderEntry {
    name: String,
    provider: Arc<dyn TranscriptionProvider>,
    state: LifecycleState,
    counters: ProviderCounters,
    degraded_at: Option<Instant>,
    init_error: Option<ProviderError>,
    init_generation: u64,
    init_lock: Arc<tokio::sync::Mutex<()>>,
}

impl ProviderEntry {
    fn new(name: String, provider: Arc<dyn TranscriptionProvider>) -> Self {
        Self {
            name,
            provider,
            state: LifecycleState::Uninitialized,
            counters: ProviderCounters::default(),
            degraded_at: None,
            init_error: None,
            init_generation: 0,
            init_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &Arc<dyn TranscriptionProvider> {
        &self.provider
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn counters(&self) -> &ProviderCounters {
        &self.counters
    }

    /// Last-known status, including fresh provider-reported metrics
    pub fn snapshot(&self) -> ProviderSnapshot {
        ProviderSnapshot {
            name: self.name.clone(),
            state: self.state.clone(),
            counters: self.counters.clone(),
            metrics: self.provider.status(),
        }
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("counters", &self.counters)
            .finish()
    }
}

/// Registry of named providers
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, ProviderEntry>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a unique name
    pub fn register(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn TranscriptionProvider>,
    ) -> Result<(), TranscriptionError> {
        let name = name.into();
        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            return Err(TranscriptionError::DuplicateProvider(name));
        }

        tracing::info!("Provider '{}' registered ({})", name, provider.name());
        providers.insert(name.clone(), ProviderEntry::new(name, provider));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<ProviderEntry, TranscriptionError> {
        self.providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TranscriptionError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    pub fn status(&self, name: &str) -> Result<ProviderSnapshot, TranscriptionError> {
        self.get(name).map(|entry| entry.snapshot())
    }

    pub fn status_all(&self) -> BTreeMap<String, ProviderSnapshot> {
        let entries: Vec<ProviderEntry> = self.providers.read().values().cloned().collect();
        entries
            .into_iter()
            .map(|entry| (entry.name.clone(), entry.snapshot()))
            .collect()
    }

    /// Whether the provider was degraded less than `cooldown` ago
    pub fn is_degraded_within(&self, name: &str, cooldown: Duration) -> bool {
        self.providers
            .read()
            .get(name)
            .and_then(|entry| match entry.state {
                LifecycleState::Degraded(_) => entry.degraded_at,
                _ => None,
            })
            .map(|at| at.elapsed() < cooldown)
            .unwrap_or(false)
    }

    /// Initialize the provider on first use and return it
    ///
    /// Concurrent callers share one initialization attempt, including its
    /// failure. A later call after a failure tries again.
    pub async fn ensure_initialized(&self, name: &str) -> Result<Arc<dyn TranscriptionProvider>, ProviderError> {
        let (provider, init_lock, generation) = {
            let providers = self.providers.read();
            let entry = providers
                .get(name)
                .ok_or_else(|| ProviderError::Initialization(format!("provider '{}' is not registered", name)))?;
            if entry.state.is_usable() {
                return Ok(Arc::clone(&entry.provider));
            }
            (Arc::clone(&entry.provider), Arc::clone(&entry.init_lock), entry.init_generation)
        };

        let _init_guard = init_lock.lock().await;

        {
            let mut providers = self.providers.write();
            let entry = providers
                .get_mut(name)
                .ok_or_else(|| ProviderError::Initialization(format!("provider '{}' is not registered", name)))?;

            if entry.state.is_usable() {
                return Ok(provider);
            }
            if entry.init_generation != generation {
                if let Some(err) = &entry.init_error {
                    return Err(err.clone());
                }
            }
            entry.state = LifecycleState::Initializing;
        }

        tracing::info!("Initializing provider '{}'...", name);
        let start = Instant::now();
        let result = provider.initialize().await;

        let mut providers = self.providers.write();
        if let Some(entry) = providers.get_mut(name) {
            entry.init_generation += 1;
            match &result {
                Ok(()) => {
                    entry.state = LifecycleState::Ready;
                    entry.init_error = None;
                    tracing::info!(
                        "Provider '{}' initialized in {}ms",
                        name,
                        start.elapsed().as_millis()
                    );
                }
                Err(e) => {
                    entry.state = LifecycleState::Failed(e.to_string());
                    entry.init_error = Some(e.clone());
                    tracing::error!("Provider '{}' failed to initialize: {}", name, e);
                }
            }
        }

        result.map(|()| provider)
    }

    /// Record a successful attempt; a degraded provider becomes ready again
    pub fn record_success(&self, name: &str, duration: Duration) {
        let mut providers = self.providers.write();
        if let Some(entry) = providers.get_mut(name) {
            entry.counters.attempts += 1;
            entry.counters.successes += 1;
            entry.counters.last_duration_ms = Some(duration.as_millis() as u64);
            if let LifecycleState::Degraded(_) = entry.state {
                entry.state = LifecycleState::Ready;
                entry.degraded_at = None;
                tracing::info!("Provider '{}' recovered from degraded state", name);
            }
        }
    }

    /// Record a failed attempt
    pub fn record_failure(&self, name: &str, error: &str, duration: Duration) {
        let mut providers = self.providers.write();
        if let Some(entry) = providers.get_mut(name) {
            entry.counters.attempts += 1;
            entry.counters.failures += 1;
            entry.counters.last_error = Some(error.to_string());
            entry.counters.last_duration_ms = Some(duration.as_millis() as u64);
        }
    }

    /// Deprioritize a ready provider after resource exhaustion
    pub fn mark_degraded(&self, name: &str, reason: impl Into<String>) {
        let mut providers = self.providers.write();
        if let Some(entry) = providers.get_mut(name) {
            if entry.state.is_usable() {
                let reason = reason.into();
                tracing::warn!("Provider '{}' degraded: {}", name, reason);
                entry.state = LifecycleState::Degraded(reason);
                entry.degraded_at = Some(Instant::now());
            }
        }
    }

    /// Ask every initialized provider to release its caches
    pub async fn clear_caches(&self) -> ClearCacheReport {
        let mut report = ClearCacheReport::default();
        let mut targets = Vec::new();
        for entry in self.providers.read().values() {
            if entry.state.is_usable() {
                targets.push((entry.name.clone(), Arc::clone(&entry.provider)));
            } else {
                report.skipped.push(entry.name.clone());
            }
        }

        let outcomes = futures_util::future::join_all(targets.into_iter().map(|(name, provider)| async move {
            let outcome = provider.clear_cache().await;
            (name, outcome)
        }))
        .await;

        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    tracing::info!("Cache cleared for provider: {}", name);
                    report.cleared.push(name);
                }
                Err(e) => {
                    tracing::warn!("Failed to clear cache for provider '{}': {}", name, e);
                    report.failed.insert(name, e.to_string());
                }
            }
        }

        report
    }
}
