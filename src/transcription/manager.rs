//! Transcription Manager
//!
//! Public entry point. Each request is fingerprinted, deduplicated through
//! the result cache and, on a miss, run through the fallback chain using the
//! policy snapshot captured when the request started.

use super::{
    CacheStats, CancellationToken, ClearCacheReport, FallbackOrchestrator, FallbackPolicy,
    Fingerprint, FingerprintStrategy, JsonFileStore, ProviderRegistry, ProviderSnapshot,
    ResultCache, TranscriptionError, TranscriptionProvider, TranscriptionRequest,
    TranscriptionResult,
};
use crate::config::{Settings, SettingsError};
use crate::utils::{AttemptRecord, MetricsSummary, PerformanceMetrics, RequestOutcome};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Instrument;

/// Multi-provider transcription façade
pub struct TranscriptionManager {
    registry: Arc<ProviderRegistry>,
    orchestrator: Arc<FallbackOrchestrator>,
    cache: Arc<ResultCache>,
    policy: RwLock<Arc<FallbackPolicy>>,
    fingerprint_strategy: FingerprintStrategy,
    cache_enabled: bool,
    metrics: Arc<RwLock<PerformanceMetrics>>,
}

impl TranscriptionManager {
    /// Create a manager with an unbounded in-memory cache
    pub fn new(policy: FallbackPolicy) -> Self {
        let registry = Arc::new(ProviderRegistry::new());
        Self {
            orchestrator: Arc::new(FallbackOrchestrator::new(Arc::clone(&registry))),
            registry,
            cache: Arc::new(ResultCache::default()),
            policy: RwLock::new(Arc::new(policy)),
            fingerprint_strategy: FingerprintStrategy::default(),
            cache_enabled: true,
            metrics: Arc::new(RwLock::new(PerformanceMetrics::new())),
        }
    }

    /// Build a manager from validated settings
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        settings.validate()?;

        let mut cache = ResultCache::new(settings.cache.cache_config());
        if settings.cache.enabled && settings.cache.persistent {
            let store = JsonFileStore::open(settings.cache.store_directory())
                .map_err(|e| SettingsError::Invalid(format!("cannot open result store: {}", e)))?;
            cache = cache.with_store(Arc::new(store));
        }

        let manager = Self::new(FallbackPolicy::from(&settings.fallback))
            .with_cache(cache)
            .with_fingerprint_strategy(settings.cache.fingerprint)
            .with_cache_enabled(settings.cache.enabled);

        tracing::info!(
            "Transcription manager configured (chain: {:?}, threshold: {:.2}, cache: {})",
            manager.policy().chain(),
            manager.policy().confidence_threshold(),
            if settings.cache.enabled { "enabled" } else { "disabled" }
        );
        Ok(manager)
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn with_fingerprint_strategy(mut self, strategy: FingerprintStrategy) -> Self {
        self.fingerprint_strategy = strategy;
        self
    }

    /// When disabled, every request runs the provider chain
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Register a provider under a unique name
    pub fn register_provider(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn TranscriptionProvider>,
    ) -> Result<(), TranscriptionError> {
        self.registry.register(name, provider)
    }

    /// Transcribe a file with an optional language hint
    pub async fn transcribe_file(
        &self,
        path: impl Into<PathBuf>,
        language_hint: Option<&str>,
    ) -> Result<Arc<TranscriptionResult>, TranscriptionError> {
        let mut request = TranscriptionRequest::from_path(path);
        if let Some(language) = language_hint {
            request = request.with_language(language);
        }
        self.transcribe(request).await
    }

    /// Transcribe a request
    ///
    /// Provider failures never surface as errors: an exhausted chain yields a
    /// result whose `error_message` is set. Errors are reserved for an
    /// unusable chain, an unreadable source and abandoned computations.
    pub async fn transcribe(&self, request: TranscriptionRequest) -> Result<Arc<TranscriptionResult>, TranscriptionError> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "transcribe",
            %request_id,
            source = %request.source().display_name(),
            language = %request.normalized_language()
        );

        self.transcribe_inner(request).instrument(span).await
    }

    async fn transcribe_inner(&self, request: TranscriptionRequest) -> Result<Arc<TranscriptionResult>, TranscriptionError> {
        let policy = self.policy();
        if policy.chain().is_empty() {
            return Err(TranscriptionError::NoProvidersConfigured);
        }

        let ran = Arc::new(AtomicBool::new(false));

        if !self.cache_enabled {
            let result = run_chain(
                Arc::clone(&self.orchestrator),
                policy,
                Arc::new(request),
                Arc::clone(&self.metrics),
                ran,
                CancellationToken::new(),
            )
            .await?;
            return Ok(Arc::new(result));
        }

        let fingerprint = Fingerprint::compute(&request, self.fingerprint_strategy).await?;
        tracing::debug!("Request fingerprint: {}", fingerprint);

        let orchestrator = Arc::clone(&self.orchestrator);
        let metrics = Arc::clone(&self.metrics);
        let request = Arc::new(request);
        let ran_flag = Arc::clone(&ran);

        let outcome = self
            .cache
            .get_or_compute(fingerprint, move |cancel| {
                run_chain(orchestrator, policy, request, metrics, ran_flag, cancel)
            })
            .await;

        if outcome.is_ok() && !ran.load(Ordering::SeqCst) {
            self.metrics.write().record_cache_hit();
        }
        outcome
    }

    /// Status of one provider
    pub fn status(&self, name: &str) -> Result<ProviderSnapshot, TranscriptionError> {
        self.registry.status(name)
    }

    /// Status of every registered provider
    pub fn status_all(&self) -> BTreeMap<String, ProviderSnapshot> {
        self.registry.status_all()
    }

    /// Ask every initialized provider to release its caches
    pub async fn clear_all_caches(&self) -> ClearCacheReport {
        self.registry.clear_caches().await
    }

    /// Drop every cached result
    pub fn clear_result_cache(&self) {
        self.cache.clear();
    }

    /// Drop the cached result for one request
    pub async fn invalidate(&self, request: &TranscriptionRequest) -> Result<(), TranscriptionError> {
        let fingerprint = Fingerprint::compute(request, self.fingerprint_strategy).await?;
        self.cache.invalidate(&fingerprint);
        Ok(())
    }

    /// Current policy snapshot
    pub fn policy(&self) -> Arc<FallbackPolicy> {
        Arc::clone(&self.policy.read())
    }

    /// Replace the whole policy
    pub fn set_policy(&self, policy: FallbackPolicy) {
        *self.policy.write() = Arc::new(policy);
    }

    pub fn set_primary(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::info!("Primary provider set to '{}'", name);
        self.update_policy(|policy| policy.set_primary(name));
    }

    pub fn set_fallback_chain(&self, names: Vec<String>) {
        tracing::info!("Fallback chain set to {:?}", names);
        self.update_policy(|policy| policy.set_fallback_chain(names));
    }

    /// Change the acceptance threshold; values outside [0, 1] are rejected
    pub fn set_confidence_threshold(&self, threshold: f32) -> Result<(), TranscriptionError> {
        self.update_policy(|policy| policy.set_confidence_threshold(threshold))?;
        tracing::info!("Confidence threshold set to {:.2}", threshold);
        Ok(())
    }

    /// Swap in a modified copy; requests already running keep the old snapshot
    fn update_policy<T>(&self, change: impl FnOnce(&mut FallbackPolicy) -> T) -> T {
        let mut current = self.policy.write();
        let mut next = (**current).clone();
        let output = change(&mut next);
        *current = Arc::new(next);
        output
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.read().get_summary()
    }

    /// Most recent provider attempts, newest first
    pub fn recent_attempts(&self, count: usize) -> Vec<AttemptRecord> {
        self.metrics.read().get_recent(count)
    }

    /// Start a fresh metrics session
    pub fn reset_metrics(&self) {
        self.metrics.write().reset();
        tracing::info!("Transcription metrics reset");
    }

    /// Release provider caches and drop cached results
    pub async fn shutdown(&self) -> ClearCacheReport {
        tracing::info!("Shutting down transcription manager");
        let report = self.clear_all_caches().await;
        self.cache.clear();
        report
    }
}

impl Default for TranscriptionManager {
    fn default() -> Self {
        Self::new(FallbackPolicy::default())
    }
}

async fn run_chain(
    orchestrator: Arc<FallbackOrchestrator>,
    policy: Arc<FallbackPolicy>,
    request: Arc<TranscriptionRequest>,
    metrics: Arc<RwLock<PerformanceMetrics>>,
    ran: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> Result<TranscriptionResult, TranscriptionError> {
    ran.store(true, Ordering::SeqCst);
    let run = orchestrator.run(&policy, &request, &cancel).await?;

    let outcome = if run.result.is_error() {
        RequestOutcome::Exhausted
    } else if policy.accepts(&run.result) {
        RequestOutcome::Accepted
    } else {
        RequestOutcome::BestEffort
    };

    {
        let mut metrics = metrics.write();
        for attempt in &run.attempts {
            metrics.record_attempt(AttemptRecord::from(attempt));
        }
        metrics.record_request(outcome, run.fallbacks_used());
    }

    Ok(run.result)
}
