//! Transcription Orchestrator
//!
//! Drives a request through the provider chain: the first result that meets
//! the acceptance rule wins and later providers are never called. When
//! nothing is accepted, the most confident error-free result is returned,
//! or a synthetic failure result if every attempt failed.

use super::{
    CancellationToken, FallbackPolicy, ProviderError, ProviderRegistry, TranscriptionError,
    TranscriptionProvider, TranscriptionRequest, TranscriptionResult,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Model name reported by the synthetic exhaustion result
pub const NO_MODEL: &str = "none";

/// How a single provider attempt ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted { confidence: f32 },
    LowConfidence { confidence: f32 },
    Failed(String),
    InitializationFailed(String),
}

/// One provider attempt within a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

/// Final result plus the attempts that led to it
#[derive(Debug, Clone)]
pub struct Orchestration {
    pub result: TranscriptionResult,
    pub attempts: Vec<Attempt>,
}

impl Orchestration {
    /// Number of providers tried after the first
    pub fn fallbacks_used(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }
}

enum AttemptError {
    Cancelled,
    Provider(ProviderError),
}

/// Orchestrates transcription across registered providers
pub struct FallbackOrchestrator {
    registry: Arc<ProviderRegistry>,
}

impl FallbackOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Registered chain members in attempt order
    ///
    /// Unknown names are skipped. Providers degraded within the policy's
    /// cooldown keep their relative order but move behind healthy ones.
    pub fn candidates(&self, policy: &FallbackPolicy) -> Vec<String> {
        let mut healthy = Vec::new();
        let mut degraded = Vec::new();

        for name in policy.chain() {
            if !self.registry.contains(&name) {
                tracing::warn!("Configured provider '{}' is not registered. Skipping.", name);
                continue;
            }
            if self.registry.is_degraded_within(&name, policy.degraded_cooldown()) {
                degraded.push(name);
            } else {
                healthy.push(name);
            }
        }

        healthy.extend(degraded);
        healthy
    }

    /// Run the fallback procedure for one request
    ///
    /// Errors only for an empty chain or cancellation. Provider failures and
    /// unregistered names end up in the returned result.
    pub async fn run(
        &self,
        policy: &FallbackPolicy,
        request: &TranscriptionRequest,
        cancel: &CancellationToken,
    ) -> Result<Orchestration, TranscriptionError> {
        let chain = policy.chain();
        if chain.is_empty() {
            return Err(TranscriptionError::NoProvidersConfigured);
        }

        let started = Instant::now();
        let language = request.normalized_language();
        let candidates = self.candidates(policy);
        let mut attempts = Vec::with_capacity(candidates.len());
        let mut best: Option<TranscriptionResult> = None;
        let mut last_error: Option<String> = chain
            .iter()
            .rev()
            .find(|name| !self.registry.contains(name))
            .map(|name| format!("provider '{}' is not registered", name));

        for name in candidates {
            if cancel.is_cancelled() {
                return Err(TranscriptionError::Cancelled);
            }

            let attempt_start = Instant::now();
            let provider = match self.registry.ensure_initialized(&name).await {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::warn!("Provider '{}' failed to initialize. Skipping to next.", name);
                    last_error = Some(format!("{}: {}", name, e));
                    attempts.push(Attempt {
                        provider: name,
                        outcome: AttemptOutcome::InitializationFailed(e.to_string()),
                        duration_ms: elapsed_ms(attempt_start),
                    });
                    continue;
                }
            };

            tracing::info!(
                "Attempting transcription of {} with provider '{}'",
                request.source().display_name(),
                name
            );

            let attempt_start = Instant::now();
            let outcome = Self::attempt(provider.as_ref(), request, policy.attempt_timeout(), cancel).await;
            let elapsed = attempt_start.elapsed();

            let result = match outcome {
                Err(AttemptError::Cancelled) => {
                    tracing::info!("Transcription cancelled during attempt with '{}'", name);
                    return Err(TranscriptionError::Cancelled);
                }
                Err(AttemptError::Provider(e)) => {
                    if e.is_resource_exhaustion() {
                        self.registry.mark_degraded(&name, e.to_string());
                    }
                    self.registry.record_failure(&name, &e.to_string(), elapsed);
                    tracing::warn!("Transcription with '{}' failed: {}. Trying fallback.", name, e);
                    last_error = Some(format!("{}: {}", name, e));
                    attempts.push(Attempt {
                        provider: name,
                        outcome: AttemptOutcome::Failed(e.to_string()),
                        duration_ms: elapsed.as_millis() as u64,
                    });
                    continue;
                }
                Ok(result) => normalize(result, &name, &language, elapsed),
            };

            if let Some(message) = &result.error_message {
                self.registry.record_failure(&name, message, elapsed);
                tracing::warn!("Transcription with '{}' failed: {}. Trying fallback.", name, message);
                last_error = Some(format!("{}: {}", name, message));
                attempts.push(Attempt {
                    provider: name,
                    outcome: AttemptOutcome::Failed(message.clone()),
                    duration_ms: elapsed.as_millis() as u64,
                });
                continue;
            }

            self.registry.record_success(&name, elapsed);

            if policy.accepts(&result) {
                tracing::info!(
                    "Transcription successful with '{}' ({} chars, confidence {:.3}, {:.2}s)",
                    name,
                    result.text.len(),
                    result.confidence,
                    result.processing_time
                );
                attempts.push(Attempt {
                    provider: name,
                    outcome: AttemptOutcome::Accepted {
                        confidence: result.confidence,
                    },
                    duration_ms: elapsed.as_millis() as u64,
                });
                return Ok(Orchestration { result, attempts });
            }

            tracing::warn!(
                "Transcription with '{}' had low confidence ({:.2} < {:.2}). Trying fallback.",
                name,
                result.confidence,
                policy.confidence_threshold()
            );
            attempts.push(Attempt {
                provider: name,
                outcome: AttemptOutcome::LowConfidence {
                    confidence: result.confidence,
                },
                duration_ms: elapsed.as_millis() as u64,
            });

            // Earlier chain position wins ties
            best = match best {
                Some(current) if current.confidence >= result.confidence => Some(current),
                _ => Some(result),
            };
        }

        if let Some(best) = best {
            tracing::warn!(
                "No provider met the confidence threshold; returning best result from '{}' ({:.2})",
                best.model_used,
                best.confidence
            );
            return Ok(Orchestration { result: best, attempts });
        }

        let message = format!(
            "All configured transcription providers failed or returned low confidence. Last error: {}",
            last_error.as_deref().unwrap_or("none")
        );
        tracing::error!("{}", message);

        let result = TranscriptionResult::failure(message, NO_MODEL, language)
            .with_processing_time(started.elapsed().as_secs_f64());
        Ok(Orchestration { result, attempts })
    }

    async fn attempt(
        provider: &dyn TranscriptionProvider,
        request: &TranscriptionRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult, AttemptError> {
        let call = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, provider.transcribe(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::ExternalService(format!(
                        "timed out after {}s",
                        limit.as_secs_f64()
                    ))),
                },
                None => provider.transcribe(request).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            result = call => result.map_err(AttemptError::Provider),
        }
    }
}

/// Fill gaps a provider left and keep confidence inside [0, 1]
fn normalize(mut result: TranscriptionResult, provider: &str, language: &str, elapsed: Duration) -> TranscriptionResult {
    result.confidence = if result.confidence.is_nan() {
        0.0
    } else {
        result.confidence.clamp(0.0, 1.0)
    };
    if result.model_used.trim().is_empty() {
        result.model_used = provider.to_string();
    }
    if result.language.trim().is_empty() {
        result.language = language.to_string();
    }
    if result.processing_time.is_nan() || result.processing_time <= 0.0 {
        result.processing_time = elapsed.as_secs_f64();
    }
    result
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
