//! Integration Tests for the Transcription Pipeline
//!
//! Tests the complete flow: TranscriptionManager -> ResultCache -> FallbackOrchestrator -> ProviderRegistry
//!
//! These tests verify:
//! 1. Identical concurrent requests share one provider invocation
//! 2. The fallback chain honours ordering and the confidence threshold
//! 3. Provider failures degrade to results, never to caller errors

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use transcription_hub::transcription::{
    FallbackPolicy, ProviderError, ProviderMetrics, TranscriptionManager, TranscriptionProvider,
    TranscriptionRequest, TranscriptionResult,
};

mod configuration;
mod pipeline;

// ============================================================================
// Test Fixtures and Mock Providers
// ============================================================================

/// Mock transcription provider for testing with configurable behavior
struct MockTranscriptionProvider {
    name: &'static str,
    confidence: f32,
    fail_error: Option<ProviderError>,
    init_fails: bool,
    delay_ms: Option<u64>,
    call_count: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl MockTranscriptionProvider {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            confidence: 0.9,
            fail_error: None,
            init_fails: false,
            delay_ms: None,
            call_count: Arc::new(AtomicU32::new(0)),
        }
    }

    fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    fn with_error(mut self, error: ProviderError) -> Self {
        self.fail_error = Some(error);
        self
    }

    fn failing_init(mut self) -> Self {
        self.init_fails = true;
        self
    }

    fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    fn with_call_counter(mut self, counter: Arc<AtomicU32>) -> Self {
        self.call_count = counter;
        self
    }
}

#[async_trait]
impl TranscriptionProvider for MockTranscriptionProvider {
    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.init_fails {
            Err(ProviderError::Initialization(format!("{}: model not found", self.name)))
        } else {
            Ok(())
        }
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<TranscriptionResult, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        // Simulate processing delay if configured
        if let Some(delay) = self.delay_ms {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match &self.fail_error {
            Some(error) => Err(error.clone()),
            None => Ok(TranscriptionResult::new(
                format!("Transcribed by {}", self.name),
                self.confidence,
                self.name,
                request.normalized_language(),
            )),
        }
    }

    fn name(&self) -> &str {
        self.name
    }

    fn status(&self) -> ProviderMetrics {
        let mut metrics = ProviderMetrics::new();
        metrics.insert("cuda_available".to_string(), serde_json::json!(false));
        metrics.insert("cache_size".to_string(), serde_json::json!(0));
        metrics
    }
}

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

fn calls(counter: &Arc<AtomicU32>) -> u32 {
    counter.load(Ordering::SeqCst)
}

/// Manager with the given chain (first entry is the primary)
fn manager_with_chain(chain: &[&str], threshold: f32) -> TranscriptionManager {
    let primary = chain.first().copied().unwrap_or("");
    let fallbacks = chain.iter().skip(1).map(|s| s.to_string()).collect();
    TranscriptionManager::new(FallbackPolicy::new(primary, fallbacks, threshold).unwrap())
}

fn clip(name: &str) -> TranscriptionRequest {
    TranscriptionRequest::from_bytes(name, format!("pcm:{}", name).into_bytes())
}
