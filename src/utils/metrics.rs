//! Performance Metrics
//!
//! Collect and expose metrics for transcription requests and the provider
//! attempts behind them. Owned by the manager.

use crate::transcription::{Attempt, AttemptOutcome};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

/// Maximum number of attempt records to keep
const MAX_HISTORY: usize = 100;

/// How a request that ran the provider chain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A provider met the confidence threshold
    Accepted,
    /// Best below-threshold result returned
    BestEffort,
    /// Every attempt failed
    Exhausted,
}

/// Performance metrics collector
pub struct PerformanceMetrics {
    /// History of provider attempts
    attempts: VecDeque<AttemptRecord>,
    /// Current session start time
    session_start: Instant,
    requests: u64,
    accepted: u64,
    best_effort: u64,
    exhausted: u64,
    /// Requests answered without running the provider chain
    cache_hits: u64,
    /// Requests that ran the provider chain
    cache_misses: u64,
    fallbacks: u64,
}

impl PerformanceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            attempts: VecDeque::with_capacity(MAX_HISTORY),
            session_start: Instant::now(),
            requests: 0,
            accepted: 0,
            best_effort: 0,
            exhausted: 0,
            cache_hits: 0,
            cache_misses: 0,
            fallbacks: 0,
        }
    }

    /// Record a single provider attempt
    pub fn record_attempt(&mut self, record: AttemptRecord) {
        if self.attempts.len() >= MAX_HISTORY {
            self.attempts.pop_front();
        }
        self.attempts.push_back(record);
    }

    /// Record a request that ran the provider chain
    pub fn record_request(&mut self, outcome: RequestOutcome, fallbacks_used: usize) {
        self.requests += 1;
        self.cache_misses += 1;
        self.fallbacks += fallbacks_used as u64;
        match outcome {
            RequestOutcome::Accepted => self.accepted += 1,
            RequestOutcome::BestEffort => self.best_effort += 1,
            RequestOutcome::Exhausted => self.exhausted += 1,
        }
    }

    /// Record a request served from the cache or a shared computation
    pub fn record_cache_hit(&mut self) {
        self.requests += 1;
        self.cache_hits += 1;
    }

    /// Get summary statistics
    pub fn get_summary(&self) -> MetricsSummary {
        let mut summary = MetricsSummary {
            request_count: self.requests,
            accepted_count: self.accepted,
            best_effort_count: self.best_effort,
            exhausted_count: self.exhausted,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            fallbacks_used: self.fallbacks,
            session_duration_ms: self.session_start.elapsed().as_millis() as u64,
            ..MetricsSummary::default()
        };

        if self.cache_misses > 0 {
            summary.accept_rate = self.accepted as f64 / self.cache_misses as f64;
        }

        let count = self.attempts.len();
        if count == 0 {
            return summary;
        }

        let mut times: Vec<u64> = self.attempts.iter().map(|r| r.processing_time_ms).collect();
        times.sort_unstable();

        summary.attempt_count = count;
        summary.avg_attempt_ms = times.iter().sum::<u64>() / count as u64;
        summary.fastest_ms = times[0];
        summary.slowest_ms = times[count - 1];
        let p95_idx = (count as f64 * 0.95) as usize;
        summary.p95_ms = times[p95_idx.min(count - 1)];
        summary
    }

    /// Get recent attempt records, newest first
    pub fn get_recent(&self, count: usize) -> Vec<AttemptRecord> {
        self.attempts.iter().rev().take(count).cloned().collect()
    }

    /// Reset metrics
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Record of a single provider attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// Timestamp when the record was built (unix ms)
    pub timestamp_ms: u64,
    pub provider: String,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    /// Reported confidence, when the attempt produced a result
    pub confidence: Option<f32>,
    pub accepted: bool,
    /// Failure reason, if any
    pub error: Option<String>,
}

impl AttemptRecord {
    /// Create a new record builder
    pub fn builder() -> AttemptRecordBuilder {
        AttemptRecordBuilder::new()
    }
}

impl From<&Attempt> for AttemptRecord {
    fn from(attempt: &Attempt) -> Self {
        let builder = AttemptRecord::builder()
            .provider(attempt.provider.clone())
            .processing_time_ms(attempt.duration_ms);

        let builder = match &attempt.outcome {
            AttemptOutcome::Accepted { confidence } => builder.confidence(*confidence).accepted(true),
            AttemptOutcome::LowConfidence { confidence } => builder.confidence(*confidence),
            AttemptOutcome::Failed(e) | AttemptOutcome::InitializationFailed(e) => builder.error(e.clone()),
        };
        builder.build()
    }
}

/// Builder for AttemptRecord
pub struct AttemptRecordBuilder {
    record: AttemptRecord,
}

impl AttemptRecordBuilder {
    fn new() -> Self {
        Self {
            record: AttemptRecord {
                timestamp_ms: std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
                provider: String::new(),
                processing_time_ms: 0,
                confidence: None,
                accepted: false,
                error: None,
            },
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.record.provider = provider.into();
        self
    }

    pub fn processing_time_ms(mut self, ms: u64) -> Self {
        self.record.processing_time_ms = ms;
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.record.confidence = Some(confidence);
        self
    }

    pub fn accepted(mut self, accepted: bool) -> Self {
        self.record.accepted = accepted;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.record.error = Some(error.into());
        self
    }

    pub fn build(self) -> AttemptRecord {
        self.record
    }
}

/// Summary of performance metrics
#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricsSummary {
    /// Requests handled, cached or not
    pub request_count: u64,
    pub accepted_count: u64,
    pub best_effort_count: u64,
    pub exhausted_count: u64,
    /// Accepted share of requests that ran the provider chain
    pub accept_rate: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Providers tried beyond the first, summed over requests
    pub fallbacks_used: u64,
    /// Number of attempts in the retained history
    pub attempt_count: usize,
    /// Average attempt time (ms)
    pub avg_attempt_ms: u64,
    pub fastest_ms: u64,
    pub slowest_ms: u64,
    /// 95th percentile attempt time (ms)
    pub p95_ms: u64,
    /// Session duration in ms
    pub session_duration_ms: u64,
}

impl MetricsSummary {
    /// Share of requests answered without running providers
    pub fn cache_hit_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.request_count as f64
        }
    }
}
