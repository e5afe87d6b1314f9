//! Result Cache
//!
//! Maps request fingerprints to finished results and deduplicates concurrent
//! identical requests: at most one computation per fingerprint is in flight,
//! and every caller that arrives while it runs receives the same result.
//!
//! The computation runs as its own task so that a caller abandoning its wait
//! never tears it down while other callers are still attached. When the last
//! waiter detaches, the flight's [`CancellationToken`] is cancelled; if the
//! computation finishes anyway its result is still installed.

use super::{CacheStore, CancellationToken, Fingerprint, TranscriptionError, TranscriptionResult};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Outcome shared by every waiter of one flight
pub type FlightOutcome = Result<Arc<TranscriptionResult>, TranscriptionError>;

/// Cache limits
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Maximum number of entries (0 = unbounded)
    pub max_entries: usize,
    /// Entry lifetime (None = never expire)
    pub ttl: Option<Duration>,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub store_hits: u64,
    pub evictions: u64,
}

struct CacheEntry {
    result: Arc<TranscriptionResult>,
    inserted_at: Instant,
}

struct Flight {
    id: u64,
    epoch: u64,
    invalidated: bool,
    waiters: usize,
    cancel: CancellationToken,
    rx: watch::Receiver<Option<FlightOutcome>>,
}

/// A flight whose waiters all left before it finished
struct DetachedFlight {
    fingerprint: Fingerprint,
    epoch: u64,
    invalidated: bool,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Fingerprint, CacheEntry>,
    in_flight: HashMap<Fingerprint, Flight>,
    detached: HashMap<u64, DetachedFlight>,
    epoch: u64,
    next_flight_id: u64,
    stats: CacheStats,
}

impl CacheState {
    fn fresh_entry(&mut self, fingerprint: &Fingerprint, ttl: Option<Duration>) -> Option<Arc<TranscriptionResult>> {
        let expired = match self.entries.get(fingerprint) {
            Some(entry) => ttl.map(|ttl| entry.inserted_at.elapsed() >= ttl).unwrap_or(false),
            None => return None,
        };

        if expired {
            self.entries.remove(fingerprint);
            tracing::debug!("Cache entry {} expired", fingerprint);
            return None;
        }

        self.entries.get(fingerprint).map(|e| Arc::clone(&e.result))
    }

    fn install(&mut self, fingerprint: Fingerprint, result: Arc<TranscriptionResult>, max_entries: usize) {
        if max_entries > 0 && !self.entries.contains_key(&fingerprint) && self.entries.len() >= max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(fp, _)| *fp);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                self.stats.evictions += 1;
                tracing::debug!("Evicted cache entry {}", oldest);
            }
        }

        self.entries.insert(
            fingerprint,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Unregister a finished flight; returns whether its result may be installed
    fn finish_flight(&mut self, fingerprint: &Fingerprint, id: u64) -> bool {
        let owned = self.in_flight.get(fingerprint).map(|f| f.id == id).unwrap_or(false);
        let (epoch, invalidated) = if owned {
            match self.in_flight.remove(fingerprint) {
                Some(flight) => (flight.epoch, flight.invalidated),
                None => return false,
            }
        } else {
            match self.detached.remove(&id) {
                Some(flight) => (flight.epoch, flight.invalidated),
                None => return false,
            }
        };

        epoch == self.epoch && !invalidated
    }
}

/// Detaches one waiter from a flight when dropped
struct WaiterGuard {
    state: Arc<Mutex<CacheState>>,
    fingerprint: Fingerprint,
    id: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        let abandoned = match state.in_flight.get_mut(&self.fingerprint) {
            Some(flight) if flight.id == self.id => {
                flight.waiters = flight.waiters.saturating_sub(1);
                flight.waiters == 0
            }
            _ => false,
        };

        if abandoned {
            if let Some(flight) = state.in_flight.remove(&self.fingerprint) {
                flight.cancel.cancel();
                state.detached.insert(
                    flight.id,
                    DetachedFlight {
                        fingerprint: self.fingerprint,
                        epoch: flight.epoch,
                        invalidated: flight.invalidated,
                    },
                );
                tracing::debug!("All waiters left flight for {}; cancelling", self.fingerprint);
            }
        }
    }
}

enum Admission {
    Hit(Arc<TranscriptionResult>),
    Join(watch::Receiver<Option<FlightOutcome>>, WaiterGuard),
    Lead {
        rx: watch::Receiver<Option<FlightOutcome>>,
        tx: watch::Sender<Option<FlightOutcome>>,
        guard: WaiterGuard,
        cancel: CancellationToken,
    },
}

/// Single-flight result cache
pub struct ResultCache {
    state: Arc<Mutex<CacheState>>,
    config: CacheConfig,
    store: Option<Arc<dyn CacheStore>>,
}

impl ResultCache {
    /// Create an in-memory cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            config,
            store: None,
        }
    }

    /// Back the cache with a persistent store
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return an in-memory result without waiting on any computation
    ///
    /// Never touches the persistent store; stored results are loaded by
    /// [`ResultCache::get_or_compute`] on the blocking pool.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Arc<TranscriptionResult>> {
        let mut state = self.state.lock();
        let hit = state.fresh_entry(fingerprint, self.config.ttl)?;
        state.stats.hits += 1;
        Some(hit)
    }

    /// Install a result directly; ignored unless the result is cacheable
    ///
    /// Writes through to the persistent store on the calling thread.
    pub fn insert(&self, fingerprint: Fingerprint, result: TranscriptionResult) -> bool {
        if !result.is_cacheable() {
            return false;
        }
        let result = Arc::new(result);
        self.state.lock().install(fingerprint, Arc::clone(&result), self.config.max_entries);
        self.save_to_store(&fingerprint, &result);
        true
    }

    /// Return the cached result, join the in-flight computation, or run `compute`
    ///
    /// `compute` is only invoked when this caller leads a new flight. Its
    /// result is installed when error-free with non-empty text; failures are
    /// delivered to every waiter and never cached.
    pub async fn get_or_compute<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> FlightOutcome
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<TranscriptionResult, TranscriptionError>> + Send + 'static,
    {
        let admission = self.admit(fingerprint);

        let (mut rx, _guard) = match admission {
            Admission::Hit(result) => {
                tracing::debug!("Cache hit for {}", fingerprint);
                return Ok(result);
            }
            Admission::Join(rx, guard) => {
                tracing::debug!("Joining in-flight computation for {}", fingerprint);
                (rx, guard)
            }
            Admission::Lead { rx, tx, guard, cancel } => {
                tracing::debug!("Cache miss for {}; computing", fingerprint);
                let id = guard.id;
                let computation = compute(cancel);
                tokio::spawn(Self::run_flight(
                    Arc::clone(&self.state),
                    self.store.clone(),
                    self.config.max_entries,
                    fingerprint,
                    id,
                    tx,
                    computation,
                ));
                (rx, guard)
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(TranscriptionError::ComputationAborted(
                "computation ended without a result".to_string(),
            ))
        })
    }

    fn admit(&self, fingerprint: Fingerprint) -> Admission {
        let mut state = self.state.lock();

        if let Some(hit) = state.fresh_entry(&fingerprint, self.config.ttl) {
            state.stats.hits += 1;
            return Admission::Hit(hit);
        }

        if let Some(flight) = state.in_flight.get_mut(&fingerprint) {
            flight.waiters += 1;
            let rx = flight.rx.clone();
            let id = flight.id;
            state.stats.joins += 1;
            return Admission::Join(
                rx,
                WaiterGuard {
                    state: Arc::clone(&self.state),
                    fingerprint,
                    id,
                },
            );
        }

        state.stats.misses += 1;
        state.next_flight_id += 1;
        let id = state.next_flight_id;
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let epoch = state.epoch;
        state.in_flight.insert(
            fingerprint,
            Flight {
                id,
                epoch,
                invalidated: false,
                waiters: 1,
                cancel: cancel.clone(),
                rx: rx.clone(),
            },
        );

        Admission::Lead {
            rx,
            tx,
            guard: WaiterGuard {
                state: Arc::clone(&self.state),
                fingerprint,
                id,
            },
            cancel,
        }
    }

    async fn run_flight<Fut>(
        state: Arc<Mutex<CacheState>>,
        store: Option<Arc<dyn CacheStore>>,
        max_entries: usize,
        fingerprint: Fingerprint,
        id: u64,
        tx: watch::Sender<Option<FlightOutcome>>,
        computation: Fut,
    ) where
        Fut: Future<Output = Result<TranscriptionResult, TranscriptionError>> + Send + 'static,
    {
        let stored = match &store {
            Some(store) => load_blocking(Arc::clone(store), fingerprint).await,
            None => None,
        };
        let from_store = stored.is_some();

        let outcome: FlightOutcome = match stored {
            Some(result) => Ok(Arc::new(result)),
            None => match AssertUnwindSafe(computation).catch_unwind().await {
                Ok(result) => result.map(Arc::new),
                Err(_) => {
                    tracing::error!("Computation for {} panicked", fingerprint);
                    Err(TranscriptionError::ComputationAborted("computation panicked".to_string()))
                }
            },
        };

        let installed = {
            let mut state = state.lock();
            if from_store {
                state.stats.store_hits += 1;
            }
            let allowed = state.finish_flight(&fingerprint, id);
            match &outcome {
                Ok(result) if allowed && result.is_cacheable() => {
                    state.install(fingerprint, Arc::clone(result), max_entries);
                    true
                }
                _ => false,
            }
        };

        if installed && !from_store {
            if let (Some(store), Ok(result)) = (store, &outcome) {
                save_blocking(store, fingerprint, Arc::clone(result)).await;
            }
        }

        tx.send_replace(Some(outcome));
    }

    /// Remove one entry; an in-flight result for it will not be installed
    ///
    /// Removes the stored copy on the calling thread.
    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        {
            let mut state = self.state.lock();
            state.entries.remove(fingerprint);
            if let Some(flight) = state.in_flight.get_mut(fingerprint) {
                flight.invalidated = true;
            }
            for flight in state.detached.values_mut() {
                if flight.fingerprint == *fingerprint {
                    flight.invalidated = true;
                }
            }
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.remove(fingerprint) {
                tracing::warn!("Failed to remove stored result {}: {}", fingerprint, e);
            }
        }
    }

    /// Remove every entry; results of computations already running are not installed
    pub fn clear(&self) {
        let removed = {
            let mut state = self.state.lock();
            state.epoch += 1;
            let removed = state.entries.len();
            state.entries.clear();
            removed
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                tracing::warn!("Failed to clear result store: {}", e);
            }
        }

        tracing::info!("Result cache cleared ({} entries)", removed);
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
            ..state.stats.clone()
        }
    }

    fn save_to_store(&self, fingerprint: &Fingerprint, result: &TranscriptionResult) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(fingerprint, result) {
                tracing::warn!("Failed to persist result {}: {}", fingerprint, e);
            }
        }
    }
}

async fn load_blocking(store: Arc<dyn CacheStore>, fingerprint: Fingerprint) -> Option<TranscriptionResult> {
    match tokio::task::spawn_blocking(move || store.load(&fingerprint)).await {
        Ok(Ok(Some(result))) if result.is_cacheable() => {
            tracing::debug!("Loaded {} from result store", fingerprint);
            Some(result)
        }
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::warn!("Failed to read stored result {}: {}", fingerprint, e);
            None
        }
        Err(e) => {
            tracing::warn!("Store read task failed: {}", e);
            None
        }
    }
}

async fn save_blocking(store: Arc<dyn CacheStore>, fingerprint: Fingerprint, result: Arc<TranscriptionResult>) {
    match tokio::task::spawn_blocking(move || store.save(&fingerprint, &result)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to persist result {}: {}", fingerprint, e),
        Err(e) => tracing::warn!("Store write task failed: {}", e),
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
