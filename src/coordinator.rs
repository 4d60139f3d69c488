//! # Single-Flight Resolution Coordinator
//!
//! The coordinator guarantees that concurrent requests for the same
//! [`CacheKey`] share one computation. It keeps a registry of in-flight
//! entries, one per key, each with its own completion signal:
//!
//! 1. A caller that finds an entry for its key attaches to it and blocks until
//!    the entry publishes an outcome.
//! 2. A caller that finds no entry (and no cached value) registers a new one
//!    and launches the computation on a dedicated thread, then waits like
//!    everybody else.
//! 3. The flight installs a successful result into the store, removes its
//!    entry from the registry and publishes the outcome to every waiter.
//!    Failures are published the same way but never stored, so the next
//!    request for the key starts over.
//!
//! Because the computation runs on its own thread, a caller that stops waiting
//! (its `wait` bound expired) never cancels it; other waiters still receive
//! the outcome and a success still lands in the store.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::key::CacheKey;
use crate::result::ResolutionResult;
use crate::store::BoundedStore;

/// Store of completed resolutions, shared by the frontend and the coordinator.
pub type ResultStore = BoundedStore<CacheKey, Arc<ResolutionResult>>;

/// What every waiter on one flight receives.
pub type Outcome = Result<Arc<ResolutionResult>>;

/// One ongoing computation for a key.
struct InFlight {
    key: CacheKey,
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl InFlight {
    fn new(key: CacheKey) -> Self {
        Self {
            key,
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// Publish the outcome and wake all waiters. Only the first call has an
    /// effect.
    fn publish(&self, outcome: Outcome) {
        match self.outcome.lock() {
            Ok(mut slot) => {
                if slot.is_none() {
                    *slot = Some(outcome);
                    self.done.notify_all();
                }
            }
            Err(_) => warn!("completion slot for {} is poisoned", self.key.short()),
        }
    }

    /// Block until the outcome is published or `timeout` expires.
    fn wait(&self, timeout: Option<Duration>) -> Outcome {
        let poisoned = || Error::poisoned("in-flight completion slot");
        let guard = self.outcome.lock().map_err(|_| poisoned())?;

        let guard = match timeout {
            None => self
                .done
                .wait_while(guard, |slot| slot.is_none())
                .map_err(|_| poisoned())?,
            Some(limit) => {
                let (guard, _) = self
                    .done
                    .wait_timeout_while(guard, limit, |slot| slot.is_none())
                    .map_err(|_| poisoned())?;
                guard
            }
        };

        match guard.as_ref() {
            Some(outcome) => outcome.clone(),
            None => Err(Error::Timeout {
                key: self.key.to_string(),
                waited: timeout.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    flights_started: AtomicU64,
    flights_joined: AtomicU64,
    late_hits: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of the coordinator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Computations launched
    pub flights_started: u64,
    /// Callers that attached to an existing computation
    pub flights_joined: u64,
    /// Callers served from the store after missing the frontend lookup
    pub late_hits: u64,
    /// Computations that ended in an error
    pub failures: u64,
    /// Store entries evicted by successful computations
    pub evictions: u64,
    /// Computations currently registered
    pub in_flight: usize,
}

struct Shared {
    in_flight: Mutex<HashMap<CacheKey, Arc<InFlight>>>,
    store: Arc<ResultStore>,
    resolution_timeout: Option<Duration>,
    counters: Counters,
}

impl Shared {
    fn registry(&self) -> Result<MutexGuard<'_, HashMap<CacheKey, Arc<InFlight>>>> {
        self.in_flight
            .lock()
            .map_err(|_| Error::poisoned("in-flight registry"))
    }

    /// Remove `flight` from the registry if it is still the registered entry.
    fn retire(&self, flight: &Arc<InFlight>) {
        match self.registry() {
            Ok(mut registry) => {
                if registry
                    .get(&flight.key)
                    .is_some_and(|current| Arc::ptr_eq(current, flight))
                {
                    registry.remove(&flight.key);
                }
            }
            Err(e) => warn!("could not retire {}: {}", flight.key.short(), e),
        }
    }

    fn complete(&self, flight: &Arc<InFlight>, outcome: Result<ResolutionResult>, started: Instant) {
        let outcome = match outcome {
            Ok(result) => {
                let result = Arc::new(result);
                match self.store.put(flight.key.clone(), Arc::clone(&result)) {
                    Ok(Some(evicted)) => {
                        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                        debug!("evicted {} to make room", evicted.short());
                    }
                    Ok(None) => {}
                    Err(e) => warn!("could not cache {}: {}", flight.key.short(), e),
                }
                info!(
                    "resolved {} in {:?}",
                    flight.key.short(),
                    started.elapsed()
                );
                Ok(result)
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!("resolution of {} failed: {}", flight.key.short(), e);
                Err(e)
            }
        };

        // Retire before publishing: once a waiter holds the outcome, a new
        // request for the key either hits the store or starts a fresh flight.
        self.retire(flight);
        flight.publish(outcome);
    }
}

/// Run `compute`, bounded by `limit` when one is set.
///
/// With a limit the computation runs on a worker thread whose late result is
/// discarded once the limit has passed.
fn execute<F>(key: &CacheKey, limit: Option<Duration>, compute: F) -> Result<ResolutionResult>
where
    F: FnOnce(&CacheKey) -> Result<ResolutionResult> + Send + 'static,
{
    let worker_died = || Error::Internal {
        message: format!("resolution worker for {} panicked", key.short()),
    };

    let Some(limit) = limit else {
        return panic::catch_unwind(AssertUnwindSafe(|| compute(key))).map_err(|_| worker_died())?;
    };

    let (tx, rx) = mpsc::channel();
    let worker_key = key.clone();
    thread::Builder::new()
        .name(format!("resolve-worker {}", key.short()))
        .spawn(move || {
            // The receiver is gone if the limit already expired
            let _ = tx.send(compute(&worker_key));
        })
        .map_err(|e| Error::Internal {
            message: format!("failed to spawn resolution worker: {}", e),
        })?;

    match rx.recv_timeout(limit) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => Err(Error::ResolutionTimedOut {
            key: key.to_string(),
            limit,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(worker_died()),
    }
}

/// Coalesces concurrent resolutions of the same key into one computation.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Create a coordinator installing successful results into `store`.
    ///
    /// `resolution_timeout` bounds each computation; `None` lets it run until
    /// the provider and compiler return.
    pub fn new(store: Arc<ResultStore>, resolution_timeout: Option<Duration>) -> Self {
        Self {
            shared: Arc::new(Shared {
                in_flight: Mutex::new(HashMap::new()),
                store,
                resolution_timeout,
                counters: Counters::default(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.shared.store
    }

    /// Resolve `key`, computing it with `compute` unless a computation for the
    /// key is already running.
    ///
    /// `wait` bounds how long this caller blocks; expiry yields
    /// [`Error::Timeout`] for this caller only and leaves the computation
    /// running.
    pub fn resolve<F>(&self, key: CacheKey, wait: Option<Duration>, compute: F) -> Outcome
    where
        F: FnOnce(&CacheKey) -> Result<ResolutionResult> + Send + 'static,
    {
        let counters = &self.shared.counters;

        let flight = {
            let mut registry = self.shared.registry()?;

            if let Some(existing) = registry.get(&key) {
                counters.flights_joined.fetch_add(1, Ordering::Relaxed);
                debug!("joining in-flight resolution of {}", key.short());
                let existing = Arc::clone(existing);
                drop(registry);
                return existing.wait(wait);
            }

            // A flight for this key may have finished between the caller's
            // store lookup and taking the registry lock.
            if let Some(cached) = self.shared.store.get(&key)? {
                counters.late_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached);
            }

            let flight = Arc::new(InFlight::new(key.clone()));
            registry.insert(key.clone(), Arc::clone(&flight));
            flight
        };

        counters.flights_started.fetch_add(1, Ordering::Relaxed);
        info!("starting resolution of {}", key.short());

        let shared = Arc::clone(&self.shared);
        let runner = Arc::clone(&flight);
        let spawned = thread::Builder::new()
            .name(format!("resolve {}", key.short()))
            .spawn(move || {
                let started = Instant::now();
                let outcome = execute(&runner.key, shared.resolution_timeout, compute);
                shared.complete(&runner, outcome, started);
            });

        if let Err(e) = spawned {
            let error = Error::Internal {
                message: format!("failed to spawn resolution thread: {}", e),
            };
            counters.failures.fetch_add(1, Ordering::Relaxed);
            self.shared.retire(&flight);
            flight.publish(Err(error.clone()));
            return Err(error);
        }

        flight.wait(wait)
    }

    /// Number of computations currently registered.
    pub fn in_flight(&self) -> usize {
        self.shared.registry().map(|r| r.len()).unwrap_or_default()
    }

    /// Returns true if a computation for `key` is registered.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.shared
            .registry()
            .map(|r| r.contains_key(key))
            .unwrap_or_default()
    }

    pub fn stats(&self) -> CoordinatorStats {
        let c = &self.shared.counters;
        CoordinatorStats {
            flights_started: c.flights_started.load(Ordering::Relaxed),
            flights_joined: c.flights_joined.load(Ordering::Relaxed),
            late_hits: c.late_hits.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}
