//! Resolution session orchestration.
//!
//! A session resolves one isochrone per catalog entity for a fixed
//! `(travel mode, time budget)` parameter pair. Starting a session
//! synchronously supersedes any session already in flight, probes the
//! cache, and on a miss sweeps the entities sequentially in catalog
//! order, publishing the growing result set after each resolved entity.
//!
//! # Architecture
//!
//! ```text
//!   start_session ──► cancel prior ──► cache probe ──┬─ hit ──► handle (Cached)
//!                                                    │
//!                                                    └─ miss ─► write empty set
//!                                                               spawn sweep
//!                                                               handle (Fresh)
//!
//!   sweep: entity 1 ─► entity 2 ─► ... ─► entity N
//!            │            │                  │
//!            ▼            ▼                  ▼
//!        save+publish  save+publish      save+publish
//! ```
//!
//! Individual entity failures are tolerated: the sweep logs them, skips
//! the entity and carries on. Only cancellation stops a sweep early.

use crate::cache::{CacheStore, Storage};
use crate::config::DEFAULT_ISOCHRONE_TTL;
use crate::entity::{Entity, IsochroneResult, TravelMode};
use crate::provider::IsochroneProvider;
use crate::time::{Clock, SystemClock};
use chrono::{DateTime, Local, TimeZone};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Where a session's initial result set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Resolved from the upstream provider during this session
    Fresh,
    /// Served from a live cache record written at the given wall-clock
    /// time (milliseconds since the Unix epoch)
    Cached {
        /// Write time of the cache record
        timestamp_millis: u64,
    },
}

/// Cache parameter key for a `(mode, time budget)` pair, e.g. `walking:15`.
pub fn parameter_key(mode: TravelMode, time_budget_minutes: u32) -> String {
    format!("{}:{}", mode.as_str(), time_budget_minutes)
}

/// Orchestrates isochrone resolution sessions.
///
/// At most one session is active per service instance; starting a new one
/// cancels the previous one before any other work happens, so a stale
/// sweep can never publish over a newer session's results.
pub struct IsochroneService<P, S, K = SystemClock> {
    provider: Arc<P>,
    cache: Arc<CacheStore<S, K>>,
    ttl: Duration,
    active: Mutex<Option<CancellationToken>>,
}

impl<P, S, K> IsochroneService<P, S, K>
where
    P: IsochroneProvider + 'static,
    S: Storage + 'static,
    K: Clock + Send + Sync + 'static,
{
    /// Creates a service with the default 1 hour isochrone TTL.
    pub fn new(provider: Arc<P>, cache: Arc<CacheStore<S, K>>) -> Self {
        Self::with_ttl(provider, cache, DEFAULT_ISOCHRONE_TTL)
    }

    /// Creates a service with a custom isochrone TTL.
    pub fn with_ttl(provider: Arc<P>, cache: Arc<CacheStore<S, K>>, ttl: Duration) -> Self {
        Self {
            provider,
            cache,
            ttl,
            active: Mutex::new(None),
        }
    }

    /// Starts a resolution session for the given entities and parameters.
    ///
    /// Any session already in flight is cancelled before this one begins.
    /// On a live cache hit the returned handle is already complete and
    /// carries [`Provenance::Cached`]; otherwise an empty result set is
    /// written to the cache immediately and a background sweep resolves
    /// the entities one at a time, publishing after each.
    pub fn start_session(
        &self,
        entities: Vec<Entity>,
        time_budget_minutes: u32,
        mode: TravelMode,
    ) -> SessionHandle {
        let token = CancellationToken::new();
        if let Some(prior) = self
            .active
            .lock()
            .expect("session lock poisoned")
            .replace(token.clone())
        {
            debug!("superseding in-flight session");
            prior.cancel();
        }

        let key = parameter_key(mode, time_budget_minutes);

        if let Some(entry) = self.cache.load_isochrones_entry(&key, Some(self.ttl)) {
            if !entry.payload.is_empty() {
                info!(key, results = entry.payload.len(), "session served from cache");
                let (_, rx) = watch::channel(entry.payload);
                return SessionHandle {
                    results: rx,
                    provenance: Provenance::Cached {
                        timestamp_millis: entry.timestamp,
                    },
                    token,
                    sweep: None,
                };
            }
        }

        // Claim the key before the sweep starts so a stale record from a
        // previous parameter set is never served mid-session.
        self.cache.save_isochrones(&key, &[]);

        let (tx, rx) = watch::channel(Vec::new());
        let sweep = tokio::spawn(run_sweep(
            Arc::clone(&self.provider),
            Arc::clone(&self.cache),
            entities,
            time_budget_minutes,
            mode,
            key,
            token.clone(),
            tx,
        ));

        SessionHandle {
            results: rx,
            provenance: Provenance::Fresh,
            token,
            sweep: Some(sweep),
        }
    }

    /// Cancels the active session, if any. Idempotent.
    pub fn cancel_active_session(&self) {
        if let Some(token) = self.active.lock().expect("session lock poisoned").take() {
            debug!("active session cancelled");
            token.cancel();
        }
    }
}

/// Sequential resolution sweep over the session's entities.
#[allow(clippy::too_many_arguments)]
async fn run_sweep<P, S, K>(
    provider: Arc<P>,
    cache: Arc<CacheStore<S, K>>,
    entities: Vec<Entity>,
    time_budget_minutes: u32,
    mode: TravelMode,
    key: String,
    cancel: CancellationToken,
    tx: watch::Sender<Vec<IsochroneResult>>,
) where
    P: IsochroneProvider,
    S: Storage,
    K: Clock,
{
    let time_budget_secs = time_budget_minutes * 60;
    let mut results: Vec<IsochroneResult> = Vec::with_capacity(entities.len());

    for entity in &entities {
        if cancel.is_cancelled() {
            debug!(key, resolved = results.len(), "sweep cancelled");
            return;
        }

        match provider
            .fetch_isochrone(entity.position, time_budget_secs, mode, &cancel)
            .await
        {
            Ok(polygon) if !polygon.is_empty() => {
                results.push(IsochroneResult {
                    entity_id: entity.stable_id(),
                    polygon,
                    color: entity.color.clone(),
                });
                cache.save_isochrones(&key, &results);
                if cancel.is_cancelled() {
                    debug!(key, resolved = results.len(), "sweep cancelled");
                    return;
                }
                let _ = tx.send(results.clone());
            }
            Ok(_) => {
                trace!(entity = %entity.stable_id(), "no coverage, entity skipped");
            }
            Err(err) if err.is_cancelled() => {
                debug!(key, resolved = results.len(), "sweep cancelled");
                return;
            }
            Err(err) => {
                warn!(entity = %entity.stable_id(), error = %err, "entity failed, continuing sweep");
            }
        }
    }

    info!(
        key,
        entities = entities.len(),
        resolved = results.len(),
        "sweep complete"
    );
}

/// Handle to a resolution session.
///
/// Dropping the handle does not cancel the sweep; cancellation happens
/// either explicitly via [`SessionHandle::cancel`] or implicitly when a
/// newer session supersedes this one.
pub struct SessionHandle {
    results: watch::Receiver<Vec<IsochroneResult>>,
    provenance: Provenance,
    token: CancellationToken,
    sweep: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Returns a watch receiver over the growing result set. Each resolved
    /// entity produces a new observable snapshot.
    pub fn results(&self) -> watch::Receiver<Vec<IsochroneResult>> {
        self.results.clone()
    }

    /// Returns the result set as of now.
    pub fn current_results(&self) -> Vec<IsochroneResult> {
        self.results.borrow().clone()
    }

    /// Returns where the session's initial results came from.
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// For a cache-served session, the wall-clock write time of the record
    /// in milliseconds since the Unix epoch.
    pub fn cache_timestamp_millis(&self) -> Option<u64> {
        match self.provenance {
            Provenance::Cached { timestamp_millis } => Some(timestamp_millis),
            Provenance::Fresh => None,
        }
    }

    /// For a cache-served session, the record's write time as a local
    /// date-time, suitable for display.
    pub fn cached_at(&self) -> Option<DateTime<Local>> {
        self.cache_timestamp_millis()
            .and_then(|ms| Local.timestamp_millis_opt(ms as i64).single())
    }

    /// Cancels this session's sweep.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once this session has been cancelled or superseded.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the sweep to finish and returns the final result set.
    /// Resolves immediately for cache-served sessions.
    pub async fn completed(mut self) -> Vec<IsochroneResult> {
        if let Some(sweep) = self.sweep.take() {
            let _ = sweep.await;
        }
        let results = self.results.borrow().clone();
        results
    }
}
