//! Admission control for outbound requests.
//!
//! This module provides a token-bucket rate limiter shared process-wide by
//! every outbound isochrone request. Callers with no token available are
//! suspended in an explicit FIFO queue of [`PendingAdmission`] records and
//! woken in submission order when the bucket refills.
//!
//! # Lifecycle
//!
//! The refill daemon has an explicit `start`/`stop` lifecycle so tests can
//! drive refills deterministically through [`RateLimiter::refill`] instead
//! of waiting on wall-clock ticks:
//!
//! ```ignore
//! use std::sync::Arc;
//! use reachmap::config::RateLimitConfig;
//! use reachmap::limiter::RateLimiter;
//!
//! let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
//! limiter.start();
//!
//! // In request tasks:
//! limiter.admit(&cancel_token).await?;
//! // ... issue the HTTP request ...
//! ```
//!
//! # Failure semantics
//!
//! Admission never fails due to upstream errors. The only failure channel
//! is cancellation: an already-cancelled caller fails synchronously without
//! being queued, and a queued caller whose token fires is removed from the
//! queue without consuming an admission token.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Errors produced by the admission controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The caller's cancellation token fired before a token was granted
    #[error("admission cancelled")]
    Cancelled,
}

/// One queued caller awaiting an admission token.
///
/// Owned solely by the rate budget's queue: removed either when granted a
/// token (the grant channel fires) or when its cancellation token fires.
struct PendingAdmission {
    /// Queue-removal handle for cancellation
    id: u64,
    /// Completion handle fired when a token is granted
    grant: oneshot::Sender<()>,
    /// Cancellation linkage checked at drain time
    cancel: CancellationToken,
}

/// Mutable token-bucket state, serialized behind one mutex.
///
/// `available` and `waiting` are only mutated from the admission path and
/// the refill path, both of which take the same lock.
struct RateBudget {
    /// Current tokens, `0 <= available <= capacity`
    available: usize,
    /// Suspended admission requests in submission order
    waiting: VecDeque<PendingAdmission>,
}

/// Token-bucket rate limiter for outbound requests.
///
/// One instance is shared by all sessions and all entities within a
/// session; it lives for the process's entire run.
pub struct RateLimiter {
    budget: Mutex<RateBudget>,
    capacity: usize,
    refill_period: Duration,
    next_id: AtomicU64,
    daemon: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl RateLimiter {
    /// Create a new limiter. The bucket starts full.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            budget: Mutex::new(RateBudget {
                available: config.capacity(),
                waiting: VecDeque::new(),
            }),
            capacity: config.capacity(),
            refill_period: config.refill_period(),
            next_id: AtomicU64::new(0),
            daemon: Mutex::new(None),
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of currently available tokens.
    pub fn available(&self) -> usize {
        self.budget.lock().expect("rate budget lock poisoned").available
    }

    /// Returns the number of callers waiting for a token.
    pub fn queue_len(&self) -> usize {
        self.budget
            .lock()
            .expect("rate budget lock poisoned")
            .waiting
            .len()
    }

    /// Requests permission to issue one outbound request.
    ///
    /// Resolves immediately when a token is available; otherwise suspends
    /// the caller in FIFO order until a refill grants it a token or its
    /// cancellation token fires.
    ///
    /// A caller whose token is already cancelled fails without ever being
    /// queued or consuming a token.
    pub async fn admit(&self, cancel: &CancellationToken) -> Result<(), AdmissionError> {
        if cancel.is_cancelled() {
            return Err(AdmissionError::Cancelled);
        }

        let (id, mut granted) = {
            let mut budget = self.budget.lock().expect("rate budget lock poisoned");
            if budget.available > 0 {
                budget.available -= 1;
                trace!(available = budget.available, "admission granted immediately");
                return Ok(());
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (grant, granted) = oneshot::channel();
            budget.waiting.push_back(PendingAdmission {
                id,
                grant,
                cancel: cancel.clone(),
            });
            trace!(id, queued = budget.waiting.len(), "admission queued");
            (id, granted)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.remove_waiter(id);
                // A refill may have granted this caller between the send and
                // this poll; the token was never used, so return it.
                if granted.try_recv().is_ok() {
                    self.release_unused_token();
                }
                Err(AdmissionError::Cancelled)
            }
            outcome = &mut granted => match outcome {
                Ok(()) => Ok(()),
                Err(_) => Err(AdmissionError::Cancelled),
            },
        }
    }

    /// Resets the bucket to capacity and drains the queue in FIFO order.
    ///
    /// Cancelled waiters are skipped without consuming a token. Called by
    /// the refill daemon every refill period; public so tests can drive
    /// refill ticks deterministically.
    pub fn refill(&self) {
        let mut budget = self.budget.lock().expect("rate budget lock poisoned");
        budget.available = self.capacity;

        while budget.available > 0 {
            let Some(pending) = budget.waiting.pop_front() else {
                break;
            };
            if pending.cancel.is_cancelled() {
                trace!(id = pending.id, "skipping cancelled waiter");
                continue;
            }
            if pending.grant.send(()).is_ok() {
                budget.available -= 1;
            }
        }

        trace!(
            available = budget.available,
            still_waiting = budget.waiting.len(),
            "refill complete"
        );
    }

    /// Starts the background refill daemon.
    ///
    /// Idempotent: calling `start` while the daemon is running has no
    /// effect. The daemon runs until [`RateLimiter::stop`] is called.
    pub fn start(self: &Arc<Self>) {
        let mut daemon = self.daemon.lock().expect("daemon lock poisoned");
        if daemon.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let limiter = Arc::clone(self);
        let shutdown = token.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + limiter.refill_period;
            let mut ticks = tokio::time::interval_at(start, limiter.refill_period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticks.tick() => limiter.refill(),
                }
            }
            debug!("refill daemon stopped");
        });

        debug!(
            capacity = self.capacity,
            refill_period_ms = self.refill_period.as_millis() as u64,
            "refill daemon started"
        );
        *daemon = Some((token, handle));
    }

    /// Stops the background refill daemon. Idempotent.
    pub fn stop(&self) {
        if let Some((token, _handle)) = self
            .daemon
            .lock()
            .expect("daemon lock poisoned")
            .take()
        {
            token.cancel();
        }
    }

    /// Removes a queued waiter after its cancellation token fired.
    fn remove_waiter(&self, id: u64) {
        let mut budget = self.budget.lock().expect("rate budget lock poisoned");
        if let Some(index) = budget.waiting.iter().position(|p| p.id == id) {
            budget.waiting.remove(index);
            trace!(id, "cancelled waiter removed from queue");
        }
    }

    /// Returns a token that was granted to a caller that never used it.
    fn release_unused_token(&self) {
        let mut budget = self.budget.lock().expect("rate budget lock poisoned");
        if budget.available < self.capacity {
            budget.available += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new().with_capacity(capacity))
    }

    #[tokio::test]
    async fn test_admit_decrements_available() {
        let limiter = limiter(3);
        let cancel = CancellationToken::new();

        assert_eq!(limiter.available(), 3);
        limiter.admit(&cancel).await.unwrap();
        assert_eq!(limiter.available(), 2);
        limiter.admit(&cancel).await.unwrap();
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_available_never_exceeds_capacity() {
        let limiter = limiter(2);
        let cancel = CancellationToken::new();

        limiter.admit(&cancel).await.unwrap();
        limiter.refill();
        assert_eq!(limiter.available(), 2);

        limiter.refill();
        limiter.refill();
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_bucket_queues_caller() {
        let limiter = Arc::new(limiter(1));
        let cancel = CancellationToken::new();

        limiter.admit(&cancel).await.unwrap();
        assert_eq!(limiter.available(), 0);

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.admit(&cancel).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(limiter.queue_len(), 1);

        limiter.refill();
        waiter.await.unwrap().unwrap();
        assert_eq!(limiter.queue_len(), 0);
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    async fn test_fifo_order_preserved_across_cancellation() {
        let limiter = Arc::new(limiter(1));
        let cancel = CancellationToken::new();
        limiter.admit(&cancel).await.unwrap();

        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel_b = CancellationToken::new();

        for (name, token) in [
            ("a", cancel.clone()),
            ("b", cancel_b.clone()),
            ("c", cancel.clone()),
        ] {
            let limiter = Arc::clone(&limiter);
            let order_tx = order_tx.clone();
            tokio::spawn(async move {
                if limiter.admit(&token).await.is_ok() {
                    order_tx.send(name).unwrap();
                }
            });
            // Ensure each caller enqueues before the next one is spawned.
            tokio::task::yield_now().await;
        }
        assert_eq!(limiter.queue_len(), 3);

        // Cancelling "b" must not reorder the survivors.
        cancel_b.cancel();
        tokio::task::yield_now().await;
        assert_eq!(limiter.queue_len(), 2);

        limiter.refill();
        assert_eq!(order_rx.recv().await, Some("a"));
        limiter.refill();
        assert_eq!(order_rx.recv().await, Some("c"));
    }

    #[tokio::test]
    async fn test_grants_between_refills_bounded_by_capacity() {
        let limiter = Arc::new(limiter(2));
        let cancel = CancellationToken::new();
        limiter.admit(&cancel).await.unwrap();
        limiter.admit(&cancel).await.unwrap();

        let mut waiters = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            waiters.push(tokio::spawn(async move { limiter.admit(&cancel).await }));
            tokio::task::yield_now().await;
        }
        assert_eq!(limiter.queue_len(), 5);

        // One refill grants at most `capacity` tokens.
        limiter.refill();
        tokio::task::yield_now().await;
        assert_eq!(limiter.queue_len(), 3);
        assert_eq!(limiter.available(), 0);

        limiter.refill();
        limiter.refill();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_already_cancelled_caller_fails_synchronously() {
        let limiter = limiter(2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = limiter.admit(&cancel).await;
        assert_eq!(result, Err(AdmissionError::Cancelled));
        assert_eq!(limiter.available(), 2);
        assert_eq!(limiter.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_queued_cancellation_consumes_no_token() {
        let limiter = Arc::new(limiter(1));
        let cancel = CancellationToken::new();
        limiter.admit(&cancel).await.unwrap();

        let waiter_cancel = CancellationToken::new();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            let token = waiter_cancel.clone();
            tokio::spawn(async move { limiter.admit(&token).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(limiter.queue_len(), 1);

        waiter_cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(AdmissionError::Cancelled));
        assert_eq!(limiter.queue_len(), 0);

        // The refill after the cancellation leaves the full budget intact.
        limiter.refill();
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_daemon_wakes_queued_caller() {
        let config = RateLimitConfig::new()
            .with_capacity(1)
            .with_refill_period(Duration::from_secs(1));
        let limiter = Arc::new(RateLimiter::new(config));
        limiter.start();

        let cancel = CancellationToken::new();
        limiter.admit(&cancel).await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.admit(&cancel).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(limiter.queue_len(), 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        waiter.await.unwrap().unwrap();

        limiter.stop();
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_twice_is_safe() {
        let limiter = Arc::new(limiter(1));
        limiter.start();
        limiter.start();
        limiter.stop();
        limiter.stop();
    }
}
