//! Retrying request executor.

use super::{FetchError, HttpFetch};
use crate::config::RetryConfig;
use crate::limiter::RateLimiter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Executes one logical request with admission control and retries.
///
/// Every attempt, successful or not, consumes exactly one admission token
/// from the shared [`RateLimiter`]; admissions refused by cancellation do
/// not. Exponential backoff between attempts keeps one slow endpoint from
/// starving the rate budget available to others.
pub struct FetchExecutor<F> {
    limiter: Arc<RateLimiter>,
    fetcher: Arc<F>,
    config: RetryConfig,
}

impl<F: HttpFetch> FetchExecutor<F> {
    /// Creates an executor with the default retry policy (3 attempts,
    /// 500 ms base backoff).
    pub fn new(limiter: Arc<RateLimiter>, fetcher: Arc<F>) -> Self {
        Self::with_config(limiter, fetcher, RetryConfig::default())
    }

    /// Creates an executor with a custom retry policy.
    pub fn with_config(limiter: Arc<RateLimiter>, fetcher: Arc<F>, config: RetryConfig) -> Self {
        Self {
            limiter,
            fetcher,
            config,
        }
    }

    /// Returns the retry policy in effect.
    pub fn config(&self) -> RetryConfig {
        self.config
    }

    /// Runs the request until it succeeds, the attempt budget is exhausted,
    /// or the cancellation token fires.
    ///
    /// Attempt `n + 1` is scheduled `base_delay * 2^(n-1)` after attempt `n`
    /// fails (500 ms, 1 s, 2 s, ...). Cancellation is checked before each
    /// attempt, after each failure, and during the backoff delay; a fired
    /// token fails the request with [`FetchError::Cancelled`] immediately,
    /// with no further attempts.
    pub async fn execute(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.config.max_attempts().max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            self.limiter
                .admit(cancel)
                .await
                .map_err(|_| FetchError::Cancelled)?;

            trace!(url, attempt, "request attempt admitted");
            match self.fetcher.get(url).await {
                Ok(body) => {
                    debug!(url, attempt, bytes = body.len(), "request succeeded");
                    return Ok(body);
                }
                Err(err) => {
                    if cancel.is_cancelled() {
                        return Err(FetchError::Cancelled);
                    }
                    warn!(url, attempt, error = %err, "request attempt failed");
                    last_error = err.to_string();
                }
            }

            if attempt < max_attempts {
                let backoff = self.config.base_delay() * 2u32.pow(attempt - 1);
                trace!(
                    url,
                    backoff_ms = backoff.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        Err(FetchError::ExhaustedRetries {
            attempts: max_attempts,
            last_error,
        })
    }
}
