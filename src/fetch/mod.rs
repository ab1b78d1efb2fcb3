//! Rate-limited, retrying request execution.
//!
//! [`FetchExecutor`] wraps one logical request: every attempt is admitted
//! through the shared [`RateLimiter`](crate::limiter::RateLimiter), transient
//! failures are retried with exponential backoff, and cancellation is
//! honored at every suspension point (admission, the request itself, and
//! the backoff delay).

mod executor;
pub(crate) mod http;

pub use executor::FetchExecutor;
pub use http::{HttpFetch, ReqwestFetcher};

use thiserror::Error;

/// Errors produced while executing a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Retryable failure: connection error or non-success status code
    #[error("transient network error: {0}")]
    Transient(String),

    /// The cancellation token fired; not an application error
    #[error("request cancelled")]
    Cancelled,

    /// Terminal failure after every attempt was exhausted
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        /// Number of attempts made
        attempts: u32,
        /// Last observed error message
        last_error: String,
    },
}

impl FetchError {
    /// Returns true for the cancellation channel, which callers treat as a
    /// routine stop rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
