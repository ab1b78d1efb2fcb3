//! HTTP transport abstraction for testability.

use super::FetchError;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

/// Default transport timeout for a single request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent string for HTTP requests.
const DEFAULT_USER_AGENT: &str = concat!("reachmap/", env!("CARGO_PKG_VERSION"));

/// Trait for issuing HTTP GET requests.
///
/// This abstraction allows dependency injection of mock transports in
/// tests; the retrying executor and catalog client are generic over it.
pub trait HttpFetch: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    ///
    /// Non-success status codes are reported as [`FetchError::Transient`],
    /// the same as transport-level failures: both are retryable.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// HTTP transport backed by a pooled async `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher with the default 30 second transport timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a fetcher with a custom transport timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Transient(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        trace!(url, "HTTP GET starting");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            warn!(url, status = response.status().as_u16(), "HTTP error status");
            return Err(FetchError::Transient(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read response: {e}")))?;

        trace!(url, bytes = bytes.len(), "HTTP response body read");
        Ok(bytes.to_vec())
    }
}
