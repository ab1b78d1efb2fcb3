//! Pipeline configuration types and defaults.

use std::time::Duration;

/// Default admission capacity (requests per refill window).
///
/// Deployments against higher-throughput routing backends may raise this
/// substantially (e.g. to 250).
pub const DEFAULT_ADMISSION_CAPACITY: usize = 5;

/// Default token refill period.
pub const DEFAULT_REFILL_PERIOD: Duration = Duration::from_secs(1);

/// Default number of attempts per logical request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default time-to-live for the cached entity catalog.
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default time-to-live for cached isochrone sets.
///
/// Isochrones are cheaper to regenerate and more likely to go stale as
/// upstream routing data changes, but still worth short-term reuse across
/// repeated parameter toggles.
pub const DEFAULT_ISOCHRONE_TTL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the admission controller.
///
/// # Example
///
/// ```
/// use reachmap::config::RateLimitConfig;
/// use std::time::Duration;
///
/// let config = RateLimitConfig::new()
///     .with_capacity(250)
///     .with_refill_period(Duration::from_secs(1));
/// assert_eq!(config.capacity(), 250);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum tokens per refill window
    capacity: usize,
    /// Period after which the available tokens reset to capacity
    refill_period: Duration,
}

impl RateLimitConfig {
    /// Create a new rate-limit configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the admission capacity. Default: 5.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the refill period. Default: 1 second.
    pub fn with_refill_period(mut self, period: Duration) -> Self {
        self.refill_period = period;
        self
    }

    /// Get the admission capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the refill period.
    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ADMISSION_CAPACITY,
            refill_period: DEFAULT_REFILL_PERIOD,
        }
    }
}

/// Configuration for the retrying executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts per logical request
    max_attempts: u32,
    /// Base delay for exponential backoff
    base_delay: Duration,
}

impl RetryConfig {
    /// Create a new retry configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total number of attempts per request. Default: 3.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base backoff delay. Default: 500 ms.
    ///
    /// The delay before attempt `n+1` is `base_delay * 2^(n-1)`:
    /// 500 ms, 1 s, 2 s, ...
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Get the total number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get the base backoff delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

/// Time-to-live policy for the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtlConfig {
    /// TTL for the entity catalog record
    catalog_ttl: Duration,
    /// TTL for isochrone-set records
    isochrone_ttl: Duration,
}

impl CacheTtlConfig {
    /// Create a new TTL configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the catalog TTL. Default: 24 hours.
    pub fn with_catalog_ttl(mut self, ttl: Duration) -> Self {
        self.catalog_ttl = ttl;
        self
    }

    /// Set the isochrone-set TTL. Default: 1 hour.
    pub fn with_isochrone_ttl(mut self, ttl: Duration) -> Self {
        self.isochrone_ttl = ttl;
        self
    }

    /// Get the catalog TTL.
    pub fn catalog_ttl(&self) -> Duration {
        self.catalog_ttl
    }

    /// Get the isochrone-set TTL.
    pub fn isochrone_ttl(&self) -> Duration {
        self.isochrone_ttl
    }
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            catalog_ttl: DEFAULT_CATALOG_TTL,
            isochrone_ttl: DEFAULT_ISOCHRONE_TTL,
        }
    }
}
