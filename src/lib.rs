//! ReachMap - isochrone resolution pipeline for map dashboards.
//!
//! This library resolves travel-time polygons ("isochrones") for lists of
//! point-of-interest entities against a rate-limited upstream routing
//! service, with retry-on-failure, user-driven cancellation and durable
//! TTL-aware caching. Partial results are streamed to consumers as they
//! arrive.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     IsochroneService                         │
//! │                                                              │
//! │  start_session() ──► SessionHandle (one active at most)      │
//! │        │                      │                              │
//! │        │ cache probe          │ per-entity sweep             │
//! │        ▼                      ▼                              │
//! │   ┌─────────┐          ┌──────────────┐     ┌────────────┐   │
//! │   │CacheStore│         │FetchExecutor │ ──► │RateLimiter │   │
//! │   │ (TTL)   │          │  (retries)   │     │(token bkt) │   │
//! │   └─────────┘          └──────────────┘     └────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use reachmap::cache::{CacheStore, MemoryStorage};
//! use reachmap::config::RateLimitConfig;
//! use reachmap::entity::TravelMode;
//! use reachmap::fetch::{FetchExecutor, ReqwestFetcher};
//! use reachmap::limiter::RateLimiter;
//! use reachmap::provider::MapboxIsochroneProvider;
//! use reachmap::session::IsochroneService;
//!
//! let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
//! limiter.start();
//!
//! let fetcher = Arc::new(ReqwestFetcher::new()?);
//! let executor = FetchExecutor::new(Arc::clone(&limiter), fetcher);
//! let provider = Arc::new(MapboxIsochroneProvider::new(executor, access_token));
//! let cache = Arc::new(CacheStore::new(MemoryStorage::new()));
//!
//! let service = IsochroneService::new(provider, cache);
//! let session = service.start_session(entities, 15, TravelMode::Walking);
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod coord;
pub mod entity;
pub mod fetch;
pub mod limiter;
pub mod logging;
pub mod provider;
pub mod session;
pub mod time;

/// Version of the ReachMap library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
