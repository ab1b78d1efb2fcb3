//! Entity catalog acquisition and caching.
//!
//! The catalog is a paginated upstream dataset of points of interest. A
//! full load walks every page, assigns each entity a random display color,
//! and persists the result under the singleton cache key with a long TTL
//! (24 hours by default): the dataset changes rarely and is expensive to
//! re-walk.

use crate::cache::CacheStore;
use crate::cache::Storage;
use crate::config::DEFAULT_CATALOG_TTL;
use crate::coord::LatLon;
use crate::entity::Entity;
use crate::fetch::{FetchError, HttpFetch};
use crate::session::Provenance;
use crate::time::Clock;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default page size for catalog pagination.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Errors produced while loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The upstream request failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The upstream response did not have the expected shape
    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

/// One page of the upstream catalog dataset.
#[derive(Debug, Deserialize)]
struct CatalogPage {
    total_count: usize,
    #[serde(default)]
    results: Vec<CatalogEntry>,
}

/// One raw catalog row. Rows without usable coordinates are skipped.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    code: Option<String>,
    label: String,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Paginating client for the upstream catalog endpoint.
///
/// Catalog pages are fetched directly, without admission control or
/// retries: the load is a rare, foreground operation and a failed page
/// fails the whole load.
pub struct CatalogClient<F> {
    fetcher: Arc<F>,
    base_url: String,
    page_size: usize,
}

impl<F: HttpFetch> CatalogClient<F> {
    /// Creates a client with the default page size of 100.
    pub fn new(fetcher: Arc<F>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the pagination page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Walks every page of the dataset and returns the assembled entity
    /// list, each entity assigned a random display color.
    pub async fn fetch_all(&self) -> Result<Vec<Entity>, CatalogError> {
        let mut entities = Vec::new();
        let mut offset = 0;

        loop {
            let url = format!(
                "{}?limit={}&offset={}",
                self.base_url, self.page_size, offset
            );
            let body = self.fetcher.get(&url).await?;
            let page: CatalogPage = serde_json::from_slice(&body)
                .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

            let fetched = page.results.len();
            for entry in page.results {
                match (entry.lat, entry.lon) {
                    (Some(lat), Some(lon)) if LatLon::new(lat, lon).is_valid() => {
                        entities.push(Entity::new(
                            entry.code,
                            entry.label,
                            LatLon::new(lat, lon),
                            random_color(),
                        ));
                    }
                    _ => {
                        debug!(label = %entry.label, "catalog row without usable coordinates skipped");
                    }
                }
            }

            offset += fetched;
            debug!(offset, total = page.total_count, "catalog page loaded");

            // An empty page before total_count is reached means the
            // upstream count is inconsistent; stop rather than loop.
            if offset >= page.total_count || fetched == 0 {
                break;
            }
        }

        info!(entities = entities.len(), "catalog load complete");
        Ok(entities)
    }
}

/// Outcome of a catalog load: the entities and where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogLoad {
    /// The full entity list
    pub entities: Vec<Entity>,
    /// Whether the list was fetched or served from cache
    pub provenance: Provenance,
}

/// Cache-fronted catalog loader.
pub struct CatalogService<F, S, K> {
    client: CatalogClient<F>,
    cache: Arc<CacheStore<S, K>>,
    ttl: Duration,
}

impl<F, S, K> CatalogService<F, S, K>
where
    F: HttpFetch,
    S: Storage,
    K: Clock,
{
    /// Creates a service with the default 24 hour catalog TTL.
    pub fn new(client: CatalogClient<F>, cache: Arc<CacheStore<S, K>>) -> Self {
        Self::with_ttl(client, cache, DEFAULT_CATALOG_TTL)
    }

    /// Creates a service with a custom catalog TTL.
    pub fn with_ttl(
        client: CatalogClient<F>,
        cache: Arc<CacheStore<S, K>>,
        ttl: Duration,
    ) -> Self {
        Self { client, cache, ttl }
    }

    /// Returns the catalog, from cache when a live record exists,
    /// otherwise from upstream (writing the cache on the way out).
    pub async fn load_or_fetch(&self) -> Result<CatalogLoad, CatalogError> {
        if let Some(entry) = self.cache.load_entities_entry(Some(self.ttl)) {
            if !entry.payload.is_empty() {
                debug!(
                    entities = entry.payload.len(),
                    written_ms = entry.timestamp,
                    "catalog served from cache"
                );
                return Ok(CatalogLoad {
                    entities: entry.payload,
                    provenance: Provenance::Cached {
                        timestamp_millis: entry.timestamp,
                    },
                });
            }
        }

        let entities = self.client.fetch_all().await?;
        if entities.is_empty() {
            warn!("catalog load returned no usable entities");
        }
        self.cache.save_entities(&entities);
        Ok(CatalogLoad {
            entities,
            provenance: Provenance::Fresh,
        })
    }
}

/// Picks a random `#rrggbb` display color.
fn random_color() -> String {
    format!("#{:06x}", rand::thread_rng().gen_range(0..0x100_0000))
}
