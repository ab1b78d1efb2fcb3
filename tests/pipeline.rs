//! End-to-end pipeline tests: catalog load, session orchestration,
//! incremental publishing, caching and retry behavior through the public
//! API only.

use reachmap::cache::{CacheStore, MemoryStorage};
use reachmap::catalog::{CatalogClient, CatalogService};
use reachmap::config::RateLimitConfig;
use reachmap::coord::LatLon;
use reachmap::entity::{Entity, TravelMode};
use reachmap::fetch::{FetchError, FetchExecutor, HttpFetch};
use reachmap::limiter::RateLimiter;
use reachmap::provider::MapboxIsochroneProvider;
use reachmap::session::{IsochroneService, Provenance};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Transport mock that routes by URL fragment. Requests whose URL contains
/// `gated_fragment` block until the test releases a permit, which lets a
/// test observe the pipeline between two entities of one sweep.
struct RoutedFetch {
    routes: Vec<(&'static str, Vec<u8>)>,
    calls: AtomicU32,
    gate: Semaphore,
    gated_fragment: &'static str,
}

impl RoutedFetch {
    fn new(routes: Vec<(&'static str, Vec<u8>)>) -> Self {
        Self {
            routes,
            calls: AtomicU32::new(0),
            gate: Semaphore::new(0),
            gated_fragment: "",
        }
    }

    fn gated_on(mut self, fragment: &'static str) -> Self {
        self.gated_fragment = fragment;
        self
    }

    fn release_one(&self) {
        self.gate.add_permits(1);
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpFetch for RoutedFetch {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.gated_fragment.is_empty() && url.contains(self.gated_fragment) {
            self.gate
                .acquire()
                .await
                .expect("gate closed")
                .forget();
        }
        self.routes
            .iter()
            .find(|(fragment, _)| url.contains(fragment))
            .map(|(_, body)| Ok(body.clone()))
            .unwrap_or_else(|| Err(FetchError::Transient(format!("HTTP 404 from {url}"))))
    }
}

fn geojson(ring: &str) -> Vec<u8> {
    format!(
        r#"{{"features":[{{"geometry":{{"coordinates":[{ring}],"type":"Polygon"}},"type":"Feature"}}],"type":"FeatureCollection"}}"#
    )
    .into_bytes()
}

fn entity(code: &str, lat: f64, lon: f64) -> Entity {
    Entity::new(Some(code.to_string()), code, LatLon::new(lat, lon), "#336699")
}

fn pipeline(
    fetcher: RoutedFetch,
) -> (
    IsochroneService<MapboxIsochroneProvider<RoutedFetch>, MemoryStorage>,
    Arc<CacheStore<MemoryStorage>>,
    Arc<RoutedFetch>,
) {
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new().with_capacity(50)));
    let fetcher = Arc::new(fetcher);
    let executor = FetchExecutor::new(limiter, Arc::clone(&fetcher));
    let provider = Arc::new(MapboxIsochroneProvider::with_base_url(
        executor,
        "test-token",
        "http://mapbox.test/isochrone",
    ));
    let cache = Arc::new(CacheStore::new(MemoryStorage::new()));
    let service = IsochroneService::new(provider, Arc::clone(&cache));
    (service, cache, fetcher)
}

#[tokio::test]
async fn test_sweep_publishes_incrementally_and_caches_final_set() {
    let a = entity("A", 48.85, 2.35);
    let b = entity("B", 45.76, 4.83);
    let (service, cache, fetcher) = pipeline(
        RoutedFetch::new(vec![
            ("2.35,48.85", geojson("[[2.35,48.85],[2.36,48.86],[2.35,48.85]]")),
            ("4.83,45.76", geojson("[[4.83,45.76],[4.84,45.77],[4.83,45.76]]")),
        ])
        .gated_on("4.83"),
    );

    let handle = service.start_session(vec![a, b], 15, TravelMode::Walking);
    assert_eq!(handle.provenance(), Provenance::Fresh);

    // The key is claimed with an empty set before any entity resolves.
    assert_eq!(cache.load_isochrones("walking:15", None), Some(vec![]));

    // First publish: entity A alone, while B is still held at the gate.
    let mut rx = handle.results();
    rx.changed().await.unwrap();
    {
        let snapshot = rx.borrow();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].entity_id, "A");
    }

    // Release B; the second publish carries both, in catalog order.
    fetcher.release_one();
    rx.changed().await.unwrap();
    {
        let snapshot = rx.borrow();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].entity_id, "B");
    }

    let results = handle.completed().await;
    assert_eq!(results.len(), 2);
    assert_eq!(fetcher.calls(), 2);

    // The final set is durable under the parameter key.
    assert_eq!(cache.load_isochrones("walking:15", None), Some(results));
}

#[tokio::test]
async fn test_repeat_session_is_served_from_cache() {
    let a = entity("A", 48.85, 2.35);
    let (service, _cache, fetcher) = pipeline(RoutedFetch::new(vec![(
        "2.35,48.85",
        geojson("[[2.35,48.85],[2.36,48.86]]"),
    )]));

    let first = service
        .start_session(vec![a.clone()], 15, TravelMode::Walking)
        .completed()
        .await;
    assert_eq!(fetcher.calls(), 1);

    let second = service.start_session(vec![a], 15, TravelMode::Walking);
    assert!(matches!(second.provenance(), Provenance::Cached { .. }));
    assert_eq!(second.completed().await, first);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_different_parameters_do_not_share_cache_records() {
    let a = entity("A", 48.85, 2.35);
    let (service, cache, _) = pipeline(RoutedFetch::new(vec![(
        "2.35,48.85",
        geojson("[[2.35,48.85],[2.36,48.86]]"),
    )]));

    service
        .start_session(vec![a.clone()], 15, TravelMode::Walking)
        .completed()
        .await;
    service
        .start_session(vec![a], 30, TravelMode::Cycling)
        .completed()
        .await;

    assert!(cache.load_isochrones("walking:15", None).is_some());
    assert!(cache.load_isochrones("cycling:30", None).is_some());
    assert_eq!(cache.load_isochrones("walking:30", None), None);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_entity_exhausts_retries_and_is_skipped() {
    let a = entity("A", 48.85, 2.35);
    let broken = entity("B", 0.0, 0.0);
    let (service, _, fetcher) = pipeline(RoutedFetch::new(vec![(
        "2.35,48.85",
        geojson("[[2.35,48.85],[2.36,48.86]]"),
    )]));

    let results = service
        .start_session(vec![a, broken], 15, TravelMode::Walking)
        .completed()
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].entity_id, "A");
    // One call for A, three failing attempts for B.
    assert_eq!(fetcher.calls(), 4);
}

#[tokio::test]
async fn test_catalog_feeds_session() {
    let catalog_page = br#"{"total_count":2,"results":[
        {"code":"A","label":"Alpha","lat":48.85,"lon":2.35},
        {"code":"B","label":"Beta","lat":45.76,"lon":4.83}
    ]}"#;
    let fetcher = Arc::new(RoutedFetch::new(vec![
        ("catalog.test", catalog_page.to_vec()),
        ("2.35,48.85", geojson("[[2.35,48.85],[2.36,48.86]]")),
        ("4.83,45.76", geojson("[[4.83,45.76],[4.84,45.77]]")),
    ]));
    let cache = Arc::new(CacheStore::new(MemoryStorage::new()));

    let catalog = CatalogService::new(
        CatalogClient::new(Arc::clone(&fetcher), "http://catalog.test/records"),
        Arc::clone(&cache),
    );
    let load = catalog.load_or_fetch().await.unwrap();
    assert_eq!(load.provenance, Provenance::Fresh);
    assert_eq!(load.entities.len(), 2);

    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new().with_capacity(50)));
    let executor = FetchExecutor::new(limiter, Arc::clone(&fetcher));
    let provider = Arc::new(MapboxIsochroneProvider::with_base_url(
        executor,
        "test-token",
        "http://mapbox.test/isochrone",
    ));
    let service = IsochroneService::new(provider, Arc::clone(&cache));

    let results = service
        .start_session(load.entities.clone(), 15, TravelMode::Walking)
        .completed()
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].entity_id, "A");
    assert_eq!(results[0].color, load.entities[0].color);

    // A rerun of the whole flow touches the network zero further times.
    let reload = catalog.load_or_fetch().await.unwrap();
    assert!(matches!(reload.provenance, Provenance::Cached { .. }));
    let rerun = service.start_session(reload.entities, 15, TravelMode::Walking);
    assert!(matches!(rerun.provenance(), Provenance::Cached { .. }));
    assert_eq!(fetcher.calls(), 3);
}
