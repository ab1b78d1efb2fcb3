//! Mapbox Isochrone API provider.

use super::IsochroneProvider;
use crate::coord::{LatLon, Polygon};
use crate::entity::TravelMode;
use crate::fetch::{FetchError, FetchExecutor, HttpFetch};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Production endpoint for the Mapbox Isochrone API.
pub const DEFAULT_MAPBOX_BASE_URL: &str = "https://api.mapbox.com/isochrone/v1/mapbox";

/// Isochrone provider backed by the Mapbox Isochrone API.
///
/// Requests go through a [`FetchExecutor`], so each one is rate limited
/// and retried. The response is a GeoJSON FeatureCollection; only the
/// outer ring of the first feature is kept.
pub struct MapboxIsochroneProvider<F> {
    executor: FetchExecutor<F>,
    base_url: String,
    access_token: String,
}

impl<F: HttpFetch> MapboxIsochroneProvider<F> {
    /// Creates a provider against the production Mapbox endpoint.
    pub fn new(executor: FetchExecutor<F>, access_token: impl Into<String>) -> Self {
        Self::with_base_url(executor, access_token, DEFAULT_MAPBOX_BASE_URL)
    }

    /// Creates a provider against a custom endpoint (staging, mock server).
    pub fn with_base_url(
        executor: FetchExecutor<F>,
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Mapbox routing profile for a travel mode. The isochrone endpoint
    /// has no traffic-aware profile, so traffic-aware driving degrades to
    /// plain driving.
    fn profile(mode: TravelMode) -> &'static str {
        match mode {
            TravelMode::Walking => "walking",
            TravelMode::Cycling => "cycling",
            TravelMode::Driving | TravelMode::DrivingTraffic => "driving",
        }
    }

    fn request_url(&self, position: LatLon, time_budget_secs: u32, mode: TravelMode) -> String {
        // The API takes whole minutes; sub-minute budgets round up to 1.
        let minutes = ((f64::from(time_budget_secs) / 60.0).round() as u32).max(1);
        format!(
            "{}/{}/{},{}?contours_minutes={}&polygons=true&access_token={}",
            self.base_url,
            Self::profile(mode),
            position.lon,
            position.lat,
            minutes,
            self.access_token,
        )
    }

    fn parse_polygon(body: &[u8]) -> Result<Polygon, FetchError> {
        let collection: FeatureCollection = serde_json::from_slice(body)
            .map_err(|e| FetchError::Transient(format!("malformed isochrone response: {e}")))?;

        let Some(feature) = collection.features.into_iter().next() else {
            return Ok(Vec::new());
        };
        let Some(ring) = feature.geometry.coordinates.into_iter().next() else {
            return Ok(Vec::new());
        };

        // GeoJSON positions are [lon, lat].
        Ok(ring
            .into_iter()
            .filter(|p| p.len() >= 2)
            .map(|p| LatLon::new(p[1], p[0]))
            .collect())
    }
}

impl<F: HttpFetch> IsochroneProvider for MapboxIsochroneProvider<F> {
    async fn fetch_isochrone(
        &self,
        position: LatLon,
        time_budget_secs: u32,
        mode: TravelMode,
        cancel: &CancellationToken,
    ) -> Result<Polygon, FetchError> {
        let url = self.request_url(position, time_budget_secs, mode);
        trace!(position = %position, mode = %mode, "isochrone request");

        let body = self.executor.execute(&url, cancel).await?;
        let polygon = Self::parse_polygon(&body)?;

        if polygon.is_empty() {
            debug!(position = %position, "no isochrone coverage at position");
        }
        Ok(polygon)
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    /// Polygon rings; each position is `[lon, lat]`.
    #[serde(default)]
    coordinates: Vec<Vec<Vec<f64>>>,
}
