//! Upstream routing service providers.
//!
//! A provider turns one `(position, time budget, travel mode)` triple into
//! a travel-time polygon. All network traffic goes through the retrying
//! executor, which is itself throttled by the shared admission controller.

mod mapbox;

pub use mapbox::{MapboxIsochroneProvider, DEFAULT_MAPBOX_BASE_URL};

use crate::coord::{LatLon, Polygon};
use crate::entity::TravelMode;
use crate::fetch::FetchError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Trait for isochrone providers.
///
/// Implementors resolve the polygon enclosing all points reachable from
/// `position` within `time_budget_secs` for the given travel mode.
///
/// An empty polygon means the position falls outside the provider's
/// supported coverage region: "no result", not an error.
pub trait IsochroneProvider: Send + Sync {
    /// Fetches the isochrone boundary for one origin.
    fn fetch_isochrone(
        &self,
        position: LatLon,
        time_budget_secs: u32,
        mode: TravelMode,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Polygon, FetchError>> + Send;
}
