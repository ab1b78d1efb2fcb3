//! Geographic coordinate types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Valid latitude range
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// A geographic position as a latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in decimal degrees, positive north
    pub lat: f64,
    /// Longitude in decimal degrees, positive east
    pub lon: f64,
}

impl LatLon {
    /// Create a new coordinate pair.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Checks that both components fall within the valid WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        (MIN_LAT..=MAX_LAT).contains(&self.lat) && (MIN_LON..=MAX_LON).contains(&self.lon)
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// An isochrone boundary: the ordered outer ring of a polygon.
pub type Polygon = Vec<LatLon>;
