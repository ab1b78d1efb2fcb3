//! Point-of-interest entities, travel modes and resolved isochrones.

use crate::coord::{LatLon, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point of interest from the entity catalog.
///
/// Each entity carries a stable identity (its natural unique code when the
/// catalog provides one), a position, a display label and an assigned
/// display color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Natural unique code from the upstream catalog, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable display label
    pub label: String,
    /// Geographic position
    pub position: LatLon,
    /// Display color as a `#rrggbb` string
    pub color: String,
}

impl Entity {
    /// Create a new entity.
    pub fn new(
        code: Option<String>,
        label: impl Into<String>,
        position: LatLon,
        color: impl Into<String>,
    ) -> Self {
        Self {
            code,
            label: label.into(),
            position,
            color: color.into(),
        }
    }

    /// Returns a stable, collision-resistant identifier for this entity.
    ///
    /// Uses the natural catalog code when present and non-empty, otherwise
    /// derives a key from the coordinates (`"{lat},{lon}"`).
    pub fn stable_id(&self) -> String {
        match &self.code {
            Some(code) if !code.is_empty() => code.clone(),
            _ => self.position.to_string(),
        }
    }
}

/// Travel mode for isochrone computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TravelMode {
    Walking,
    Cycling,
    Driving,
    DrivingTraffic,
}

impl TravelMode {
    /// Canonical string form, used in cache parameter keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
            TravelMode::Cycling => "cycling",
            TravelMode::Driving => "driving",
            TravelMode::DrivingTraffic => "driving-traffic",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved isochrone for one entity.
///
/// Immutable once produced; appended to the session's accumulating result
/// set and to the corresponding cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochroneResult {
    /// Stable identifier of the entity this polygon belongs to
    pub entity_id: String,
    /// Outer ring of the travel-time polygon
    pub polygon: Polygon,
    /// Display color inherited from the entity
    pub color: String,
}
