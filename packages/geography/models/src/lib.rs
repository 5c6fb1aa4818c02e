#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic coordinate types.
//!
//! Coordinates are WGS84 decimal degrees. A record that has not been
//! located carries `Option<GeoPoint>::None`; nothing in the workspace
//! substitutes `(0, 0)` for a missing location.

use serde::{Deserialize, Serialize};

/// A WGS84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point from latitude and longitude.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Builds a point from optional parsed fields.
    ///
    /// Returns `None` if either value is missing, non-finite, out of
    /// range, or exactly zero (open-data feeds use `0` as a "no location"
    /// sentinel).
    #[must_use]
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        let latitude = latitude?;
        let longitude = longitude?;
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if latitude == 0.0 || longitude == 0.0 {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self::new(latitude, longitude))
    }

    /// Coordinate-wise median of a set of points.
    ///
    /// Each axis is sorted independently, so a single mis-tagged point
    /// cannot drag the result the way a mean would. Returns `None` for an
    /// empty input.
    #[must_use]
    pub fn coordinate_median(points: &[Self]) -> Option<Self> {
        let mut lats: Vec<f64> = points.iter().map(|p| p.latitude).collect();
        let mut lons: Vec<f64> = points.iter().map(|p| p.longitude).collect();
        Some(Self::new(median_in_place(&mut lats)?, median_in_place(&mut lons)?))
    }
}

fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(f64::midpoint(values[mid - 1], values[mid]))
    } else {
        Some(values[mid])
    }
}

/// An axis-aligned latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge.
    pub min_latitude: f64,
    /// Western edge.
    pub min_longitude: f64,
    /// Northern edge.
    pub max_latitude: f64,
    /// Eastern edge.
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Whether the point lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&point.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&point.longitude)
    }

    /// Smallest box covering every point, or `None` for an empty input.
    #[must_use]
    pub fn covering(points: impl IntoIterator<Item = GeoPoint>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Self>, p| {
            Some(acc.map_or(
                Self {
                    min_latitude: p.latitude,
                    min_longitude: p.longitude,
                    max_latitude: p.latitude,
                    max_longitude: p.longitude,
                },
                |b| Self {
                    min_latitude: b.min_latitude.min(p.latitude),
                    min_longitude: b.min_longitude.min(p.longitude),
                    max_latitude: b.max_latitude.max(p.latitude),
                    max_longitude: b.max_longitude.max(p.longitude),
                },
            ))
        })
    }
}

/// Anything that may carry a location.
///
/// Implemented by every record type that flows through the boundary
/// filter, proximity aggregation and deduplication.
pub trait Located {
    /// The record's location, if known.
    fn location(&self) -> Option<GeoPoint>;
}

impl Located for GeoPoint {
    fn location(&self) -> Option<GeoPoint> {
        Some(*self)
    }
}
