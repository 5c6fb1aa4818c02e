#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory boundary index for target-area membership.
//!
//! Loads the target administrative polygon once, builds an R-tree over its
//! parts, and answers point-in-polygon queries with a bounding-box
//! pre-check. The index is the only authority for "is this record inside
//! the area" once a record has coordinates.

pub mod boundary;

use geo::{BoundingRect, Contains, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use safety_map_geography_models::{BoundingBox, GeoPoint, Located};
use thiserror::Error;

/// Errors from loading a boundary.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// Reading or writing the local boundary file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Downloading the boundary collection failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The document was not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// The document parsed but did not contain a usable polygon.
    #[error("Invalid boundary: {message}")]
    Invalid {
        /// Description of what was missing.
        message: String,
    },
}

impl From<geojson::Error> for BoundaryError {
    fn from(e: geojson::Error) -> Self {
        Self::GeoJson(Box::new(e))
    }
}

/// One polygon part of the boundary stored in the R-tree.
struct BoundaryPart {
    envelope: AABB<[f64; 2]>,
    polygon: geo::Polygon<f64>,
}

impl RTreeObject for BoundaryPart {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Prepared representation of the target-area polygon.
///
/// Immutable after construction. A refreshed boundary is a new index.
pub struct BoundaryIndex {
    parts: RTree<BoundaryPart>,
    bbox: BoundingBox,
}

impl BoundaryIndex {
    /// Builds an index from a polygon or multipolygon in (lon, lat) order.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError::Invalid`] if the geometry has no area.
    pub fn new(multi_polygon: MultiPolygon<f64>) -> Result<Self, BoundaryError> {
        let rect = multi_polygon
            .bounding_rect()
            .ok_or_else(|| BoundaryError::Invalid {
                message: "boundary has no coordinates".to_string(),
            })?;

        let parts: Vec<BoundaryPart> = multi_polygon
            .into_iter()
            .filter_map(|polygon| {
                let r = polygon.bounding_rect()?;
                Some(BoundaryPart {
                    envelope: AABB::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]),
                    polygon,
                })
            })
            .collect();

        log::info!("Loaded boundary with {} polygon part(s)", parts.len());

        Ok(Self {
            parts: RTree::bulk_load(parts),
            bbox: BoundingBox {
                min_latitude: rect.min().y,
                min_longitude: rect.min().x,
                max_latitude: rect.max().y,
                max_longitude: rect.max().x,
            },
        })
    }

    /// Builds an index from a ring of points, closing it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError::Invalid`] if fewer than three points are given.
    pub fn from_ring(ring: &[GeoPoint]) -> Result<Self, BoundaryError> {
        if ring.len() < 3 {
            return Err(BoundaryError::Invalid {
                message: format!("ring has {} point(s), need at least 3", ring.len()),
            });
        }
        let coords: Vec<(f64, f64)> = ring.iter().map(|p| (p.longitude, p.latitude)).collect();
        let polygon = geo::Polygon::new(geo::LineString::from(coords), vec![]);
        Self::new(MultiPolygon(vec![polygon]))
    }

    /// Parses a `GeoJSON` document and builds an index from it.
    ///
    /// Accepts a bare geometry, a feature, or a feature collection. For a
    /// collection, `selector` picks the feature; without one the first
    /// polygonal feature is used.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if parsing fails or no polygon is found.
    pub fn from_geojson_str(
        geojson_str: &str,
        selector: Option<&boundary::FeatureSelector>,
    ) -> Result<Self, BoundaryError> {
        let geojson: GeoJson = geojson_str.parse()?;
        let geometry = boundary::select_geometry(geojson, selector)?;
        let multi_polygon = to_multipolygon(geometry)?;
        Self::new(multi_polygon)
    }

    /// Whether the point lies strictly inside the boundary.
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        if !self.bbox.contains(point) {
            return false;
        }
        let geo_point = geo::Point::new(point.longitude, point.latitude);
        let query_env = AABB::from_point([point.longitude, point.latitude]);

        self.parts
            .locate_in_envelope_intersecting(&query_env)
            .any(|part| part.polygon.contains(&geo_point))
    }

    /// The boundary's bounding box.
    #[must_use]
    pub const fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Result<MultiPolygon<f64>, BoundaryError> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        _ => Err(BoundaryError::Invalid {
            message: "boundary geometry is not a Polygon or MultiPolygon".to_string(),
        }),
    }
}

/// Records split by boundary membership.
#[derive(Debug, Clone)]
pub struct BoundaryFilterResult<T> {
    /// Records with a location inside the boundary.
    pub retained: Vec<T>,
    /// Records with a location outside the boundary.
    pub outside: Vec<T>,
    /// Records with no location at all. Never counted as inside.
    pub missing_geometry: Vec<T>,
}

impl<T> BoundaryFilterResult<T> {
    /// Counts for audit output.
    #[must_use]
    pub fn report(&self) -> FilterReport {
        FilterReport {
            retained: self.retained.len(),
            outside: self.outside.len(),
            missing_geometry: self.missing_geometry.len(),
        }
    }
}

/// Counts produced by [`filter_in_boundary`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterReport {
    /// Records kept.
    pub retained: usize,
    /// Records excluded for lying outside the boundary.
    pub outside: usize,
    /// Records excluded for having no coordinate.
    pub missing_geometry: usize,
}

/// Splits records by boundary membership.
///
/// Only records whose location is present and inside the boundary are
/// retained. Records without a location are returned separately and never
/// mixed into the retained set.
#[must_use]
pub fn filter_in_boundary<T: Located>(
    records: Vec<T>,
    index: &BoundaryIndex,
) -> BoundaryFilterResult<T> {
    let mut result = BoundaryFilterResult {
        retained: Vec::with_capacity(records.len()),
        outside: Vec::new(),
        missing_geometry: Vec::new(),
    };

    for record in records {
        match record.location() {
            Some(point) if index.contains(point) => result.retained.push(record),
            Some(_) => result.outside.push(record),
            None => result.missing_geometry.push(record),
        }
    }

    let report = result.report();
    log::info!(
        "Boundary filter: {} retained, {} outside, {} without coordinates",
        report.retained,
        report.outside,
        report.missing_geometry
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A rough square around Ridgewood/Maspeth, Queens.
    pub(crate) fn square() -> BoundaryIndex {
        BoundaryIndex::from_ring(&[
            GeoPoint::new(40.69, -73.93),
            GeoPoint::new(40.69, -73.85),
            GeoPoint::new(40.74, -73.85),
            GeoPoint::new(40.74, -73.93),
        ])
        .unwrap()
    }

    #[test]
    fn contains_interior_point() {
        let index = square();
        assert!(index.contains(GeoPoint::new(40.71, -73.89)));
        assert!(!index.contains(GeoPoint::new(40.80, -73.89)));
        assert!(!index.contains(GeoPoint::new(40.71, -73.80)));
    }

    #[test]
    fn concave_polygon_excludes_notch() {
        // An L-shape: the north-east quadrant is cut away.
        let index = BoundaryIndex::from_ring(&[
            GeoPoint::new(40.0, -74.0),
            GeoPoint::new(40.0, -73.0),
            GeoPoint::new(40.5, -73.0),
            GeoPoint::new(40.5, -73.5),
            GeoPoint::new(41.0, -73.5),
            GeoPoint::new(41.0, -74.0),
        ])
        .unwrap();
        assert!(index.contains(GeoPoint::new(40.25, -73.25)));
        assert!(index.contains(GeoPoint::new(40.75, -73.75)));
        // Inside the bounding box but in the notch.
        assert!(!index.contains(GeoPoint::new(40.75, -73.25)));
    }

    #[test]
    fn rejects_degenerate_ring() {
        assert!(BoundaryIndex::from_ring(&[GeoPoint::new(40.0, -74.0)]).is_err());
    }

    #[test]
    fn filter_never_retains_missing_geometry() {
        let index = square();
        let records = vec![
            Some(GeoPoint::new(40.71, -73.89)),
            None,
            Some(GeoPoint::new(40.80, -73.89)),
            None,
            Some(GeoPoint::new(40.72, -73.90)),
        ];

        struct Row(Option<GeoPoint>);
        impl Located for Row {
            fn location(&self) -> Option<GeoPoint> {
                self.0
            }
        }

        let result = filter_in_boundary(records.into_iter().map(Row).collect(), &index);
        assert!(result.retained.iter().all(|r| r.0.is_some()));
        assert_eq!(
            result.report(),
            FilterReport {
                retained: 2,
                outside: 1,
                missing_geometry: 2,
            }
        );
    }

    #[test]
    fn parses_feature_collection_polygon() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"GEOCODE": 405},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-73.93, 40.69], [-73.85, 40.69], [-73.85, 40.74], [-73.93, 40.74], [-73.93, 40.69]]]
                }
            }]
        }"#;
        let index = BoundaryIndex::from_geojson_str(doc, None).unwrap();
        assert!(index.contains(GeoPoint::new(40.71, -73.89)));
        let bbox = index.bounding_box();
        assert!((bbox.min_latitude - 40.69).abs() < 1e-12);
        assert!((bbox.max_longitude - -73.85).abs() < 1e-12);
    }

    #[test]
    fn rejects_point_geometry() {
        let doc = r#"{"type": "Point", "coordinates": [-73.9, 40.7]}"#;
        assert!(matches!(
            BoundaryIndex::from_geojson_str(doc, None),
            Err(BoundaryError::Invalid { .. })
        ));
    }
}
