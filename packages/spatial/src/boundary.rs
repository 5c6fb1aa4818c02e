//! Boundary document loading.
//!
//! The target area usually arrives as one feature inside a city-wide
//! collection of districts. The selected feature is cached locally as a
//! single-feature collection; when the local file is absent it is
//! downloaded once and written by atomic replace.

use std::io::Write as _;
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, JsonValue};

use crate::{BoundaryError, BoundaryIndex};

/// Picks one feature out of a collection by a property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSelector {
    /// Property name (e.g., `"GEOCODE"`).
    pub property: String,
    /// Expected value, compared as text so `405` and `"405"` both match.
    pub value: String,
}

impl FeatureSelector {
    /// Whether the feature's property matches.
    #[must_use]
    pub fn matches(&self, feature: &Feature) -> bool {
        feature
            .property(&self.property)
            .is_some_and(|v| property_text(v) == self.value)
    }
}

fn property_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Extracts the boundary geometry from any `GeoJSON` document shape.
///
/// # Errors
///
/// Returns [`BoundaryError::Invalid`] if no matching feature with a
/// geometry exists.
pub fn select_geometry(
    geojson: GeoJson,
    selector: Option<&FeatureSelector>,
) -> Result<geojson::Geometry, BoundaryError> {
    match geojson {
        GeoJson::Geometry(geometry) => Ok(geometry),
        GeoJson::Feature(feature) => feature.geometry.ok_or_else(|| BoundaryError::Invalid {
            message: "feature has no geometry".to_string(),
        }),
        GeoJson::FeatureCollection(collection) => {
            select_feature(collection, selector)?
                .geometry
                .ok_or_else(|| BoundaryError::Invalid {
                    message: "selected feature has no geometry".to_string(),
                })
        }
    }
}

fn select_feature(
    collection: FeatureCollection,
    selector: Option<&FeatureSelector>,
) -> Result<Feature, BoundaryError> {
    let total = collection.features.len();
    let found = collection.features.into_iter().find(|f| {
        f.geometry.is_some() && selector.is_none_or(|s| s.matches(f))
    });

    found.ok_or_else(|| BoundaryError::Invalid {
        message: selector.map_or_else(
            || format!("none of {total} feature(s) has a geometry"),
            |s| format!("no feature among {total} has {} = {}", s.property, s.value),
        ),
    })
}

/// Loads the boundary from `path`, downloading it from `url` first if the
/// file does not exist.
///
/// The downloaded collection is reduced to the selected feature before it
/// is written, so later runs read only the target area.
///
/// # Errors
///
/// Returns [`BoundaryError`] if the file is missing and no URL is given, or
/// if downloading, parsing, or writing fails.
pub async fn load_or_fetch(
    path: &Path,
    url: Option<&str>,
    selector: Option<&FeatureSelector>,
) -> Result<BoundaryIndex, BoundaryError> {
    if path.exists() {
        log::info!("Loading boundary from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        return BoundaryIndex::from_geojson_str(&contents, selector);
    }

    let Some(url) = url else {
        return Err(BoundaryError::Invalid {
            message: format!("{} does not exist and no download URL is set", path.display()),
        });
    };

    log::info!("Boundary file missing, downloading from {url}");
    let body = reqwest::get(url).await?.error_for_status()?.text().await?;
    let contents = extract_feature_document(&body, selector)?;
    write_atomic(path, contents.as_bytes())?;
    log::info!("Saved boundary to {}", path.display());

    BoundaryIndex::from_geojson_str(&contents, None)
}

/// Reduces a downloaded document to a single-feature collection.
///
/// # Errors
///
/// Returns [`BoundaryError`] if the document does not parse or no feature
/// matches.
pub fn extract_feature_document(
    body: &str,
    selector: Option<&FeatureSelector>,
) -> Result<String, BoundaryError> {
    let geojson: GeoJson = body.parse()?;
    let feature = match geojson {
        GeoJson::FeatureCollection(collection) => select_feature(collection, selector)?,
        GeoJson::Feature(feature) => feature,
        GeoJson::Geometry(geometry) => Feature::from(geometry),
    };

    let collection = FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: None,
    };
    Ok(GeoJson::FeatureCollection(collection).to_string())
}

/// Writes a file by creating a sibling temp file and renaming it over the
/// destination, so an interrupted run never leaves a partial file.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or the write
/// or rename fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use safety_map_geography_models::GeoPoint;

    use super::*;

    const DISTRICTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"GEOCODE": 404},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-73.90, 40.74], [-73.85, 40.74], [-73.85, 40.76], [-73.90, 40.76], [-73.90, 40.74]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"GEOCODE": 405},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-73.93, 40.69], [-73.85, 40.69], [-73.85, 40.74], [-73.93, 40.74], [-73.93, 40.69]]]
                }
            }
        ]
    }"#;

    fn selector(value: &str) -> FeatureSelector {
        FeatureSelector {
            property: "GEOCODE".to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn selects_feature_by_numeric_property() {
        let index = BoundaryIndex::from_geojson_str(DISTRICTS, Some(&selector("405"))).unwrap();
        assert!(index.contains(GeoPoint::new(40.71, -73.89)));
        assert!(!index.contains(GeoPoint::new(40.75, -73.87)));
    }

    #[test]
    fn missing_feature_is_an_error() {
        let result = BoundaryIndex::from_geojson_str(DISTRICTS, Some(&selector("999")));
        assert!(matches!(result, Err(BoundaryError::Invalid { .. })));
    }

    #[test]
    fn extracted_document_holds_one_feature() {
        let doc = extract_feature_document(DISTRICTS, Some(&selector("405"))).unwrap();
        let GeoJson::FeatureCollection(collection) = doc.parse::<GeoJson>().unwrap() else {
            panic!("expected a feature collection");
        };
        assert_eq!(collection.features.len(), 1);
        assert!(selector("405").matches(&collection.features[0]));
    }

    #[test]
    fn atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("boundary.geojson");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[tokio::test]
    async fn loads_existing_file_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundary.geojson");
        std::fs::write(&path, DISTRICTS).unwrap();

        let index = load_or_fetch(&path, None, Some(&selector("405"))).await.unwrap();
        assert!(index.contains(GeoPoint::new(40.71, -73.89)));
    }

    #[tokio::test]
    async fn missing_file_without_url_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.geojson");
        assert!(load_or_fetch(&path, None, None).await.is_err());
    }
}
