//! Geocode results persisted between runs.
//!
//! The cache is a CSV keyed on the normalized street pair. Both resolved
//! and unresolved lookups are stored, so an unchanged intersection is not
//! re-resolved on the next run. A cache is never edited in place: merging
//! new results produces a new cache, and saving replaces the file
//! atomically.

use std::collections::BTreeMap;
use std::path::Path;

use safety_map_geography_models::GeoPoint;
use safety_map_safety_models::GeocodeTier;
use safety_map_spatial::BoundaryIndex;
use safety_map_spatial::boundary::write_atomic;
use safety_map_street::{Intersection, normalize_intersection};
use serde::{Deserialize, Serialize};

use crate::{BatchResult, GeocodeError, GeocodeMatch};

/// One row of the cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    street_a: String,
    street_b: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    tier: Option<GeocodeTier>,
}

/// Previously resolved intersections.
///
/// `None` entries record intersections that every tier failed on.
#[derive(Debug, Clone, Default)]
pub struct GeocodeCache {
    entries: BTreeMap<Intersection, Option<GeocodeMatch>>,
}

impl GeocodeCache {
    /// An empty cache. Used when the cache is explicitly invalidated.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the cache file, returning an empty cache if it does not exist.
    ///
    /// Cached points that fall outside `boundary` are dropped, so a cache
    /// written against an older boundary is re-resolved rather than
    /// trusted.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path, boundary: &BoundaryIndex) -> Result<Self, GeocodeError> {
        if !path.exists() {
            log::info!("No geocode cache at {}", path.display());
            return Ok(Self::empty());
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut entries = BTreeMap::new();
        let mut stale = 0usize;
        let mut incomplete = 0usize;

        for row in reader.deserialize::<CacheRow>() {
            let row = row?;
            let key = normalize_intersection(&row.street_a, &row.street_b);
            if !key.is_complete() {
                incomplete += 1;
                continue;
            }

            let value = match (row.latitude, row.longitude, row.tier) {
                (Some(lat), Some(lon), Some(tier)) => {
                    let Some(point) = GeoPoint::from_parts(Some(lat), Some(lon)) else {
                        stale += 1;
                        continue;
                    };
                    if !boundary.contains(point) {
                        stale += 1;
                        continue;
                    }
                    Some(GeocodeMatch { point, tier })
                }
                (None, None, _) => None,
                _ => {
                    return Err(GeocodeError::InvalidCache {
                        message: format!("partial coordinate for {key}"),
                    });
                }
            };
            entries.insert(key, value);
        }

        let cache = Self { entries };
        log::info!(
            "Loaded geocode cache: {} entr(ies), {} located",
            cache.len(),
            cache.located()
        );
        if stale > 0 {
            log::info!("Discarded {stale} cached point(s) outside the boundary");
        }
        if incomplete > 0 {
            log::warn!("Skipped {incomplete} cache row(s) with a blank street name");
        }

        Ok(cache)
    }

    /// The cached result for an intersection.
    ///
    /// The outer `Option` is whether the intersection was looked up
    /// before; the inner one is whether that lookup succeeded.
    #[must_use]
    pub fn get(&self, key: &Intersection) -> Option<Option<GeocodeMatch>> {
        self.entries.get(key).copied()
    }

    /// Number of cached intersections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of cached intersections that have a point.
    #[must_use]
    pub fn located(&self) -> usize {
        self.entries.values().filter(|v| v.is_some()).count()
    }

    /// A new cache holding these entries plus the batch's fresh results.
    #[must_use]
    pub fn merged(&self, batch: &BatchResult) -> Self {
        let mut entries = self.entries.clone();
        for (key, found) in &batch.resolved {
            entries.insert(key.clone(), Some(*found));
        }
        for key in &batch.unmatched {
            entries.insert(key.clone(), None);
        }
        Self { entries }
    }

    /// Writes the cache to `path` by atomic replace.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), GeocodeError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for (key, value) in &self.entries {
            writer.serialize(CacheRow {
                street_a: key.first().to_string(),
                street_b: key.second().to_string(),
                latitude: value.map(|m| m.point.latitude),
                longitude: value.map(|m| m.point.longitude),
                tier: value.map(|m| m.tier),
            })?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        write_atomic(path, &bytes)?;

        log::info!(
            "Saved geocode cache ({} entr(ies)) to {}",
            self.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    fn square() -> BoundaryIndex {
        BoundaryIndex::from_ring(&[
            GeoPoint::new(40.69, -73.93),
            GeoPoint::new(40.69, -73.85),
            GeoPoint::new(40.74, -73.85),
            GeoPoint::new(40.74, -73.93),
        ])
        .unwrap()
    }

    fn batch() -> BatchResult {
        let mut resolved = BTreeMap::new();
        resolved.insert(
            normalize_intersection("GRAND AVE", "69 ST"),
            GeocodeMatch {
                point: GeoPoint::new(40.7231, -73.8931),
                tier: GeocodeTier::IncidentCorpus,
            },
        );
        let mut unmatched = BTreeSet::new();
        unmatched.insert(normalize_intersection("NOWHERE PL", "ELSEWHERE ST"));
        BatchResult {
            resolved,
            unmatched,
            cache_hits: 0,
        }
    }

    #[test]
    fn save_then_load_keeps_hits_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geocode_cache.csv");

        let cache = GeocodeCache::empty().merged(&batch());
        cache.save(&path).unwrap();

        let loaded = GeocodeCache::load(&path, &square()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.located(), 1);

        let hit = loaded
            .get(&normalize_intersection("69 STREET", "GRAND AVENUE"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.tier, GeocodeTier::IncidentCorpus);
        assert!((hit.point.latitude - 40.7231).abs() < 1e-12);

        assert_eq!(
            loaded.get(&normalize_intersection("ELSEWHERE ST", "NOWHERE PL")),
            Some(None)
        );
        assert_eq!(loaded.get(&normalize_intersection("A ST", "B ST")), None);
    }

    #[test]
    fn drops_cached_points_outside_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geocode_cache.csv");
        std::fs::write(
            &path,
            "street_a,street_b,latitude,longitude,tier\n\
             69 STREET,GRAND AVENUE,40.7231,-73.8931,incident_corpus\n\
             BROADWAY,WALL STREET,40.7069,-74.0113,street_line\n",
        )
        .unwrap();

        let loaded = GeocodeCache::load(&path, &square()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&normalize_intersection("BROADWAY", "WALL ST")), None);
    }

    #[test]
    fn missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = GeocodeCache::load(&dir.path().join("absent.csv"), &square()).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn merge_leaves_original_untouched() {
        let original = GeocodeCache::empty();
        let merged = original.merged(&batch());
        assert!(original.is_empty());
        assert_eq!(merged.len(), 2);
    }
}
