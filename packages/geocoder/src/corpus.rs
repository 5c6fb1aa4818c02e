//! Reference corpora of already-located street pairs.
//!
//! Crashes record both the street they happened on and the cross street,
//! and speed reducer rows record a coordinate for their segment endpoints.
//! Grouping those points by [`Intersection`] gives the geocoder a lookup
//! table for requests that arrive with street names only.

use std::collections::BTreeMap;

use safety_map_geography_models::GeoPoint;
use safety_map_safety_models::{IncidentRecord, SegmentEndpoint};
use safety_map_street::Intersection;

/// The result of a corpus lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusMatch {
    /// Coordinate-wise median of every matching point.
    pub point: GeoPoint,
    /// How many points matched.
    pub matches: usize,
}

/// Located points grouped by unordered street pair.
///
/// Keys are [`Intersection`]s, so lookups match both street orders.
#[derive(Debug, Clone, Default)]
pub struct PairCorpus {
    points: BTreeMap<Intersection, Vec<GeoPoint>>,
}

impl PairCorpus {
    /// Groups crash coordinates by their on/off street pair.
    ///
    /// Crashes missing either street name are skipped.
    #[must_use]
    pub fn from_incidents(incidents: &[IncidentRecord]) -> Self {
        let mut corpus = Self::default();
        for incident in incidents {
            if let Some(key) = incident.intersection() {
                corpus.insert(key, incident.point);
            }
        }
        log::info!(
            "Incident corpus: {} street pair(s) from {} crash(es)",
            corpus.len(),
            incidents.len()
        );
        corpus
    }

    /// Groups segment endpoint coordinates by their on/cross street pair.
    #[must_use]
    pub fn from_segment_endpoints(endpoints: &[SegmentEndpoint]) -> Self {
        let mut corpus = Self::default();
        for endpoint in endpoints {
            if let Some(key) = endpoint.intersection() {
                corpus.insert(key, endpoint.point);
            }
        }
        log::info!(
            "Segment corpus: {} street pair(s) from {} endpoint(s)",
            corpus.len(),
            endpoints.len()
        );
        corpus
    }

    /// Adds one located observation of a street pair.
    ///
    /// Incomplete keys are ignored since they can never be looked up.
    pub fn insert(&mut self, key: Intersection, point: GeoPoint) {
        if key.is_complete() {
            self.points.entry(key).or_default().push(point);
        }
    }

    /// Median location of a street pair, if it was observed.
    #[must_use]
    pub fn lookup(&self, key: &Intersection) -> Option<CorpusMatch> {
        let points = self.points.get(key)?;
        Some(CorpusMatch {
            point: GeoPoint::coordinate_median(points)?,
            matches: points.len(),
        })
    }

    /// One median point per observed street pair.
    pub fn medians(&self) -> impl Iterator<Item = (&Intersection, GeoPoint)> + '_ {
        self.points
            .iter()
            .filter_map(|(key, points)| Some((key, GeoPoint::coordinate_median(points)?)))
    }

    /// Number of distinct street pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no street pair was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use safety_map_safety_models::InjuryCounts;
    use safety_map_street::{normalize, normalize_intersection};

    use super::*;

    fn crash(on: &str, off: &str, lat: f64, lon: f64) -> IncidentRecord {
        IncidentRecord {
            id: format!("{on}/{off}/{lat}"),
            occurred_on: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            point: GeoPoint::new(lat, lon),
            on_street: normalize(on),
            off_street: normalize(off),
            injuries: InjuryCounts::default(),
        }
    }

    #[test]
    fn lookup_matches_either_street_order() {
        let corpus = PairCorpus::from_incidents(&[
            crash("FRESH POND RD", "METROPOLITAN AVE", 40.7130, -73.8975),
            crash("METROPOLITAN AVENUE", "fresh pond road", 40.7132, -73.8977),
        ]);
        let found = corpus
            .lookup(&normalize_intersection("Metropolitan Ave", "Fresh Pond Rd"))
            .unwrap();
        assert_eq!(found.matches, 2);
        assert!((found.point.latitude - 40.7131).abs() < 1e-9);
    }

    #[test]
    fn median_ignores_mis_tagged_outlier() {
        let corpus = PairCorpus::from_incidents(&[
            crash("GRAND AVE", "69 ST", 40.7230, -73.8930),
            crash("GRAND AVE", "69 ST", 40.7232, -73.8932),
            crash("GRAND AVE", "69 ST", 40.7231, -73.8931),
            crash("GRAND AVE", "69 ST", 40.7229, -73.8929),
            crash("GRAND AVE", "69 ST", 40.8500, -73.7000),
        ]);
        let found = corpus.lookup(&normalize_intersection("69 ST", "GRAND AVE")).unwrap();

        assert!((found.point.latitude - 40.7231).abs() < 1e-9);
        assert!((found.point.longitude - -73.8930).abs() < 1e-9);

        let mean_lat = (40.7230 + 40.7232 + 40.7231 + 40.7229 + 40.8500) / 5.0;
        assert!(
            (found.point.latitude - mean_lat).abs() > 0.01,
            "median should not be pulled toward the outlier"
        );
    }

    #[test]
    fn skips_crashes_without_cross_street() {
        let corpus = PairCorpus::from_incidents(&[crash("GRAND AVE", "", 40.72, -73.89)]);
        assert!(corpus.is_empty());
    }

    #[test]
    fn segment_endpoints_match_on_and_cross_street() {
        let endpoint = |cross: &str, lat: f64| SegmentEndpoint {
            on_street: normalize("70 ST"),
            cross_street: normalize(cross),
            point: GeoPoint::new(lat, -73.89),
        };
        let corpus =
            PairCorpus::from_segment_endpoints(&[endpoint("GRAND AVE", 40.72), endpoint("CALDWELL AVE", 40.73)]);
        assert_eq!(corpus.len(), 2);
        assert!(corpus.lookup(&normalize_intersection("CALDWELL AVENUE", "70 STREET")).is_some());
        assert!(corpus.lookup(&normalize_intersection("GRAND AVE", "CALDWELL AVE")).is_none());
    }
}
