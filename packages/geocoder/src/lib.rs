#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Offline intersection geocoding.
//!
//! Signal study requests name an intersection but usually carry no
//! coordinate. They are resolved without any external service, using
//! three tiers tried in order of confidence:
//!
//! 1. **Incident corpus**: median location of crashes reported at the
//!    same street pair.
//! 2. **Segment corpus**: median location of speed reducer segment
//!    endpoints at the same street pair.
//! 3. **Street lines**: crossing point of least-squares lines fitted
//!    through every known point on each of the two streets.
//!
//! Every candidate must fall inside the target boundary, or the next tier
//! is tried. Requests that no tier can place keep an absent point and are
//! reported as unmatched.

pub mod cache;
pub mod corpus;
pub mod lines;
pub mod progress;

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use safety_map_geography_models::GeoPoint;
use safety_map_safety_models::{GeocodeTier, SubjectRecord};
use safety_map_spatial::BoundaryIndex;
use safety_map_street::Intersection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::GeocodeCache;
use crate::corpus::PairCorpus;
use crate::lines::StreetLines;
use crate::progress::ProgressCallback;

/// Errors from reading or writing the geocode cache.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cache file is not valid CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A cache row parsed but is inconsistent.
    #[error("Invalid geocode cache: {message}")]
    InvalidCache {
        /// Description of the problem.
        message: String,
    },
}

/// Tuning for the street-line tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderSettings {
    /// Fewest reference points a street needs before a line is fitted.
    pub min_points_per_street: usize,
    /// Smallest crossing angle, in degrees, accepted between two lines.
    pub min_intersection_angle_deg: f64,
    /// Smallest standard deviation of longitudes, in degrees, for a fit.
    pub min_longitude_spread: f64,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            min_points_per_street: 2,
            min_intersection_angle_deg: 1.0,
            min_longitude_spread: 1e-8,
        }
    }
}

/// A resolved location and the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeocodeMatch {
    /// Resolved coordinate.
    pub point: GeoPoint,
    /// Which tier resolved it.
    pub tier: GeocodeTier,
}

/// Resolves intersections against the reference corpora.
///
/// Immutable once built, so it can be shared across `rayon` workers.
pub struct IntersectionGeocoder<'a> {
    incidents: PairCorpus,
    segments: PairCorpus,
    lines: StreetLines,
    boundary: &'a BoundaryIndex,
    settings: GeocoderSettings,
}

impl<'a> IntersectionGeocoder<'a> {
    /// Builds a geocoder, fitting street lines from both corpora.
    #[must_use]
    pub fn new(
        incidents: PairCorpus,
        segments: PairCorpus,
        boundary: &'a BoundaryIndex,
        settings: GeocoderSettings,
    ) -> Self {
        let lines = StreetLines::build(&[&incidents, &segments], &settings);
        Self {
            incidents,
            segments,
            lines,
            boundary,
            settings,
        }
    }

    /// Resolves one intersection, trying each tier in order.
    ///
    /// Returns `None` if the key is missing a street name or no tier
    /// yields a point inside the boundary.
    #[must_use]
    pub fn geocode(&self, key: &Intersection) -> Option<GeocodeMatch> {
        if !key.is_complete() {
            return None;
        }

        self.from_corpus(&self.incidents, key, GeocodeTier::IncidentCorpus)
            .or_else(|| self.from_corpus(&self.segments, key, GeocodeTier::SegmentCorpus))
            .or_else(|| self.from_street_lines(key))
    }

    fn from_corpus(
        &self,
        corpus: &PairCorpus,
        key: &Intersection,
        tier: GeocodeTier,
    ) -> Option<GeocodeMatch> {
        let found = corpus.lookup(key)?;
        if self.boundary.contains(found.point) {
            log::debug!("{key}: {tier} from {} point(s)", found.matches);
            Some(GeocodeMatch {
                point: found.point,
                tier,
            })
        } else {
            log::debug!("{key}: {tier} median lies outside the boundary");
            None
        }
    }

    fn from_street_lines(&self, key: &Intersection) -> Option<GeocodeMatch> {
        let first = self.lines.get(key.first())?;
        let second = self.lines.get(key.second())?;

        let Some(point) = first.intersect(second, self.settings.min_intersection_angle_deg) else {
            log::debug!("{key}: street lines are nearly parallel");
            return None;
        };

        if !self.boundary.bounding_box().contains(point) || !self.boundary.contains(point) {
            log::debug!("{key}: street lines cross outside the boundary");
            return None;
        }

        Some(GeocodeMatch {
            point,
            tier: GeocodeTier::StreetLine,
        })
    }

    /// Resolves many intersections, consulting `cache` first.
    ///
    /// Cache misses are resolved in parallel. Results are keyed by
    /// intersection, so scheduling order never shows in the output.
    #[must_use]
    pub fn geocode_batch(
        &self,
        keys: &BTreeSet<Intersection>,
        cache: &GeocodeCache,
        progress: &dyn ProgressCallback,
    ) -> BatchResult {
        let mut result = BatchResult::default();
        let mut pending = Vec::new();

        for key in keys {
            match cache.get(key) {
                Some(Some(found)) => {
                    result.cache_hits += 1;
                    result.resolved.insert(key.clone(), found);
                }
                Some(None) => {
                    result.cache_hits += 1;
                    result.unmatched.insert(key.clone());
                }
                None => pending.push(key),
            }
        }

        log::info!(
            "Geocoding {} intersection(s): {} cached, {} to resolve",
            keys.len(),
            result.cache_hits,
            pending.len()
        );

        progress.set_total(pending.len() as u64);
        progress.set_message("Geocoding intersections".to_string());

        let fresh: Vec<(&Intersection, Option<GeocodeMatch>)> = pending
            .par_iter()
            .map(|key| {
                let found = self.geocode(key);
                progress.inc(1);
                (*key, found)
            })
            .collect();

        for (key, found) in fresh {
            match found {
                Some(found) => {
                    result.resolved.insert(key.clone(), found);
                }
                None => {
                    result.unmatched.insert(key.clone());
                }
            }
        }

        progress.finish(format!(
            "Geocoded {} of {} intersection(s)",
            result.resolved.len(),
            keys.len()
        ));

        result
    }
}

/// Results of [`IntersectionGeocoder::geocode_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Intersections that were placed.
    pub resolved: BTreeMap<Intersection, GeocodeMatch>,
    /// Intersections no tier could place.
    pub unmatched: BTreeSet<Intersection>,
    /// How many keys were answered from the cache.
    pub cache_hits: usize,
}

/// Per-record counts from [`geocode_subjects`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeReport {
    /// Records that already had a coordinate.
    pub source: usize,
    /// Records placed from the incident corpus.
    pub incident_corpus: usize,
    /// Records placed from the segment corpus.
    pub segment_corpus: usize,
    /// Records placed by street-line intersection.
    pub street_line: usize,
    /// Records no tier could place.
    pub unmatched: usize,
    /// Records missing a street name, which cannot be geocoded.
    pub missing_street_names: usize,
    /// Distinct intersections answered from the cache.
    pub cache_hits: usize,
}

impl GeocodeReport {
    fn record(&mut self, tier: GeocodeTier) {
        match tier {
            GeocodeTier::Source => self.source += 1,
            GeocodeTier::IncidentCorpus => self.incident_corpus += 1,
            GeocodeTier::SegmentCorpus => self.segment_corpus += 1,
            GeocodeTier::StreetLine => self.street_line += 1,
        }
    }

    /// Records with a coordinate after geocoding.
    #[must_use]
    pub const fn located(&self) -> usize {
        self.source + self.incident_corpus + self.segment_corpus + self.street_line
    }
}

/// Subjects after geocoding, with the cache to persist for the next run.
#[derive(Debug, Clone)]
pub struct GeocodeOutcome {
    /// Every input subject, in input order, points filled where resolved.
    pub subjects: Vec<SubjectRecord>,
    /// Per-tier counts.
    pub report: GeocodeReport,
    /// Identifiers of subjects left without a point.
    pub unmatched: Vec<String>,
    /// The input cache merged with this run's results.
    pub cache: GeocodeCache,
}

/// Fills missing subject coordinates.
///
/// Subjects that already have a point are left alone. No subject is
/// dropped: unresolved ones keep an absent point and are listed in
/// [`GeocodeOutcome::unmatched`].
#[must_use]
pub fn geocode_subjects(
    subjects: Vec<SubjectRecord>,
    geocoder: &IntersectionGeocoder<'_>,
    cache: &GeocodeCache,
    progress: &dyn ProgressCallback,
) -> GeocodeOutcome {
    let keys: BTreeSet<Intersection> = subjects
        .iter()
        .filter(|s| s.point.is_none())
        .map(|s| s.location.geocode_key())
        .filter(Intersection::is_complete)
        .collect();

    let batch = geocoder.geocode_batch(&keys, cache, progress);

    let mut report = GeocodeReport {
        cache_hits: batch.cache_hits,
        ..GeocodeReport::default()
    };
    let mut unmatched = Vec::new();

    let subjects: Vec<SubjectRecord> = subjects
        .into_iter()
        .map(|subject| {
            if subject.point.is_some() {
                report.record(subject.geocode_tier.unwrap_or(GeocodeTier::Source));
                return subject;
            }

            let key = subject.location.geocode_key();
            if !key.is_complete() {
                report.missing_street_names += 1;
                unmatched.push(subject.id.clone());
                return subject;
            }

            if let Some(found) = batch.resolved.get(&key) {
                report.record(found.tier);
                subject.with_geocode(found.point, found.tier)
            } else {
                report.unmatched += 1;
                unmatched.push(subject.id.clone());
                subject
            }
        })
        .collect();

    log::info!(
        "Geocoded subjects: {} from source, {} incident corpus, {} segment corpus, \
         {} street line, {} unmatched, {} missing street names",
        report.source,
        report.incident_corpus,
        report.segment_corpus,
        report.street_line,
        report.unmatched,
        report.missing_street_names
    );

    GeocodeOutcome {
        subjects,
        report,
        unmatched,
        cache: cache.merged(&batch),
    }
}
