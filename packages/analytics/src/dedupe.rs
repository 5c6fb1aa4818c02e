//! Collapsing subjects that describe the same place, for top-N views.
//!
//! Two passes run in order. The textual pass keeps the strongest record
//! for each location key, which catches one intersection filed under both
//! street orders. The spatial pass then walks subjects strongest first
//! and accepts each one only if it lies farther than the radius from
//! everything already accepted, which catches differently named but
//! adjacent locations. The spatial pass is greedy and makes no attempt at
//! an optimal cover.
//!
//! Statistics always run on the full set; only rankings are
//! de-duplicated.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use safety_map_analytics_models::{DedupeReport, RankedHotspot};
use safety_map_safety_models::{AnnotatedSubject, ProximityMetrics, RankMetric};
use serde::{Deserialize, Serialize};

use crate::AnalyticsError;
use crate::proximity::{great_circle_distance, validate_radius};

/// Ranking and de-duplication settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeSettings {
    /// Minimum separation between ranked subjects, in meters. Falls back
    /// to the proximity radius when unset, so hotspots never overlap.
    pub radius_m: Option<f64>,
    /// Number of hotspots kept.
    pub top_n: usize,
    /// Metric subjects are ranked by.
    pub rank_metric: RankMetric,
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self {
            radius_m: None,
            top_n: 25,
            rank_metric: RankMetric::Incidents,
        }
    }
}

impl DedupeSettings {
    /// The separation radius, defaulting to `proximity_radius_m`.
    #[must_use]
    pub fn effective_radius(&self, proximity_radius_m: f64) -> f64 {
        self.radius_m.unwrap_or(proximity_radius_m)
    }

    /// Checks an explicit radius is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameter`] if the radius is set
    /// and not a finite, positive number.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        self.radius_m
            .map_or(Ok(()), |r| validate_radius("dedupe.radius_m", r))
    }
}

/// A subject that can be ranked: it has a point and metrics.
struct Candidate<'a> {
    subject: &'a AnnotatedSubject,
    metrics: ProximityMetrics,
}

/// Strongest first; ties broken by identifier so the order is stable
/// regardless of input order.
fn by_strength(metric: RankMetric) -> impl Fn(&Candidate<'_>, &Candidate<'_>) -> Ordering {
    move |a: &Candidate<'_>, b: &Candidate<'_>| {
        b.metrics
            .get(metric)
            .cmp(&a.metrics.get(metric))
            .then_with(|| a.subject.subject.id.cmp(&b.subject.subject.id))
    }
}

/// Ranks subjects by `metric` and removes textual and spatial
/// duplicates.
///
/// Subjects without a point are not rankable and are only counted. The
/// output is a subset of the input in which no two subjects lie within
/// `radius_m` of each other.
#[must_use]
pub fn dedupe(
    subjects: &[AnnotatedSubject],
    radius_m: f64,
    metric: RankMetric,
) -> (Vec<AnnotatedSubject>, DedupeReport) {
    let mut report = DedupeReport {
        input: subjects.len(),
        ..DedupeReport::default()
    };

    let mut candidates: Vec<Candidate<'_>> = subjects
        .iter()
        .filter_map(|subject| {
            let metrics = subject.proximity.metrics().copied();
            match (subject.subject.point, metrics) {
                (Some(_), Some(metrics)) => Some(Candidate { subject, metrics }),
                _ => None,
            }
        })
        .collect();
    report.not_computable = subjects.len() - candidates.len();
    candidates.sort_by(by_strength(metric));

    let mut by_name: BTreeMap<String, Candidate<'_>> = BTreeMap::new();
    for candidate in candidates {
        let key = candidate.subject.subject.location.dedupe_key();
        if by_name.contains_key(&key) {
            report.textual_duplicates += 1;
        } else {
            by_name.insert(key, candidate);
        }
    }

    let mut distinct: Vec<Candidate<'_>> = by_name.into_values().collect();
    distinct.sort_by(by_strength(metric));

    let mut accepted: Vec<&AnnotatedSubject> = Vec::new();
    for candidate in distinct {
        let Some(point) = candidate.subject.subject.point else {
            continue;
        };
        let clear = accepted.iter().all(|kept| {
            kept.subject
                .point
                .is_some_and(|other| great_circle_distance(point, other) > radius_m)
        });
        if clear {
            accepted.push(candidate.subject);
        } else {
            report.spatial_duplicates += 1;
        }
    }

    report.retained = accepted.len();
    log::info!(
        "Dedupe ({radius_m} m, by {metric}): {} in, {} without metrics, {} textual and {} spatial duplicate(s), {} kept",
        report.input,
        report.not_computable,
        report.textual_duplicates,
        report.spatial_duplicates,
        report.retained
    );

    (accepted.into_iter().cloned().collect(), report)
}

/// The top `top_n` distinct subjects, numbered from 1.
#[must_use]
pub fn rank_hotspots(
    subjects: &[AnnotatedSubject],
    radius_m: f64,
    metric: RankMetric,
    top_n: usize,
) -> (Vec<RankedHotspot>, DedupeReport) {
    let (distinct, report) = dedupe(subjects, radius_m, metric);
    let ranked = distinct
        .into_iter()
        .take(top_n)
        .enumerate()
        .filter_map(|(i, annotated)| {
            let metrics = *annotated.proximity.metrics()?;
            Some(RankedHotspot {
                rank: i + 1,
                subject: annotated.subject,
                metrics,
            })
        })
        .collect();
    (ranked, report)
}
