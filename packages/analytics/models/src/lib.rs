#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types for proximity, ranking, and outcome statistics.
//!
//! These are the shapes handed to table writers and the JSON summary.
//! They carry counts for every exclusion so totals can be audited.

use safety_map_geography_models::GeoPoint;
use safety_map_safety_models::{Dataset, ProximityMetrics, RankMetric, SubjectRecord};
use safety_map_street::StreetName;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How far a statistical result can be trusted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SampleConfidence {
    /// Both groups met the minimum sample size.
    Normal,
    /// At least one group was below the minimum sample size.
    LowSample,
    /// A group was empty, or every value was identical. The result is a
    /// placeholder (`p = 1`).
    Degenerate,
}

/// Output of a two-sample Mann-Whitney U test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MannWhitneyResult {
    /// U statistic of the first sample.
    pub u: f64,
    /// Standardized statistic under the normal approximation.
    pub z: f64,
    /// Two-tailed p-value.
    pub p_value: f64,
    /// Size of the first sample.
    pub n_a: usize,
    /// Size of the second sample.
    pub n_b: usize,
    /// Reliability flag.
    pub confidence: SampleConfidence,
}

impl MannWhitneyResult {
    /// Whether the difference is significant at `alpha`.
    ///
    /// Degenerate results are never significant.
    #[must_use]
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.confidence != SampleConfidence::Degenerate && self.p_value < alpha
    }
}

/// Central tendency of one group of subjects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Number of subjects.
    pub n: usize,
    /// Arithmetic mean, absent for an empty group.
    pub mean: Option<f64>,
    /// Median, absent for an empty group.
    pub median: Option<f64>,
}

/// Denied versus approved comparison for one dataset and metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeComparison {
    /// Dataset compared, or `None` for all datasets combined.
    pub dataset: Option<Dataset>,
    /// Metric compared.
    pub metric: RankMetric,
    /// Denied subjects.
    pub denied: GroupSummary,
    /// Approved subjects.
    pub approved: GroupSummary,
    /// Test of denied against approved.
    pub test: MannWhitneyResult,
    /// Whether `test.p_value` is below the configured significance level.
    pub significant: bool,
}

impl OutcomeComparison {
    /// Table label for the dataset column.
    #[must_use]
    pub fn dataset_label(&self) -> &'static str {
        self.dataset.map_or("Combined", Dataset::label)
    }
}

/// One entry of a top-N ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedHotspot {
    /// 1-based position in the ranking.
    pub rank: usize,
    /// The subject at this location.
    pub subject: SubjectRecord,
    /// Its proximity totals.
    pub metrics: ProximityMetrics,
}

impl RankedHotspot {
    /// The subject's location. Ranked subjects always have one.
    #[must_use]
    pub const fn point(&self) -> Option<GeoPoint> {
        self.subject.point
    }
}

/// Crash totals along one street.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreetHotspot {
    /// 1-based position in the ranking.
    pub rank: usize,
    /// Normalized street name.
    pub street: StreetName,
    /// Crash, injury, and fatality totals on the street.
    pub totals: ProximityMetrics,
}

/// Counts from proximity aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityReport {
    /// Subjects annotated.
    pub subjects: usize,
    /// Subjects that received metrics.
    pub computed: usize,
    /// Subjects with no point, marked not computable.
    pub not_computable: usize,
    /// Crashes inside the time window.
    pub incidents_in_window: usize,
    /// Crashes dropped by the time window before the distance pass.
    pub incidents_outside_window: usize,
}

/// Counts from the two de-duplication passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeReport {
    /// Subjects offered.
    pub input: usize,
    /// Subjects without metrics, which cannot be ranked.
    pub not_computable: usize,
    /// Subjects collapsed onto an identically named, stronger one.
    pub textual_duplicates: usize,
    /// Subjects within the radius of a stronger, accepted one.
    pub spatial_duplicates: usize,
    /// Subjects kept.
    pub retained: usize,
}

/// Share of resolved requests that were denied, within one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenialRate {
    /// Dataset the group belongs to.
    pub dataset: Dataset,
    /// Group label: a year, request type, or borough.
    pub group: String,
    /// Resolved requests in the group.
    pub total: usize,
    /// Denied requests in the group.
    pub denied: usize,
    /// `denied / total` as a percentage.
    pub denial_rate: f64,
}

/// Coarse category of a free-text speed reducer denial reason.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DenialReasonCategory {
    /// Measured speeds were below the threshold.
    LowSpeed,
    /// Too many driveways or curb cuts.
    Driveways,
    /// The block is too short.
    StreetTooShort,
    /// Existing stop controls.
    StopControls,
    /// The street is a bus route.
    BusRoute,
    /// A speed camera is nearby.
    NearSpeedCamera,
    /// Any other stated reason.
    Other,
    /// No reason recorded.
    NotSpecified,
}

impl DenialReasonCategory {
    /// Human-readable label for tables.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LowSpeed => "Speed < 30 mph",
            Self::Driveways => "Driveways",
            Self::StreetTooShort => "Street Too Short",
            Self::StopControls => "Stop Controls",
            Self::BusRoute => "Bus Route",
            Self::NearSpeedCamera => "Near Speed Camera",
            Self::Other => "Other",
            Self::NotSpecified => "Not Specified",
        }
    }
}

/// Number of denials in one reason category, optionally for one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenialReasonCount {
    /// Request year, or `None` for the whole window.
    pub year: Option<i32>,
    /// Reason category.
    pub category: DenialReasonCategory,
    /// Denials in the category.
    pub count: usize,
}

/// A location ranked by how often requests there were denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedLocation {
    /// 1-based position in the ranking.
    pub rank: usize,
    /// Title-cased intersection or street name.
    pub location: String,
    /// Denied requests at the location.
    pub denials: usize,
}

/// Denial patterns among the requests in the study area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DenialBreakdown {
    /// Rates per dataset and request year.
    pub by_year: Vec<DenialRate>,
    /// Rates per dataset and request type.
    pub by_request_type: Vec<DenialRate>,
    /// Signal study rates per borough.
    pub by_borough: Vec<DenialRate>,
    /// Speed reducer denial reasons over the whole window.
    pub reasons: Vec<DenialReasonCount>,
    /// Speed reducer denial reasons per request year.
    pub reasons_by_year: Vec<DenialReasonCount>,
    /// Intersections with the most denied signal studies.
    pub most_denied_intersections: Vec<DeniedLocation>,
    /// Streets with the most denied speed reducer segments.
    pub most_denied_streets: Vec<DeniedLocation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(p_value: f64, confidence: SampleConfidence) -> MannWhitneyResult {
        MannWhitneyResult {
            u: 9.0,
            z: -1.96,
            p_value,
            n_a: 3,
            n_b: 3,
            confidence,
        }
    }

    #[test]
    fn significance_respects_alpha() {
        assert!(result(0.049, SampleConfidence::LowSample).is_significant(0.05));
        assert!(!result(0.051, SampleConfidence::Normal).is_significant(0.05));
    }

    #[test]
    fn degenerate_is_never_significant() {
        assert!(!result(0.0, SampleConfidence::Degenerate).is_significant(0.05));
    }

    #[test]
    fn reason_category_has_code_and_label() {
        assert_eq!(DenialReasonCategory::LowSpeed.to_string(), "low_speed");
        assert_eq!(DenialReasonCategory::LowSpeed.label(), "Speed < 30 mph");
    }

    #[test]
    fn confidence_serializes_snake_case() {
        assert_eq!(SampleConfidence::LowSample.to_string(), "low_sample");
        assert_eq!(SampleConfidence::LowSample.as_ref(), "low_sample");
    }
}
