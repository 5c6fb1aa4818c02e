//! Result tables and the run summary.
//!
//! Every table is a flat CSV with one header row. Numbers are written
//! unrounded; missing values are empty cells.

use std::path::Path;

use safety_map_analytics_models::{
    DedupeReport, DenialBreakdown, DenialRate, DenialReasonCount, DeniedLocation,
    OutcomeComparison, ProximityReport, RankedHotspot, StreetHotspot,
};
use safety_map_config::AnalysisConfig;
use safety_map_geocoder::GeocodeReport;
use safety_map_ingest::IngestReport;
use safety_map_safety_models::{AnnotatedSubject, Proximity, SubjectRecord};
use safety_map_spatial::FilterReport;
use serde::Serialize;

/// Per-location proximity table.
pub const LOCATIONS_TABLE: &str = "table_09_proximity_by_location.csv";
/// Denied versus approved comparison table.
pub const COMPARISON_TABLE: &str = "table_09b_outcome_comparison.csv";
/// Top denied hotspots table.
pub const HOTSPOTS_TABLE: &str = "table_09c_top_denied_hotspots.csv";
/// Crash totals by street table.
pub const STREETS_TABLE: &str = "table_08_street_hotspots.csv";
/// Signal study denial rates by borough.
pub const BOROUGH_RATES_TABLE: &str = "table_02_denial_rates_by_borough.csv";
/// Denial rates by request year.
pub const YEAR_RATES_TABLE: &str = "table_03_denial_rates_by_year.csv";
/// Denial rates by request type.
pub const TYPE_RATES_TABLE: &str = "table_04_denial_rates_by_type.csv";
/// Speed reducer denial reasons.
pub const REASONS_TABLE: &str = "table_05b_srts_denial_reasons.csv";
/// Speed reducer denial reasons by year.
pub const REASONS_BY_YEAR_TABLE: &str = "table_05c_denial_reasons_by_year.csv";
/// Most denied intersections.
pub const DENIED_INTERSECTIONS_TABLE: &str = "table_06_most_denied_intersections.csv";
/// Most denied streets.
pub const DENIED_STREETS_TABLE: &str = "table_07_most_denied_streets.csv";
/// Run summary.
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Serialize)]
struct LocationRow<'a> {
    id: &'a str,
    dataset: &'static str,
    request_type: &'a str,
    location: String,
    outcome: &'a str,
    requested_on: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    geocode_tier: Option<&'a str>,
    proximity: &'static str,
    incidents: Option<u32>,
    injuries: Option<u32>,
    pedestrian_injuries: Option<u32>,
    fatalities: Option<u32>,
}

impl<'a> LocationRow<'a> {
    fn new(annotated: &'a AnnotatedSubject) -> Self {
        let subject = &annotated.subject;
        let metrics = annotated.proximity.metrics();
        Self {
            id: &subject.id,
            dataset: subject.dataset.label(),
            request_type: &subject.request_type,
            location: subject.location.display_name(),
            outcome: subject.outcome.as_ref(),
            requested_on: subject.requested_on.map(|d| d.to_string()),
            latitude: subject.point.map(|p| p.latitude),
            longitude: subject.point.map(|p| p.longitude),
            geocode_tier: subject.geocode_tier.as_ref().map(AsRef::as_ref),
            proximity: match annotated.proximity {
                Proximity::Computed(_) => "computed",
                Proximity::NotComputable => "not_computable",
            },
            incidents: metrics.map(|m| m.incidents),
            injuries: metrics.map(|m| m.injuries),
            pedestrian_injuries: metrics.map(|m| m.pedestrian_injuries),
            fatalities: metrics.map(|m| m.fatalities),
        }
    }
}

#[derive(Serialize)]
struct ComparisonRow<'a> {
    dataset: &'static str,
    metric: &'a str,
    denied_n: usize,
    denied_mean: Option<f64>,
    denied_median: Option<f64>,
    approved_n: usize,
    approved_mean: Option<f64>,
    approved_median: Option<f64>,
    u: f64,
    z: f64,
    p_value: f64,
    confidence: &'a str,
    significant: bool,
}

#[derive(Serialize)]
struct HotspotRow<'a> {
    rank: usize,
    id: &'a str,
    dataset: &'static str,
    location: String,
    request_type: &'a str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    incidents: u32,
    injuries: u32,
    pedestrian_injuries: u32,
    fatalities: u32,
}

#[derive(Serialize)]
struct StreetRow {
    rank: usize,
    street: String,
    crashes: u32,
    injuries: u32,
    pedestrian_injuries: u32,
    fatalities: u32,
}

#[derive(Serialize)]
struct RateRow<'a> {
    dataset: &'static str,
    group: &'a str,
    total: usize,
    denied: usize,
    denial_rate: f64,
}

#[derive(Serialize)]
struct ReasonRow {
    year: Option<i32>,
    category: &'static str,
    count: usize,
}

fn write_rows<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    log::info!("Wrote {count} row(s) to {}", path.display());
    Ok(count)
}

/// Writes the per-location proximity table.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_locations(
    path: &Path,
    subjects: &[AnnotatedSubject],
) -> Result<usize, Box<dyn std::error::Error>> {
    write_rows(path, subjects.iter().map(LocationRow::new))
}

/// Writes the denied versus approved comparison table.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_comparisons(
    path: &Path,
    comparisons: &[OutcomeComparison],
) -> Result<usize, Box<dyn std::error::Error>> {
    write_rows(
        path,
        comparisons.iter().map(|c| ComparisonRow {
            dataset: c.dataset_label(),
            metric: c.metric.as_ref(),
            denied_n: c.denied.n,
            denied_mean: c.denied.mean,
            denied_median: c.denied.median,
            approved_n: c.approved.n,
            approved_mean: c.approved.mean,
            approved_median: c.approved.median,
            u: c.test.u,
            z: c.test.z,
            p_value: c.test.p_value,
            confidence: c.test.confidence.as_ref(),
            significant: c.significant,
        }),
    )
}

fn hotspot_row(hotspot: &RankedHotspot) -> HotspotRow<'_> {
    let subject: &SubjectRecord = &hotspot.subject;
    HotspotRow {
        rank: hotspot.rank,
        id: &subject.id,
        dataset: subject.dataset.label(),
        location: subject.location.display_name(),
        request_type: &subject.request_type,
        latitude: subject.point.map(|p| p.latitude),
        longitude: subject.point.map(|p| p.longitude),
        incidents: hotspot.metrics.incidents,
        injuries: hotspot.metrics.injuries,
        pedestrian_injuries: hotspot.metrics.pedestrian_injuries,
        fatalities: hotspot.metrics.fatalities,
    }
}

/// Writes the ranked denied hotspots table.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_hotspots(
    path: &Path,
    hotspots: &[RankedHotspot],
) -> Result<usize, Box<dyn std::error::Error>> {
    write_rows(path, hotspots.iter().map(hotspot_row))
}

/// Writes the crash totals by street table.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_street_hotspots(
    path: &Path,
    streets: &[StreetHotspot],
) -> Result<usize, Box<dyn std::error::Error>> {
    write_rows(
        path,
        streets.iter().map(|s| StreetRow {
            rank: s.rank,
            street: s.street.display_name(),
            crashes: s.totals.incidents,
            injuries: s.totals.injuries,
            pedestrian_injuries: s.totals.pedestrian_injuries,
            fatalities: s.totals.fatalities,
        }),
    )
}

fn write_rates(path: &Path, rates: &[DenialRate]) -> Result<usize, Box<dyn std::error::Error>> {
    write_rows(
        path,
        rates.iter().map(|r| RateRow {
            dataset: r.dataset.label(),
            group: &r.group,
            total: r.total,
            denied: r.denied,
            denial_rate: r.denial_rate,
        }),
    )
}

fn write_reasons(
    path: &Path,
    reasons: &[DenialReasonCount],
) -> Result<usize, Box<dyn std::error::Error>> {
    write_rows(
        path,
        reasons.iter().map(|r| ReasonRow {
            year: r.year,
            category: r.category.label(),
            count: r.count,
        }),
    )
}

fn write_denied_locations(
    path: &Path,
    locations: &[DeniedLocation],
) -> Result<usize, Box<dyn std::error::Error>> {
    write_rows(path, locations)
}

/// Writes every denial table into `dir`.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub fn write_denial_tables(
    dir: &Path,
    breakdown: &DenialBreakdown,
) -> Result<(), Box<dyn std::error::Error>> {
    write_rates(&dir.join(BOROUGH_RATES_TABLE), &breakdown.by_borough)?;
    write_rates(&dir.join(YEAR_RATES_TABLE), &breakdown.by_year)?;
    write_rates(&dir.join(TYPE_RATES_TABLE), &breakdown.by_request_type)?;
    write_reasons(&dir.join(REASONS_TABLE), &breakdown.reasons)?;
    write_reasons(&dir.join(REASONS_BY_YEAR_TABLE), &breakdown.reasons_by_year)?;
    write_denied_locations(
        &dir.join(DENIED_INTERSECTIONS_TABLE),
        &breakdown.most_denied_intersections,
    )?;
    write_denied_locations(&dir.join(DENIED_STREETS_TABLE), &breakdown.most_denied_streets)?;
    Ok(())
}

/// Everything a reader needs to audit a run: settings, every exclusion
/// count, and the statistics.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary<'a> {
    /// When the run finished (UTC, RFC 3339).
    pub generated_at: String,
    /// Effective configuration.
    pub config: &'a AnalysisConfig,
    /// Per-feed row accounting.
    pub ingest: &'a [IngestReport],
    /// Subjects split by the boundary after geocoding.
    pub subject_boundary: FilterReport,
    /// Crashes split by the boundary.
    pub incident_boundary: FilterReport,
    /// Geocoding results by tier.
    pub geocode: GeocodeReport,
    /// Subjects left without a location.
    pub unlocated_subjects: &'a [String],
    /// Proximity aggregation counts.
    pub proximity: ProximityReport,
    /// Hotspot de-duplication counts.
    pub dedupe: DedupeReport,
    /// Denied versus approved comparisons.
    pub comparisons: &'a [OutcomeComparison],
    /// Denial rates, reasons, and most denied locations.
    pub denials: &'a DenialBreakdown,
}

/// Writes the run summary as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_summary(path: &Path, summary: &Summary<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    log::info!("Wrote summary to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use safety_map_analytics_models::DenialReasonCategory;
    use safety_map_geography_models::GeoPoint;
    use safety_map_safety_models::{
        Dataset, GeocodeTier, Outcome, ProximityMetrics, SubjectLocation,
    };
    use safety_map_street::normalize_intersection;

    use super::*;

    fn annotated(id: &str, proximity: Proximity, point: Option<GeoPoint>) -> AnnotatedSubject {
        AnnotatedSubject {
            subject: SubjectRecord {
                id: id.to_string(),
                dataset: Dataset::SignalStudy,
                request_type: "Traffic Signal".to_string(),
                location: SubjectLocation::Intersection(normalize_intersection("GRAND AVE", "69 ST")),
                outcome: Outcome::Denied,
                requested_on: None,
                decided_on: None,
                external_reference: None,
                borough: None,
                denial_reason: None,
                point,
                geocode_tier: point.map(|_| GeocodeTier::IncidentCorpus),
            },
            proximity,
        }
    }

    #[test]
    fn location_table_distinguishes_zero_from_not_computable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCATIONS_TABLE);
        let subjects = [
            annotated(
                "zero",
                Proximity::Computed(ProximityMetrics::default()),
                Some(GeoPoint::new(40.71, -73.89)),
            ),
            annotated("none", Proximity::NotComputable, None),
        ];

        assert_eq!(write_locations(&path, &subjects).unwrap(), 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let incidents = headers.iter().position(|h| h == "incidents").unwrap();
        let status = headers.iter().position(|h| h == "proximity").unwrap();
        let tier = headers.iter().position(|h| h == "geocode_tier").unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();

        assert_eq!(&rows[0][incidents], "0");
        assert_eq!(&rows[0][status], "computed");
        assert_eq!(&rows[0][tier], "incident_corpus");
        assert_eq!(&rows[1][incidents], "");
        assert_eq!(&rows[1][status], "not_computable");
    }

    #[test]
    fn hotspot_table_uses_display_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HOTSPOTS_TABLE);
        let hotspot = RankedHotspot {
            rank: 1,
            subject: annotated("h", Proximity::NotComputable, Some(GeoPoint::new(40.71, -73.89))).subject,
            metrics: ProximityMetrics {
                incidents: 4,
                ..ProximityMetrics::default()
            },
        };
        write_hotspots(&path, &[hotspot]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("69 Street & Grand Avenue"), "{contents}");
    }

    #[test]
    fn denial_tables_use_labels() {
        let dir = tempfile::tempdir().unwrap();
        let breakdown = DenialBreakdown {
            by_year: vec![DenialRate {
                dataset: Dataset::SpeedReducer,
                group: "2021".to_string(),
                total: 4,
                denied: 3,
                denial_rate: 75.0,
            }],
            reasons: vec![DenialReasonCount {
                year: None,
                category: DenialReasonCategory::LowSpeed,
                count: 3,
            }],
            most_denied_streets: vec![DeniedLocation {
                rank: 1,
                location: "Grand Avenue".to_string(),
                denials: 3,
            }],
            ..DenialBreakdown::default()
        };

        write_denial_tables(dir.path(), &breakdown).unwrap();

        let years = std::fs::read_to_string(dir.path().join(YEAR_RATES_TABLE)).unwrap();
        assert_eq!(
            years,
            "dataset,group,total,denied,denial_rate\nSRTS,2021,4,3,75.0\n"
        );
        let reasons = std::fs::read_to_string(dir.path().join(REASONS_TABLE)).unwrap();
        assert_eq!(reasons, "year,category,count\n,Speed < 30 mph,3\n");
        let streets = std::fs::read_to_string(dir.path().join(DENIED_STREETS_TABLE)).unwrap();
        assert_eq!(streets, "rank,location,denials\n1,Grand Avenue,3\n");

        let boroughs = std::fs::read_to_string(dir.path().join(BOROUGH_RATES_TABLE)).unwrap();
        assert_eq!(boroughs, "");
    }
}
