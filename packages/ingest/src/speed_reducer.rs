//! Speed reducer (speed bump) requests.
//!
//! Each row describes a block of one street between two cross streets.
//! Besides the requests themselves, every located row in the feed, from
//! any community board and with any status, contributes segment endpoints
//! to the geocoder's reference geometry.

use std::io::Read;
use std::path::Path;

use safety_map_safety_models::{
    Dataset, GeocodeTier, Outcome, SegmentEndpoint, SubjectLocation, SubjectRecord,
};
use safety_map_street::{StreetName, normalize};
use serde::Deserialize;

use crate::parsing::{non_blank, parse_optional_date, parse_point};
use crate::{IngestError, IngestReport, IngestSettings, open, read_rows};

/// One row of the speed reducer export.
#[derive(Debug, Deserialize)]
struct SpeedReducerRow {
    #[serde(default)]
    projectcode: Option<String>,
    #[serde(default)]
    cb: Option<String>,
    #[serde(default)]
    onstreet: Option<String>,
    #[serde(default)]
    fromstreet: Option<String>,
    #[serde(default)]
    tostreet: Option<String>,
    #[serde(default)]
    segmentstatusdescription: Option<String>,
    #[serde(default)]
    requestdate: Option<String>,
    #[serde(default)]
    fromlatitude: Option<String>,
    #[serde(default)]
    fromlongitude: Option<String>,
    #[serde(default)]
    tolatitude: Option<String>,
    #[serde(default)]
    tolongitude: Option<String>,
    #[serde(default)]
    borough: Option<String>,
    #[serde(default)]
    denialreason: Option<String>,
}

/// Normalized streets of one row.
struct Streets {
    on: StreetName,
    from: StreetName,
    to: StreetName,
}

impl SpeedReducerRow {
    fn streets(&self) -> Streets {
        Streets {
            on: normalize(self.onstreet.as_deref().unwrap_or_default()),
            from: normalize(self.fromstreet.as_deref().unwrap_or_default()),
            to: normalize(self.tostreet.as_deref().unwrap_or_default()),
        }
    }

    /// Located ends of the segment.
    ///
    /// The to-end falls back to the from-coordinate when the feed only
    /// records one end.
    fn endpoints(&self, streets: &Streets) -> Vec<SegmentEndpoint> {
        let Some(from_point) = parse_point(self.fromlatitude.as_deref(), self.fromlongitude.as_deref())
        else {
            return Vec::new();
        };
        let to_point = parse_point(self.tolatitude.as_deref(), self.tolongitude.as_deref())
            .unwrap_or(from_point);

        [(&streets.from, from_point), (&streets.to, to_point)]
            .into_iter()
            .map(|(cross, point)| SegmentEndpoint {
                on_street: streets.on.clone(),
                cross_street: cross.clone(),
                point,
            })
            .filter(|e| e.intersection().is_some())
            .collect()
    }

    fn to_subject(&self, streets: Streets) -> Option<SubjectRecord> {
        let id = non_blank(self.projectcode.as_deref())?;
        let point = parse_point(self.fromlatitude.as_deref(), self.fromlongitude.as_deref());
        Some(SubjectRecord {
            id,
            dataset: Dataset::SpeedReducer,
            request_type: "Speed Bump".to_string(),
            location: SubjectLocation::Segment {
                on_street: streets.on,
                from_street: streets.from,
                to_street: streets.to,
            },
            outcome: classify_segment_status(self.segmentstatusdescription.as_deref()),
            requested_on: parse_optional_date(self.requestdate.as_deref()),
            decided_on: None,
            external_reference: None,
            borough: non_blank(self.borough.as_deref()),
            denial_reason: non_blank(self.denialreason.as_deref()),
            point,
            geocode_tier: point.map(|_| GeocodeTier::Source),
        })
    }
}

/// Maps a segment status to an outcome.
#[must_use]
pub fn classify_segment_status(status: Option<&str>) -> Outcome {
    match status.map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("Not Feasible") => Outcome::Denied,
        Some(s) if s.eq_ignore_ascii_case("Feasible") => Outcome::Approved,
        _ => Outcome::Pending,
    }
}

/// Whether a board code names the configured board. Codes are compared
/// numerically when both parse, so `"405"` matches `"405.0"`.
fn same_board(code: Option<&str>, board: &str) -> bool {
    let board = board.trim();
    if board.is_empty() {
        return true;
    }
    let Some(code) = code.map(str::trim) else {
        return false;
    };
    match (code.parse::<f64>(), board.parse::<f64>()) {
        (Ok(a), Ok(b)) => (a - b).abs() < f64::EPSILON,
        _ => code.eq_ignore_ascii_case(board),
    }
}

/// Whether any keyword appears in the street name as a run of whole
/// tokens, so "51 STREET" matches "WEST 51 STREET" but not "151 STREET".
fn mentions_any(street: &StreetName, keywords: &[String]) -> bool {
    let tokens: Vec<&str> = street.as_str().split_whitespace().collect();
    keywords.iter().any(|k| {
        let k = normalize(k);
        let wanted: Vec<&str> = k.as_str().split_whitespace().collect();
        !wanted.is_empty()
            && tokens
                .windows(wanted.len())
                .any(|window| window == wanted.as_slice())
    })
}

/// Whether the area keyword lists place a segment outside the study area.
fn excluded_by_keyword(streets: &Streets, settings: &IngestSettings) -> bool {
    let cross = [&streets.from, &streets.to];
    cross
        .iter()
        .any(|s| mentions_any(s, &settings.excluded_cross_street_keywords))
        || mentions_any(&streets.on, &settings.excluded_main_street_keywords)
        || [&streets.on, &streets.from, &streets.to]
            .iter()
            .any(|s| mentions_any(s, &settings.excluded_keywords))
}

/// Speed reducer requests together with the reference geometry the feed
/// provides.
#[derive(Debug, Clone, Default)]
pub struct SpeedReducers {
    /// Requests in the configured community board.
    pub subjects: Vec<SubjectRecord>,
    /// Located segment ends from every row of the feed.
    pub endpoints: Vec<SegmentEndpoint>,
}

/// Reads speed reducer requests from a CSV export.
///
/// Only rows for the configured community board that pass the keyword
/// lists become subjects; every located row contributes endpoints.
///
/// # Errors
///
/// Returns [`IngestError`] if the feed cannot be read.
pub fn read_speed_reducers(
    reader: impl Read,
    settings: &IngestSettings,
) -> Result<(SpeedReducers, IngestReport), IngestError> {
    let mut report = IngestReport::new(Dataset::SpeedReducer.label());
    let rows: Vec<SpeedReducerRow> = read_rows(reader, &mut report)?;

    let mut out = SpeedReducers::default();
    for row in &rows {
        let streets = row.streets();
        out.endpoints.extend(row.endpoints(&streets));

        if !same_board(row.cb.as_deref(), &settings.community_board) {
            report.outside_community_board += 1;
            continue;
        }
        if excluded_by_keyword(&streets, settings) {
            log::debug!(
                "[{}] {} excluded by area keywords",
                report.feed,
                streets.on
            );
            report.excluded_keyword += 1;
            continue;
        }
        let Some(subject) = row.to_subject(streets) else {
            report.malformed += 1;
            continue;
        };
        if subject.point.is_none() {
            report.missing_geometry += 1;
        }
        out.subjects.push(subject);
    }

    report.retained = out.subjects.len();
    report.log_summary();
    log::info!(
        "[{}] {} located segment endpoints",
        report.feed,
        out.endpoints.len()
    );

    Ok((out, report))
}

/// Reads speed reducer requests from a file.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be opened or read.
pub fn load_speed_reducers(
    path: &Path,
    settings: &IngestSettings,
) -> Result<(SpeedReducers, IngestReport), IngestError> {
    log::info!("Loading speed reducers from {}", path.display());
    read_speed_reducers(open(path)?, settings)
}
