//! Traffic signal and all-way stop study requests.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use safety_map_safety_models::{Dataset, GeocodeTier, Outcome, SubjectLocation, SubjectRecord};
use safety_map_street::normalize_intersection;
use serde::Deserialize;

use crate::parsing::{non_blank, parse_optional_date, parse_point};
use crate::{IngestError, IngestReport, IngestSettings, open, read_rows};

/// Prefix of external reference numbers shared by administrative
/// duplicates.
const ADMINISTRATIVE_PREFIX: &str = "DOT-";

/// One row of the signal study export.
#[derive(Debug, Deserialize)]
struct SignalStudyRow {
    #[serde(default)]
    referencenumber: Option<String>,
    #[serde(default)]
    externalreferencenumber: Option<String>,
    #[serde(default)]
    requesttype: Option<String>,
    #[serde(default)]
    mainstreet: Option<String>,
    #[serde(default)]
    crossstreet1: Option<String>,
    #[serde(default)]
    statusdescription: Option<String>,
    #[serde(default)]
    statusdate: Option<String>,
    #[serde(default)]
    daterequested: Option<String>,
    #[serde(default)]
    latitude: Option<String>,
    #[serde(default)]
    longitude: Option<String>,
    #[serde(default)]
    borough: Option<String>,
}

impl SignalStudyRow {
    fn to_subject(&self) -> Option<SubjectRecord> {
        let id = non_blank(self.referencenumber.as_deref())?;
        let point = parse_point(self.latitude.as_deref(), self.longitude.as_deref());
        Some(SubjectRecord {
            id,
            dataset: Dataset::SignalStudy,
            request_type: non_blank(self.requesttype.as_deref()).unwrap_or_default(),
            location: SubjectLocation::Intersection(normalize_intersection(
                self.mainstreet.as_deref().unwrap_or_default(),
                self.crossstreet1.as_deref().unwrap_or_default(),
            )),
            outcome: classify_status(self.statusdescription.as_deref()),
            requested_on: parse_optional_date(self.daterequested.as_deref()),
            decided_on: parse_optional_date(self.statusdate.as_deref()),
            external_reference: non_blank(self.externalreferencenumber.as_deref()),
            borough: non_blank(self.borough.as_deref()),
            denial_reason: None,
            point,
            geocode_tier: point.map(|_| GeocodeTier::Source),
        })
    }
}

/// Maps a signal study status description to an outcome.
///
/// A denial, or a completed engineering study that does not mention an
/// approval, is [`Outcome::Denied`]. Approvals and accessible pedestrian
/// signal installation stages are [`Outcome::Approved`]. Anything else,
/// including a missing status, is [`Outcome::Pending`].
#[must_use]
pub fn classify_status(status: Option<&str>) -> Outcome {
    let Some(status) = status else {
        return Outcome::Pending;
    };
    let s = status.to_lowercase();
    if s.contains("denial") || (s.contains("engineering study completed") && !s.contains("approval")) {
        return Outcome::Denied;
    }
    if ["approval", "approved", "aps installed", "aps ranking", "aps design"]
        .iter()
        .any(|k| s.contains(k))
    {
        return Outcome::Approved;
    }
    Outcome::Pending
}

/// Collapses records sharing a `DOT-` external reference number into the
/// one with the latest status date.
///
/// Records with any other reference, or none, are kept as they are. The
/// relative order of kept records is preserved; among equal status dates
/// the first record wins. Returns the kept records and the number removed.
#[must_use]
pub fn collapse_administrative_duplicates(subjects: Vec<SubjectRecord>) -> (Vec<SubjectRecord>, usize) {
    let mut latest: BTreeMap<String, (usize, Option<NaiveDate>)> = BTreeMap::new();
    for (i, subject) in subjects.iter().enumerate() {
        let Some(reference) = administrative_reference(subject) else {
            continue;
        };
        latest
            .entry(reference.to_string())
            .and_modify(|(best, date)| {
                if subject.decided_on > *date {
                    *best = i;
                    *date = subject.decided_on;
                }
            })
            .or_insert((i, subject.decided_on));
    }

    let before = subjects.len();
    let kept: Vec<SubjectRecord> = subjects
        .into_iter()
        .enumerate()
        .filter(|(i, subject)| {
            administrative_reference(subject)
                .and_then(|r| latest.get(r))
                .is_none_or(|(best, _)| best == i)
        })
        .map(|(_, subject)| subject)
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

fn administrative_reference(subject: &SubjectRecord) -> Option<&str> {
    subject
        .external_reference
        .as_deref()
        .filter(|r| r.starts_with(ADMINISTRATIVE_PREFIX))
}

/// Reads signal study requests from a CSV export.
///
/// Rows without a reference number are malformed. Excluded request types
/// are dropped, administrative duplicates collapsed, and rows without
/// coordinates kept for geocoding.
///
/// # Errors
///
/// Returns [`IngestError`] if the feed cannot be read.
pub fn read_signal_studies(
    reader: impl Read,
    settings: &IngestSettings,
) -> Result<(Vec<SubjectRecord>, IngestReport), IngestError> {
    let mut report = IngestReport::new(Dataset::SignalStudy.label());
    let rows: Vec<SignalStudyRow> = read_rows(reader, &mut report)?;

    let mut subjects = Vec::with_capacity(rows.len());
    for row in &rows {
        let Some(subject) = row.to_subject() else {
            report.malformed += 1;
            continue;
        };
        if settings
            .excluded_request_types
            .iter()
            .any(|t| t.trim().eq_ignore_ascii_case(subject.request_type.trim()))
        {
            report.excluded_request_type += 1;
            continue;
        }
        subjects.push(subject);
    }

    let (subjects, removed) = collapse_administrative_duplicates(subjects);
    report.administrative_duplicates = removed;
    report.missing_geometry = subjects.iter().filter(|s| s.point.is_none()).count();
    report.retained = subjects.len();
    report.log_summary();

    Ok((subjects, report))
}

/// Reads signal study requests from a file.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be opened or read.
pub fn load_signal_studies(
    path: &Path,
    settings: &IngestSettings,
) -> Result<(Vec<SubjectRecord>, IngestReport), IngestError> {
    log::info!("Loading signal studies from {}", path.display());
    read_signal_studies(open(path)?, settings)
}
