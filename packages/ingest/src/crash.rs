//! Motor vehicle collision export.

use std::io::Read;
use std::path::Path;

use safety_map_safety_models::{IncidentRecord, InjuryCounts};
use safety_map_street::normalize;
use serde::Deserialize;

use crate::parsing::{non_blank, parse_count, parse_date, parse_point};
use crate::{IngestError, IngestReport, open, read_rows};

/// One row of the collision export.
#[derive(Debug, Deserialize)]
struct CrashRow {
    #[serde(default)]
    collision_id: Option<String>,
    #[serde(default)]
    crash_date: Option<String>,
    #[serde(default)]
    latitude: Option<String>,
    #[serde(default)]
    longitude: Option<String>,
    #[serde(default)]
    on_street_name: Option<String>,
    #[serde(default)]
    off_street_name: Option<String>,
    #[serde(default)]
    number_of_persons_injured: Option<String>,
    #[serde(default)]
    number_of_persons_killed: Option<String>,
    #[serde(default)]
    number_of_pedestrians_injured: Option<String>,
    #[serde(default)]
    number_of_pedestrians_killed: Option<String>,
    #[serde(default)]
    number_of_cyclist_injured: Option<String>,
    #[serde(default)]
    number_of_cyclist_killed: Option<String>,
    #[serde(default)]
    number_of_motorist_injured: Option<String>,
    #[serde(default)]
    number_of_motorist_killed: Option<String>,
}

impl CrashRow {
    fn injuries(&self) -> InjuryCounts {
        InjuryCounts {
            persons_injured: parse_count(self.number_of_persons_injured.as_deref()),
            persons_killed: parse_count(self.number_of_persons_killed.as_deref()),
            pedestrians_injured: parse_count(self.number_of_pedestrians_injured.as_deref()),
            pedestrians_killed: parse_count(self.number_of_pedestrians_killed.as_deref()),
            cyclists_injured: parse_count(self.number_of_cyclist_injured.as_deref()),
            cyclists_killed: parse_count(self.number_of_cyclist_killed.as_deref()),
            motorists_injured: parse_count(self.number_of_motorist_injured.as_deref()),
            motorists_killed: parse_count(self.number_of_motorist_killed.as_deref()),
        }
    }
}

/// Reads crashes from a CSV export.
///
/// Rows without a collision id are malformed, rows with a missing or
/// unparseable date are counted as invalid dates, and rows with missing,
/// unparseable or zero coordinates are counted as missing geometry. None
/// of them are returned. Blank injury counts are zero.
///
/// # Errors
///
/// Returns [`IngestError`] if the feed cannot be read.
pub fn read_crashes(reader: impl Read) -> Result<(Vec<IncidentRecord>, IngestReport), IngestError> {
    let mut report = IngestReport::new("Crashes");
    let rows: Vec<CrashRow> = read_rows(reader, &mut report)?;

    let mut incidents = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(id) = non_blank(row.collision_id.as_deref()) else {
            report.malformed += 1;
            continue;
        };
        let Some(occurred_on) = row.crash_date.as_deref().and_then(parse_date) else {
            log::debug!("[{}] {id}: unparseable date {:?}", report.feed, row.crash_date);
            report.invalid_date += 1;
            continue;
        };
        let Some(point) = parse_point(row.latitude.as_deref(), row.longitude.as_deref()) else {
            report.missing_geometry += 1;
            continue;
        };
        incidents.push(IncidentRecord {
            id,
            occurred_on,
            point,
            on_street: normalize(row.on_street_name.as_deref().unwrap_or_default()),
            off_street: normalize(row.off_street_name.as_deref().unwrap_or_default()),
            injuries: row.injuries(),
        });
    }

    report.retained = incidents.len();
    report.log_summary();
    Ok((incidents, report))
}

/// Reads crashes from a file.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be opened or read.
pub fn load_crashes(path: &Path) -> Result<(Vec<IncidentRecord>, IngestReport), IngestError> {
    log::info!("Loading crashes from {}", path.display());
    read_crashes(open(path)?)
}
