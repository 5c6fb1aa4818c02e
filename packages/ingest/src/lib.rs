#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feed adapters for safety request and crash CSV exports.
//!
//! Each adapter reads one open-data feed and translates its rows into the
//! shared record types from `safety_map_safety_models`. Feed-specific
//! rules (status text classification, administrative duplicates, area
//! keyword exclusions) live here so the analysis crates only ever see
//! normalized records. Every adapter also returns an [`IngestReport`]
//! accounting for each row it did not keep.

pub mod crash;
pub mod parsing;
pub mod signal_study;
pub mod speed_reducer;

use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors reading a feed.
///
/// Individual rows that fail to deserialize are not errors; they are
/// counted in [`IngestReport::malformed`] and skipped.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The feed file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path to the feed file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Reading the feed failed part way through.
    #[error("CSV read error: {0}")]
    Csv(#[from] csv::Error),
}

/// Feed filtering rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Signal study request types left out of the analysis entirely.
    pub excluded_request_types: Vec<String>,
    /// Community board code speed reducer rows must carry. Empty keeps
    /// every board.
    pub community_board: String,
    /// Keywords that place a speed reducer outside the area when found in
    /// either cross street.
    pub excluded_cross_street_keywords: Vec<String>,
    /// Keywords that place a speed reducer outside the area when found in
    /// its main street.
    pub excluded_main_street_keywords: Vec<String>,
    /// Keywords that exclude a speed reducer when found in any of its
    /// streets.
    pub excluded_keywords: Vec<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(ToString::to_string).collect();
        Self {
            excluded_request_types: owned(&["Accessible Pedestrian Signal"]),
            community_board: "405".to_string(),
            excluded_cross_street_keywords: owned(&[
                "51 ROAD",
                "51 STREET",
                "52 AVENUE",
                "52 DRIVE",
                "52 ROAD",
                "52 COURT",
                "53 AVENUE",
                "53 DRIVE",
                "53 ROAD",
                "CALAMUS AVENUE",
                "QUEENS BOULEVARD",
            ]),
            excluded_main_street_keywords: owned(&["MAURICE AVENUE"]),
            excluded_keywords: owned(&["WOODSIDE"]),
        }
    }
}

/// Row accounting for one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Feed label for log lines.
    pub feed: String,
    /// Data rows read, including malformed ones.
    pub rows: usize,
    /// Rows that could not be deserialized or lacked an identifier.
    pub malformed: usize,
    /// Rows dropped for an excluded request type.
    pub excluded_request_type: usize,
    /// Rows filed under a different community board.
    pub outside_community_board: usize,
    /// Rows dropped by the area keyword lists.
    pub excluded_keyword: usize,
    /// Administrative duplicates collapsed into one record.
    pub administrative_duplicates: usize,
    /// Rows without a usable coordinate. For crashes these are dropped;
    /// for requests they are kept and left to the geocoder.
    pub missing_geometry: usize,
    /// Crash rows dropped for an unparseable date.
    pub invalid_date: usize,
    /// Records returned.
    pub retained: usize,
}

impl IngestReport {
    fn new(feed: &str) -> Self {
        Self {
            feed: feed.to_string(),
            ..Self::default()
        }
    }

    /// Logs the counts at info level.
    pub fn log_summary(&self) {
        log::info!(
            "[{}] {} rows: {} kept, {} malformed, {} excluded request type, {} other board, \
             {} keyword-excluded, {} administrative duplicates, {} missing geometry, {} invalid date",
            self.feed,
            self.rows,
            self.retained,
            self.malformed,
            self.excluded_request_type,
            self.outside_community_board,
            self.excluded_keyword,
            self.administrative_duplicates,
            self.missing_geometry,
            self.invalid_date
        );
    }
}

/// Deserializes every row of a CSV feed, counting the malformed ones.
///
/// I/O failures abort; rows that do not fit `T` are skipped.
fn read_rows<T: DeserializeOwned>(
    reader: impl Read,
    report: &mut IngestReport,
) -> Result<Vec<T>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.deserialize::<T>() {
        report.rows += 1;
        match result {
            Ok(row) => rows.push(row),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                log::debug!("[{}] skipping malformed row: {e}", report.feed);
                report.malformed += 1;
            }
        }
    }
    Ok(rows)
}

/// Opens a feed file for one of the `read_*` adapters.
fn open(path: &Path) -> Result<std::fs::File, IngestError> {
    std::fs::File::open(path).map_err(|e| IngestError::Open {
        path: path.display().to_string(),
        source: e.into(),
    })
}
