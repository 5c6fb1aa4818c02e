#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crash analysis around safety requests.
//!
//! - [`proximity`]: great-circle distance and per-subject crash totals
//!   within a radius.
//! - [`dedupe`]: collapsing duplicate and adjacent subjects for top-N
//!   views.
//! - [`stats`]: the Mann-Whitney U test.
//! - [`compare`]: denied versus approved summaries per dataset and metric.
//! - [`hotspots`]: crash totals by street.
//! - [`denials`]: denial rates, denial reasons, and the most denied
//!   locations.

pub mod compare;
pub mod dedupe;
pub mod denials;
pub mod hotspots;
pub mod proximity;
pub mod stats;

use thiserror::Error;

/// Errors from invalid analysis parameters.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A parameter was out of range.
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name as it appears in configuration.
        name: &'static str,
        /// What was wrong with it.
        message: String,
    },
}
