#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street name canonicalization for cross-dataset joins.
//!
//! Municipal feeds spell the same road many ways ("METROPOLITAN AVE",
//! "Metropolitan Avenue ", "METROPOLITAN  AVENUE"). Every textual join in
//! the pipeline goes through [`normalize`] so that those variants compare
//! equal, and through [`normalize_intersection`] so that "A & B" and
//! "B & A" produce the same key.

pub mod intersection;
pub mod normalize;
pub mod suffixes;

pub use intersection::{Intersection, normalize_intersection};
pub use normalize::{StreetName, normalize, title_case};
