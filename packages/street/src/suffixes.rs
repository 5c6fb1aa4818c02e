//! Street suffix abbreviation table.
//!
//! Only the trailing token of a street name is looked up here. Full words
//! never appear as keys, which keeps expansion idempotent.

use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Maps a trailing suffix abbreviation to its full word.
static SUFFIXES: LazyLock<BTreeMap<&'static str, &'static str>> = LazyLock::new(|| {
    BTreeMap::from([
        ("AVE", "AVENUE"),
        ("BLVD", "BOULEVARD"),
        ("CT", "COURT"),
        ("DR", "DRIVE"),
        ("EXPWY", "EXPRESSWAY"),
        ("LN", "LANE"),
        ("PKWY", "PARKWAY"),
        ("PL", "PLACE"),
        ("RD", "ROAD"),
        ("ST", "STREET"),
        ("TPKE", "TURNPIKE"),
    ])
});

/// Expands a suffix abbreviation, or returns the token unchanged.
#[must_use]
pub fn expand_suffix(token: &str) -> &str {
    SUFFIXES.get(token).copied().unwrap_or(token)
}
