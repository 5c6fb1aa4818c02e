//! Free-text street name normalization.
//!
//! The pipeline:
//! 1. Uppercase
//! 2. Replace punctuation (`.`, `,`, `;`) with spaces
//! 3. Collapse whitespace and trim
//! 4. Expand the trailing suffix token (AVE→AVENUE, ST→STREET, ...)
//!
//! Only the last token is expanded, so "AVENUE C" and "ST JOHNS PLACE"
//! keep their leading words intact.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::suffixes;

static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,;]+").expect("valid regex"));

/// A street name in canonical form.
///
/// Construct with [`normalize`]; two names are equal only after
/// canonicalization. An empty name means the source field was blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreetName(String);

impl StreetName {
    /// Returns the canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the source text contained no street name at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Title-cased form for labels ("METROPOLITAN AVENUE" → "Metropolitan Avenue").
    #[must_use]
    pub fn display_name(&self) -> String {
        title_case(&self.0)
    }
}

impl fmt::Display for StreetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreetName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalizes a raw street name.
///
/// Never fails: unrecognized tokens pass through unchanged, and blank
/// input yields an empty [`StreetName`]. Idempotent.
#[must_use]
pub fn normalize(raw: &str) -> StreetName {
    let upper = raw.to_uppercase();
    let no_punct = PUNCTUATION_RE.replace_all(&upper, " ");
    let mut tokens: Vec<&str> = no_punct.split_whitespace().collect();

    // A lone "ST" is a name, not a suffix.
    if tokens.len() > 1 {
        let last = tokens.len() - 1;
        tokens[last] = suffixes::expand_suffix(tokens[last]);
    }

    StreetName(tokens.join(" "))
}

/// Title-cases each whitespace-separated word, the way location labels
/// are presented ("52 AVENUE" → "52 Avenue").
#[must_use]
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
