//! Unordered street-pair keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::{StreetName, normalize};

/// An unordered pair of canonical street names.
///
/// The two streets are always stored sorted, so `{A, B}` and `{B, A}`
/// compare, hash and serialize identically and can be used directly as
/// map keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Intersection {
    first: StreetName,
    second: StreetName,
}

impl Intersection {
    /// Builds an intersection from two already-normalized names.
    #[must_use]
    pub fn new(a: StreetName, b: StreetName) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// The lexicographically smaller street.
    #[must_use]
    pub const fn first(&self) -> &StreetName {
        &self.first
    }

    /// The lexicographically larger street.
    #[must_use]
    pub const fn second(&self) -> &StreetName {
        &self.second
    }

    /// Both streets, in key order.
    #[must_use]
    pub const fn streets(&self) -> [&StreetName; 2] {
        [&self.first, &self.second]
    }

    /// Whether both streets are named. Incomplete intersections cannot be
    /// geocoded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.first.is_empty() && !self.second.is_empty()
    }

    /// Title-cased "A & B" label.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{} & {}",
            self.first.display_name(),
            self.second.display_name()
        )
    }
}

impl fmt::Display for Intersection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} & {}", self.first, self.second)
    }
}

/// Normalizes both names and returns them as an order-independent key.
#[must_use]
pub fn normalize_intersection(a: &str, b: &str) -> Intersection {
    Intersection::new(normalize(a), normalize(b))
}
