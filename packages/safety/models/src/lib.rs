#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Safety request, crash incident, and proximity metric types.
//!
//! Every source feed is translated into [`SubjectRecord`] (a request for
//! safety infrastructure) or [`IncidentRecord`] (a crash) before any
//! analysis runs. Enrichment steps add fields to these records; they never
//! overwrite a record's identifier or outcome.

use chrono::NaiveDate;
use safety_map_geography_models::{GeoPoint, Located};
use safety_map_street::{Intersection, StreetName};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Resolved outcome of a safety request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    /// The agency declined to install the requested device.
    Denied,
    /// The request was approved or the device installed.
    Approved,
    /// Still under study, or the status text was not conclusive.
    Pending,
}

impl Outcome {
    /// Whether the request reached a final decision.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Denied | Self::Approved)
    }
}

/// Which request feed a subject came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dataset {
    /// Traffic signal and all-way stop study requests (intersections).
    SignalStudy,
    /// Speed reducer requests (street segments).
    SpeedReducer,
}

impl Dataset {
    /// Human-readable label for tables.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SignalStudy => "Signal Study",
            Self::SpeedReducer => "SRTS",
        }
    }
}

/// How a subject's coordinate was obtained.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GeocodeTier {
    /// Coordinate was present in the source feed.
    Source,
    /// Median of matching crash intersections.
    IncidentCorpus,
    /// Median of matching street-segment endpoints.
    SegmentCorpus,
    /// Intersection of two fitted street lines.
    StreetLine,
}

/// Where a request was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectLocation {
    /// A two-street intersection.
    Intersection(Intersection),
    /// A block of one street between two cross streets.
    Segment {
        /// The street the segment runs along.
        on_street: StreetName,
        /// Cross street at the start of the segment.
        from_street: StreetName,
        /// Cross street at the end of the segment.
        to_street: StreetName,
    },
}

impl SubjectLocation {
    /// The intersection to geocode, if this location is one.
    #[must_use]
    pub const fn intersection(&self) -> Option<&Intersection> {
        match self {
            Self::Intersection(i) => Some(i),
            Self::Segment { .. } => None,
        }
    }

    /// The street pair the geocoder resolves for this location.
    ///
    /// A segment is placed at its starting cross street, matching the
    /// endpoint the speed reducer feed records coordinates for.
    #[must_use]
    pub fn geocode_key(&self) -> Intersection {
        match self {
            Self::Intersection(i) => i.clone(),
            Self::Segment {
                on_street,
                from_street,
                ..
            } => Intersection::new(on_street.clone(), from_street.clone()),
        }
    }

    /// Textual identity used to collapse duplicate records of one place.
    ///
    /// Street order inside an intersection, and the direction of a
    /// segment, do not change the key.
    #[must_use]
    pub fn dedupe_key(&self) -> String {
        match self {
            Self::Intersection(i) => i.to_string(),
            Self::Segment {
                on_street,
                from_street,
                to_street,
            } => {
                let (a, b) = if from_street <= to_street {
                    (from_street, to_street)
                } else {
                    (to_street, from_street)
                };
                format!("{on_street} ({a} | {b})")
            }
        }
    }

    /// Title-cased label for presentation tables.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Intersection(i) => i.display_name(),
            Self::Segment {
                on_street,
                from_street,
                to_street,
            } => format!(
                "{} ({} to {})",
                on_street.display_name(),
                from_street.display_name(),
                to_street.display_name()
            ),
        }
    }
}

/// A request for safety infrastructure, normalized from any feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    /// Identifier from the source feed.
    pub id: String,
    /// Feed the record came from.
    pub dataset: Dataset,
    /// Requested device (e.g., "Traffic Signal", "Speed Bump").
    pub request_type: String,
    /// Requested location.
    pub location: SubjectLocation,
    /// Resolved outcome.
    pub outcome: Outcome,
    /// When the request was filed.
    pub requested_on: Option<NaiveDate>,
    /// When the current status was recorded.
    pub decided_on: Option<NaiveDate>,
    /// Agency-side reference shared by administrative duplicates.
    pub external_reference: Option<String>,
    /// Borough, when the feed records one.
    #[serde(default)]
    pub borough: Option<String>,
    /// Free-text reason given for a denial.
    #[serde(default)]
    pub denial_reason: Option<String>,
    /// Location, once known.
    pub point: Option<GeoPoint>,
    /// How [`Self::point`] was obtained.
    pub geocode_tier: Option<GeocodeTier>,
}

impl SubjectRecord {
    /// Attaches a geocoded point if the record does not already have one.
    ///
    /// Existing coordinates are never replaced.
    #[must_use]
    pub fn with_geocode(mut self, point: GeoPoint, tier: GeocodeTier) -> Self {
        if self.point.is_none() {
            self.point = Some(point);
            self.geocode_tier = Some(tier);
        }
        self
    }
}

impl Located for SubjectRecord {
    fn location(&self) -> Option<GeoPoint> {
        self.point
    }
}

/// A located end of a street segment, used as reference geometry.
///
/// Each speed reducer row yields up to two of these: the on-street paired
/// with the from street, and with the to street.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEndpoint {
    /// Street the segment runs along.
    pub on_street: StreetName,
    /// Cross street at this end.
    pub cross_street: StreetName,
    /// Coordinate of this end.
    pub point: GeoPoint,
}

impl SegmentEndpoint {
    /// The endpoint's street pair, if both names are present.
    #[must_use]
    pub fn intersection(&self) -> Option<Intersection> {
        let key = Intersection::new(self.on_street.clone(), self.cross_street.clone());
        key.is_complete().then_some(key)
    }
}

/// Injury and fatality counts for one crash, by person category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjuryCounts {
    /// All persons injured.
    pub persons_injured: u32,
    /// All persons killed.
    pub persons_killed: u32,
    /// Pedestrians injured.
    pub pedestrians_injured: u32,
    /// Pedestrians killed.
    pub pedestrians_killed: u32,
    /// Cyclists injured.
    pub cyclists_injured: u32,
    /// Cyclists killed.
    pub cyclists_killed: u32,
    /// Motorists and other occupants injured.
    pub motorists_injured: u32,
    /// Motorists and other occupants killed.
    pub motorists_killed: u32,
}

impl InjuryCounts {
    /// Total injured. Uses the larger of the reported total and the
    /// per-category sum, since feeds occasionally leave the total blank.
    /// Sums saturate at `u32::MAX`.
    #[must_use]
    pub const fn total_injured(&self) -> u32 {
        let by_category = self
            .pedestrians_injured
            .saturating_add(self.cyclists_injured)
            .saturating_add(self.motorists_injured);
        if by_category > self.persons_injured {
            by_category
        } else {
            self.persons_injured
        }
    }

    /// Total killed, with the same fallback as [`Self::total_injured`].
    #[must_use]
    pub const fn total_killed(&self) -> u32 {
        let by_category = self
            .pedestrians_killed
            .saturating_add(self.cyclists_killed)
            .saturating_add(self.motorists_killed);
        if by_category > self.persons_killed {
            by_category
        } else {
            self.persons_killed
        }
    }
}

/// A crash event.
///
/// Crashes without a coordinate are rejected by the feed adapters, so the
/// point here is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Collision identifier from the source feed.
    pub id: String,
    /// Date of the crash.
    pub occurred_on: NaiveDate,
    /// Crash location.
    pub point: GeoPoint,
    /// Street the crash was reported on (may be empty).
    pub on_street: StreetName,
    /// Cross street, for intersection crashes (may be empty).
    pub off_street: StreetName,
    /// Injury and fatality counts.
    pub injuries: InjuryCounts,
}

impl IncidentRecord {
    /// The crash's intersection, if both streets were reported.
    #[must_use]
    pub fn intersection(&self) -> Option<Intersection> {
        let key = Intersection::new(self.on_street.clone(), self.off_street.clone());
        key.is_complete().then_some(key)
    }
}

impl Located for IncidentRecord {
    fn location(&self) -> Option<GeoPoint> {
        Some(self.point)
    }
}

/// Crash totals within the proximity radius of one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityMetrics {
    /// Number of crashes.
    pub incidents: u32,
    /// Persons injured.
    pub injuries: u32,
    /// Pedestrians injured.
    pub pedestrian_injuries: u32,
    /// Persons killed.
    pub fatalities: u32,
}

impl ProximityMetrics {
    /// Adds one crash to the totals. Totals saturate at `u32::MAX`.
    pub const fn add(&mut self, injuries: &InjuryCounts) {
        self.incidents = self.incidents.saturating_add(1);
        self.injuries = self.injuries.saturating_add(injuries.total_injured());
        self.pedestrian_injuries = self
            .pedestrian_injuries
            .saturating_add(injuries.pedestrians_injured);
        self.fatalities = self.fatalities.saturating_add(injuries.total_killed());
    }

    /// Reads one metric.
    #[must_use]
    pub const fn get(&self, metric: RankMetric) -> u32 {
        match metric {
            RankMetric::Incidents => self.incidents,
            RankMetric::Injuries => self.injuries,
            RankMetric::PedestrianInjuries => self.pedestrian_injuries,
            RankMetric::Fatalities => self.fatalities,
        }
    }
}

/// Proximity result for a subject.
///
/// `Computed` with zero counts means "no crashes nearby";
/// `NotComputable` means the subject had no location to measure from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Proximity {
    /// The subject had no coordinate.
    NotComputable,
    /// Totals within the radius.
    Computed(ProximityMetrics),
}

impl Proximity {
    /// The metrics, when computable.
    #[must_use]
    pub const fn metrics(&self) -> Option<&ProximityMetrics> {
        match self {
            Self::Computed(m) => Some(m),
            Self::NotComputable => None,
        }
    }
}

/// A metric subjects can be ranked or compared by.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RankMetric {
    /// Crash count.
    Incidents,
    /// Persons injured.
    Injuries,
    /// Pedestrians injured.
    PedestrianInjuries,
    /// Persons killed.
    Fatalities,
}

impl RankMetric {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Incidents,
            Self::Injuries,
            Self::PedestrianInjuries,
            Self::Fatalities,
        ]
    }
}

/// A subject together with its proximity result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedSubject {
    /// The request.
    pub subject: SubjectRecord,
    /// Crash totals around it.
    pub proximity: Proximity,
}

impl Located for AnnotatedSubject {
    fn location(&self) -> Option<GeoPoint> {
        self.subject.point
    }
}
