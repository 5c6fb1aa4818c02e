//! Crash totals within a fixed radius of each subject.
//!
//! Crashes are filtered by date before any distance is computed; the
//! haversine pass is the expensive part, so it runs only over crashes that
//! can count.

use chrono::{Datelike as _, NaiveDate};
use rayon::prelude::*;
use safety_map_analytics_models::ProximityReport;
use safety_map_geography_models::GeoPoint;
use safety_map_safety_models::{
    AnnotatedSubject, IncidentRecord, Proximity, ProximityMetrics, SubjectRecord,
};
use serde::{Deserialize, Serialize};

use crate::AnalyticsError;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Pedestrian-safety analysis radius, about a block and a half.
pub const DEFAULT_RADIUS_M: f64 = 150.0;

/// Haversine distance in meters.
#[must_use]
pub fn great_circle_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Proximity radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximitySettings {
    /// Radius in meters; crashes at exactly this distance count.
    pub radius_m: f64,
}

impl Default for ProximitySettings {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_RADIUS_M,
        }
    }
}

impl ProximitySettings {
    /// Checks the radius is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameter`] if the radius is not a
    /// finite, positive number.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        validate_radius("proximity.radius_m", self.radius_m)
    }
}

pub(crate) fn validate_radius(name: &'static str, radius_m: f64) -> Result<(), AnalyticsError> {
    if radius_m.is_finite() && radius_m > 0.0 {
        Ok(())
    } else {
        Err(AnalyticsError::InvalidParameter {
            name,
            message: format!("expected a positive distance in meters, got {radius_m}"),
        })
    }
}

/// Inclusive range of calendar years a crash must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeWindow {
    /// First year counted.
    pub start_year: i32,
    /// Last year counted.
    pub end_year: i32,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start_year: 2020,
            end_year: 2025,
        }
    }
}

impl TimeWindow {
    /// Builds a window.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameter`] if `start_year` is
    /// after `end_year`.
    pub fn new(start_year: i32, end_year: i32) -> Result<Self, AnalyticsError> {
        let window = Self {
            start_year,
            end_year,
        };
        window.validate()?;
        Ok(window)
    }

    /// Checks the years are in order.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameter`] if `start_year` is
    /// after `end_year`.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.start_year <= self.end_year {
            Ok(())
        } else {
            Err(AnalyticsError::InvalidParameter {
                name: "time_window",
                message: format!("start year {} is after end year {}", self.start_year, self.end_year),
            })
        }
    }

    /// Whether a date falls inside the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.start_year..=self.end_year).contains(&date.year())
    }

    /// The crashes inside the window.
    #[must_use]
    pub fn filter<'a>(&self, incidents: &'a [IncidentRecord]) -> Vec<&'a IncidentRecord> {
        incidents
            .iter()
            .filter(|i| self.contains(i.occurred_on))
            .collect()
    }
}

/// Totals the crashes within `radius_m` of a subject.
///
/// Returns [`Proximity::NotComputable`] when the subject has no point,
/// and zero counts when it has one but nothing is nearby.
pub fn aggregate<'a, I>(subject: &SubjectRecord, incidents: I, radius_m: f64) -> Proximity
where
    I: IntoIterator<Item = &'a IncidentRecord>,
{
    let Some(origin) = subject.point else {
        return Proximity::NotComputable;
    };

    // Latitude difference alone bounds the distance from below.
    let max_lat_delta = (radius_m / EARTH_RADIUS_M).to_degrees();

    let mut metrics = ProximityMetrics::default();
    for incident in incidents {
        if (incident.point.latitude - origin.latitude).abs() > max_lat_delta {
            continue;
        }
        if great_circle_distance(origin, incident.point) <= radius_m {
            metrics.add(&incident.injuries);
        }
    }
    Proximity::Computed(metrics)
}

/// Annotates every subject with its crash totals.
///
/// Crashes outside `window` are dropped first. Subjects are processed in
/// parallel and returned in input order.
#[must_use]
pub fn annotate(
    subjects: Vec<SubjectRecord>,
    incidents: &[IncidentRecord],
    settings: &ProximitySettings,
    window: &TimeWindow,
) -> (Vec<AnnotatedSubject>, ProximityReport) {
    let in_window = window.filter(incidents);
    let radius_m = settings.radius_m;

    let annotated: Vec<AnnotatedSubject> = subjects
        .into_par_iter()
        .map(|subject| {
            let proximity = aggregate(&subject, in_window.iter().copied(), radius_m);
            AnnotatedSubject { subject, proximity }
        })
        .collect();

    let computed = annotated
        .iter()
        .filter(|a| a.proximity.metrics().is_some())
        .count();

    let report = ProximityReport {
        subjects: annotated.len(),
        computed,
        not_computable: annotated.len() - computed,
        incidents_in_window: in_window.len(),
        incidents_outside_window: incidents.len() - in_window.len(),
    };

    log::info!(
        "Proximity ({radius_m} m): {} subject(s) measured against {} crash(es), {} not computable, \
         {} crash(es) outside {}-{}",
        report.computed,
        report.incidents_in_window,
        report.not_computable,
        report.incidents_outside_window,
        window.start_year,
        window.end_year
    );

    (annotated, report)
}

#[cfg(test)]
mod tests {
    use safety_map_safety_models::{
        Dataset, GeocodeTier, InjuryCounts, Outcome, RankMetric, SubjectLocation,
    };
    use safety_map_street::{normalize, normalize_intersection};

    use super::*;

    fn subject(id: &str, point: Option<GeoPoint>) -> SubjectRecord {
        SubjectRecord {
            id: id.to_string(),
            dataset: Dataset::SignalStudy,
            request_type: "Traffic Signal".to_string(),
            location: SubjectLocation::Intersection(normalize_intersection(id, "GRAND AVE")),
            outcome: Outcome::Denied,
            requested_on: None,
            decided_on: None,
            external_reference: None,
            borough: None,
            denial_reason: None,
            point,
            geocode_tier: point.map(|_| GeocodeTier::Source),
        }
    }

    fn crash(point: GeoPoint, year: i32, injured: u32, ped: u32, killed: u32) -> IncidentRecord {
        IncidentRecord {
            id: format!("{year}-{}-{}", point.latitude, point.longitude),
            occurred_on: NaiveDate::from_ymd_opt(year, 7, 1).unwrap(),
            point,
            on_street: normalize("GRAND AVE"),
            off_street: normalize(""),
            injuries: InjuryCounts {
                persons_injured: injured,
                pedestrians_injured: ped,
                persons_killed: killed,
                ..InjuryCounts::default()
            },
        }
    }

    /// Offsets a point north by `meters`.
    fn north(p: GeoPoint, meters: f64) -> GeoPoint {
        GeoPoint::new(p.latitude + (meters / EARTH_RADIUS_M).to_degrees(), p.longitude)
    }

    #[test]
    fn distance_to_self_is_zero() {
        for p in [
            GeoPoint::new(40.7128, -74.0060),
            GeoPoint::new(-33.8688, 151.2093),
            GeoPoint::new(0.0001, 0.0001),
        ] {
            assert!(great_circle_distance(p, p).abs() < 1e-9);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(40.7128, -74.0060);
        let b = GeoPoint::new(40.7306, -73.9352);
        assert!((great_circle_distance(a, b) - great_circle_distance(b, a)).abs() < 1e-9);
    }

    #[test]
    fn known_pair_matches_reference_distance() {
        // City Hall to Williamsburg.
        let d = great_circle_distance(GeoPoint::new(40.7128, -74.0060), GeoPoint::new(40.7306, -73.9352));
        assert!((d - 6_286.0).abs() <= 62.9, "distance was {d} m");
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = great_circle_distance(GeoPoint::new(40.0, -73.9), GeoPoint::new(41.0, -73.9));
        assert!((d - 111_195.0).abs() < 1.0, "distance was {d} m");
    }

    #[test]
    fn no_incidents_is_zero_not_absent() {
        let located = subject("69 ST", Some(GeoPoint::new(40.72, -73.89)));
        let result = aggregate(&located, &Vec::<IncidentRecord>::new(), DEFAULT_RADIUS_M);
        assert_eq!(result, Proximity::Computed(ProximityMetrics::default()));
    }

    #[test]
    fn missing_point_is_not_computable() {
        let crashes = [crash(GeoPoint::new(40.72, -73.89), 2022, 1, 0, 0)];
        let unlocated = subject("69 ST", None);
        assert_eq!(aggregate(&unlocated, &crashes, DEFAULT_RADIUS_M), Proximity::NotComputable);
    }

    #[test]
    fn counts_only_crashes_within_radius() {
        let origin = GeoPoint::new(40.72, -73.89);
        let crashes = [
            crash(origin, 2022, 2, 1, 0),
            crash(north(origin, 100.0), 2022, 1, 0, 1),
            crash(north(origin, 149.0), 2022, 0, 0, 0),
            crash(north(origin, 151.0), 2022, 5, 5, 5),
            crash(north(origin, 1_000.0), 2022, 5, 5, 5),
        ];
        let Proximity::Computed(metrics) = aggregate(&subject("a", Some(origin)), &crashes, 150.0) else {
            panic!("expected computed metrics");
        };
        assert_eq!(metrics.get(RankMetric::Incidents), 3);
        assert_eq!(metrics.get(RankMetric::Injuries), 3);
        assert_eq!(metrics.get(RankMetric::PedestrianInjuries), 1);
        assert_eq!(metrics.get(RankMetric::Fatalities), 1);
    }

    #[test]
    fn window_excludes_crashes_before_distance_pass() {
        let origin = GeoPoint::new(40.72, -73.89);
        let crashes = vec![
            crash(origin, 2019, 1, 0, 0),
            crash(origin, 2020, 1, 0, 0),
            crash(origin, 2025, 1, 0, 0),
            crash(origin, 2026, 1, 0, 0),
        ];
        let (annotated, report) = annotate(
            vec![subject("a", Some(origin)), subject("b", None)],
            &crashes,
            &ProximitySettings::default(),
            &TimeWindow::default(),
        );

        assert_eq!(annotated[0].subject.id, "a");
        assert_eq!(annotated[0].proximity.metrics().map(|m| m.incidents), Some(2));
        assert_eq!(annotated[1].proximity, Proximity::NotComputable);
        assert_eq!(
            report,
            ProximityReport {
                subjects: 2,
                computed: 1,
                not_computable: 1,
                incidents_in_window: 2,
                incidents_outside_window: 2,
            }
        );
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(TimeWindow::new(2025, 2020).is_err());
        assert!(TimeWindow::new(2020, 2020).is_ok());
        assert!(ProximitySettings { radius_m: 0.0 }.validate().is_err());
        assert!(ProximitySettings { radius_m: f64::NAN }.validate().is_err());
        assert!(ProximitySettings::default().validate().is_ok());
    }
}
