//! Denial patterns among resolved requests.
//!
//! Only requests with a request date inside the [`TimeWindow`] are
//! counted. Rates use resolved requests (denied or approved); reason
//! categories and location rankings use denied ones.

use std::collections::BTreeMap;

use chrono::Datelike;
use safety_map_analytics_models::{
    DenialBreakdown, DenialRate, DenialReasonCategory, DenialReasonCount, DeniedLocation,
};
use safety_map_safety_models::{Dataset, Outcome, SubjectLocation, SubjectRecord};
use serde::{Deserialize, Serialize};

use crate::AnalyticsError;
use crate::proximity::TimeWindow;

const DATASETS: [Dataset; 2] = [Dataset::SignalStudy, Dataset::SpeedReducer];

/// Settings for the denial tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenialSettings {
    /// Number of locations kept in the most-denied rankings.
    pub top_n: usize,
}

impl Default for DenialSettings {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

impl DenialSettings {
    /// Checks the ranking length.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameter`] if `top_n` is zero.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.top_n == 0 {
            return Err(AnalyticsError::InvalidParameter {
                name: "denials.top_n",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Sorts a free-text speed reducer denial reason into a category.
///
/// Rules are checked in order and ignore case: a speed reading ("speed"
/// with "below" or "radar"), driveways or curb cuts, a short street or
/// block, stop control, bus, camera. A missing reason is
/// [`DenialReasonCategory::NotSpecified`].
#[must_use]
pub fn categorize_denial_reason(reason: Option<&str>) -> DenialReasonCategory {
    let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) else {
        return DenialReasonCategory::NotSpecified;
    };
    let r = reason.to_lowercase();
    if r.contains("speed") && (r.contains("below") || r.contains("radar")) {
        DenialReasonCategory::LowSpeed
    } else if r.contains("driveway") || r.contains("curb cut") {
        DenialReasonCategory::Driveways
    } else if r.contains("street too short") || r.contains("block") {
        DenialReasonCategory::StreetTooShort
    } else if r.contains("stop control") {
        DenialReasonCategory::StopControls
    } else if r.contains("bus") {
        DenialReasonCategory::BusRoute
    } else if r.contains("camera") {
        DenialReasonCategory::NearSpeedCamera
    } else {
        DenialReasonCategory::Other
    }
}

/// Request year of a subject, if it falls inside the window.
fn request_year(subject: &SubjectRecord, window: &TimeWindow) -> Option<i32> {
    subject
        .requested_on
        .filter(|d| window.contains(*d))
        .map(|d| d.year())
}

/// Subjects of one dataset with a request date in the window.
fn in_window<'a>(
    subjects: &'a [SubjectRecord],
    dataset: Dataset,
    window: &TimeWindow,
) -> Vec<(i32, &'a SubjectRecord)> {
    subjects
        .iter()
        .filter(|s| s.dataset == dataset)
        .filter_map(|s| request_year(s, window).map(|year| (year, s)))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn rates<K: Ord + ToString>(
    dataset: Dataset,
    items: impl IntoIterator<Item = (K, Outcome)>,
) -> Vec<DenialRate> {
    let mut groups: BTreeMap<K, (usize, usize)> = BTreeMap::new();
    for (key, outcome) in items {
        if !outcome.is_resolved() {
            continue;
        }
        let (total, denied) = groups.entry(key).or_default();
        *total += 1;
        if outcome == Outcome::Denied {
            *denied += 1;
        }
    }

    groups
        .into_iter()
        .map(|(key, (total, denied))| DenialRate {
            dataset,
            group: key.to_string(),
            total,
            denied,
            denial_rate: percentage(denied, total),
        })
        .collect()
}

/// Denial rate per dataset and request year, in year order.
#[must_use]
pub fn rates_by_year(subjects: &[SubjectRecord], window: &TimeWindow) -> Vec<DenialRate> {
    DATASETS
        .iter()
        .flat_map(|&dataset| {
            rates(
                dataset,
                in_window(subjects, dataset, window)
                    .into_iter()
                    .map(|(year, s)| (year, s.outcome)),
            )
        })
        .collect()
}

/// Denial rate per dataset and request type.
#[must_use]
pub fn rates_by_request_type(subjects: &[SubjectRecord], window: &TimeWindow) -> Vec<DenialRate> {
    DATASETS
        .iter()
        .flat_map(|&dataset| {
            rates(
                dataset,
                in_window(subjects, dataset, window)
                    .into_iter()
                    .map(|(_, s)| (s.request_type.as_str(), s.outcome)),
            )
        })
        .collect()
}

/// Signal study denial rate per borough. Requests without a borough are
/// skipped.
#[must_use]
pub fn rates_by_borough(subjects: &[SubjectRecord], window: &TimeWindow) -> Vec<DenialRate> {
    rates(
        Dataset::SignalStudy,
        in_window(subjects, Dataset::SignalStudy, window)
            .into_iter()
            .filter_map(|(_, s)| s.borough.as_deref().map(|b| (b, s.outcome))),
    )
}

/// Speed reducer denials by reason category.
///
/// Returns the totals over the window, most frequent first, and the
/// counts per request year, in year then category order.
#[must_use]
pub fn denial_reasons(
    subjects: &[SubjectRecord],
    window: &TimeWindow,
) -> (Vec<DenialReasonCount>, Vec<DenialReasonCount>) {
    let mut overall: BTreeMap<DenialReasonCategory, usize> = BTreeMap::new();
    let mut yearly: BTreeMap<(i32, DenialReasonCategory), usize> = BTreeMap::new();
    for (year, subject) in in_window(subjects, Dataset::SpeedReducer, window) {
        if subject.outcome != Outcome::Denied {
            continue;
        }
        let category = categorize_denial_reason(subject.denial_reason.as_deref());
        *overall.entry(category).or_default() += 1;
        *yearly.entry((year, category)).or_default() += 1;
    }

    let mut totals: Vec<DenialReasonCount> = overall
        .into_iter()
        .map(|(category, count)| DenialReasonCount {
            year: None,
            category,
            count,
        })
        .collect();
    totals.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));

    let by_year = yearly
        .into_iter()
        .map(|((year, category), count)| DenialReasonCount {
            year: Some(year),
            category,
            count,
        })
        .collect();

    (totals, by_year)
}

/// Counts denied requests per location key and ranks the `top_n`
/// locations with the most denials. Ties are ordered by label.
fn most_denied<'a>(
    subjects: &'a [SubjectRecord],
    dataset: Dataset,
    window: &TimeWindow,
    top_n: usize,
    label: impl Fn(&'a SubjectLocation) -> Option<(String, String)>,
) -> Vec<DeniedLocation> {
    // key -> (label, denials)
    let mut counts: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for (_, subject) in in_window(subjects, dataset, window) {
        if subject.outcome != Outcome::Denied {
            continue;
        }
        let Some((key, name)) = label(&subject.location) else {
            continue;
        };
        counts.entry(key).or_insert((name, 0)).1 += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_values().collect();
    ranked.sort_by(|(la, a), (lb, b)| b.cmp(a).then_with(|| la.cmp(lb)));
    ranked
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, (location, denials))| DeniedLocation {
            rank: i + 1,
            location,
            denials,
        })
        .collect()
}

/// Intersections with the most denied signal studies.
///
/// Reversed street orders of one intersection count together.
#[must_use]
pub fn most_denied_intersections(
    subjects: &[SubjectRecord],
    window: &TimeWindow,
    top_n: usize,
) -> Vec<DeniedLocation> {
    most_denied(subjects, Dataset::SignalStudy, window, top_n, |location| {
        location
            .intersection()
            .filter(|i| i.is_complete())
            .map(|i| (i.to_string(), i.display_name()))
    })
}

/// Streets with the most denied speed reducer segments. Each denied
/// segment counts once toward the street it runs along.
#[must_use]
pub fn most_denied_streets(
    subjects: &[SubjectRecord],
    window: &TimeWindow,
    top_n: usize,
) -> Vec<DeniedLocation> {
    most_denied(subjects, Dataset::SpeedReducer, window, top_n, |location| match location {
        SubjectLocation::Segment { on_street, .. } if !on_street.is_empty() => {
            Some((on_street.to_string(), on_street.display_name()))
        }
        _ => None,
    })
}

/// Every denial breakdown for the requests in the study area.
#[must_use]
pub fn denial_breakdown(
    subjects: &[SubjectRecord],
    window: &TimeWindow,
    settings: &DenialSettings,
) -> DenialBreakdown {
    let top_n = settings.top_n;
    let (reasons, reasons_by_year) = denial_reasons(subjects, window);
    let breakdown = DenialBreakdown {
        by_year: rates_by_year(subjects, window),
        by_request_type: rates_by_request_type(subjects, window),
        by_borough: rates_by_borough(subjects, window),
        reasons,
        reasons_by_year,
        most_denied_intersections: most_denied_intersections(subjects, window, top_n),
        most_denied_streets: most_denied_streets(subjects, window, top_n),
    };
    log::info!(
        "Denial breakdown: {} year group(s), {} request type group(s), {} reason categories, {} intersection(s), {} street(s)",
        breakdown.by_year.len(),
        breakdown.by_request_type.len(),
        breakdown.reasons.len(),
        breakdown.most_denied_intersections.len(),
        breakdown.most_denied_streets.len()
    );
    breakdown
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use safety_map_street::{normalize, normalize_intersection};

    use super::*;

    fn request(
        id: &str,
        dataset: Dataset,
        outcome: Outcome,
        year: Option<i32>,
        location: SubjectLocation,
    ) -> SubjectRecord {
        SubjectRecord {
            id: id.to_string(),
            dataset,
            request_type: match dataset {
                Dataset::SignalStudy => "Traffic Signal".to_string(),
                Dataset::SpeedReducer => "Speed Bump".to_string(),
            },
            location,
            outcome,
            requested_on: year.and_then(|y| NaiveDate::from_ymd_opt(y, 6, 1)),
            decided_on: None,
            external_reference: None,
            borough: None,
            denial_reason: None,
            point: None,
            geocode_tier: None,
        }
    }

    fn study(id: &str, outcome: Outcome, year: Option<i32>, a: &str, b: &str) -> SubjectRecord {
        request(
            id,
            Dataset::SignalStudy,
            outcome,
            year,
            SubjectLocation::Intersection(normalize_intersection(a, b)),
        )
    }

    fn segment(id: &str, outcome: Outcome, year: i32, on: &str, reason: Option<&str>) -> SubjectRecord {
        let mut record = request(
            id,
            Dataset::SpeedReducer,
            outcome,
            Some(year),
            SubjectLocation::Segment {
                on_street: normalize(on),
                from_street: normalize("60 ST"),
                to_street: normalize("61 ST"),
            },
        );
        record.denial_reason = reason.map(ToString::to_string);
        record
    }

    #[test]
    fn categorizes_reasons_in_rule_order() {
        let cases = [
            (Some("Speed below 30 mph"), DenialReasonCategory::LowSpeed),
            (Some("RADAR SPEED STUDY"), DenialReasonCategory::LowSpeed),
            (Some("Too many driveways"), DenialReasonCategory::Driveways),
            (Some("curb cuts on block"), DenialReasonCategory::Driveways),
            (Some("Block too short"), DenialReasonCategory::StreetTooShort),
            (Some("Existing stop control"), DenialReasonCategory::StopControls),
            (Some("Bus route"), DenialReasonCategory::BusRoute),
            (Some("Speed camera nearby"), DenialReasonCategory::NearSpeedCamera),
            (Some("Emergency route"), DenialReasonCategory::Other),
            (Some("  "), DenialReasonCategory::NotSpecified),
            (None, DenialReasonCategory::NotSpecified),
        ];
        for (reason, expected) in cases {
            assert_eq!(categorize_denial_reason(reason), expected, "{reason:?}");
        }
    }

    #[test]
    fn yearly_rates_count_resolved_requests_in_window() {
        let subjects = [
            study("1", Outcome::Denied, Some(2020), "GRAND AVE", "69 ST"),
            study("2", Outcome::Approved, Some(2020), "GRAND AVE", "69 ST"),
            study("3", Outcome::Denied, Some(2021), "ELIOT AVE", "80 ST"),
            study("4", Outcome::Pending, Some(2021), "ELIOT AVE", "80 ST"),
            study("5", Outcome::Denied, Some(2019), "ELIOT AVE", "80 ST"),
            study("6", Outcome::Denied, None, "ELIOT AVE", "80 ST"),
            segment("7", Outcome::Approved, 2022, "METROPOLITAN AVE", None),
        ];
        let rates = rates_by_year(&subjects, &TimeWindow::default());

        assert_eq!(rates.len(), 3);
        assert_eq!(rates[0].group, "2020");
        assert_eq!((rates[0].total, rates[0].denied), (2, 1));
        assert!((rates[0].denial_rate - 50.0).abs() < 1e-9);
        assert_eq!(rates[1].group, "2021");
        assert_eq!((rates[1].total, rates[1].denied), (1, 1));
        assert_eq!(rates[2].dataset, Dataset::SpeedReducer);
        assert!(rates[2].denial_rate.abs() < 1e-9);
    }

    #[test]
    fn request_type_and_borough_rates() {
        let mut signal = study("1", Outcome::Denied, Some(2021), "GRAND AVE", "69 ST");
        signal.borough = Some("Queens".to_string());
        let mut stop = study("2", Outcome::Approved, Some(2021), "GRAND AVE", "69 ST");
        stop.request_type = "All-Way Stop".to_string();
        stop.borough = Some("Brooklyn".to_string());
        let unknown = study("3", Outcome::Denied, Some(2021), "ELIOT AVE", "80 ST");
        let bump = segment("4", Outcome::Denied, 2021, "ELIOT AVE", None);
        let subjects = [signal, stop, unknown, bump];
        let window = TimeWindow::default();

        let by_type = rates_by_request_type(&subjects, &window);
        let groups: Vec<(&str, usize, usize)> = by_type
            .iter()
            .map(|r| (r.group.as_str(), r.total, r.denied))
            .collect();
        assert_eq!(
            groups,
            [("All-Way Stop", 1, 0), ("Traffic Signal", 2, 2), ("Speed Bump", 1, 1)]
        );

        let by_borough = rates_by_borough(&subjects, &window);
        let boroughs: Vec<&str> = by_borough.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(boroughs, ["Brooklyn", "Queens"]);
        assert!((by_borough[1].denial_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn reasons_count_denied_segments_only() {
        let subjects = [
            segment("1", Outcome::Denied, 2021, "ELIOT AVE", Some("Speed below 30 mph")),
            segment("2", Outcome::Denied, 2022, "ELIOT AVE", Some("radar speed 22 mph")),
            segment("3", Outcome::Denied, 2022, "ELIOT AVE", Some("bus route")),
            segment("4", Outcome::Denied, 2022, "ELIOT AVE", None),
            segment("5", Outcome::Approved, 2022, "ELIOT AVE", Some("bus route")),
            segment("6", Outcome::Denied, 2018, "ELIOT AVE", Some("bus route")),
        ];
        let (totals, by_year) = denial_reasons(&subjects, &TimeWindow::default());

        assert_eq!(totals[0].category, DenialReasonCategory::LowSpeed);
        assert_eq!(totals[0].count, 2);
        assert_eq!(totals.iter().map(|c| c.count).sum::<usize>(), 4);
        assert!(totals.iter().all(|c| c.year.is_none()));

        assert_eq!(by_year[0].year, Some(2021));
        assert_eq!(by_year[0].category, DenialReasonCategory::LowSpeed);
        assert_eq!(by_year.len(), 4);
    }

    #[test]
    fn reversed_intersections_count_together() {
        let subjects = [
            study("1", Outcome::Denied, Some(2021), "GRAND AVE", "69 ST"),
            study("2", Outcome::Denied, Some(2022), "69 STREET", "Grand Avenue"),
            study("3", Outcome::Denied, Some(2022), "ELIOT AVE", "80 ST"),
            study("4", Outcome::Approved, Some(2022), "ELIOT AVE", "80 ST"),
            study("5", Outcome::Denied, Some(2022), "METROPOLITAN AVE", "60 ST"),
        ];
        let ranked = most_denied_intersections(&subjects, &TimeWindow::default(), 2);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].location, "69 Street & Grand Avenue");
        assert_eq!(ranked[0].denials, 2);
        assert_eq!(ranked[1].location, "60 Street & Metropolitan Avenue");
        assert_eq!(ranked[1].denials, 1);
    }

    #[test]
    fn streets_rank_denied_segments() {
        let subjects = [
            segment("1", Outcome::Denied, 2021, "ELIOT AVE", None),
            segment("2", Outcome::Denied, 2022, "Eliot Avenue", None),
            segment("3", Outcome::Denied, 2022, "CALDWELL AVE", None),
            segment("4", Outcome::Approved, 2022, "CALDWELL AVE", None),
        ];
        let ranked = most_denied_streets(&subjects, &TimeWindow::default(), 10);
        let rows: Vec<(&str, usize)> = ranked.iter().map(|r| (r.location.as_str(), r.denials)).collect();
        assert_eq!(rows, [("Eliot Avenue", 2), ("Caldwell Avenue", 1)]);
    }

    #[test]
    fn zero_top_n_is_rejected() {
        assert!(DenialSettings::default().validate().is_ok());
        assert!(DenialSettings { top_n: 0 }.validate().is_err());
    }

    #[test]
    fn breakdown_collects_every_view() {
        let subjects = [
            study("1", Outcome::Denied, Some(2021), "GRAND AVE", "69 ST"),
            segment("2", Outcome::Denied, 2021, "ELIOT AVE", Some("driveways")),
        ];
        let breakdown =
            denial_breakdown(&subjects, &TimeWindow::default(), &DenialSettings::default());
        assert_eq!(breakdown.by_year.len(), 2);
        assert_eq!(breakdown.by_request_type.len(), 2);
        assert!(breakdown.by_borough.is_empty());
        assert_eq!(breakdown.reasons[0].category, DenialReasonCategory::Driveways);
        assert_eq!(breakdown.most_denied_intersections.len(), 1);
        assert_eq!(breakdown.most_denied_streets.len(), 1);
    }
}
