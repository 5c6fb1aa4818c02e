//! Crash totals by street.

use std::collections::BTreeMap;

use safety_map_analytics_models::StreetHotspot;
use safety_map_safety_models::{IncidentRecord, ProximityMetrics, RankMetric};
use safety_map_street::StreetName;

use crate::proximity::TimeWindow;

/// Groups in-window crashes by the street they were reported on and
/// returns the `top_n` streets by `metric`.
///
/// Street names are already normalized, so abbreviation variants of one
/// street land in the same group. Crashes with no on-street name are
/// skipped.
#[must_use]
pub fn street_hotspots(
    incidents: &[IncidentRecord],
    window: &TimeWindow,
    metric: RankMetric,
    top_n: usize,
) -> Vec<StreetHotspot> {
    let mut totals: BTreeMap<&StreetName, ProximityMetrics> = BTreeMap::new();
    for incident in window.filter(incidents) {
        if incident.on_street.is_empty() {
            continue;
        }
        totals
            .entry(&incident.on_street)
            .or_default()
            .add(&incident.injuries);
    }

    let mut ranked: Vec<(&StreetName, ProximityMetrics)> = totals.into_iter().collect();
    ranked.sort_by(|(sa, a), (sb, b)| b.get(metric).cmp(&a.get(metric)).then_with(|| sa.cmp(sb)));

    ranked
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, (street, totals))| StreetHotspot {
            rank: i + 1,
            street: street.clone(),
            totals,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use safety_map_geography_models::GeoPoint;
    use safety_map_safety_models::InjuryCounts;
    use safety_map_street::normalize;

    use super::*;

    fn crash(on: &str, year: i32, injured: u32) -> IncidentRecord {
        IncidentRecord {
            id: format!("{on}-{year}-{injured}"),
            occurred_on: NaiveDate::from_ymd_opt(year, 1, 15).unwrap(),
            point: GeoPoint::new(40.71, -73.89),
            on_street: normalize(on),
            off_street: normalize(""),
            injuries: InjuryCounts {
                persons_injured: injured,
                ..InjuryCounts::default()
            },
        }
    }

    #[test]
    fn merges_variants_and_ranks() {
        let incidents = [
            crash("METROPOLITAN AVE", 2021, 1),
            crash("Metropolitan Avenue", 2022, 0),
            crash("METROPOLITAN AVENUE ", 2023, 2),
            crash("FRESH POND RD", 2021, 4),
            crash("FRESH POND ROAD", 2019, 9),
            crash("", 2022, 3),
        ];

        let by_crashes = street_hotspots(&incidents, &TimeWindow::default(), RankMetric::Incidents, 10);
        assert_eq!(by_crashes.len(), 2);
        assert_eq!(by_crashes[0].street.as_str(), "METROPOLITAN AVENUE");
        assert_eq!(by_crashes[0].totals.incidents, 3);
        assert_eq!(by_crashes[0].rank, 1);

        let by_injuries = street_hotspots(&incidents, &TimeWindow::default(), RankMetric::Injuries, 1);
        assert_eq!(by_injuries.len(), 1);
        assert_eq!(by_injuries[0].street.as_str(), "FRESH POND ROAD");
        assert_eq!(by_injuries[0].totals.injuries, 4);
    }
}
