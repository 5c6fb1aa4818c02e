//! Denied versus approved comparisons.

use safety_map_analytics_models::{GroupSummary, OutcomeComparison};
use safety_map_safety_models::{AnnotatedSubject, Dataset, Outcome, RankMetric};

use crate::stats::{StatisticsSettings, mann_whitney_u, mean, median};

/// Summarizes one group of metric values.
#[must_use]
pub fn summarize(values: &[f64]) -> GroupSummary {
    GroupSummary {
        n: values.len(),
        mean: mean(values),
        median: median(values),
    }
}

fn metric_values(
    subjects: &[AnnotatedSubject],
    dataset: Option<Dataset>,
    outcome: Outcome,
    metric: RankMetric,
) -> Vec<f64> {
    subjects
        .iter()
        .filter(|s| s.subject.outcome == outcome)
        .filter(|s| dataset.is_none_or(|d| s.subject.dataset == d))
        .filter_map(|s| s.proximity.metrics())
        .map(|m| f64::from(m.get(metric)))
        .collect()
}

/// Compares denied against approved subjects for one dataset (or all,
/// with `None`) on one metric.
///
/// Pending and not-computable subjects are left out of both groups.
#[must_use]
pub fn compare_group(
    subjects: &[AnnotatedSubject],
    dataset: Option<Dataset>,
    metric: RankMetric,
    settings: &StatisticsSettings,
) -> OutcomeComparison {
    let denied = metric_values(subjects, dataset, Outcome::Denied, metric);
    let approved = metric_values(subjects, dataset, Outcome::Approved, metric);
    let test = mann_whitney_u(&denied, &approved, settings.min_sample_size);

    OutcomeComparison {
        dataset,
        metric,
        denied: summarize(&denied),
        approved: summarize(&approved),
        significant: test.is_significant(settings.significance_level),
        test,
    }
}

/// Compares denied against approved subjects for every dataset present,
/// and for all datasets combined, on every metric.
#[must_use]
pub fn compare_outcomes(
    subjects: &[AnnotatedSubject],
    settings: &StatisticsSettings,
) -> Vec<OutcomeComparison> {
    let mut datasets: Vec<Option<Dataset>> = [Dataset::SignalStudy, Dataset::SpeedReducer]
        .into_iter()
        .filter(|d| subjects.iter().any(|s| s.subject.dataset == *d))
        .map(Some)
        .collect();
    datasets.push(None);

    let comparisons: Vec<OutcomeComparison> = datasets
        .into_iter()
        .flat_map(|dataset| {
            RankMetric::all()
                .iter()
                .map(move |&metric| compare_group(subjects, dataset, metric, settings))
        })
        .collect();

    for c in comparisons.iter().filter(|c| c.metric == RankMetric::Incidents) {
        log::info!(
            "{}: denied median {:?} (n={}) vs approved median {:?} (n={}), U={}, p={:.4} [{}]",
            c.dataset_label(),
            c.denied.median,
            c.denied.n,
            c.approved.median,
            c.approved.n,
            c.test.u,
            c.test.p_value,
            c.test.confidence
        );
    }

    comparisons
}
