//! Mann-Whitney U test.
//!
//! Values are ranked together with tied values sharing their average
//! rank. The p-value comes from the normal approximation with the tie
//! correction applied to the variance, for every sample size; results
//! from groups smaller than the minimum sample size are flagged
//! [`SampleConfidence::LowSample`] instead of being withheld.

use safety_map_analytics_models::{MannWhitneyResult, SampleConfidence};
use serde::{Deserialize, Serialize};

use crate::AnalyticsError;

/// Group size below which a result is flagged low confidence.
pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 8;

/// Settings for outcome comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsSettings {
    /// Smallest group size treated as reliable.
    pub min_sample_size: usize,
    /// p-value below which a difference is reported as significant.
    pub significance_level: f64,
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            significance_level: 0.05,
        }
    }
}

impl StatisticsSettings {
    /// Checks the significance level is a probability.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidParameter`] if the level is not in
    /// the open interval (0, 1).
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.significance_level > 0.0 && self.significance_level < 1.0 {
            Ok(())
        } else {
            Err(AnalyticsError::InvalidParameter {
                name: "statistics.significance_level",
                message: format!("expected a value in (0, 1), got {}", self.significance_level),
            })
        }
    }
}

/// Two-sided Mann-Whitney U test of `sample_a` against `sample_b`.
///
/// Non-finite values are ignored. An empty sample, or samples whose
/// values are all identical, yield a [`SampleConfidence::Degenerate`]
/// result with `U = n_a * n_b / 2` and `p = 1`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn mann_whitney_u(sample_a: &[f64], sample_b: &[f64], min_sample_size: usize) -> MannWhitneyResult {
    let a: Vec<f64> = sample_a.iter().copied().filter(|v| v.is_finite()).collect();
    let b: Vec<f64> = sample_b.iter().copied().filter(|v| v.is_finite()).collect();
    let (n_a, n_b) = (a.len(), b.len());

    let degenerate = MannWhitneyResult {
        u: (n_a * n_b) as f64 / 2.0,
        z: 0.0,
        p_value: 1.0,
        n_a,
        n_b,
        confidence: SampleConfidence::Degenerate,
    };
    if n_a == 0 || n_b == 0 {
        return degenerate;
    }

    let mut combined: Vec<(f64, bool)> = a
        .iter()
        .map(|&v| (v, true))
        .chain(b.iter().map(|&v| (v, false)))
        .collect();
    combined.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut rank_sum_a = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < combined.len() {
        let mut j = i + 1;
        while j < combined.len() && combined[j].0 == combined[i].0 {
            j += 1;
        }
        // Positions i..j (0-based) share ranks i+1..=j.
        let average_rank = (i + 1 + j) as f64 / 2.0;
        let in_a = combined[i..j].iter().filter(|(_, from_a)| *from_a).count();
        rank_sum_a += average_rank * in_a as f64;

        let t = (j - i) as f64;
        tie_term += t.powi(3) - t;
        i = j;
    }

    let n1 = n_a as f64;
    let n2 = n_b as f64;
    let n = n1 + n2;
    let u = rank_sum_a - n1 * (n1 + 1.0) / 2.0;
    let mean = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));

    if variance <= 0.0 {
        return MannWhitneyResult { u, ..degenerate };
    }

    let z = (u - mean) / variance.sqrt();
    let p_value = (2.0 * upper_tail(z.abs())).clamp(0.0, 1.0);

    let confidence = if n_a.min(n_b) < min_sample_size {
        SampleConfidence::LowSample
    } else {
        SampleConfidence::Normal
    };

    MannWhitneyResult {
        u,
        z,
        p_value,
        n_a,
        n_b,
        confidence,
    }
}

/// Standard normal upper tail `P(Z > x)` for `x >= 0`
/// (Abramowitz and Stegun 26.2.17, absolute error below 7.5e-8).
fn upper_tail(x: f64) -> f64 {
    const P: f64 = 0.231_641_9;
    const B: [f64; 5] = [
        0.319_381_530,
        -0.356_563_782,
        1.781_477_937,
        -1.821_255_978,
        1.330_274_429,
    ];
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

    let t = 1.0 / P.mul_add(x, 1.0);
    let poly = B.iter().rev().fold(0.0_f64, |acc, &b| acc.mul_add(t, b)) * t;
    INV_SQRT_2PI * (-0.5 * x * x).exp() * poly
}

/// Median of a sample, or `None` if it is empty.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(f64::midpoint(sorted[mid - 1], sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

/// Arithmetic mean of a sample, or `None` if it is empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_samples_are_not_significant() {
        let sample = [3.0, 7.0, 1.0, 9.0, 4.0, 4.0, 12.0, 0.0];
        let result = mann_whitney_u(&sample, &sample, DEFAULT_MIN_SAMPLE_SIZE);
        assert!((result.p_value - 1.0).abs() < 1e-6, "p was {}", result.p_value);
        assert!((result.u - 32.0).abs() < 1e-9);
        assert_eq!(result.confidence, SampleConfidence::Normal);
    }

    #[test]
    fn separated_samples_are_significant() {
        let result = mann_whitney_u(&[1.0, 2.0, 3.0], &[100.0, 101.0, 102.0], DEFAULT_MIN_SAMPLE_SIZE);
        assert!(result.p_value < 0.05, "p was {}", result.p_value);
        assert!(result.u.abs() < 1e-9);
        assert!((result.z - -1.964).abs() < 1e-3);
        assert_eq!(result.confidence, SampleConfidence::LowSample);
    }

    #[test]
    fn u_counts_pairwise_wins() {
        // A beats B in 5 of 6 pairs and ties none.
        let result = mann_whitney_u(&[4.0, 6.0], &[1.0, 2.0, 5.0], 1);
        assert!((result.u - 5.0).abs() < 1e-9);
    }

    #[test]
    fn ties_share_average_rank() {
        // Ranks: 1 -> 1, 2,2,2 -> 3, 5 -> 5. A = {2, 5} has rank sum 8.
        let result = mann_whitney_u(&[2.0, 5.0], &[1.0, 2.0, 2.0], 1);
        assert!((result.u - 5.0).abs() < 1e-9);
        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
    }

    #[test]
    fn empty_sample_is_degenerate() {
        let result = mann_whitney_u(&[], &[1.0, 2.0], DEFAULT_MIN_SAMPLE_SIZE);
        assert_eq!(result.confidence, SampleConfidence::Degenerate);
        assert!((result.p_value - 1.0).abs() < f64::EPSILON);
        assert_eq!((result.n_a, result.n_b), (0, 2));
    }

    #[test]
    fn constant_values_are_degenerate() {
        let result = mann_whitney_u(&[0.0, 0.0, 0.0], &[0.0, 0.0], DEFAULT_MIN_SAMPLE_SIZE);
        assert_eq!(result.confidence, SampleConfidence::Degenerate);
        assert!((result.p_value - 1.0).abs() < f64::EPSILON);
        assert!((result.u - 3.0).abs() < 1e-9);
    }

    #[test]
    fn ignores_non_finite_values() {
        let result = mann_whitney_u(&[1.0, f64::NAN], &[2.0, f64::INFINITY], 1);
        assert_eq!((result.n_a, result.n_b), (1, 1));
    }

    #[test]
    fn normal_tail_matches_reference_values() {
        assert!((upper_tail(0.0) - 0.5).abs() < 1e-7);
        assert!((upper_tail(1.959_964) - 0.025).abs() < 1e-6);
        assert!((upper_tail(3.0) - 0.001_349_898).abs() < 1e-7);
    }

    #[test]
    fn median_and_mean() {
        assert_eq!(median(&[20.0, 15.0, 10.0]), Some(15.0));
        assert_eq!(median(&[5.0, 4.0, 3.0, 6.0]), Some(4.5));
        assert_eq!(median(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
    }
}
