//! Straight-line street approximations for the last-resort tier.
//!
//! Every street seen in a corpus contributes the median point of each of
//! its known intersections. A least-squares fit of latitude against
//! longitude through those points stands in for the street's centerline;
//! two such lines cross near the requested intersection.

use std::collections::BTreeMap;

use safety_map_geography_models::GeoPoint;
use safety_map_street::StreetName;

use crate::GeocoderSettings;
use crate::corpus::PairCorpus;

/// A fitted `latitude = slope * longitude + intercept` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreetLine {
    /// Degrees of latitude per degree of longitude.
    pub slope: f64,
    /// Latitude at longitude zero.
    pub intercept: f64,
}

impl StreetLine {
    /// Least-squares fit through `points`.
    ///
    /// Returns `None` with fewer than `min_points` points, or when the
    /// longitudes are too tightly bunched (a north-south street) for the
    /// slope to be meaningful.
    #[must_use]
    pub fn fit(points: &[GeoPoint], min_points: usize, min_longitude_spread: f64) -> Option<Self> {
        if points.len() < min_points.max(2) {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let n = points.len() as f64;
        let mean_lon = points.iter().map(|p| p.longitude).sum::<f64>() / n;
        let mean_lat = points.iter().map(|p| p.latitude).sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for p in points {
            let dx = p.longitude - mean_lon;
            sxx += dx * dx;
            sxy += dx * (p.latitude - mean_lat);
        }

        if (sxx / n).sqrt() < min_longitude_spread {
            return None;
        }

        let slope = sxy / sxx;
        Some(Self {
            slope,
            intercept: mean_lat - slope * mean_lon,
        })
    }

    /// Where this line crosses `other`.
    ///
    /// Returns `None` when the lines meet at less than
    /// `min_angle_degrees`, since nearly parallel fits produce crossings
    /// far from either street.
    #[must_use]
    pub fn intersect(&self, other: &Self, min_angle_degrees: f64) -> Option<GeoPoint> {
        let raw = (self.slope.atan() - other.slope.atan()).abs().to_degrees();
        let angle = raw.min(180.0 - raw);
        if angle < min_angle_degrees {
            return None;
        }

        let longitude = (other.intercept - self.intercept) / (self.slope - other.slope);
        let latitude = self.slope.mul_add(longitude, self.intercept);
        (latitude.is_finite() && longitude.is_finite()).then(|| GeoPoint::new(latitude, longitude))
    }
}

/// Fitted lines for every street with enough reference points.
#[derive(Debug, Clone, Default)]
pub struct StreetLines {
    lines: BTreeMap<StreetName, StreetLine>,
}

impl StreetLines {
    /// Fits a line per street from the median points of every corpus.
    #[must_use]
    pub fn build(corpora: &[&PairCorpus], settings: &GeocoderSettings) -> Self {
        let mut points: BTreeMap<&StreetName, Vec<GeoPoint>> = BTreeMap::new();
        for corpus in corpora {
            for (key, point) in corpus.medians() {
                for street in key.streets() {
                    points.entry(street).or_default().push(point);
                }
            }
        }

        let candidates = points.len();
        let lines: BTreeMap<StreetName, StreetLine> = points
            .into_iter()
            .filter_map(|(street, pts)| {
                StreetLine::fit(
                    &pts,
                    settings.min_points_per_street,
                    settings.min_longitude_spread,
                )
                .map(|line| (street.clone(), line))
            })
            .collect();

        log::info!(
            "Street lines: fitted {} of {candidates} street(s)",
            lines.len()
        );

        Self { lines }
    }

    /// The fitted line for a street.
    #[must_use]
    pub fn get(&self, street: &StreetName) -> Option<&StreetLine> {
        self.lines.get(street)
    }

    /// Number of fitted streets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether no street could be fitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
