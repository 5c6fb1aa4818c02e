#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analysis configuration.
//!
//! One [`AnalysisConfig`] value carries every tunable of a run. The
//! defaults are embedded from `default.toml` at compile time; a user file
//! replaces them section by section, and command-line flags override
//! individual values through [`ConfigOverrides`]. Components receive the
//! sections they need by reference.

use std::path::{Path, PathBuf};

use safety_map_analytics::AnalyticsError;
use safety_map_analytics::dedupe::DedupeSettings;
use safety_map_analytics::denials::DenialSettings;
use safety_map_analytics::proximity::{ProximitySettings, TimeWindow};
use safety_map_analytics::stats::StatisticsSettings;
use safety_map_geocoder::GeocoderSettings;
use safety_map_ingest::IngestSettings;
use safety_map_spatial::boundary::FeatureSelector;
use serde::{Deserialize, Serialize};

/// Default configuration, embedded at compile time.
const DEFAULT_TOML: &str = include_str!("../default.toml");

/// Errors loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path to the file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`AnalysisConfig`].
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// An analysis parameter is out of range.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// A non-analysis setting is out of range.
    #[error("invalid setting {name}: {message}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Where the input feeds live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Directory the feed files are read from.
    pub data_dir: PathBuf,
    /// Signal study export for the study area, relative to `data_dir`.
    pub signal_studies: PathBuf,
    /// Speed reducer export, relative to `data_dir`.
    pub speed_reducers: PathBuf,
    /// Crash export, relative to `data_dir`.
    pub crashes: PathBuf,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data_raw"),
            signal_studies: PathBuf::from("signal_studies_cb5.csv"),
            speed_reducers: PathBuf::from("srts_citywide.csv"),
            crashes: PathBuf::from("crashes_queens_2020plus.csv"),
        }
    }
}

/// Target-area boundary source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundarySettings {
    /// Local `GeoJSON` file, relative to the data directory.
    pub path: PathBuf,
    /// Collection downloaded when the local file is missing.
    pub url: Option<String>,
    /// Property identifying the target feature in the collection.
    pub feature_property: Option<String>,
    /// Value of [`Self::feature_property`] for the target feature.
    pub feature_value: Option<String>,
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cb5_boundary.geojson"),
            url: Some(
                "https://raw.githubusercontent.com/nycehs/NYC_geography/master/CD.geo.json"
                    .to_string(),
            ),
            feature_property: Some("GEOCODE".to_string()),
            feature_value: Some("405".to_string()),
        }
    }
}

impl BoundarySettings {
    /// The feature selector, if both property and value are set.
    #[must_use]
    pub fn selector(&self) -> Option<FeatureSelector> {
        match (&self.feature_property, &self.feature_value) {
            (Some(property), Some(value)) => Some(FeatureSelector {
                property: property.clone(),
                value: value.clone(),
            }),
            _ => None,
        }
    }
}

/// Where results are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Output directory for tables and the summary.
    pub directory: PathBuf,
    /// Geocode cache file, relative to [`Self::directory`].
    pub geocode_cache: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            geocode_cache: PathBuf::from("geocode_cache_signal_studies.csv"),
        }
    }
}

/// Every tunable of an analysis run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Input feed locations.
    pub input: InputSettings,
    /// Target-area boundary.
    pub boundary: BoundarySettings,
    /// Output locations.
    pub output: OutputSettings,
    /// Crash counting radius.
    pub proximity: ProximitySettings,
    /// Crash years counted.
    pub time_window: TimeWindow,
    /// Street-line geocoding tolerances.
    pub geocoder: GeocoderSettings,
    /// Hotspot ranking.
    pub dedupe: DedupeSettings,
    /// Denial tables.
    pub denials: DenialSettings,
    /// Outcome comparisons.
    pub statistics: StatisticsSettings,
    /// Feed filtering rules.
    pub ingest: IngestSettings,
}

/// Command-line values that replace configured ones.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces [`InputSettings::data_dir`].
    pub data_dir: Option<PathBuf>,
    /// Replaces [`OutputSettings::directory`].
    pub output_dir: Option<PathBuf>,
    /// Replaces [`ProximitySettings::radius_m`].
    pub radius_m: Option<f64>,
    /// Replaces [`DedupeSettings::top_n`].
    pub top_n: Option<usize>,
}

impl AnalysisConfig {
    /// The embedded default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the embedded `default.toml` is malformed, which the tests
    /// rule out.
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml(DEFAULT_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded default.toml: {e}"))
    }

    /// Parses a configuration document. Missing sections and fields take
    /// their built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the document is malformed.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(contents)?)
    }

    /// Loads the configuration from `path`, or the embedded defaults when
    /// no path is given, and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse,
    /// or holds out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Self::from_toml(&contents)?
            }
            None => Self::embedded(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides and re-validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an override is out of range.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(dir) = overrides.data_dir {
            self.input.data_dir = dir;
        }
        if let Some(dir) = overrides.output_dir {
            self.output.directory = dir;
        }
        if let Some(radius_m) = overrides.radius_m {
            self.proximity.radius_m = radius_m;
        }
        if let Some(top_n) = overrides.top_n {
            self.dedupe.top_n = top_n;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks every section for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.proximity.validate()?;
        self.time_window.validate()?;
        self.dedupe.validate()?;
        self.denials.validate()?;
        self.statistics.validate()?;

        if self.dedupe.top_n == 0 {
            return Err(ConfigError::Invalid {
                name: "dedupe.top_n",
                message: "must be at least 1".to_string(),
            });
        }
        if self.geocoder.min_points_per_street < 2 {
            return Err(ConfigError::Invalid {
                name: "geocoder.min_points_per_street",
                message: format!(
                    "a line needs at least 2 points, got {}",
                    self.geocoder.min_points_per_street
                ),
            });
        }
        let angle = self.geocoder.min_intersection_angle_deg;
        if !(angle > 0.0 && angle < 90.0) {
            return Err(ConfigError::Invalid {
                name: "geocoder.min_intersection_angle_deg",
                message: format!("expected a value in (0, 90), got {angle}"),
            });
        }
        let spread = self.geocoder.min_longitude_spread;
        if !(spread.is_finite() && spread >= 0.0) {
            return Err(ConfigError::Invalid {
                name: "geocoder.min_longitude_spread",
                message: format!("expected a non-negative number, got {spread}"),
            });
        }
        if self.boundary.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                name: "boundary.path",
                message: "a local boundary file path is required".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved signal study feed path.
    #[must_use]
    pub fn signal_studies_path(&self) -> PathBuf {
        self.input.data_dir.join(&self.input.signal_studies)
    }

    /// Resolved speed reducer feed path.
    #[must_use]
    pub fn speed_reducers_path(&self) -> PathBuf {
        self.input.data_dir.join(&self.input.speed_reducers)
    }

    /// Resolved crash feed path.
    #[must_use]
    pub fn crashes_path(&self) -> PathBuf {
        self.input.data_dir.join(&self.input.crashes)
    }

    /// Resolved boundary file path.
    #[must_use]
    pub fn boundary_path(&self) -> PathBuf {
        self.input.data_dir.join(&self.boundary.path)
    }

    /// Resolved geocode cache path.
    #[must_use]
    pub fn geocode_cache_path(&self) -> PathBuf {
        self.output.directory.join(&self.output.geocode_cache)
    }

    /// Minimum separation between ranked hotspots, in meters.
    #[must_use]
    pub fn dedupe_radius_m(&self) -> f64 {
        self.dedupe.effective_radius(self.proximity.radius_m)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use safety_map_analytics::proximity::DEFAULT_RADIUS_M;

    use super::*;

    #[test]
    fn embedded_defaults_parse_and_validate() {
        let config = AnalysisConfig::embedded();
        config.validate().unwrap();
        assert_eq!(config, AnalysisConfig::default());

        assert!((config.proximity.radius_m - DEFAULT_RADIUS_M).abs() < f64::EPSILON);
        assert_eq!(config.time_window, TimeWindow::default());
        assert_eq!(config.dedupe.top_n, 25);
        assert_eq!(config.denials, DenialSettings::default());
        assert_eq!(config.statistics, StatisticsSettings::default());
        assert_eq!(config.ingest, IngestSettings::default());
        assert_eq!(config.geocoder, GeocoderSettings::default());
        assert_eq!(
            config.boundary.selector(),
            Some(FeatureSelector {
                property: "GEOCODE".to_string(),
                value: "405".to_string(),
            })
        );
    }

    #[test]
    fn dedupe_radius_follows_proximity_radius() {
        let config = AnalysisConfig::from_toml("[proximity]\nradius_m = 200.0\n").unwrap();
        assert!((config.dedupe_radius_m() - 200.0).abs() < f64::EPSILON);

        let config = AnalysisConfig::from_toml(
            "[proximity]\nradius_m = 200.0\n[dedupe]\nradius_m = 75.0\n",
        )
        .unwrap();
        assert!((config.dedupe_radius_m() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AnalysisConfig::from_toml("[time_window]\nend_year = 2024\n").unwrap();
        assert_eq!(config.time_window.start_year, 2020);
        assert_eq!(config.time_window.end_year, 2024);
        assert_eq!(config.output, OutputSettings::default());
    }

    #[test]
    fn rejects_bad_values() {
        let config = AnalysisConfig::from_toml("[proximity]\nradius_m = -5.0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Analytics(_))));

        let config = AnalysisConfig::from_toml("[time_window]\nstart_year = 2026\n").unwrap();
        assert!(config.validate().is_err());

        let config = AnalysisConfig::from_toml("[denials]\ntop_n = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Analytics(_))));

        let mut config = AnalysisConfig::embedded();
        config.geocoder.min_intersection_angle_deg = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        assert!(matches!(
            AnalysisConfig::from_toml("[proximity]\nradius_m = \"wide\"\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn overrides_replace_values() {
        let config = AnalysisConfig::embedded()
            .with_overrides(ConfigOverrides {
                data_dir: Some(PathBuf::from("/data")),
                output_dir: Some(PathBuf::from("/tmp/out")),
                radius_m: Some(100.0),
                top_n: Some(10),
            })
            .unwrap();
        assert_eq!(config.crashes_path(), PathBuf::from("/data/crashes_queens_2020plus.csv"));
        assert_eq!(
            config.geocode_cache_path(),
            PathBuf::from("/tmp/out/geocode_cache_signal_studies.csv")
        );
        assert_eq!(config.dedupe.top_n, 10);

        let bad = AnalysisConfig::embedded().with_overrides(ConfigOverrides {
            top_n: Some(0),
            ..ConfigOverrides::default()
        });
        assert!(bad.is_err());
    }

    #[test]
    fn loads_user_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dedupe]\ntop_n = 15\nrank_metric = \"injuries\"").unwrap();
        let config = AnalysisConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.dedupe.top_n, 15);

        let missing = AnalysisConfig::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
