//! Harvest configuration.
//!
//! Configuration is read from a TOML file. Every key is optional; missing keys
//! take the defaults below. The runtime view handed to harvesters is
//! [`HarvestParams`], derived with [`HarvestConfig::params`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{default_locations, Location};

/// Upper bound for any look-ahead, global or per source.
pub const MAX_LOOK_AHEAD_DAYS: i64 = 3650;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What the coordinator does when one source fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Re-raise the first source failure and produce no batch
    #[default]
    AbortRun,

    /// Log the failure, drop that source's records, continue with the rest
    SkipSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSection {
    pub failure_policy: FailurePolicy,

    /// Default look-ahead for date-threshold sources
    pub look_ahead_days: i64,

    /// Timeout wrapping each single page fetch
    pub fetch_timeout_secs: u64,

    /// Safety ceiling for cursor and date-threshold loops
    pub max_pages: u32,

    /// 1 harvests sources strictly one at a time
    pub max_concurrent_sources: usize,

    /// Log when later rules disagree with the winning rule
    pub detect_ambiguity: bool,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::AbortRun,
            look_ahead_days: 3,
            fetch_timeout_secs: 60,
            max_pages: 200,
            max_concurrent_sources: 1,
            detect_ambiguity: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub harvest: HarvestSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,

    /// Geo-scopes for geo-scoped sources
    pub locations: Vec<Location>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            harvest: HarvestSection::default(),
            storage: StorageSection::default(),
            logging: LoggingSection::default(),
            locations: default_locations(),
        }
    }
}

impl HarvestConfig {
    /// Loads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse or validation failure.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.harvest;
        if h.max_pages == 0 {
            return Err(ConfigError::Invalid("harvest.max_pages must be > 0".into()));
        }
        if h.max_concurrent_sources == 0 {
            return Err(ConfigError::Invalid(
                "harvest.max_concurrent_sources must be > 0".into(),
            ));
        }
        if h.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "harvest.fetch_timeout_secs must be > 0".into(),
            ));
        }
        if !(0..=MAX_LOOK_AHEAD_DAYS).contains(&h.look_ahead_days) {
            return Err(ConfigError::Invalid(format!(
                "harvest.look_ahead_days must be between 0 and {MAX_LOOK_AHEAD_DAYS}"
            )));
        }
        for location in &self.locations {
            if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lon)
            {
                return Err(ConfigError::Invalid(format!(
                    "location '{}' has out-of-range coordinates",
                    location.name
                )));
            }
        }
        Ok(())
    }

    /// Runtime parameters for a run starting at `now`.
    pub fn params(&self, now: DateTime<Utc>) -> HarvestParams {
        HarvestParams {
            reference_time: now,
            look_ahead_days: self.harvest.look_ahead_days,
            locations: self.locations.clone(),
            fetch_timeout: Duration::from_secs(self.harvest.fetch_timeout_secs),
            max_pages: self.harvest.max_pages,
        }
    }
}

/// Per-run parameters shared by every source harvester.
#[derive(Debug, Clone)]
pub struct HarvestParams {
    /// "Now" for horizon computations
    pub reference_time: DateTime<Utc>,

    /// Default look-ahead for date-threshold sources, in days
    pub look_ahead_days: i64,

    pub locations: Vec<Location>,

    /// Timeout wrapping each page fetch
    pub fetch_timeout: Duration,

    /// Safety ceiling for cursor and date-threshold loops
    pub max_pages: u32,
}

impl HarvestParams {
    /// Last calendar day (UTC) a date-threshold source may accept.
    ///
    /// `look_ahead_days` overrides the run's default. Returns `None` when the
    /// look-ahead is negative, above [`MAX_LOOK_AHEAD_DAYS`], or the resulting
    /// date is out of range.
    pub fn horizon(&self, look_ahead_days: Option<i64>) -> Option<NaiveDate> {
        let days = look_ahead_days.unwrap_or(self.look_ahead_days);
        if !(0..=MAX_LOOK_AHEAD_DAYS).contains(&days) {
            return None;
        }
        self.reference_time
            .date_naive()
            .checked_add_days(Days::new(u64::try_from(days).ok()?))
    }
}

impl Default for HarvestParams {
    fn default() -> Self {
        HarvestConfig::default().params(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = HarvestConfig::from_toml_str("").unwrap();
        assert_eq!(config, HarvestConfig::default());
        assert_eq!(config.harvest.failure_policy, FailurePolicy::AbortRun);
        assert_eq!(config.locations.len(), 23);
    }

    #[test]
    fn test_partial_file() {
        let raw = r#"
            [harvest]
            failure_policy = "skip_source"
            look_ahead_days = 10

            [[locations]]
            name = "Ukraine"
            lat = 50.45
            lon = 30.52
            radius = 300
        "#;
        let config = HarvestConfig::from_toml_str(raw).unwrap();

        assert_eq!(config.harvest.failure_policy, FailurePolicy::SkipSource);
        assert_eq!(config.harvest.look_ahead_days, 10);
        assert_eq!(config.harvest.max_pages, 200);
        assert_eq!(config.locations, vec![Location::new("Ukraine", 50.45, 30.52, 300)]);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            HarvestConfig::from_toml_str("[harvest]\nmax_pages = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HarvestConfig::from_toml_str("[harvest]\nlook_ahead_days = -1"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HarvestConfig::from_toml_str("[harvest]\nlook_ahead_days = 200000000"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HarvestConfig::from_toml_str(
                "[[locations]]\nname = \"X\"\nlat = 95.0\nlon = 0.0\nradius = 1"
            ),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HarvestConfig::from_toml_str("[harvest]\nfailure_policy = \"retry\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"snapshots\"\n").unwrap();

        let config = HarvestConfig::load(&path).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("snapshots"));

        let missing = HarvestConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_params_horizon() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let params = HarvestConfig::default().params(now);

        assert_eq!(params.fetch_timeout, Duration::from_secs(60));
        assert_eq!(params.horizon(None), NaiveDate::from_ymd_opt(2024, 1, 4));
        assert_eq!(params.horizon(Some(10)), NaiveDate::from_ymd_opt(2024, 1, 11));
        assert_eq!(params.horizon(Some(0)), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn test_horizon_rejects_out_of_range_look_ahead() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut params = HarvestConfig::default().params(now);

        assert_eq!(params.horizon(Some(-1)), None);
        assert_eq!(params.horizon(Some(200_000_000)), None);
        assert_eq!(params.horizon(Some(i64::MAX)), None);

        params.look_ahead_days = i64::MIN;
        assert_eq!(params.horizon(None), None);
    }
}
