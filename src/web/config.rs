use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::predict::{ObserverLocation, PassSearch, TleSources};
use crate::store::backfill::BackfillConfig;
use crate::store::retention::RetentionPolicy;
use crate::util::duration_str;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid observer coordinates: {0}")]
    Observer(String),
    #[error("invalid {section} settings: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
}

/// Longest pass search horizon accepted from the file.
const MAX_HORIZON_DAYS: i64 = 365;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub observer: ObserverConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub prediction: PassSearch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObserverConfig {
    pub name: Option<String>,
    /// `"lat,lng"` in degrees.
    pub coordinates: String,
    #[serde(default)]
    pub altitude_m: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub tle: TleSources,
    #[serde(default = "default_position_url")]
    pub position_url: String,
    #[serde(default = "default_crew_url")]
    pub crew_url: String,
    /// Wall-clock limit for every outbound request.
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            tle: TleSources::default(),
            position_url: default_position_url(),
            crew_url: default_crew_url(),
            timeout: default_timeout(),
        }
    }
}

fn default_position_url() -> String {
    "https://api.wheretheiss.at/v1/satellites/25544".to_string()
}

fn default_crew_url() -> String {
    "http://api.open-notify.org/astros.json".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_position_interval", with = "duration_str")]
    pub position_interval: Duration,
    #[serde(default = "default_hourly", with = "duration_str")]
    pub element_set_interval: Duration,
    #[serde(default = "default_hourly", with = "duration_str")]
    pub crew_interval: Duration,
    #[serde(default = "default_pause_on_hidden")]
    pub pause_on_hidden: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            position_interval: default_position_interval(),
            element_set_interval: default_hourly(),
            crew_interval: default_hourly(),
            pause_on_hidden: default_pause_on_hidden(),
        }
    }
}

fn default_position_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_hourly() -> Duration {
    Duration::from_secs(3600)
}

fn default_pause_on_hidden() -> bool {
    true
}

fn invalid(section: &'static str) -> impl Fn(String) -> ConfigError {
    move |reason| ConfigError::Invalid { section, reason }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.observer()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.timeout.is_zero() {
            return Err(invalid("sources")("timeout must be non-zero".into()));
        }
        let intervals = [
            self.sync.position_interval,
            self.sync.element_set_interval,
            self.sync.crew_interval,
        ];
        if intervals.iter().any(Duration::is_zero) {
            return Err(invalid("sync")("intervals must be non-zero".into()));
        }
        self.retention.validate().map_err(invalid("retention"))?;
        self.backfill.validate().map_err(invalid("backfill"))?;

        let search = &self.prediction;
        if search.max_passes == 0
            || !(1..=MAX_HORIZON_DAYS).contains(&search.max_days_horizon)
            || !(0.0..90.0).contains(&search.min_elevation_deg)
        {
            return Err(invalid("prediction")(format!(
                "need max_passes >= 1, max_days_horizon in 1..={} and min_elevation_deg in [0, 90)",
                MAX_HORIZON_DAYS
            )));
        }
        Ok(())
    }

    pub fn observer(&self) -> Result<ObserverLocation, ConfigError> {
        ObserverLocation::from_coordinates(
            &self.observer.coordinates,
            Some(self.observer.altitude_m),
        )
        .ok_or_else(|| ConfigError::Observer(self.observer.coordinates.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = Config::from_yaml("observer:\n  coordinates: \"45.5,-122.6\"\n").unwrap();

        assert_eq!(config.web.bind, "0.0.0.0:8080");
        assert_eq!(config.store.data_dir, PathBuf::from("data"));
        assert_eq!(config.sync.position_interval, Duration::from_secs(5));
        assert_eq!(config.sync.element_set_interval, Duration::from_secs(3600));
        assert!(config.sync.pause_on_hidden);
        assert_eq!(config.sources.timeout, Duration::from_secs(10));
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(config.retention.max_record_count, 7);
        assert_eq!(config.retention.cleanup_batch_size, 10_000);
        assert_eq!(config.retention.cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.backfill.max_gap_hours, 168.0);
        assert_eq!(config.prediction, PassSearch::default());

        let observer = config.observer().unwrap();
        assert_eq!(observer.latitude_deg, 45.5);
        assert_eq!(observer.longitude_deg, -122.6);
    }

    #[test]
    fn human_readable_durations_and_overrides() {
        let yaml = r#"
observer:
  name: Backyard
  coordinates: "52.0, 4.3"
  altitude_m: 12
web:
  bind: "127.0.0.1:9000"
sources:
  timeout: 3s
  tle:
    primary_url: "https://example.test/primary"
    backup_url: "https://example.test/backup"
sync:
  position_interval: 10s
  crew_interval: 2h
  pause_on_hidden: false
retention:
  max_age_days: 14
  cleanup_interval: 5m
prediction:
  max_passes: 3
  min_elevation_deg: 20
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.web.bind, "127.0.0.1:9000");
        assert_eq!(config.sources.timeout, Duration::from_secs(3));
        assert!(config.sources.tle.proxy_url.is_none());
        assert_eq!(config.sync.position_interval, Duration::from_secs(10));
        assert_eq!(config.sync.crew_interval, Duration::from_secs(7200));
        assert!(!config.sync.pause_on_hidden);
        assert_eq!(config.retention.max_age_days, 14);
        assert_eq!(config.retention.max_record_count, 7);
        assert_eq!(config.retention.cleanup_interval, Duration::from_secs(300));
        assert_eq!(config.prediction.max_passes, 3);
        assert_eq!(config.prediction.max_days_horizon, 7);
        assert_eq!(config.prediction.min_elevation_deg, 20.0);
    }

    #[test]
    fn bad_coordinates_are_rejected() {
        let err = Config::from_yaml("observer:\n  coordinates: \"north\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Observer(_)));
    }

    fn rejected_section(extra: &str) -> &'static str {
        let yaml = format!("observer:\n  coordinates: \"0,0\"\n{}", extra);
        match Config::from_yaml(&yaml) {
            Err(ConfigError::Invalid { section, .. }) => section,
            other => panic!("expected invalid settings, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn zero_intervals_are_rejected() {
        assert_eq!(rejected_section("retention:\n  cleanup_interval: 0s\n"), "retention");
        assert_eq!(rejected_section("sync:\n  position_interval: 0s\n"), "sync");
        assert_eq!(rejected_section("sync:\n  crew_interval: 0ms\n"), "sync");
        assert_eq!(rejected_section("sources:\n  timeout: 0s\n"), "sources");
    }

    #[test]
    fn out_of_range_bounds_are_rejected() {
        assert_eq!(
            rejected_section("retention:\n  max_age_days: 9223372036854775807\n"),
            "retention"
        );
        assert_eq!(rejected_section("retention:\n  max_age_days: 0\n"), "retention");
        assert_eq!(rejected_section("retention:\n  max_record_count: 0\n"), "retention");
        assert_eq!(
            rejected_section("backfill:\n  expected_interval_seconds: 4611686018427387904\n"),
            "backfill"
        );
        assert_eq!(rejected_section("backfill:\n  max_gap_hours: .nan\n"), "backfill");
        assert_eq!(rejected_section("prediction:\n  max_days_horizon: 0\n"), "prediction");
        assert_eq!(rejected_section("prediction:\n  min_elevation_deg: 90\n"), "prediction");
    }

    #[test]
    fn bad_duration_is_a_yaml_error() {
        let yaml = "observer:\n  coordinates: \"0,0\"\nsync:\n  position_interval: soon\n";
        assert!(matches!(Config::from_yaml(yaml), Err(ConfigError::Yaml(_))));
    }
}
