//! Runtime configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) yields a production setup with one daily anonymous
//! sweep and one weekly avatar sweep.

use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 100;
pub const DEFAULT_CONCURRENCY: usize = 10;

pub const MIN_DURATION: Duration = Duration::from_secs(60);

const DAY: u64 = 24 * 60 * 60;
pub const DEFAULT_STALE_INTERVAL: Duration = Duration::from_secs(DAY);
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(30 * DAY);

pub const DEFAULT_ASSET_INTERVAL: Duration = Duration::from_secs(7 * DAY);
pub const DEFAULT_ASSET_GRACE_PERIOD: Duration = Duration::from_secs(7 * DAY);
pub const MAX_KEEP_RECENT: usize = 100;
pub const DEFAULT_KEEP_RECENT: usize = 3;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Where the lifecycle data lives in the document and object stores.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Root collection holding one profile document per uid.
    pub users_collection: String,
    /// Collection id of the tracker subcollection under each user.
    pub tracker_collection: String,
    /// Document id of the tracker inside `tracker_collection`.
    pub tracker_document: String,
    /// Object prefix; a user's assets live under `{asset_prefix}/{uid}/`.
    pub asset_prefix: String,
    /// Profile field referencing the current asset.
    pub photo_field: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            users_collection: "users".to_string(),
            tracker_collection: "tracker".to_string(),
            tracker_document: "status".to_string(),
            asset_prefix: "avatars".to_string(),
            photo_field: "photoURL".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn user_path(&self, uid: &str) -> String {
        format!("{}/{}", self.users_collection, uid)
    }

    pub fn tracker_path(&self, uid: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.users_collection, uid, self.tracker_collection, self.tracker_document
        )
    }

    pub fn asset_prefix_for(&self, uid: &str) -> String {
        format!("{}/{}/", self.asset_prefix, uid)
    }

    /// Extracts the uid from a tracker document path, rejecting paths that
    /// do not follow the configured layout.
    pub fn uid_from_tracker_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [users, uid, tracker, doc]
                if *users == self.users_collection
                    && *tracker == self.tracker_collection
                    && *doc == self.tracker_document
                    && !uid.is_empty() =>
            {
                Some(*uid)
            }
            _ => None,
        }
    }

    /// Extracts the uid from a profile document path (`users/{uid}`).
    pub fn uid_from_user_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        match path.split_once('/') {
            Some((users, uid)) if users == self.users_collection && !uid.is_empty() && !uid.contains('/') => {
                Some(uid)
            }
            _ => None,
        }
    }
}

/// One scheduled stale-anonymous sweep.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StaleSweepConfig {
    pub name: String,
    /// Time between runs.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Inactivity after which an anonymous account becomes a candidate.
    #[serde(deserialize_with = "deserialize_duration")]
    pub threshold: Duration,
}

impl Default for StaleSweepConfig {
    fn default() -> Self {
        Self {
            name: "production".to_string(),
            interval: DEFAULT_STALE_INTERVAL,
            threshold: DEFAULT_STALE_THRESHOLD,
        }
    }
}

/// One scheduled asset retention sweep.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AssetSweepConfig {
    pub name: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Minimum age before an unreferenced asset may be deleted.
    #[serde(deserialize_with = "deserialize_duration")]
    pub grace_period: Duration,
    /// Most recent assets kept besides the referenced one.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

fn default_keep_recent() -> usize {
    DEFAULT_KEEP_RECENT
}

impl Default for AssetSweepConfig {
    fn default() -> Self {
        Self {
            name: "production".to_string(),
            interval: DEFAULT_ASSET_INTERVAL,
            grace_period: DEFAULT_ASSET_GRACE_PERIOD,
            keep_recent: DEFAULT_KEEP_RECENT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on concurrently processed uids or files within a run.
    pub concurrency: usize,
    /// Storage bucket; the project's default bucket when unset.
    pub bucket: Option<String>,
    pub paths: PathsConfig,
    pub stale_sweeps: Vec<StaleSweepConfig>,
    pub asset_sweeps: Vec<AssetSweepConfig>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            bucket: None,
            paths: PathsConfig::default(),
            stale_sweeps: vec![StaleSweepConfig::default()],
            asset_sweeps: vec![AssetSweepConfig::default()],
        }
    }
}

impl LifecycleConfig {
    /// Reads and validates the config at `path`, or the defaults when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency < MIN_CONCURRENCY || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Invalid(format!(
                "concurrency must be {}-{}, got {}",
                MIN_CONCURRENCY, MAX_CONCURRENCY, self.concurrency
            )));
        }

        for (field, value) in [
            ("paths.users_collection", &self.paths.users_collection),
            ("paths.tracker_collection", &self.paths.tracker_collection),
            ("paths.tracker_document", &self.paths.tracker_document),
            ("paths.asset_prefix", &self.paths.asset_prefix),
            ("paths.photo_field", &self.paths.photo_field),
        ] {
            if value.is_empty() || value.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a single non-empty path segment, got {:?}",
                    field, value
                )));
            }
        }

        let mut names = HashSet::new();
        for sweep in &self.stale_sweeps {
            if !names.insert(sweep.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate stale sweep name {:?}",
                    sweep.name
                )));
            }
            check_duration(&sweep.name, "interval", sweep.interval)?;
            check_duration(&sweep.name, "threshold", sweep.threshold)?;
        }

        let mut names = HashSet::new();
        for sweep in &self.asset_sweeps {
            if !names.insert(sweep.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate asset sweep name {:?}",
                    sweep.name
                )));
            }
            check_duration(&sweep.name, "interval", sweep.interval)?;
            check_duration(&sweep.name, "grace_period", sweep.grace_period)?;
            if sweep.keep_recent > MAX_KEEP_RECENT {
                return Err(ConfigError::Invalid(format!(
                    "{}.keep_recent must be 0-{}, got {}",
                    sweep.name, MAX_KEEP_RECENT, sweep.keep_recent
                )));
            }
        }

        Ok(())
    }

    pub fn stale_sweep(&self, name: &str) -> Option<&StaleSweepConfig> {
        self.stale_sweeps.iter().find(|s| s.name == name)
    }

    pub fn asset_sweep(&self, name: &str) -> Option<&AssetSweepConfig> {
        self.asset_sweeps.iter().find(|s| s.name == name)
    }
}

fn check_duration(sweep: &str, field: &str, value: Duration) -> Result<(), ConfigError> {
    if value < MIN_DURATION {
        return Err(ConfigError::Invalid(format!(
            "{}.{} must be at least {}, got {}",
            sweep,
            field,
            humantime::format_duration(MIN_DURATION),
            humantime::format_duration(value)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LifecycleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stale_sweeps[0].threshold, DEFAULT_STALE_THRESHOLD);
        assert_eq!(config.asset_sweeps[0].keep_recent, DEFAULT_KEEP_RECENT);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = LifecycleConfig::from_toml_str("").unwrap();
        assert_eq!(config, LifecycleConfig::default());
    }

    #[test]
    fn test_example_file_spells_out_the_defaults() {
        let config = LifecycleConfig::from_toml_str(include_str!("../lifecycle.example.toml")).unwrap();
        assert_eq!(config, LifecycleConfig::default());
        assert_eq!(config.asset_sweeps[0].grace_period, Duration::from_secs(7 * DAY));
    }

    #[test]
    fn test_production_and_validation_sweeps() {
        let config = LifecycleConfig::from_toml_str(
            r#"
            concurrency = 4
            bucket = "books.appspot.com"

            [[stale_sweeps]]
            name = "production"
            interval = "24h"
            threshold = "30days"

            [[stale_sweeps]]
            name = "validation"
            interval = "5m"
            threshold = "1h"

            [[asset_sweeps]]
            name = "production"
            interval = "7days"
            grace_period = "2days"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.bucket.as_deref(), Some("books.appspot.com"));
        let validation = config.stale_sweep("validation").unwrap();
        assert_eq!(validation.interval, Duration::from_secs(300));
        assert_eq!(validation.threshold, Duration::from_secs(3600));
        let assets = config.asset_sweep("production").unwrap();
        assert_eq!(assets.grace_period, Duration::from_secs(2 * DAY));
        assert_eq!(assets.keep_recent, DEFAULT_KEEP_RECENT);
    }

    #[test]
    fn test_empty_sweep_lists_disable_jobs() {
        let config = LifecycleConfig::from_toml_str("stale_sweeps = []\nasset_sweeps = []").unwrap();
        assert!(config.stale_sweeps.is_empty());
        assert!(config.asset_sweeps.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_concurrency() {
        let err = LifecycleConfig::from_toml_str("concurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("concurrency")));
    }

    #[test]
    fn test_rejects_too_short_threshold() {
        let err = LifecycleConfig::from_toml_str(
            r#"
            [[stale_sweeps]]
            name = "fast"
            interval = "5m"
            threshold = "10s"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("fast.threshold")));
    }

    #[test]
    fn test_rejects_duplicate_sweep_names() {
        let err = LifecycleConfig::from_toml_str(
            r#"
            [[asset_sweeps]]
            name = "weekly"
            interval = "7days"
            grace_period = "1day"

            [[asset_sweeps]]
            name = "weekly"
            interval = "1day"
            grace_period = "1day"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_rejects_unparseable_duration() {
        let err = LifecycleConfig::from_toml_str(
            r#"
            [[stale_sweeps]]
            name = "bad"
            interval = "soon"
            threshold = "1h"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_path_helpers() {
        let paths = PathsConfig::default();
        assert_eq!(paths.tracker_path("u1"), "users/u1/tracker/status");
        assert_eq!(paths.asset_prefix_for("u1"), "avatars/u1/");
        assert_eq!(paths.uid_from_tracker_path("users/u1/tracker/status"), Some("u1"));
        assert_eq!(paths.uid_from_tracker_path("groups/g1/tracker/status"), None);
        assert_eq!(paths.uid_from_user_path("users/u1"), Some("u1"));
        assert_eq!(paths.uid_from_user_path("users/u1/tracker"), None);
    }
}
