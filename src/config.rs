//! Configuration types for docweave

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Worker pool sizing and error policy
///
/// Groups the settings that bound parallelism of each build phase.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Minimum number of document workers kept while content remains (default: 10)
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Maximum number of concurrently processed documents (default: 25)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Abort the download phase on the first failed resource (default: false)
    #[serde(default)]
    pub fail_fast: bool,

    /// Number of resource download workers (default: 10)
    #[serde(default = "default_resource_download_workers")]
    pub resource_download_workers: usize,

    /// Number of link validation workers (default: 10)
    #[serde(default = "default_validation_workers")]
    pub validation_workers: usize,

    /// Buffer capacity of the download and validation queues (default: 1024)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            fail_fast: false,
            resource_download_workers: default_resource_download_workers(),
            validation_workers: default_validation_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Outbound HTTP limits shared by the HTTP worker and the HTTP resource handler
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Maximum accepted response body in bytes (default: 10 MiB)
    #[serde(default = "default_max_response_body")]
    pub max_response_body: u64,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_response_body: default_max_response_body(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Link validation behavior
///
/// The backoff table is the list of delays applied to consecutive `429 Too Many
/// Requests` answers for the same request; its length is the retry budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Validate absolute links found in content (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delays between 429 retries (default: 1s, 5s, 10s, 20s)
    #[serde(default = "default_backoff_table", with = "duration_list_millis")]
    pub backoff_table: Vec<Duration>,

    /// Jitter unit; retry `i` adds `random(0..=i)` units (default: 1 second)
    #[serde(default = "default_jitter_unit", with = "duration_millis")]
    pub jitter_unit: Duration,

    /// Treat loopback addresses as valid without a request (default: true)
    #[serde(default = "default_true")]
    pub skip_loopback: bool,

    /// Hosts treated as valid without a request (default: localhost, 127.0.0.1, 1.2.3.4)
    #[serde(default = "default_skip_hosts")]
    pub skip_hosts: Vec<String>,

    /// Host fragments treated as valid without a request (default: foo.bar)
    #[serde(default = "default_skip_host_fragments")]
    pub skip_host_fragments: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_loopback: true,
            backoff_table: default_backoff_table(),
            jitter_unit: default_jitter_unit(),
            skip_hosts: default_skip_hosts(),
            skip_host_fragments: default_skip_host_fragments(),
        }
    }
}

/// Output locations and resolver lookup tables
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Root directory for generated documents (default: "./docs")
    #[serde(default = "default_destination_path")]
    pub destination_path: PathBuf,

    /// Root directory for downloaded resources (default: "./docs/__resources")
    #[serde(default = "default_resources_path")]
    pub resources_path: PathBuf,

    /// Log writes instead of touching the filesystem (default: false)
    #[serde(default)]
    pub dry_run: bool,

    /// Repository to version/branch overrides handed to resource handlers
    #[serde(default)]
    pub version_overrides: HashMap<String, String>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            destination_path: default_destination_path(),
            resources_path: default_resources_path(),
            dry_run: false,
            version_overrides: HashMap::new(),
        }
    }
}

/// Main configuration for a documentation build
///
/// Every section has working defaults, so `Config::default()` is a valid
/// configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool sizing and error policy
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Outbound HTTP limits
    #[serde(default)]
    pub http: HttpConfig,

    /// Link validation behavior
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Output locations and lookup tables
    #[serde(default)]
    pub resources: ResourceConfig,
}

impl Config {
    /// Check cross-field invariants
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let workers = &self.workers;
        if workers.min_workers > workers.max_workers {
            return Err(Error::config(
                "workers.min_workers",
                format!(
                    "min_workers ({}) exceeds max_workers ({})",
                    workers.min_workers, workers.max_workers
                ),
            ));
        }
        if workers.max_workers == 0 {
            return Err(Error::config(
                "workers.max_workers",
                "at least one document worker is required",
            ));
        }
        if workers.resource_download_workers == 0 {
            return Err(Error::config(
                "workers.resource_download_workers",
                "at least one download worker is required",
            ));
        }
        if self.validation.enabled && workers.validation_workers == 0 {
            return Err(Error::config(
                "workers.validation_workers",
                "validation is enabled but no validation workers are configured",
            ));
        }
        if workers.queue_capacity == 0 {
            return Err(Error::config(
                "workers.queue_capacity",
                "queue capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_min_workers() -> usize {
    10
}

fn default_max_workers() -> usize {
    25
}

fn default_resource_download_workers() -> usize {
    10
}

fn default_validation_workers() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    crate::queue::DEFAULT_QUEUE_CAPACITY
}

fn default_max_response_body() -> u64 {
    10 * 1024 * 1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_table() -> Vec<Duration> {
    [1, 5, 10, 20].into_iter().map(Duration::from_secs).collect()
}

fn default_jitter_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_skip_hosts() -> Vec<String> {
    vec!["localhost".into(), "127.0.0.1".into(), "1.2.3.4".into()]
}

fn default_skip_host_fragments() -> Vec<String> {
    vec!["foo.bar".into()]
}

fn default_destination_path() -> PathBuf {
    PathBuf::from("docs")
}

fn default_resources_path() -> PathBuf {
    PathBuf::from("docs/__resources")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Duration list serialization helper (milliseconds)
mod duration_list_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(durations.iter().map(|d| d.as_millis() as u64))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Vec::<u64>::deserialize(deserializer)?;
        Ok(millis.into_iter().map(Duration::from_millis).collect())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn default_backoff_table_matches_link_checker_policy() {
        let table = ValidationConfig::default().backoff_table;
        assert_eq!(
            table,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20),
            ]
        );
    }

    #[test]
    fn inverted_worker_bounds_are_rejected() {
        let mut config = Config::default();
        config.workers.min_workers = 10;
        config.workers.max_workers = 2;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("workers.min_workers"))
            }
            other => panic!("expected Config error, got: {:?}", other),
        }
    }

    #[test]
    fn validation_workers_only_required_when_enabled() {
        let mut config = Config::default();
        config.workers.validation_workers = 0;
        assert!(config.validate().is_err());

        config.validation.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn empty_resource_section_matches_default() {
        let config: Config = serde_json::from_str(r#"{"resources":{}}"#).unwrap();
        assert_eq!(config.resources, ResourceConfig::default());
        assert_eq!(config.resources.destination_path, PathBuf::from("docs"));
        assert_eq!(config.resources.resources_path, PathBuf::from("docs/__resources"));
    }

    #[test]
    fn json_round_trip_keeps_durations() {
        let json = r#"{
            "workers": { "min_workers": 2, "max_workers": 4, "fail_fast": true },
            "http": { "request_timeout": 5 },
            "validation": { "backoff_table": [10, 20], "jitter_unit": 0 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.workers.max_workers, 4);
        assert!(config.workers.fail_fast);
        assert_eq!(config.workers.resource_download_workers, 10);
        assert_eq!(config.http.request_timeout, Duration::from_secs(5));
        assert_eq!(
            config.validation.backoff_table,
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(config.validation.jitter_unit, Duration::ZERO);

        let back: Config = serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
