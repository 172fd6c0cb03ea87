//! Daemon configuration: YAML file plus `TRACKER_*` environment overrides

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracker_core::FailurePolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Route tracker settings. Environment identity is supplied here, never discovered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Instance that VPC routes point at
    pub instance_id: String,
    /// VPC route table to manage
    pub route_table_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Bridge device that host routes point at
    pub bridge: String,
    /// YAML file listing the ranges owned by this host
    pub ranges_file: PathBuf,
    pub poll_interval_secs: u64,
    /// Longest a single `aws` or `ip` invocation may run
    pub command_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
    pub validate_input: bool,
    /// Use in-memory tables instead of touching the VPC or the kernel
    pub dry_run: bool,
    /// Treat a missing ranges file as owning nothing
    pub teardown_on_missing: bool,
    /// Prometheus textfile to write after every cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_file: Option<PathBuf>,
    pub aws_bin: String,
    pub ip_bin: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            instance_id: String::new(),
            route_table_id: String::new(),
            region: None,
            bridge: "weave".to_string(),
            ranges_file: PathBuf::from("/run/route-tracker/ranges.yaml"),
            poll_interval_secs: 30,
            command_timeout_secs: 60,
            failure_policy: FailurePolicy::Abort,
            validate_input: true,
            dry_run: false,
            teardown_on_missing: false,
            metrics_file: None,
            aws_bin: "aws".to_string(),
            ip_bin: "ip".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Load from `TRACKER_CONFIG` (if set), then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("TRACKER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override fields from `TRACKER_*` variables returned by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TRACKER_INSTANCE_ID") {
            self.instance_id = v;
        }
        if let Some(v) = lookup("TRACKER_ROUTE_TABLE_ID") {
            self.route_table_id = v;
        }
        if let Some(v) = lookup("TRACKER_REGION") {
            self.region = Some(v);
        }
        if let Some(v) = lookup("TRACKER_BRIDGE") {
            self.bridge = v;
        }
        if let Some(v) = lookup("TRACKER_RANGES_FILE") {
            self.ranges_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRACKER_METRICS_FILE") {
            self.metrics_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TRACKER_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "TRACKER_POLL_INTERVAL_SECS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("TRACKER_COMMAND_TIMEOUT_SECS") {
            self.command_timeout_secs = v.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "TRACKER_COMMAND_TIMEOUT_SECS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("TRACKER_DRY_RUN") {
            self.dry_run = parse_bool("TRACKER_DRY_RUN", &v)?;
        }
        if let Some(v) = lookup("TRACKER_FAILURE_POLICY") {
            self.failure_policy = match v.to_ascii_lowercase().as_str() {
                "abort" => FailurePolicy::Abort,
                "continue" => FailurePolicy::Continue,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "TRACKER_FAILURE_POLICY",
                        value: v,
                    })
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "command_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.bridge.is_empty() {
            return Err(ConfigError::Invalid("bridge must be set".to_string()));
        }
        if !self.dry_run {
            if self.instance_id.is_empty() {
                return Err(ConfigError::Invalid("instance_id must be set".to_string()));
            }
            if self.route_table_id.is_empty() {
                return Err(ConfigError::Invalid("route_table_id must be set".to_string()));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name,
            value: value.to_string(),
        }),
    }
}
