//! Backup configuration
//!
//! Three layers, lowest first:
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config`)
//! 3. CLI flags
//!
//! Durations are written as humantime strings (`"10s"`, `"2m"`).

mod defaults;
mod effective;
mod merge;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_BACKUP_TIMEOUT, DEFAULT_DIAL_TIMEOUT, DEFAULT_ETCD_ENV_FILE, DEFAULT_HOST_CONFIG_DIR,
    DEFAULT_KUBECONFIG, DEFAULT_MANIFESTS_DIR, DEFAULT_NAME, DEFAULT_PUBLISH_TIMEOUT,
    DEFAULT_STATIC_PODS,
};
pub use effective::{ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};

/// Errors while assembling or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required value: {0}")]
    MissingField(&'static str),

    #[error("environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything one backup run needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Backup name; prefixes the working directory and names the bundle
    pub name: String,

    /// Root of the host's control-plane configuration
    pub host_config_dir: PathBuf,

    /// Directory holding `<pod>-pod.yaml` static pod manifests
    pub manifests_dir: PathBuf,

    /// Kubeconfig used to tag log records with the cluster
    pub kubeconfig_path: PathBuf,

    /// etcd environment file with endpoints and credentials
    pub etcd_env_file: PathBuf,

    /// Static pods whose resource directories are archived
    pub static_pods: Vec<String>,

    #[serde(with = "duration_text")]
    pub etcd_dial_timeout: Duration,

    /// Bound on the whole snapshot request
    #[serde(with = "duration_text")]
    pub etcd_backup_timeout: Duration,

    /// Bound on each `aws` call (bucket check and upload)
    #[serde(with = "duration_text")]
    pub publish_timeout: Duration,

    /// Keep the working directory after the run
    pub keep_local_backup: bool,

    /// Where the working directory is created (system temp dir when unset)
    pub work_dir_parent: Option<PathBuf>,

    /// Create the `static-pod-certs` compatibility link when the
    /// discovered cert path does not exist
    pub link_missing_certs: bool,

    pub etcdctl_path: PathBuf,

    pub aws_cli_path: PathBuf,
}

impl BackupConfig {
    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        if self.name.contains('/') {
            return Err(ConfigError::Invalid {
                field: "name",
                reason: format!("{:?} must not contain '/'", self.name),
            });
        }
        if self.etcd_dial_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "etcd_dial_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.etcd_backup_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "etcd_backup_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.publish_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "publish_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.static_pods.iter().any(|pod| pod.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "static_pods",
                reason: "pod names must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a humantime duration such as `"90s"` or `"1m 30s"`.
pub fn parse_duration(field: &'static str, text: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(text).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{:?}: {}", text, e),
    })
}

mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
