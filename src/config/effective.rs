//! Configuration resolved from all layers, with provenance

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::merge::merge_layers;
use super::{BackupConfig, ConfigError};

/// Where a layer came from
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// One contributing layer
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// The merged configuration and the layers that produced it
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub config: BackupConfig,
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge defaults, an optional TOML file and CLI overrides.
    ///
    /// `cli_overrides` is a JSON object keyed like [`BackupConfig`]; `null`
    /// values leave the lower layers untouched.
    pub fn build(config_file: Option<&Path>, cli_overrides: Value) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        let builtin = serde_json::to_value(BackupConfig::default()).map_err(|e| {
            ConfigError::Invalid {
                field: "defaults",
                reason: e.to_string(),
            }
        })?;
        layers.push(builtin);
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        if let Some(path) = config_file {
            let (value, digest) = load_toml_file(path)?;
            debug!(path = %path.display(), digest = %digest, "loaded config file");
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.display().to_string()),
                digest: Some(digest),
            });
        }

        if !cli_overrides.is_null() {
            layers.push(cli_overrides);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let config: BackupConfig =
            serde_json::from_value(merge_layers(layers)).map_err(|e| ConfigError::Invalid {
                field: "configuration",
                reason: e.to_string(),
            })?;
        config.validate()?;

        Ok(Self { config, sources })
    }
}

fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    // The digest covers exactly the bytes parsed below.
    let digest = backup_archive::digest_bytes(&bytes);
    let contents = std::str::from_utf8(&bytes).map_err(|e| parse_error(e.to_string()))?;
    let table: toml::Table = toml::from_str(contents).map_err(|e| parse_error(e.to_string()))?;
    let value = serde_json::to_value(table).map_err(|e| parse_error(e.to_string()))?;

    Ok((value, digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_only() {
        let effective = EffectiveConfig::build(None, Value::Null).unwrap();
        assert_eq!(effective.config, BackupConfig::default());
        assert_eq!(effective.sources.len(), 1);
        assert_eq!(effective.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_file_then_cli_layering() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.toml");
        fs::write(
            &path,
            r#"
name = "nightly"
etcd_backup_timeout = "2m"
static_pods = ["etcd"]
work_dir_parent = "/var/backups"
"#,
        )
        .unwrap();

        let effective = EffectiveConfig::build(
            Some(&path),
            json!({"name": "manual", "etcd_backup_timeout": null, "keep_local_backup": true}),
        )
        .unwrap();
        let config = effective.config;

        assert_eq!(config.name, "manual");
        assert_eq!(config.etcd_backup_timeout, Duration::from_secs(120));
        assert_eq!(config.etcd_dial_timeout, Duration::from_secs(10));
        assert_eq!(config.static_pods, vec!["etcd".to_string()]);
        assert_eq!(config.work_dir_parent, Some(PathBuf::from("/var/backups")));
        assert!(config.keep_local_backup);

        assert_eq!(effective.sources.len(), 3);
        assert_eq!(effective.sources[1].origin, ConfigOrigin::File);
        assert_eq!(
            effective.sources[1].digest,
            Some(backup_archive::digest_bytes(&fs::read(&path).unwrap()))
        );
    }

    #[test]
    fn test_non_utf8_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.toml");
        fs::write(&path, b"name = \"\xff\"\n").unwrap();

        let err = EffectiveConfig::build(Some(&path), Value::Null).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{:?}", err);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.toml");
        fs::write(&path, "nmae = \"typo\"\n").unwrap();

        let err = EffectiveConfig::build(Some(&path), Value::Null).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "{:?}", err);
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err =
            EffectiveConfig::build(None, json!({"etcd_dial_timeout": "forever"})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err =
            EffectiveConfig::build(Some(Path::new("/nonexistent/backup.toml")), Value::Null)
                .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.toml");
        fs::write(&path, "name = [unterminated").unwrap();

        let err = EffectiveConfig::build(Some(&path), Value::Null).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
