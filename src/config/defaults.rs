//! Built-in defaults (lowest layer)

use std::path::PathBuf;
use std::time::Duration;

use super::BackupConfig;

pub const DEFAULT_NAME: &str = "openshift-cluster-backup";
pub const DEFAULT_HOST_CONFIG_DIR: &str = "/etc/kubernetes";
pub const DEFAULT_MANIFESTS_DIR: &str = "/etc/kubernetes/manifests";
pub const DEFAULT_KUBECONFIG: &str = "/etc/kubernetes/kubeconfig";
pub const DEFAULT_ETCD_ENV_FILE: &str =
    "/etc/kubernetes/static-pod-resources/etcd-certs/configmaps/etcd-scripts/etcd.env";

/// Control-plane static pods whose resource directories are archived
pub const DEFAULT_STATIC_PODS: &[&str] = &[
    "kube-apiserver",
    "kube-controller-manager",
    "kube-scheduler",
    "etcd",
];

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BACKUP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(15 * 60);

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            host_config_dir: PathBuf::from(DEFAULT_HOST_CONFIG_DIR),
            manifests_dir: PathBuf::from(DEFAULT_MANIFESTS_DIR),
            kubeconfig_path: PathBuf::from(DEFAULT_KUBECONFIG),
            etcd_env_file: PathBuf::from(DEFAULT_ETCD_ENV_FILE),
            static_pods: DEFAULT_STATIC_PODS.iter().map(|s| s.to_string()).collect(),
            etcd_dial_timeout: DEFAULT_DIAL_TIMEOUT,
            etcd_backup_timeout: DEFAULT_BACKUP_TIMEOUT,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            keep_local_backup: false,
            work_dir_parent: None,
            link_missing_certs: true,
            etcdctl_path: PathBuf::from("etcdctl"),
            aws_cli_path: PathBuf::from("aws"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BackupConfig::default();
        assert_eq!(config.name, "openshift-cluster-backup");
        assert_eq!(config.etcd_dial_timeout, Duration::from_secs(10));
        assert_eq!(config.etcd_backup_timeout, Duration::from_secs(60));
        assert!(!config.keep_local_backup);
        assert_eq!(config.static_pods.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_serialize_durations_as_text() {
        let value = serde_json::to_value(BackupConfig::default()).unwrap();
        assert_eq!(value["etcd_dial_timeout"], "10s");
        assert_eq!(value["etcd_backup_timeout"], "1m");
        assert_eq!(value["publish_timeout"], "15m");
        assert!(value["work_dir_parent"].is_null());
    }
}
