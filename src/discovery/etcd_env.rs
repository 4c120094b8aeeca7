//! etcd environment file
//!
//! The file is a shell fragment of `export KEY="value"` lines written by
//! the etcd operator. Besides the client credentials it carries one
//! `NODE_<host>_ETCD_URL_HOST` entry per member; the one matching this
//! host's name (with `-` replaced by `_`) selects the member to snapshot.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{EnvironmentDiscovery, StoreConnection};
use crate::config::ConfigError;

pub const ETCD_CLIENT_PORT: u16 = 2379;

const ENDPOINTS_KEY: &str = "ETCDCTL_ENDPOINTS";
const CA_CERT_KEY: &str = "ETCDCTL_CACERT";
const CERT_KEY: &str = "ETCDCTL_CERT";
const KEY_KEY: &str = "ETCDCTL_KEY";

/// Supplies this node's host name
pub trait HostnameProvider {
    fn hostname(&self) -> io::Result<String>;
}

/// The kernel's host name
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostname;

impl HostnameProvider for SystemHostname {
    fn hostname(&self) -> io::Result<String> {
        system_hostname()?
            .into_string()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "hostname is not UTF-8"))
    }
}

#[cfg(unix)]
fn system_hostname() -> io::Result<OsString> {
    nix::unistd::gethostname().map_err(io::Error::from)
}

#[cfg(not(unix))]
fn system_hostname() -> io::Result<OsString> {
    std::env::var_os("COMPUTERNAME")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "COMPUTERNAME is not set"))
}

/// [`EnvironmentDiscovery`] backed by the etcd environment file
pub struct EtcdEnvFile<H = SystemHostname> {
    path: PathBuf,
    hostname: H,
}

impl EtcdEnvFile<SystemHostname> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hostname: SystemHostname,
        }
    }
}

impl<H: HostnameProvider> EtcdEnvFile<H> {
    pub fn with_hostname(path: impl Into<PathBuf>, hostname: H) -> Self {
        Self {
            path: path.into(),
            hostname,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<H: HostnameProvider> EnvironmentDiscovery for EtcdEnvFile<H> {
    fn discover(&self) -> Result<StoreConnection, ConfigError> {
        info!(path = %self.path.display(), "reading etcd environment file");
        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let hostname = self.hostname.hostname().map_err(|source| ConfigError::Io {
            path: PathBuf::from("hostname"),
            source,
        })?;

        let connection = parse(&contents, &hostname)?;
        debug!(
            selected = %connection.selected_endpoint,
            members = connection.endpoints.len(),
            "discovered store connection"
        );
        Ok(connection)
    }
}

/// Parse the file contents for `hostname`.
///
/// Lines that are blank, commented or not of the form `KEY="value"` are
/// skipped. An exact `NODE_<host>_ETCD_URL_HOST` key wins; otherwise the
/// first key matching `NODE_<host>.*_ETCD_URL_HOST` is used.
pub fn parse(contents: &str, hostname: &str) -> Result<StoreConnection, ConfigError> {
    let host_key = hostname.replace('-', "_");
    let exact_key = format!("NODE_{}_ETCD_URL_HOST", host_key);
    let pattern = format!("^NODE_{}.*_ETCD_URL_HOST$", regex_lite::escape(&host_key));
    let host_pattern = regex_lite::Regex::new(&pattern).map_err(|e| ConfigError::Invalid {
        field: "hostname",
        reason: e.to_string(),
    })?;

    let mut connection = StoreConnection::default();
    let mut exact_host = None;
    let mut matched_host = None;

    for (key, value) in contents.lines().filter_map(split_assignment) {
        match key {
            CERT_KEY => connection.cert = PathBuf::from(value),
            KEY_KEY => connection.key = PathBuf::from(value),
            CA_CERT_KEY => connection.ca_cert = PathBuf::from(value),
            ENDPOINTS_KEY => {
                connection.endpoints = value
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(String::from)
                    .collect();
            }
            _ if key == exact_key => exact_host = Some(value),
            _ if matched_host.is_none() && host_pattern.is_match(key) => {
                matched_host = Some(value)
            }
            _ => {}
        }
    }

    if let Some(host) = exact_host.or(matched_host).filter(|h| !h.is_empty()) {
        connection.selected_endpoint = format!("https://{}:{}", host, ETCD_CLIENT_PORT);
    }

    connection.validate()?;
    Ok(connection)
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    let (key, value) = line.split_once("=\"")?;
    let value = value.strip_suffix('"').unwrap_or(value);
    Some((key.trim(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedHostname(&'static str);

    impl HostnameProvider for FixedHostname {
        fn hostname(&self) -> io::Result<String> {
            Ok(self.0.to_string())
        }
    }

    const ENV_FILE: &str = r#"export ETCDCTL_API="3"
export ETCDCTL_CACERT="/etc/kubernetes/static-pod-certs/configmaps/etcd-serving-ca/ca-bundle.crt"
export ETCDCTL_CERT="/etc/kubernetes/static-pod-certs/secrets/etcd-all-certs/etcd-peer-master-0.crt"
export ETCDCTL_KEY="/etc/kubernetes/static-pod-certs/secrets/etcd-all-certs/etcd-peer-master-0.key"
export ETCDCTL_ENDPOINTS="https://10.0.0.1:2379,https://10.0.0.2:2379,https://10.0.0.3:2379"

# per-member hosts
export NODE_master_0_ETCD_URL_HOST="10.0.0.1"
export NODE_master_1_ETCD_URL_HOST="10.0.0.2"
export NODE_master_2_ETCD_URL_HOST="10.0.0.3"
"#;

    #[test]
    fn test_parse_selects_this_host() {
        let conn = parse(ENV_FILE, "master-1").unwrap();
        assert_eq!(conn.selected_endpoint, "https://10.0.0.2:2379");
        assert_eq!(conn.endpoints.len(), 3);
        assert_eq!(conn.endpoints[2], "https://10.0.0.3:2379");
        assert!(conn.cert.ends_with("etcd-peer-master-0.crt"));
        assert!(conn.key.ends_with("etcd-peer-master-0.key"));
        assert!(conn.ca_cert.ends_with("ca-bundle.crt"));
    }

    #[test]
    fn test_parse_prefers_exact_host_key() {
        let contents = "\
export ETCDCTL_CACERT=\"/ca\"
export ETCDCTL_CERT=\"/cert\"
export ETCDCTL_KEY=\"/key\"
export ETCDCTL_ENDPOINTS=\"https://a:2379\"
export NODE_node_1_extra_ETCD_URL_HOST=\"10.9.9.9\"
export NODE_node_1_ETCD_URL_HOST=\"10.1.1.1\"
";
        let conn = parse(contents, "node-1").unwrap();
        assert_eq!(conn.selected_endpoint, "https://10.1.1.1:2379");
    }

    #[test]
    fn test_parse_falls_back_to_pattern_match() {
        let contents = "\
export ETCDCTL_CACERT=\"/ca\"
export ETCDCTL_CERT=\"/cert\"
export ETCDCTL_KEY=\"/key\"
export ETCDCTL_ENDPOINTS=\"https://a:2379\"
export NODE_node_1_example_com_ETCD_URL_HOST=\"10.1.1.1\"
";
        let conn = parse(contents, "node-1").unwrap();
        assert_eq!(conn.selected_endpoint, "https://10.1.1.1:2379");
    }

    #[test]
    fn test_hostname_is_not_a_regex() {
        let contents = "\
export ETCDCTL_CACERT=\"/ca\"
export ETCDCTL_CERT=\"/cert\"
export ETCDCTL_KEY=\"/key\"
export ETCDCTL_ENDPOINTS=\"https://a:2379\"
export NODE_nodeX1_ETCD_URL_HOST=\"10.1.1.1\"
";
        let err = parse(contents, "node.1").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("selected_endpoint")));
    }

    #[test]
    fn test_missing_fields_rejected_in_order() {
        let without_cert: String = ENV_FILE
            .lines()
            .filter(|l| !l.contains("ETCDCTL_CERT="))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(matches!(
            parse(&without_cert, "master-0"),
            Err(ConfigError::MissingField("cert"))
        ));

        assert!(matches!(
            parse(ENV_FILE, "worker-7"),
            Err(ConfigError::MissingField("selected_endpoint"))
        ));

        let without_endpoints: String = ENV_FILE
            .lines()
            .filter(|l| !l.contains("ENDPOINTS"))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(matches!(
            parse(&without_endpoints, "master-0"),
            Err(ConfigError::MissingField("endpoints"))
        ));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let contents = format!("garbage line\nexport FOO=bar\n=\"\"\n{}", ENV_FILE);
        assert!(parse(&contents, "master-0").is_ok());
    }

    #[test]
    fn test_discover_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etcd.env");
        fs::write(&path, ENV_FILE).unwrap();

        let discovery = EtcdEnvFile::with_hostname(&path, FixedHostname("master-2"));
        let conn = discovery.discover().unwrap();
        assert_eq!(conn.selected_endpoint, "https://10.0.0.3:2379");
    }

    #[test]
    fn test_discover_missing_file() {
        let discovery = EtcdEnvFile::with_hostname("/nonexistent/etcd.env", FixedHostname("m"));
        assert!(matches!(discovery.discover(), Err(ConfigError::Io { .. })));
    }
}
