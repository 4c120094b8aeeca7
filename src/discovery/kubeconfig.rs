//! Cluster API host lookup from a kubeconfig

use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::DiscoveryError;

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
struct Cluster {
    #[serde(default)]
    server: String,
}

/// API host of the first cluster, without scheme and the default port.
pub fn api_hostname(kubeconfig: &Path) -> Result<String, DiscoveryError> {
    let contents = fs::read_to_string(kubeconfig).map_err(|source| DiscoveryError::Io {
        path: kubeconfig.to_path_buf(),
        source,
    })?;
    let parsed: Kubeconfig =
        serde_yaml::from_str(&contents).map_err(|source| DiscoveryError::Manifest {
            path: kubeconfig.to_path_buf(),
            source,
        })?;

    let server = parsed
        .clusters
        .into_iter()
        .next()
        .map(|c| c.cluster.server)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DiscoveryError::NoCluster {
            path: kubeconfig.to_path_buf(),
        })?;

    let host = server.strip_prefix("https://").unwrap_or(&server);
    let host = host.strip_suffix(":6443").unwrap_or(host);
    Ok(host.to_string())
}
