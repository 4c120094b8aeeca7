//! Static pod resource directories

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use super::{DiscoveryError, ResourceLocator};

/// Volume whose host path holds a static pod's revisioned resources
pub const RESOURCE_DIR_VOLUME: &str = "resource-dir";

#[derive(Debug, Deserialize)]
struct PodManifest {
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    volumes: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    name: String,
    #[serde(rename = "hostPath")]
    host_path: Option<HostPath>,
}

#[derive(Debug, Deserialize)]
struct HostPath {
    path: PathBuf,
}

/// [`ResourceLocator`] reading `<manifests_dir>/<component>-pod.yaml`
#[derive(Debug, Clone)]
pub struct StaticPodManifests {
    manifests_dir: PathBuf,
}

impl StaticPodManifests {
    pub fn new(manifests_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifests_dir: manifests_dir.into(),
        }
    }
}

impl ResourceLocator for StaticPodManifests {
    fn resource_dir(&self, component: &str) -> Result<PathBuf, DiscoveryError> {
        let path = self.manifests_dir.join(format!("{}-pod.yaml", component));
        let contents = fs::read_to_string(&path).map_err(|source| DiscoveryError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest: PodManifest =
            serde_yaml::from_str(&contents).map_err(|source| DiscoveryError::Manifest {
                path: path.clone(),
                source,
            })?;

        manifest
            .spec
            .volumes
            .into_iter()
            .find(|v| v.name == RESOURCE_DIR_VOLUME)
            .and_then(|v| v.host_path)
            .map(|h| h.path)
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(DiscoveryError::MissingVolume {
                path,
                volume: RESOURCE_DIR_VOLUME,
            })
    }
}
