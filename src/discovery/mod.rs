//! Discovery of the local control-plane environment
//!
//! Everything the run learns from the host before touching the store:
//! connection parameters from the etcd environment file, the resource
//! directory of each static pod, and the cluster API host for log records.

mod certs;
mod etcd_env;
mod kubeconfig;
mod static_pods;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

pub use certs::{ensure_cert_link, CertLink, STATIC_POD_CERTS_DIR};
pub use etcd_env::{EtcdEnvFile, HostnameProvider, SystemHostname, ETCD_CLIENT_PORT};
pub use kubeconfig::api_hostname;
pub use static_pods::{StaticPodManifests, RESOURCE_DIR_VOLUME};

/// Errors while reading host state other than the etcd environment file
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("manifest {path} has no hostPath volume named {volume}")]
    MissingVolume { path: PathBuf, volume: &'static str },

    #[error("kubeconfig {path} lists no cluster server")]
    NoCluster { path: PathBuf },
}

impl DiscoveryError {
    pub fn is_io(&self) -> bool {
        matches!(self, DiscoveryError::Io { .. })
    }
}

/// Connection parameters for the store
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreConnection {
    /// Every member's client URL
    pub endpoints: Vec<String>,
    /// The member on this node; snapshots are requested from it alone
    pub selected_endpoint: String,
    pub ca_cert: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl StoreConnection {
    /// Every field must be present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cert.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("cert"));
        }
        if self.key.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("key"));
        }
        if self.ca_cert.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("ca_cert"));
        }
        if self.selected_endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("selected_endpoint"));
        }
        if self.endpoints.iter().all(|e| e.trim().is_empty()) {
            return Err(ConfigError::MissingField("endpoints"));
        }
        Ok(())
    }
}

/// Source of store connection parameters
pub trait EnvironmentDiscovery {
    fn discover(&self) -> Result<StoreConnection, ConfigError>;
}

/// Resolves where a static pod keeps its resources on the host
pub trait ResourceLocator {
    fn resource_dir(&self, component: &str) -> Result<PathBuf, DiscoveryError>;
}

/// Fixed connection parameters, for tests and callers that already know them
#[derive(Debug, Clone)]
pub struct StaticDiscovery(pub StoreConnection);

impl EnvironmentDiscovery for StaticDiscovery {
    fn discover(&self) -> Result<StoreConnection, ConfigError> {
        Ok(self.0.clone())
    }
}
