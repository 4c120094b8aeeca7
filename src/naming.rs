//! Artifact names for one run
//!
//! All names derive from a single timestamp captured when the run starts,
//! so the snapshot, the static resource archive and the bundle of one run
//! always share it.

use std::path::{Path, PathBuf};

use backup_archive::sidecar_path;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const SNAPSHOT_PREFIX: &str = "snapshot";
pub const STATIC_RESOURCES_PREFIX: &str = "static_kuberesources";

/// `strftime` format of the run timestamp; contains no `:` so names stay
/// portable
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Snapshot,
    StaticResourceArchive,
    FinalBundle,
}

/// A file the run produces, and the sidecar that will cover it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub sidecar: PathBuf,
}

impl BackupArtifact {
    pub fn new(path: PathBuf, kind: ArtifactKind) -> Self {
        let sidecar = sidecar_path(&path);
        Self {
            path,
            kind,
            sidecar,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Reserved artifact paths for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactNames {
    pub timestamp: String,
    pub snapshot: BackupArtifact,
    pub static_resources: BackupArtifact,
    pub bundle: BackupArtifact,
}

impl ArtifactNames {
    pub fn new(work_dir: &Path, backup_name: &str, started_at: DateTime<Utc>) -> Self {
        let timestamp = format_timestamp(started_at);
        Self {
            snapshot: BackupArtifact::new(
                work_dir.join(format!("{}_{}.db", SNAPSHOT_PREFIX, timestamp)),
                ArtifactKind::Snapshot,
            ),
            static_resources: BackupArtifact::new(
                work_dir.join(format!("{}_{}.tgz", STATIC_RESOURCES_PREFIX, timestamp)),
                ArtifactKind::StaticResourceArchive,
            ),
            bundle: BackupArtifact::new(
                work_dir.join(format!("{}_{}.tgz", backup_name, timestamp)),
                ArtifactKind::FinalBundle,
            ),
            timestamp,
        }
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
