//! Backup orchestration
//!
//! Runs the stages in order against one working directory. The first
//! failing stage ends the run; artifacts already produced stay where they
//! are and nothing is retried.

mod stage;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use backup_archive::{build_archive, write_sidecar};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{BackupConfig, ConfigError};
use crate::discovery::{
    ensure_cert_link, CertLink, EnvironmentDiscovery, ResourceLocator, StoreConnection,
};
use crate::error::{BackupFailure, StageError};
use crate::naming::{ArtifactNames, BackupArtifact};
use crate::publish::RemotePublisher;
use crate::signal::CancelToken;
use crate::snapshot::{SnapshotClient, SnapshotContext, SnapshotError};

pub use stage::Stage;

/// The external parts of a run
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub discovery: &'a dyn EnvironmentDiscovery,
    pub resources: &'a dyn ResourceLocator,
    pub snapshot: &'a dyn SnapshotClient,
    pub publisher: &'a dyn RemotePublisher,
}

/// What a successful run produced
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub name: String,
    pub timestamp: String,
    pub work_dir: PathBuf,
    pub artifacts: Vec<BackupArtifact>,
    pub completed: Vec<Stage>,
    /// Resource directories archived into the static resource archive
    pub resource_dirs: Vec<PathBuf>,
    pub remote_uri: String,
}

/// State carried from one stage to the next
#[derive(Default)]
struct Progress {
    connection: Option<StoreConnection>,
    resource_dirs: Vec<PathBuf>,
    remote_uri: Option<String>,
    completed: Vec<Stage>,
}

pub struct Orchestrator<'a> {
    config: &'a BackupConfig,
    collaborators: Collaborators<'a>,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a BackupConfig, collaborators: Collaborators<'a>) -> Self {
        Self {
            config,
            collaborators,
            cancel: CancelToken::new(),
        }
    }

    /// Token observed by the snapshot request
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every stage in `work_dir`, naming artifacts after `started_at`.
    pub fn run(
        &self,
        work_dir: &Path,
        started_at: DateTime<Utc>,
    ) -> Result<BackupReport, BackupFailure> {
        let names = ArtifactNames::new(work_dir, &self.config.name, started_at);
        let mut progress = Progress::default();
        let mut next = Some(Stage::Init);

        while let Some(stage) = next {
            let started = Instant::now();
            info!(stage = %stage, "stage started");

            if let Err(cause) = self.execute(stage, work_dir, &names, &mut progress) {
                let failure = BackupFailure::new(stage, cause)
                    .with_completed(progress.completed.clone());
                error!(
                    stage = %stage,
                    kind = %failure.kind(),
                    error = %failure.cause,
                    "stage failed"
                );
                return Err(failure);
            }

            info!(
                stage = %stage,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "stage completed"
            );
            progress.completed.push(stage);
            next = stage.next();
        }

        Ok(BackupReport {
            name: self.config.name.clone(),
            timestamp: names.timestamp.clone(),
            work_dir: work_dir.to_path_buf(),
            artifacts: vec![names.snapshot, names.static_resources, names.bundle],
            completed: progress.completed,
            resource_dirs: progress.resource_dirs,
            remote_uri: progress.remote_uri.unwrap_or_default(),
        })
    }

    fn execute(
        &self,
        stage: Stage,
        work_dir: &Path,
        names: &ArtifactNames,
        progress: &mut Progress,
    ) -> Result<(), StageError> {
        match stage {
            Stage::Init => {
                let connection = self.collaborators.discovery.discover()?;
                connection.validate()?;
                progress.connection = Some(connection);
            }
            Stage::DestinationCheck => {
                self.collaborators.publisher.verify_destination_ready()?;
            }
            Stage::SnapshotRequested => {
                let connection = progress
                    .connection
                    .as_ref()
                    .ok_or(ConfigError::MissingField("store connection"))?;
                self.request_snapshot(connection, &names.snapshot)?;
            }
            Stage::SnapshotHashed => hash(&names.snapshot)?,
            Stage::ResourcesArchived => {
                let dirs = self
                    .config
                    .static_pods
                    .iter()
                    .map(|pod| self.collaborators.resources.resource_dir(pod))
                    .collect::<Result<Vec<_>, _>>()?;
                let summary = build_archive(
                    &names.static_resources.path,
                    Some(self.config.host_config_dir.as_path()),
                    &dirs,
                )?;
                info!(
                    path = %summary.destination.display(),
                    files = summary.file_count(),
                    directories = summary.directory_count(),
                    "archived static resources"
                );
                progress.resource_dirs = dirs;
            }
            Stage::ResourcesHashed => hash(&names.static_resources)?,
            Stage::BundleBuilt => {
                let summary = build_archive(&names.bundle.path, None, &[work_dir])?;
                info!(
                    path = %summary.destination.display(),
                    files = summary.file_count(),
                    bytes = summary.content_bytes(),
                    "built bundle"
                );
            }
            Stage::BundleHashed => hash(&names.bundle)?,
            Stage::Upload => {
                let uri = self.collaborators.publisher.upload(&names.bundle.path)?;
                info!(uri = %uri, "bundle uploaded");
                progress.remote_uri = Some(uri);
            }
        }
        Ok(())
    }

    fn request_snapshot(
        &self,
        connection: &StoreConnection,
        snapshot: &BackupArtifact,
    ) -> Result<(), StageError> {
        if self.config.link_missing_certs {
            if let CertLink::Created(link) =
                ensure_cert_link(&connection.cert, &self.config.host_config_dir)?
            {
                debug!(link = %link.display(), "cert path linked");
            }
        }

        let ctx = SnapshotContext::with_timeout(self.config.etcd_backup_timeout, self.cancel.clone());
        let result = self
            .collaborators
            .snapshot
            .save(&ctx, connection, &snapshot.path)
            // A client returning after the deadline or a cancel has still
            // been abandoned.
            .and_then(|()| ctx.check())
            .and_then(|()| {
                if snapshot.path.is_file() {
                    Ok(())
                } else {
                    Err(SnapshotError::MissingOutput(snapshot.path.clone()))
                }
            });

        if result.is_err() {
            remove_if_present(&snapshot.path);
        }
        result.map_err(StageError::from)
    }
}

fn hash(artifact: &BackupArtifact) -> Result<(), StageError> {
    let sidecar = write_sidecar(&artifact.path)?;
    debug!(path = %artifact.sidecar.display(), digest = %sidecar.digest, "wrote checksum");
    Ok(())
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => warn!(path = %path.display(), "removed snapshot left by failed client"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove snapshot"),
    }
}
