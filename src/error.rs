//! Failure taxonomy for a backup run
//!
//! Component errors convert into [`StageError`]; the orchestrator tags the
//! failing stage with [`BackupFailure`]. The CLI maps [`ErrorKind`] onto a
//! process exit code.

use std::io;

use backup_archive::ArchiveError;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::discovery::DiscoveryError;
use crate::orchestrator::Stage;
use crate::publish::PublishError;
use crate::snapshot::SnapshotError;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid configuration, including discovered parameters
    Config,
    /// The store could not produce a snapshot (timeout, cancel, client error)
    StoreUnavailable,
    /// Local filesystem failure
    Io,
    /// A backup root contained something other than files and directories
    UnsupportedFileType,
    /// Remote destination check or upload failed
    Publish,
}

impl ErrorKind {
    /// Process exit code for this kind of failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Config => 2,
            ErrorKind::StoreUnavailable => 3,
            ErrorKind::Io => 4,
            ErrorKind::UnsupportedFileType => 5,
            ErrorKind::Publish => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::Io => "io",
            ErrorKind::UnsupportedFileType => "unsupported_file_type",
            ErrorKind::Publish => "publish",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised while executing one stage
#[derive(Debug, Error)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] SnapshotError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Config(_) => ErrorKind::Config,
            StageError::Discovery(e) if e.is_io() => ErrorKind::Io,
            StageError::Discovery(_) => ErrorKind::Config,
            StageError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            StageError::Archive(e) if e.is_unsupported_file_type() => {
                ErrorKind::UnsupportedFileType
            }
            StageError::Archive(e) if e.is_invalid_input() => ErrorKind::Config,
            StageError::Archive(_) => ErrorKind::Io,
            StageError::Io(_) => ErrorKind::Io,
            StageError::Publish(_) => ErrorKind::Publish,
        }
    }
}

/// A run that stopped at `stage`
#[derive(Debug, Error)]
#[error("{stage} stage failed: {cause}")]
pub struct BackupFailure {
    pub stage: Stage,
    #[source]
    pub cause: StageError,
    /// Stages that finished before the failure, in order
    pub completed: Vec<Stage>,
}

impl BackupFailure {
    pub fn new(stage: Stage, cause: impl Into<StageError>) -> Self {
        Self {
            stage,
            cause: cause.into(),
            completed: Vec::new(),
        }
    }

    pub fn with_completed(mut self, completed: Vec<Stage>) -> Self {
        self.completed = completed;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}
