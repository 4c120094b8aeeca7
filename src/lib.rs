//! Control-plane backup
//!
//! One unattended run snapshots the cluster store, archives the static
//! pod resources, bundles both with their checksums and uploads the
//! bundle to object storage.

pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod naming;
pub mod orchestrator;
pub mod process;
pub mod publish;
pub mod run_context;
pub mod signal;
pub mod snapshot;

pub use config::{BackupConfig, ConfigError, EffectiveConfig};
pub use error::{BackupFailure, ErrorKind, StageError};
pub use naming::{ArtifactKind, ArtifactNames, BackupArtifact};
pub use orchestrator::{BackupReport, Collaborators, Orchestrator, Stage};
pub use run_context::RunContext;
pub use signal::CancelToken;
