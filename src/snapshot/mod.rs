//! Store snapshot requests
//!
//! A snapshot is requested from the single member running on this node
//! and is bounded by a deadline. The request is the only part of a run
//! that honours cancellation.

mod etcdctl;

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::discovery::StoreConnection;
use crate::signal::CancelToken;

pub use etcdctl::EtcdctlSnapshotClient;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot deadline exceeded")]
    DeadlineExceeded,

    #[error("snapshot cancelled")]
    Cancelled,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("snapshot client exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("snapshot client reported success but wrote no file at {0}")]
    MissingOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Deadline and cancellation for one request
#[derive(Debug, Clone)]
pub struct SnapshotContext {
    deadline: Instant,
    cancel: CancelToken,
}

impl SnapshotContext {
    pub fn new(deadline: Instant, cancel: CancelToken) -> Self {
        Self { deadline, cancel }
    }

    /// Context expiring `timeout` from now
    pub fn with_timeout(timeout: Duration, cancel: CancelToken) -> Self {
        Self::new(Instant::now() + timeout, cancel)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err` when the request must not continue
    pub fn check(&self) -> Result<(), SnapshotError> {
        if self.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }
        if self.is_expired() {
            return Err(SnapshotError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Writes a point-in-time snapshot of the store to a local file.
///
/// On any error the implementation must leave nothing at `destination`.
pub trait SnapshotClient {
    fn save(
        &self,
        ctx: &SnapshotContext,
        connection: &StoreConnection,
        destination: &Path,
    ) -> Result<(), SnapshotError>;
}
