//! Remote object storage
//!
//! The destination is checked before any artifact is produced; the final
//! bundle is uploaded under its own base name.

mod aws_cli;
mod s3;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use aws_cli::AwsCliPublisher;
pub use s3::{S3Config, ACCESS_KEY_ID_ENV, BUCKET_ENV, REGION_ENV, SECRET_ACCESS_KEY_ENV};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("bucket {bucket} does not exist or is not configured for encryption: {detail}")]
    DestinationNotReady { bucket: String, detail: String },

    #[error("upload of {path} failed: {detail}")]
    UploadFailed { path: PathBuf, detail: String },

    #[error("cannot upload {0}: not a regular file with a name")]
    InvalidArtifact(PathBuf),
}

/// Durable remote storage for the final bundle
pub trait RemotePublisher {
    /// Confirm the destination exists and is usable.
    fn verify_destination_ready(&self) -> Result<(), PublishError>;

    /// Upload `path`; returns the remote object URI.
    fn upload(&self, path: &Path) -> Result<String, PublishError>;
}

/// Object key for an uploaded file: its base name
pub fn object_key(path: &Path) -> Result<String, PublishError> {
    if !path.is_file() {
        return Err(PublishError::InvalidArtifact(path.to_path_buf()));
    }
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PublishError::InvalidArtifact(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_object_key_is_basename() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("nightly_2024-01-01T00-00-00.tgz");
        fs::write(&bundle, "tgz").unwrap();
        assert_eq!(object_key(&bundle).unwrap(), "nightly_2024-01-01T00-00-00.tgz");
    }

    #[test]
    fn test_object_key_rejects_directories() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            object_key(dir.path()),
            Err(PublishError::InvalidArtifact(_))
        ));
    }
}
