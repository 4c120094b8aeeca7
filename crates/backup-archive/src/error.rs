//! Error types for archive and checksum operations.

use std::io;
use std::path::{Path, PathBuf};

/// Errors for archive building, reading and hashing
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Unsupported file type ({file_type}) at {path}")]
    UnsupportedFileType {
        path: PathBuf,
        file_type: &'static str,
    },

    #[error("Path {path} is not under archive prefix {prefix}")]
    PathOutsidePrefix { path: PathBuf, prefix: PathBuf },

    #[error("Malformed checksum sidecar {path}: {reason}")]
    MalformedSidecar { path: PathBuf, reason: String },
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when the archive input contained something other than a
    /// regular file or a directory.
    pub fn is_unsupported_file_type(&self) -> bool {
        matches!(self, ArchiveError::UnsupportedFileType { .. })
    }

    /// True when the archive path rules were violated by the caller's
    /// roots and prefix, rather than by the filesystem.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            ArchiveError::PathOutsidePrefix { .. } | ArchiveError::MalformedSidecar { .. }
        )
    }
}

/// Human-readable name of a filesystem entry type the builder refuses.
pub(crate) fn describe_file_type(file_type: std::fs::FileType) -> &'static str {
    if file_type.is_symlink() {
        return "symlink";
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_fifo() {
            return "fifo";
        }
        if file_type.is_socket() {
            return "socket";
        }
        if file_type.is_block_device() {
            return "block device";
        }
        if file_type.is_char_device() {
            return "character device";
        }
    }
    "unknown"
}

/// Human-readable name of a tar entry type the reader refuses.
pub(crate) fn describe_archived_type(entry_type: tar::EntryType) -> &'static str {
    match entry_type {
        tar::EntryType::Symlink => "symlink",
        tar::EntryType::Link => "hard link",
        tar::EntryType::Fifo => "fifo",
        tar::EntryType::Char => "character device",
        tar::EntryType::Block => "block device",
        _ => "unknown",
    }
}
