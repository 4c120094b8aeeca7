//! Backup archive primitives
//!
//! Builds gzip-compressed tar archives from files and directory trees,
//! computes archive-relative entry names, and writes/verifies SHA-256
//! checksum sidecars in the `sha256sum` manifest-line format.

pub mod builder;
pub mod entry;
pub mod error;
pub mod hasher;
pub mod prefix;
pub mod reader;

pub use builder::{build_archive, ArchiveBuilder, ArchiveSummary, PARTIAL_SUFFIX};
pub use entry::{ArchiveEntry, EntryKind};
pub use error::ArchiveError;
pub use hasher::{
    digest_bytes, digest_file, sidecar_path, verify_sidecar, write_sidecar, HashSidecar, Verification,
    SIDECAR_EXTENSION,
};
pub use prefix::{archive_name, prefix_to_strip, relative_name};
pub use reader::list_archive;
