//! Archive entry metadata

use serde::Serialize;

/// Kind of an archived entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry written to (or read back from) an archive.
///
/// `path` is always relative and slash-separated, without a trailing
/// slash for directories; `kind` carries that distinction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    /// Archive-relative path
    pub path: String,

    /// File or directory
    pub kind: EntryKind,

    /// Permission bits as recorded in the header
    pub mode: u32,

    /// Content size in bytes (0 for directories)
    pub size: u64,

    /// Modification time, seconds since the epoch
    pub mtime: u64,
}

impl ArchiveEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}
