//! Reading archives back

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::{describe_archived_type, ArchiveError};
use crate::prefix::archive_name;

/// List the entries of a gzip tar archive in stored order.
///
/// Entries other than regular files and directories fail with
/// `UnsupportedFileType`; the builder never writes them.
pub fn list_archive(path: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut entries = Vec::new();
    for entry in archive.entries().map_err(|e| ArchiveError::io(path, e))? {
        let entry = entry.map_err(|e| ArchiveError::io(path, e))?;
        let header = entry.header();

        let kind = match header.entry_type() {
            tar::EntryType::Regular => EntryKind::File,
            tar::EntryType::Directory => EntryKind::Directory,
            other => {
                let name = entry
                    .path()
                    .map(|p| p.into_owned())
                    .unwrap_or_else(|_| path.to_path_buf());
                return Err(ArchiveError::UnsupportedFileType {
                    path: name,
                    file_type: describe_archived_type(other),
                });
            }
        };

        let name = entry.path().map_err(|e| ArchiveError::io(path, e))?;
        entries.push(ArchiveEntry {
            path: archive_name(&name),
            kind,
            mode: header.mode().map_err(|e| ArchiveError::io(path, e))?,
            size: header.size().map_err(|e| ArchiveError::io(path, e))?,
            mtime: header.mtime().map_err(|e| ArchiveError::io(path, e))?,
        });
    }

    Ok(entries)
}
