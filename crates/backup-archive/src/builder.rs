//! Gzip tar archive builder
//!
//! Serializes regular files and directory trees into one `.tgz` stream.
//! Entry names follow the prefix rule in [`crate::prefix`]; header
//! metadata is taken from the live filesystem as-is.
//!
//! The archive is written to `<destination>.partial` and renamed onto the
//! destination only after the tar trailer, the gzip footer and the file
//! sync have all succeeded. Any failure removes the partial file, so a
//! file at the destination path is always a complete archive.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::entry::{ArchiveEntry, EntryKind};
use crate::error::{describe_file_type, ArchiveError};
use crate::prefix::{archive_name, prefix_to_strip, relative_name};

/// Suffix of the in-progress archive file
pub const PARTIAL_SUFFIX: &str = "partial";

/// Build a gzip tar archive at `destination` from `roots`.
///
/// Shorthand for `ArchiveBuilder::new(destination).with_prefix(explicit_prefix).build(roots)`.
pub fn build_archive<P: AsRef<Path>>(
    destination: &Path,
    explicit_prefix: Option<&Path>,
    roots: &[P],
) -> Result<ArchiveSummary, ArchiveError> {
    ArchiveBuilder::new(destination)
        .with_prefix(explicit_prefix)
        .build(roots)
}

/// What was written by a successful build
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// Final archive path
    pub destination: PathBuf,
    /// Entries in archive order
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveSummary {
    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_file()).count()
    }

    pub fn directory_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_dir()).count()
    }

    /// Sum of archived file sizes (uncompressed)
    pub fn content_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Archive builder for one destination
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    destination: PathBuf,
    prefix: Option<PathBuf>,
    compression: Compression,
}

impl ArchiveBuilder {
    /// Create a builder writing to `destination` with the derived-prefix rule
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            prefix: None,
            compression: Compression::default(),
        }
    }

    /// Strip `prefix` from every walked path of every root.
    ///
    /// `None` or an empty path selects the derived rule (parent of each root).
    pub fn with_prefix(mut self, prefix: Option<&Path>) -> Self {
        self.prefix = prefix
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        self
    }

    /// Set the gzip compression level (0-9)
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    /// Path the archive is written to before it is complete
    pub fn partial_path(&self) -> PathBuf {
        let mut name = self.destination.as_os_str().to_os_string();
        name.push(".");
        name.push(PARTIAL_SUFFIX);
        PathBuf::from(name)
    }

    /// Walk `roots` in order and write the archive.
    pub fn build<P: AsRef<Path>>(&self, roots: &[P]) -> Result<ArchiveSummary, ArchiveError> {
        let partial = self.partial_path();

        let entries = match self.write_partial(&partial, roots) {
            Ok(entries) => entries,
            Err(err) => {
                discard_partial(&partial);
                return Err(err);
            }
        };

        if let Err(e) = fs::rename(&partial, &self.destination) {
            discard_partial(&partial);
            return Err(ArchiveError::io(&self.destination, e));
        }

        debug!(
            archive = %self.destination.display(),
            entries = entries.len(),
            "archive sealed"
        );

        Ok(ArchiveSummary {
            destination: self.destination.clone(),
            entries,
        })
    }

    fn write_partial<P: AsRef<Path>>(
        &self,
        partial: &Path,
        roots: &[P],
    ) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let file = File::create(partial).map_err(|e| ArchiveError::io(partial, e))?;
        let own_output = OwnOutput::new(&self.destination, partial)?;

        let mut tar = Builder::new(GzEncoder::new(file, self.compression));
        let mut entries = Vec::new();

        for root in roots {
            self.append_root(&mut tar, root.as_ref(), &own_output, &mut entries)?;
        }

        // Release in reverse order: tar trailer, gzip footer, file contents.
        let encoder = tar.into_inner().map_err(|e| ArchiveError::io(partial, e))?;
        let file = encoder.finish().map_err(|e| ArchiveError::io(partial, e))?;
        file.sync_all().map_err(|e| ArchiveError::io(partial, e))?;

        Ok(entries)
    }

    fn append_root<W: io::Write>(
        &self,
        tar: &mut Builder<W>,
        root: &Path,
        own_output: &OwnOutput,
        entries: &mut Vec<ArchiveEntry>,
    ) -> Result<(), ArchiveError> {
        let prefix = prefix_to_strip(root, self.prefix.as_deref());
        let metadata = fs::symlink_metadata(root).map_err(|e| ArchiveError::io(root, e))?;
        let file_type = metadata.file_type();

        if file_type.is_file() {
            return append_file(tar, root, &metadata, &prefix, entries);
        }
        if !file_type.is_dir() {
            return Err(ArchiveError::UnsupportedFileType {
                path: root.to_path_buf(),
                file_type: describe_file_type(file_type),
            });
        }

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();

            if own_output.matches(path) {
                debug!(path = %path.display(), "skipping archive's own output");
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                let metadata = entry.metadata()?;
                append_dir(tar, path, &metadata, &prefix, entries)?;
            } else if file_type.is_file() {
                let metadata = entry.metadata()?;
                append_file(tar, path, &metadata, &prefix, entries)?;
            } else {
                return Err(ArchiveError::UnsupportedFileType {
                    path: path.to_path_buf(),
                    file_type: describe_file_type(file_type),
                });
            }
        }

        Ok(())
    }
}

fn append_dir<W: io::Write>(
    tar: &mut Builder<W>,
    path: &Path,
    metadata: &Metadata,
    prefix: &Path,
    entries: &mut Vec<ArchiveEntry>,
) -> Result<(), ArchiveError> {
    // The prefix directory itself has no name inside the archive.
    let Some(relative) = relative_name(path, prefix)? else {
        return Ok(());
    };

    let mut header = Header::new_gnu();
    header.set_metadata(metadata);
    // Trailing separator marks the entry as a directory for tar readers.
    let name = relative.join("");
    tar.append_data(&mut header, &name, io::empty())
        .map_err(|e| ArchiveError::io(path, e))?;

    entries.push(entry_from_header(&relative, EntryKind::Directory, &header, path)?);
    Ok(())
}

fn append_file<W: io::Write>(
    tar: &mut Builder<W>,
    path: &Path,
    metadata: &Metadata,
    prefix: &Path,
    entries: &mut Vec<ArchiveEntry>,
) -> Result<(), ArchiveError> {
    let relative = relative_name(path, prefix)?.ok_or_else(|| ArchiveError::PathOutsidePrefix {
        path: path.to_path_buf(),
        prefix: prefix.to_path_buf(),
    })?;

    let mut header = Header::new_gnu();
    header.set_metadata(metadata);

    let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut content = file.take(metadata.len());
    tar.append_data(&mut header, &relative, &mut content)
        .map_err(|e| ArchiveError::io(path, e))?;

    if content.limit() != 0 {
        return Err(ArchiveError::io(
            path,
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank while it was being archived",
            ),
        ));
    }

    entries.push(entry_from_header(&relative, EntryKind::File, &header, path)?);
    Ok(())
}

fn entry_from_header(
    relative: &Path,
    kind: EntryKind,
    header: &Header,
    source: &Path,
) -> Result<ArchiveEntry, ArchiveError> {
    Ok(ArchiveEntry {
        path: archive_name(relative),
        kind,
        mode: header.mode().map_err(|e| ArchiveError::io(source, e))?,
        size: header.size().map_err(|e| ArchiveError::io(source, e))?,
        mtime: header.mtime().map_err(|e| ArchiveError::io(source, e))?,
    })
}

/// Remove an unfinished archive; failure only gets logged.
fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %partial.display(),
            error = %e,
            "removing partial archive failed"
        ),
    }
}

/// Identifies the archive being written so a walk over its own directory
/// does not try to archive it.
struct OwnOutput {
    dir: PathBuf,
    names: [OsString; 2],
}

impl OwnOutput {
    fn new(destination: &Path, partial: &Path) -> Result<Self, ArchiveError> {
        let dir = canonical_parent(partial).map_err(|e| ArchiveError::io(partial, e))?;
        let name_of = |p: &Path| p.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        Ok(Self {
            dir,
            names: [name_of(destination), name_of(partial)],
        })
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        if !self.names.iter().any(|n| n.as_os_str() == name) {
            return false;
        }
        canonical_parent(path).map(|dir| dir == self.dir).unwrap_or(false)
    }
}

fn canonical_parent(path: &Path) -> io::Result<PathBuf> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize(),
        _ => Path::new(".").canonicalize(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::list_archive;
    use tempfile::TempDir;

    fn names(summary: &ArchiveSummary) -> Vec<&str> {
        summary.entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_directory_root_derived_prefix() {
        let dir = TempDir::new().unwrap();
        let manifests = dir.path().join("manifests");
        fs::create_dir(&manifests).unwrap();
        fs::write(manifests.join("etcd-pod.yaml"), "kind: Pod\n").unwrap();

        let dest = dir.path().join("out.tgz");
        let summary = build_archive(&dest, None, &[&manifests]).unwrap();

        assert_eq!(names(&summary), vec!["manifests", "manifests/etcd-pod.yaml"]);
        assert_eq!(summary.file_count(), 1);
        assert_eq!(summary.directory_count(), 1);
        assert!(dest.exists());
        assert!(!ArchiveBuilder::new(&dest).partial_path().exists());
    }

    #[test]
    fn test_file_root_uses_base_name() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("snapshot.db");
        fs::write(&file, "snap").unwrap();

        let summary = build_archive(&dir.path().join("a.tgz"), None, &[&file]).unwrap();
        assert_eq!(names(&summary), vec!["snapshot.db"]);
        assert_eq!(summary.content_bytes(), 4);
    }

    #[test]
    fn test_entries_sorted_by_name_within_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        for name in ["z.txt", "a.txt", "m.txt"] {
            fs::write(root.join(name), name).unwrap();
        }

        let summary = build_archive(&dir.path().join("a.tgz"), None, &[&root]).unwrap();
        assert_eq!(
            names(&summary),
            vec!["root", "root/a.txt", "root/m.txt", "root/z.txt"]
        );
    }

    #[test]
    fn test_missing_root_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.tgz");

        let err = build_archive(&dest, None, &[dir.path().join("absent")]).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
        assert!(!dest.exists());
        assert!(!ArchiveBuilder::new(&dest).partial_path().exists());
    }

    #[test]
    fn test_root_equal_to_prefix_archives_children_only() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("data");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("x"), "x").unwrap();

        let summary = build_archive(&dir.path().join("a.tgz"), Some(root.as_path()), &[&root]).unwrap();
        assert_eq!(names(&summary), vec!["x"]);
    }

    #[test]
    fn test_archive_skips_its_own_output() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        fs::create_dir(&work).unwrap();
        fs::write(work.join("snapshot.db"), "snap").unwrap();

        let dest = work.join("bundle.tgz");
        let summary = build_archive(&dest, None, &[&work]).unwrap();

        assert_eq!(names(&summary), vec!["work", "work/snapshot.db"]);
        let listed = list_archive(&dest).unwrap();
        assert!(listed.iter().all(|e| !e.path.contains("bundle.tgz")));
    }

    #[test]
    fn test_rebuild_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, "one").unwrap();
        let dest = dir.path().join("a.tgz");

        build_archive(&dest, None, &[&file]).unwrap();
        fs::write(&file, "three").unwrap();
        let summary = build_archive(&dest, None, &[&file]).unwrap();

        assert_eq!(summary.content_bytes(), 5);
        assert_eq!(list_archive(&dest).unwrap()[0].size, 5);
    }

    #[test]
    fn test_compression_level_is_clamped() {
        let builder = ArchiveBuilder::new("/tmp/x.tgz").with_compression_level(42);
        assert_eq!(builder.compression.level(), 9);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_root_rejected() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let dest = dir.path().join("a.tgz");
        let err = build_archive(&dest, None, &[&link]).unwrap_err();
        match err {
            ArchiveError::UnsupportedFileType { path, file_type } => {
                assert_eq!(path, link);
                assert_eq!(file_type, "symlink");
            }
            other => panic!("expected UnsupportedFileType, got {:?}", other),
        }
        assert!(!dest.exists());
    }
}
