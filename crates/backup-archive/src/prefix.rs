//! Archive-relative path computation
//!
//! Every walked filesystem path is turned into an archive entry name by
//! stripping a prefix. The prefix is either given explicitly (shared by
//! all roots of one archive, so scattered directories merge into a single
//! namespace) or derived from the parent of the root being walked.
//!
//! Restore tooling depends on these names: a root `/etc/kubernetes/manifests`
//! archived without an explicit prefix yields `manifests/...`, and roots
//! under `/etc/kubernetes` archived with that directory as prefix keep
//! their `/etc/kubernetes`-relative layout.

use std::path::{Component, Path, PathBuf};

use crate::error::ArchiveError;

/// Prefix removed from every path walked under `root`.
///
/// A non-empty `explicit_prefix` wins verbatim, regardless of the root.
/// Otherwise the parent directory of `root` is used; a root with no parent
/// (`/`) strips itself.
pub fn prefix_to_strip(root: &Path, explicit_prefix: Option<&Path>) -> PathBuf {
    match explicit_prefix {
        Some(prefix) if !prefix.as_os_str().is_empty() => prefix.to_path_buf(),
        _ => match root.parent() {
            Some(parent) => parent.to_path_buf(),
            None => root.to_path_buf(),
        },
    }
}

/// Path of `path` relative to `prefix`, normalized to plain components.
///
/// Returns `Ok(None)` when `path` is the prefix itself. Fails when `path`
/// does not lie under `prefix` or would climb out of it with `..`.
pub fn relative_name(path: &Path, prefix: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let outside = || ArchiveError::PathOutsidePrefix {
        path: path.to_path_buf(),
        prefix: prefix.to_path_buf(),
    };

    let stripped = strip(path, prefix).ok_or_else(outside)?;

    let mut relative = PathBuf::new();
    for component in stripped.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(outside());
            }
        }
    }

    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(relative))
    }
}

/// Slash-separated archive name for a relative path.
pub fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn strip<'a>(path: &'a Path, prefix: &Path) -> Option<&'a Path> {
    if prefix.as_os_str().is_empty() || prefix == Path::new(".") {
        return Some(path.strip_prefix(".").unwrap_or(path));
    }
    if let Ok(rest) = path.strip_prefix(prefix) {
        return Some(rest);
    }
    // "./a" and "a" name the same place.
    let path = path.strip_prefix(".").unwrap_or(path);
    let prefix = prefix.strip_prefix(".").unwrap_or(prefix);
    path.strip_prefix(prefix).ok()
}
