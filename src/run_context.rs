//! Per-run working directory

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{info, warn};

#[derive(Debug)]
enum WorkDir {
    Temporary(TempDir),
    Kept(PathBuf),
}

/// A freshly created, uniquely named directory holding one run's artifacts.
///
/// Removed by [`RunContext::finish`] unless created with `keep`.
#[derive(Debug)]
pub struct RunContext {
    dir: WorkDir,
}

impl RunContext {
    /// Create `<parent>/<name>-XXXXXX`, or under the system temp dir when
    /// `parent` is `None`.
    pub fn create(parent: Option<&Path>, name: &str, keep: bool) -> io::Result<Self> {
        let prefix = format!("{}-", name);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        let dir = if keep {
            #[allow(deprecated)]
            let path = dir.into_path();
            WorkDir::Kept(path)
        } else {
            WorkDir::Temporary(dir)
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            WorkDir::Temporary(dir) => dir.path(),
            WorkDir::Kept(path) => path,
        }
    }

    pub fn is_kept(&self) -> bool {
        matches!(self.dir, WorkDir::Kept(_))
    }

    /// End the run: remove the directory unless kept.
    ///
    /// Returns the kept path. A removal failure is logged.
    pub fn finish(self) -> Option<PathBuf> {
        match self.dir {
            WorkDir::Kept(path) => {
                info!(path = %path.display(), "keeping local backup");
                Some(path)
            }
            WorkDir::Temporary(dir) => {
                let path = dir.path().to_path_buf();
                if let Err(e) = dir.close() {
                    warn!(path = %path.display(), error = %e, "failed to remove working directory");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_directory_removed_on_finish() {
        let parent = TempDir::new().unwrap();
        let ctx = RunContext::create(Some(parent.path()), "nightly", false).unwrap();
        let path = ctx.path().to_path_buf();
        fs::write(path.join("snapshot.db"), "x").unwrap();

        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("nightly-"));
        assert_eq!(ctx.finish(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_directory_survives() {
        let parent = TempDir::new().unwrap();
        let ctx = RunContext::create(Some(parent.path()), "nightly", true).unwrap();
        assert!(ctx.is_kept());
        let path = ctx.path().to_path_buf();

        assert_eq!(ctx.finish(), Some(path.clone()));
        assert!(path.is_dir());
    }

    #[test]
    fn test_unique_per_run() {
        let parent = TempDir::new().unwrap();
        let a = RunContext::create(Some(parent.path()), "b", false).unwrap();
        let b = RunContext::create(Some(parent.path()), "b", false).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_missing_parent_fails() {
        let parent = TempDir::new().unwrap();
        let missing = parent.path().join("absent");
        assert!(RunContext::create(Some(&missing), "b", false).is_err());
    }
}
