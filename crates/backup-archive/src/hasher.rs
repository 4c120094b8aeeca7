//! Content hashing and checksum sidecars
//!
//! Every backup artifact gets a `<artifact>.sha256` file holding one
//! `sha256sum`-compatible line: `<64 hex digest>  <basename>`. The line is
//! written without a trailing newline; readers tolerate one.

use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::ArchiveError;

/// File extension appended to an artifact's full name
pub const SIDECAR_EXTENSION: &str = "sha256";

const DIGEST_HEX_LEN: usize = 64;

/// One checksum-manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSidecar {
    /// Lowercase SHA-256 hex digest
    pub digest: String,
    /// Base name of the covered artifact
    pub basename: String,
}

impl HashSidecar {
    /// Render as `"<digest>  <basename>"`
    pub fn to_line(&self) -> String {
        format!("{}  {}", self.digest, self.basename)
    }

    /// Parse a manifest line.
    ///
    /// Accepts both the text (`"<digest>  <name>"`) and binary
    /// (`"<digest> *<name>"`) markers and a trailing newline.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim_end_matches(['\n', '\r']);

        let digest = line
            .get(..DIGEST_HEX_LEN)
            .ok_or_else(|| "line shorter than a SHA-256 digest".to_string())?;
        if !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("digest is not hex: {}", digest));
        }

        let rest = &line[DIGEST_HEX_LEN..];
        let name = rest
            .strip_prefix("  ")
            .or_else(|| rest.strip_prefix(" *"))
            .ok_or_else(|| "expected two-space separator after digest".to_string())?;
        if name.is_empty() {
            return Err("missing file name".to_string());
        }

        Ok(Self {
            digest: digest.to_ascii_lowercase(),
            basename: name.to_string(),
        })
    }
}

/// Outcome of checking an artifact against its sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Artifact the sidecar names, resolved next to the sidecar
    pub artifact: PathBuf,
    /// Digest recorded in the sidecar
    pub expected: String,
    /// Digest of the artifact as it is now
    pub actual: String,
}

impl Verification {
    pub fn is_match(&self) -> bool {
        self.expected == self.actual
    }
}

/// Path of the sidecar covering `artifact`
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}

/// Lowercase hex SHA-256 of an in-memory buffer
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Stream a file through SHA-256 and return the lowercase hex digest.
pub fn digest_file(path: &Path) -> Result<String, ArchiveError> {
    let mut file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| ArchiveError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hash `artifact` and write its sidecar next to it.
///
/// Overwrites an existing sidecar; running twice over an unchanged file
/// yields byte-identical sidecars.
pub fn write_sidecar(artifact: &Path) -> Result<HashSidecar, ArchiveError> {
    let basename = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ArchiveError::io(
                artifact,
                io::Error::new(io::ErrorKind::InvalidInput, "artifact path has no file name"),
            )
        })?;

    let sidecar = HashSidecar {
        digest: digest_file(artifact)?,
        basename,
    };

    let path = sidecar_path(artifact);
    let mut file = open_sidecar(&path).map_err(|e| ArchiveError::io(&path, e))?;
    file.write_all(sidecar.to_line().as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| ArchiveError::io(&path, e))?;

    Ok(sidecar)
}

/// Read a sidecar and recompute the digest of the artifact it names.
///
/// The artifact is looked up by basename in the sidecar's directory, the
/// same way `sha256sum -c` resolves names relative to where it runs.
pub fn verify_sidecar(sidecar: &Path) -> Result<Verification, ArchiveError> {
    let contents = fs::read_to_string(sidecar).map_err(|e| ArchiveError::io(sidecar, e))?;
    let parsed = HashSidecar::parse(&contents).map_err(|reason| ArchiveError::MalformedSidecar {
        path: sidecar.to_path_buf(),
        reason,
    })?;

    let artifact = match sidecar.parent() {
        Some(dir) => dir.join(&parsed.basename),
        None => PathBuf::from(&parsed.basename),
    };
    let actual = digest_file(&artifact)?;

    Ok(Verification {
        artifact,
        expected: parsed.digest,
        actual,
    })
}

fn open_sidecar(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
