//! Certificate path compatibility link
//!
//! The etcd env file names certificates under
//! `<host>/static-pod-certs/...`, which some hosts only have as
//! `<host>/static-pod-resources/etcd-certs/...`.

use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

pub const STATIC_POD_CERTS_DIR: &str = "static-pod-certs";
const ETCD_CERTS_DIR: &str = "static-pod-resources/etcd-certs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertLink {
    /// The certificate is reachable as named
    NotNeeded,
    /// Something already exists at the link path
    AlreadyPresent(PathBuf),
    Created(PathBuf),
}

/// Link `<host_config_dir>/static-pod-certs` to the etcd certs directory
/// when `cert` does not exist.
pub fn ensure_cert_link(cert: &Path, host_config_dir: &Path) -> io::Result<CertLink> {
    if cert.exists() {
        return Ok(CertLink::NotNeeded);
    }

    let link = host_config_dir.join(STATIC_POD_CERTS_DIR);
    if link.symlink_metadata().is_ok() {
        return Ok(CertLink::AlreadyPresent(link));
    }

    let target = host_config_dir.join(ETCD_CERTS_DIR);
    create_link(&target, &link)?;
    info!(link = %link.display(), target = %target.display(), "created etcd cert link");
    Ok(CertLink::Created(link))
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_link(_target: &Path, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot create cert link {}", link.display()),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_existing_cert_needs_no_link() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("peer.crt");
        fs::write(&cert, "pem").unwrap();
        assert_eq!(ensure_cert_link(&cert, dir.path()).unwrap(), CertLink::NotNeeded);
        assert!(!dir.path().join(STATIC_POD_CERTS_DIR).exists());
    }

    #[test]
    fn test_missing_cert_creates_link() {
        let host = TempDir::new().unwrap();
        let real = host.path().join("static-pod-resources/etcd-certs/secrets");
        fs::create_dir_all(&real).unwrap();
        fs::write(real.join("peer.crt"), "pem").unwrap();

        let cert = host.path().join("static-pod-certs/secrets/peer.crt");
        let outcome = ensure_cert_link(&cert, host.path()).unwrap();

        assert_eq!(
            outcome,
            CertLink::Created(host.path().join(STATIC_POD_CERTS_DIR))
        );
        assert_eq!(fs::read_to_string(&cert).unwrap(), "pem");
    }

    #[test]
    fn test_existing_link_path_left_alone() {
        let host = TempDir::new().unwrap();
        fs::create_dir(host.path().join(STATIC_POD_CERTS_DIR)).unwrap();
        let cert = host.path().join("static-pod-certs/secrets/peer.crt");

        let outcome = ensure_cert_link(&cert, host.path()).unwrap();
        assert!(matches!(outcome, CertLink::AlreadyPresent(_)));
    }
}
