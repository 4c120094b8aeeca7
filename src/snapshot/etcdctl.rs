//! `etcdctl snapshot save`

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{SnapshotClient, SnapshotContext, SnapshotError};
use crate::discovery::StoreConnection;
use crate::process::{run_watched, ProcessOutcome, Watch};

/// [`SnapshotClient`] shelling out to `etcdctl` (v3 API)
#[derive(Debug, Clone)]
pub struct EtcdctlSnapshotClient {
    program: PathBuf,
    leading_args: Vec<OsString>,
    dial_timeout: Duration,
}

impl EtcdctlSnapshotClient {
    pub fn new(program: impl Into<PathBuf>, dial_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            dial_timeout,
        }
    }

    /// Arguments placed before the etcdctl arguments, for wrappers such as
    /// `sudo` or `sh -c '...' etcdctl`.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Full argument list after the program
    pub fn arguments(&self, connection: &StoreConnection, destination: &Path) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.push(format!("--endpoints={}", connection.selected_endpoint).into());
        args.push(flag("--cacert=", &connection.ca_cert));
        args.push(flag("--cert=", &connection.cert));
        args.push(flag("--key=", &connection.key));
        args.push(format!("--dial-timeout={}s", self.dial_timeout.as_secs().max(1)).into());
        args.push("snapshot".into());
        args.push("save".into());
        args.push(destination.as_os_str().to_os_string());
        args
    }
}

fn flag(name: &str, path: &Path) -> OsString {
    let mut value = OsString::from(name);
    value.push(path.as_os_str());
    value
}

impl SnapshotClient for EtcdctlSnapshotClient {
    fn save(
        &self,
        ctx: &SnapshotContext,
        connection: &StoreConnection,
        destination: &Path,
    ) -> Result<(), SnapshotError> {
        ctx.check()?;

        info!(
            endpoint = %connection.selected_endpoint,
            destination = %destination.display(),
            timeout_secs = ctx.remaining().as_secs(),
            "requesting etcd snapshot"
        );

        let mut command = Command::new(&self.program);
        command
            .args(self.arguments(connection, destination))
            .env("ETCDCTL_API", "3");

        let watch = Watch::until(ctx.deadline()).with_cancel(ctx.cancel_token().clone());
        let outcome = run_watched(&mut command, &watch).map_err(|source| SnapshotError::Spawn {
            program: self.program.display().to_string(),
            source,
        });

        let result = match outcome {
            Ok(ProcessOutcome::Exited(captured)) if captured.status.success() => {
                debug!(stdout = %captured.stdout, "etcdctl finished");
                if destination.is_file() {
                    Ok(())
                } else {
                    Err(SnapshotError::MissingOutput(destination.to_path_buf()))
                }
            }
            Ok(ProcessOutcome::Exited(captured)) => Err(SnapshotError::Failed {
                status: captured.status.to_string(),
                stderr: captured.stderr,
            }),
            Ok(ProcessOutcome::TimedOut) => Err(SnapshotError::DeadlineExceeded),
            Ok(ProcessOutcome::Cancelled) => Err(SnapshotError::Cancelled),
            Err(e) => Err(e),
        };

        if result.is_err() {
            discard_partial(destination);
        }
        result
    }
}

/// Remove whatever a failed client left behind, including etcdctl's
/// `<dest>.part` download file.
fn discard_partial(destination: &Path) {
    let mut part = destination.as_os_str().to_os_string();
    part.push(".part");
    for path in [destination.to_path_buf(), PathBuf::from(part)] {
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed partial snapshot"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::CancelToken;
    use std::time::Instant;
    use tempfile::TempDir;

    fn connection() -> StoreConnection {
        StoreConnection {
            endpoints: vec!["https://10.0.0.1:2379".to_string()],
            selected_endpoint: "https://10.0.0.1:2379".to_string(),
            ca_cert: PathBuf::from("/certs/ca.crt"),
            cert: PathBuf::from("/certs/peer.crt"),
            key: PathBuf::from("/certs/peer.key"),
        }
    }

    #[test]
    fn test_argument_list() {
        let client = EtcdctlSnapshotClient::new("etcdctl", Duration::from_secs(10));
        let args = client.arguments(&connection(), Path::new("/w/snapshot.db"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--endpoints=https://10.0.0.1:2379",
                "--cacert=/certs/ca.crt",
                "--cert=/certs/peer.crt",
                "--key=/certs/peer.key",
                "--dial-timeout=10s",
                "snapshot",
                "save",
                "/w/snapshot.db",
            ]
        );
    }

    #[test]
    fn test_expired_context_never_runs_client() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("snapshot.db");
        let ctx = SnapshotContext::new(Instant::now(), CancelToken::new());
        let client = EtcdctlSnapshotClient::new("/nonexistent/etcdctl", Duration::from_secs(1));

        let err = client.save(&ctx, &connection(), &dest).unwrap_err();
        assert!(matches!(err, SnapshotError::DeadlineExceeded));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let ctx = SnapshotContext::with_timeout(Duration::from_secs(5), CancelToken::new());
        let client = EtcdctlSnapshotClient::new("/nonexistent/etcdctl", Duration::from_secs(1));

        let err = client
            .save(&ctx, &connection(), &dir.path().join("s.db"))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_stand_in_client_writes_snapshot() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("snapshot.db");
        // "$0" is the first etcdctl argument; the destination is the last.
        let client = EtcdctlSnapshotClient::new("sh", Duration::from_secs(1)).with_leading_args([
            "-c",
            r#"for last; do :; done; test "$ETCDCTL_API" = 3 && printf db > "$last""#,
        ]);
        let ctx = SnapshotContext::with_timeout(Duration::from_secs(10), CancelToken::new());

        client.save(&ctx, &connection(), &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "db");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_client_leaves_no_snapshot() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("snapshot.db");
        let client = EtcdctlSnapshotClient::new("sh", Duration::from_secs(1)).with_leading_args([
            "-c",
            r#"for last; do :; done; printf partial > "$last"; echo "context deadline exceeded" >&2; exit 1"#,
        ]);
        let ctx = SnapshotContext::with_timeout(Duration::from_secs(10), CancelToken::new());

        let err = client.save(&ctx, &connection(), &dest).unwrap_err();
        match err {
            SnapshotError::Failed { stderr, .. } => {
                assert_eq!(stderr, "context deadline exceeded")
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_client_hits_deadline() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("snapshot.db");
        let client = EtcdctlSnapshotClient::new("sh", Duration::from_secs(1))
            .with_leading_args(["-c", r#"for last; do :; done; : > "$last.part"; sleep 5"#]);
        let ctx = SnapshotContext::with_timeout(Duration::from_millis(300), CancelToken::new());

        let started = Instant::now();
        let err = client.save(&ctx, &connection(), &dest).unwrap_err();
        assert!(matches!(err, SnapshotError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!dest.exists());
        assert!(!dir.path().join("snapshot.db.part").exists());
    }
}
