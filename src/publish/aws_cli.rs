//! [`RemotePublisher`] shelling out to the `aws` CLI

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::DEFAULT_PUBLISH_TIMEOUT;

use super::{object_key, PublishError, RemotePublisher, S3Config};
use super::{ACCESS_KEY_ID_ENV, SECRET_ACCESS_KEY_ENV};
use crate::process::{run_watched, Captured, ProcessOutcome, Watch};

#[derive(Debug, Clone)]
pub struct AwsCliPublisher {
    program: PathBuf,
    leading_args: Vec<OsString>,
    config: S3Config,
    timeout: Duration,
}

impl AwsCliPublisher {
    pub fn new(program: impl Into<PathBuf>, config: S3Config) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            config,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Bound on each `aws` invocation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments placed before the `aws` arguments
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    pub fn bucket_check_arguments(&self) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.extend(
            [
                "s3api",
                "get-bucket-encryption",
                "--bucket",
                self.config.bucket.as_str(),
                "--region",
                self.config.region.as_str(),
            ]
            .map(OsString::from),
        );
        args
    }

    pub fn upload_arguments(&self, path: &Path, key: &str) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.push("s3".into());
        args.push("cp".into());
        args.push(path.as_os_str().to_os_string());
        args.push(self.config.object_uri(key).into());
        args.push("--region".into());
        args.push(self.config.region.clone().into());
        args.push("--only-show-errors".into());
        args
    }

    /// Run one `aws` invocation; `Ok(Err(detail))` is a non-zero exit.
    fn run(&self, args: Vec<OsString>) -> Result<Result<Captured, String>, PublishError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .env(ACCESS_KEY_ID_ENV, &self.config.access_key_id)
            .env(SECRET_ACCESS_KEY_ENV, &self.config.secret_access_key)
            .env("AWS_DEFAULT_REGION", &self.config.region);

        let watch = Watch::until(Instant::now() + self.timeout);
        let outcome = run_watched(&mut command, &watch).map_err(|source| PublishError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        Ok(match outcome {
            ProcessOutcome::Exited(captured) if captured.status.success() => Ok(captured),
            ProcessOutcome::Exited(captured) => Err(failure_detail(&captured)),
            ProcessOutcome::TimedOut => Err(format!(
                "timed out after {}",
                humantime::format_duration(self.timeout)
            )),
            ProcessOutcome::Cancelled => Err("cancelled".to_string()),
        })
    }
}

fn failure_detail(captured: &Captured) -> String {
    if captured.stderr.is_empty() {
        captured.status.to_string()
    } else {
        format!("{}: {}", captured.status, captured.stderr)
    }
}

impl RemotePublisher for AwsCliPublisher {
    fn verify_destination_ready(&self) -> Result<(), PublishError> {
        info!(bucket = %self.config.bucket, region = %self.config.region, "checking bucket");
        self.run(self.bucket_check_arguments())?
            .map(|_| ())
            .map_err(|detail| PublishError::DestinationNotReady {
                bucket: self.config.bucket.clone(),
                detail,
            })
    }

    fn upload(&self, path: &Path) -> Result<String, PublishError> {
        let key = object_key(path)?;
        let uri = self.config.object_uri(&key);
        info!(path = %path.display(), uri = %uri, "uploading bundle");

        self.run(self.upload_arguments(path, &key))?
            .map_err(|detail| PublishError::UploadFailed {
                path: path.to_path_buf(),
                detail,
            })?;
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> S3Config {
        S3Config {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            region: "eu-west-1".to_string(),
            bucket: "cluster-backups".to_string(),
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_bucket_check_arguments() {
        let publisher = AwsCliPublisher::new("aws", config());
        assert_eq!(
            strings(publisher.bucket_check_arguments()),
            vec![
                "s3api",
                "get-bucket-encryption",
                "--bucket",
                "cluster-backups",
                "--region",
                "eu-west-1"
            ]
        );
    }

    #[test]
    fn test_upload_arguments() {
        let publisher = AwsCliPublisher::new("aws", config());
        let args = strings(publisher.upload_arguments(Path::new("/w/b.tgz"), "b.tgz"));
        assert_eq!(&args[..4], &["s3", "cp", "/w/b.tgz", "s3://cluster-backups/b.tgz"]);
        assert!(args.contains(&"eu-west-1".to_string()));
    }

    #[test]
    fn test_missing_cli_is_spawn_error() {
        let publisher = AwsCliPublisher::new("/nonexistent/aws", config());
        assert!(matches!(
            publisher.verify_destination_ready(),
            Err(PublishError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_bucket_check_failure() {
        let publisher = AwsCliPublisher::new("sh", config()).with_leading_args([
            "-c",
            "echo 'An error occurred (NoSuchBucket)' >&2; exit 254",
            "aws",
        ]);
        match publisher.verify_destination_ready() {
            Err(PublishError::DestinationNotReady { bucket, detail }) => {
                assert_eq!(bucket, "cluster-backups");
                assert!(detail.contains("NoSuchBucket"), "{}", detail);
            }
            other => panic!("expected DestinationNotReady, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_upload_passes_credentials_and_target() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("nightly.tgz");
        fs::write(&bundle, "tgz").unwrap();
        let record = dir.path().join("record");

        let script = format!(
            r#"test "$AWS_SECRET_ACCESS_KEY" = secret && echo "$@" > '{}'"#,
            record.display()
        );
        let publisher =
            AwsCliPublisher::new("sh", config()).with_leading_args(["-c", script.as_str(), "aws"]);

        let uri = publisher.upload(&bundle).unwrap();
        assert_eq!(uri, "s3://cluster-backups/nightly.tgz");

        let recorded = fs::read_to_string(&record).unwrap();
        assert!(recorded.starts_with(&format!("s3 cp {}", bundle.display())));
        assert!(recorded.contains("s3://cluster-backups/nightly.tgz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stalled_upload_times_out() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("nightly.tgz");
        fs::write(&bundle, "tgz").unwrap();

        let publisher = AwsCliPublisher::new("sh", config())
            .with_leading_args(["-c", "sleep 30", "aws"])
            .with_timeout(Duration::from_millis(200));

        let started = Instant::now();
        match publisher.upload(&bundle) {
            Err(PublishError::UploadFailed { detail, .. }) => {
                assert!(detail.starts_with("timed out"), "{}", detail);
            }
            other => panic!("expected UploadFailed, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
