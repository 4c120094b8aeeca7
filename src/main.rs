//! cluster-backup CLI
//!
//! Entry point for the `cluster-backup` command-line tool.

use std::path::{Path, PathBuf};
use std::process;

use backup_archive::{list_archive, verify_sidecar};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{error, info, info_span, warn};

use cluster_backup::config::{parse_duration, ConfigError, EffectiveConfig};
use cluster_backup::discovery::{api_hostname, EtcdEnvFile, StaticPodManifests};
use cluster_backup::error::{BackupFailure, StageError};
use cluster_backup::logging::{init_logging, LogFormat};
use cluster_backup::publish::{AwsCliPublisher, S3Config};
use cluster_backup::signal::{install_handler, CancelToken};
use cluster_backup::snapshot::EtcdctlSnapshotClient;
use cluster_backup::{BackupReport, Collaborators, Orchestrator, RunContext, Stage};

/// Exit code for a checksum that does not match its artifact
const EXIT_CHECKSUM_MISMATCH: i32 = 1;

#[derive(Parser)]
#[command(name = "cluster-backup")]
#[command(about = "Snapshot etcd and static pod resources and ship them to S3", version)]
struct Cli {
    /// Log record format
    #[arg(long, value_enum, default_value = "json", global = true)]
    log_format: LogFormat,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backup
    Run(RunArgs),

    /// Check artifacts against their .sha256 sidecars
    Verify {
        /// Sidecar files to check
        #[arg(required = true)]
        sidecars: Vec<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List the entries of a backup archive
    List {
        archive: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Backup name (prefixes the working directory and the bundle)
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    etcd_env_file: Option<PathBuf>,

    /// Dial timeout passed to etcdctl (e.g. "10s")
    #[arg(long)]
    etcd_dial_timeout: Option<String>,

    /// Bound on the snapshot request (e.g. "60s")
    #[arg(long)]
    etcd_backup_timeout: Option<String>,

    /// Bound on each bucket check or upload call (e.g. "15m")
    #[arg(long)]
    publish_timeout: Option<String>,

    /// Keep the working directory after the run
    #[arg(long, alias = "keepLocalBackup")]
    keep_local_backup: bool,

    /// Parent of the working directory (default: system temp dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    #[arg(long)]
    host_config_dir: Option<PathBuf>,

    #[arg(long)]
    manifests_dir: Option<PathBuf>,

    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Do not create the static-pod-certs link for missing cert paths
    #[arg(long)]
    no_cert_link: bool,

    /// etcdctl binary
    #[arg(long)]
    etcdctl: Option<PathBuf>,

    /// aws CLI binary
    #[arg(long)]
    aws: Option<PathBuf>,

    /// Print the backup report as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    /// CLI layer of the configuration; unset flags are null
    fn overrides(&self) -> Result<Value, ConfigError> {
        let duration = |field: &'static str, text: &Option<String>| -> Result<Value, ConfigError> {
            match text {
                Some(text) => {
                    parse_duration(field, text)?;
                    Ok(Value::String(text.clone()))
                }
                None => Ok(Value::Null),
            }
        };

        Ok(json!({
            "name": self.name,
            "etcd_env_file": self.etcd_env_file,
            "etcd_dial_timeout": duration("etcd_dial_timeout", &self.etcd_dial_timeout)?,
            "etcd_backup_timeout": duration("etcd_backup_timeout", &self.etcd_backup_timeout)?,
            "publish_timeout": duration("publish_timeout", &self.publish_timeout)?,
            "keep_local_backup": self.keep_local_backup.then_some(true),
            "work_dir_parent": self.work_dir,
            "host_config_dir": self.host_config_dir,
            "manifests_dir": self.manifests_dir,
            "kubeconfig_path": self.kubeconfig,
            "link_missing_certs": self.no_cert_link.then_some(false),
            "etcdctl_path": self.etcdctl,
            "aws_cli_path": self.aws,
        }))
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_format, cli.verbose) {
        eprintln!("Error initializing logging: {}", e);
    }

    match cli.command {
        Commands::Run(args) => run_backup(args),
        Commands::Verify { sidecars, json } => run_verify(&sidecars, json),
        Commands::List { archive, json } => run_list(&archive, json),
    }
}

fn run_backup(args: RunArgs) {
    let config = match args
        .overrides()
        .and_then(|cli| EffectiveConfig::build(args.config.as_deref(), cli))
    {
        Ok(effective) => effective.config,
        Err(e) => exit_with_failure(&BackupFailure::new(Stage::Init, e)),
    };

    let span = info_span!("backup", name = %config.name, cluster = tracing::field::Empty);
    let _guard = span.enter();
    match api_hostname(&config.kubeconfig_path) {
        Ok(cluster) => {
            span.record("cluster", cluster.as_str());
        }
        Err(e) => warn!(error = %e, "cluster API host unknown"),
    }

    let s3 = match S3Config::from_env() {
        Ok(s3) => s3,
        Err(e) => exit_with_failure(&BackupFailure::new(Stage::Init, e)),
    };

    let cancel = CancelToken::new();
    if let Err(e) = install_handler(cancel.clone()) {
        warn!(error = %e, "failed to install interrupt handler");
    }

    let context = match RunContext::create(
        config.work_dir_parent.as_deref(),
        &config.name,
        config.keep_local_backup,
    ) {
        Ok(context) => context,
        Err(e) => exit_with_failure(&BackupFailure::new(Stage::Init, StageError::Io(e))),
    };
    info!(work_dir = %context.path().display(), "created working directory");

    let discovery = EtcdEnvFile::new(&config.etcd_env_file);
    let resources = StaticPodManifests::new(&config.manifests_dir);
    let snapshot = EtcdctlSnapshotClient::new(&config.etcdctl_path, config.etcd_dial_timeout);
    let publisher =
        AwsCliPublisher::new(&config.aws_cli_path, s3).with_timeout(config.publish_timeout);
    let collaborators = Collaborators {
        discovery: &discovery,
        resources: &resources,
        snapshot: &snapshot,
        publisher: &publisher,
    };

    let result = Orchestrator::new(&config, collaborators)
        .with_cancel_token(cancel)
        .run(context.path(), Utc::now());
    context.finish();

    match result {
        Ok(report) => {
            report_success(&report, args.json);
            process::exit(0);
        }
        Err(failure) => exit_with_failure(&failure),
    }
}

fn report_success(report: &BackupReport, json_output: bool) {
    info!(
        status = "success",
        remote_uri = %report.remote_uri,
        timestamp = %report.timestamp,
        stages = report.completed.len(),
        "backup finished"
    );
    if json_output {
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!(error = %e, "failed to serialize report"),
        }
    }
}

fn exit_with_failure(failure: &BackupFailure) -> ! {
    error!(
        status = "failure",
        stage = %failure.stage,
        kind = %failure.kind(),
        exit_code = failure.exit_code(),
        error = %failure,
        "backup failed"
    );
    process::exit(failure.exit_code());
}

fn run_verify(sidecars: &[PathBuf], json_output: bool) {
    let mut results = Vec::new();
    let mut exit_code = 0;

    for sidecar in sidecars {
        match verify_sidecar(sidecar) {
            Ok(v) => {
                if !v.is_match() {
                    exit_code = exit_code.max(EXIT_CHECKSUM_MISMATCH);
                }
                results.push(json!({
                    "sidecar": sidecar,
                    "artifact": v.artifact,
                    "ok": v.is_match(),
                    "expected": v.expected,
                    "actual": v.actual,
                }));
            }
            Err(e) => {
                let message = e.to_string();
                exit_code = exit_code.max(StageError::from(e).kind().exit_code());
                results.push(json!({
                    "sidecar": sidecar,
                    "ok": false,
                    "error": message,
                }));
            }
        }
    }

    if json_output {
        match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        for result in &results {
            let ok = result["ok"].as_bool().unwrap_or(false);
            let sidecar = result["sidecar"].as_str().unwrap_or_default();
            match result.get("error").and_then(Value::as_str) {
                Some(error) => println!("{}: ERROR {}", sidecar, error),
                None if ok => println!("{}: OK", sidecar),
                None => println!("{}: FAILED", sidecar),
            }
        }
    }
    process::exit(exit_code);
}

fn run_list(archive: &Path, json_output: bool) {
    let entries = match list_archive(archive) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error reading {}: {}", archive.display(), e);
            process::exit(StageError::from(e).kind().exit_code());
        }
    };

    if json_output {
        match serde_json::to_string_pretty(&entries) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    for entry in &entries {
        let marker = if entry.is_dir() { "/" } else { "" };
        println!("{:o} {:>10} {}{}", entry.mode & 0o7777, entry.size, entry.path, marker);
    }
    println!("\n{} entries", entries.len());
}
