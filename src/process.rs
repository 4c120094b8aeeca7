//! Child processes bounded by a deadline and a cancel token
//!
//! Used for the external clients (`etcdctl`, `aws`). The child runs in its
//! own process group so that termination reaches anything it spawned.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::signal::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time a terminated child gets to exit before it is killed
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Limits applied while waiting for a child
#[derive(Debug, Clone)]
pub struct Watch {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelToken>,
    pub grace: Duration,
}

impl Default for Watch {
    fn default() -> Self {
        Self {
            deadline: None,
            cancel: None,
            grace: DEFAULT_TERMINATION_GRACE,
        }
    }
}

impl Watch {
    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Output of a child that ran to completion
#[derive(Debug, Clone)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Exited(Captured),
    /// The deadline passed; the child was terminated
    TimedOut,
    /// The cancel token was set; the child was terminated
    Cancelled,
}

/// Spawn `command` with piped output and wait under `watch`.
///
/// Returns `Err` only when the child cannot be spawned or waited on.
pub fn run_watched(command: &mut Command, watch: &Watch) -> io::Result<ProcessOutcome> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    // A watch that is already over never starts the child.
    if watch.is_cancelled() {
        return Ok(ProcessOutcome::Cancelled);
    }
    if watch.is_expired() {
        return Ok(ProcessOutcome::TimedOut);
    }

    let mut child = command.spawn()?;
    debug!(pid = child.id(), program = ?command.get_program(), "spawned child");

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = loop {
        if watch.is_cancelled() {
            terminate(&mut child, watch.grace);
            return Ok(ProcessOutcome::Cancelled);
        }
        if watch.is_expired() {
            terminate(&mut child, watch.grace);
            return Ok(ProcessOutcome::TimedOut);
        }
        match child.try_wait()? {
            Some(status) => break status,
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    Ok(ProcessOutcome::Exited(Captured {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    }))
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default()
}

/// SIGTERM the child's process group, then kill after `grace`.
///
/// Failures are logged; the reader threads are left to finish on their own
/// once the pipes close.
fn terminate(child: &mut Child, grace: Duration) {
    let pid = child.id();

    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(pid, error = %e, "failed to send SIGTERM to child");
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            match child.try_wait() {
                Ok(Some(_)) => {
                    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
                    return;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    warn!(pid, error = %e, "failed to poll terminating child");
                    break;
                }
            }
        }
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = grace;
    }

    if let Err(e) = child.kill() {
        if e.kind() != io::ErrorKind::InvalidInput {
            warn!(pid, error = %e, "failed to kill child");
        }
    }
    if let Err(e) = child.wait() {
        warn!(pid, error = %e, "failed to reap child");
    }
}
