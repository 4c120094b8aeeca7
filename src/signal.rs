//! Interrupt handling (SIGINT/SIGTERM)
//!
//! The first signal requests cancellation. Only the snapshot request
//! observes it: a running `etcdctl` is terminated and the run fails at the
//! snapshot stage. Archive building has no cancellation point. A second
//! signal exits immediately.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Exit code used when a second signal forces an immediate exit
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// What the handler does for the Nth signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: request cooperative cancellation
    Cancel,
    /// Second signal: exit now
    ImmediateExit,
    /// Later signals
    Ignore,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    signal_count: AtomicU8,
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Record one received signal and decide what to do about it
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.state.signal_count.fetch_add(1, Ordering::SeqCst) + 1;
        match count {
            1 => {
                self.cancel();
                SignalAction::Cancel
            }
            2 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Install the process-wide SIGINT/SIGTERM handler feeding `token`.
///
/// Must be called at most once per process.
pub fn install_handler(token: CancelToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || match token.handle_signal() {
        SignalAction::Cancel => {
            warn!("received interrupt, cancelling pending snapshot request");
        }
        SignalAction::ImmediateExit => {
            warn!("received second interrupt, exiting immediately");
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        SignalAction::Ignore => {}
    })
}
