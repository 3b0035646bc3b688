//! Graceful shutdown for taskq.
//!
//! `SIGTERM` (Unix) and Ctrl+C both cancel the server's token. The accept loop
//! then stops and in-flight connections get [`drain`]'s grace period.
//!
//! Shutdown never writes a checkpoint; persistence only happens on `SAVE`.

use std::fmt;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Wait for Ctrl+C or, on Unix, SIGTERM.
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => res.map(|()| ShutdownSignal::Interrupt),
            _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}

/// Cancel `token` once a shutdown signal arrives.
///
/// If the handlers cannot be installed the server keeps running and can only
/// be stopped by killing it.
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        received = wait_for_signal() => match received {
            Ok(sig) => {
                tracing::info!(signal = %sig, "initiating graceful shutdown");
                token.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to install signal handlers"),
        },
        _ = token.cancelled() => {}
    }
}

/// Close `tracker` and wait up to `timeout` for its tasks.
///
/// Returns `false` if tasks were still running when the timeout elapsed.
pub async fn drain(tracker: &TaskTracker, timeout: Duration) -> bool {
    tracker.close();
    if tracker.is_empty() {
        return true;
    }
    tracing::info!(in_flight = tracker.len(), "draining connections");
    if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
        tracing::warn!(
            remaining = tracker.len(),
            "drain timeout elapsed with connections still open"
        );
        return false;
    }
    true
}
