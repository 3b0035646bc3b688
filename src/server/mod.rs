//! TCP listener for taskq.
//!
//! Accepts connections and serves each one on its own task. All store access
//! goes through the store's single lock, so connections may run concurrently.
//!
//! # Example
//!
//! ```ignore
//! use taskq::server::{bind, run_server};
//!
//! let listener = bind(addr).await?;
//! run_server(listener, state, options, shutdown).await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::AppState;
use crate::protocol::handler::handle_connection;
use crate::shutdown::{DEFAULT_DRAIN_TIMEOUT_SECS, drain};
use crate::storage::Storage;
use crate::storage::memory::InMemoryStorage;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// How long in-flight connections get to finish after shutdown starts.
    pub drain_timeout: Duration,
    /// Period of the all-queue reclamation sweep; `None` keeps reclamation lazy.
    pub sweep_interval: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            sweep_interval: None,
        }
    }
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Periodically reclaim expired leases in every queue.
///
/// Uses the same expiry predicate as `lease`, so a task is never reclaimed
/// before its timeout has passed.
pub fn spawn_reclaim_sweep(
    storage: Arc<InMemoryStorage>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    storage.reclaim_expired(Utc::now()).await;
                }
            }
        }
        tracing::debug!("reclaim sweep stopped");
    })
}

/// Accept connections until `shutdown` is cancelled, then drain.
pub async fn run_server(
    listener: TcpListener,
    state: AppState,
    options: ServerOptions,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let local_addr = listener.local_addr()?;
    tracing::info!("taskq listening on {}", local_addr);

    let sweep = options
        .sweep_interval
        .map(|every| spawn_reclaim_sweep(state.storage.clone(), every, shutdown.clone()));

    let tracker = TaskTracker::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = state.clone();
                    let span = tracing::info_span!("connection", %peer);
                    tracker.spawn(
                        async move {
                            if let Err(e) = handle_connection(stream, &state).await {
                                tracing::warn!(error = %e, "connection failed");
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    // e.g. EMFILE; pause before accepting again.
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }

    drop(listener);
    tracing::info!("stopped accepting connections");
    drain(&tracker, options.drain_timeout).await;

    if let Some(sweep) = sweep {
        let _ = sweep.await;
    }

    let stats = state.storage.get_stats().await;
    tracing::info!(%stats, "server shutdown complete");
    Ok(())
}
