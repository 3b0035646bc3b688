//! taskq: a TCP task-leasing broker.
//!
//! Producers `ADD` tasks to named queues, workers `GET` (lease) the earliest
//! unclaimed task and `ACK` it when done. Leases older than the configured
//! timeout are reclaimed the next time somebody leases from the same queue.
//! `SAVE` writes the whole store to a checkpoint file, which is loaded again
//! on startup.

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod storage;
pub mod telemetry;

use std::path::Path;
use std::sync::Arc;

use config::Config;
use protocol::handler::ConnectionLimits;
use storage::checkpoint::CheckpointError;
use storage::checkpoint::manager::CheckpointManager;
use storage::memory::InMemoryStorage;
use storage::reclaim::LeasePolicy;

/// Shared state handed to every connection.
#[derive(Clone, Debug)]
pub struct AppState {
    pub storage: Arc<InMemoryStorage>,
    pub checkpoint: Arc<CheckpointManager>,
    pub limits: ConnectionLimits,
}

impl AppState {
    pub fn new(
        storage: Arc<InMemoryStorage>,
        checkpoint_dir: impl AsRef<Path>,
        limits: ConnectionLimits,
    ) -> Self {
        Self {
            storage,
            checkpoint: Arc::new(CheckpointManager::new(checkpoint_dir)),
            limits,
        }
    }
}

/// Build the application state, restoring the checkpoint when one exists.
///
/// A checkpoint that exists but cannot be read or fails validation is an error.
pub async fn app(config: &Config) -> Result<AppState, CheckpointError> {
    let storage = Arc::new(InMemoryStorage::new(LeasePolicy::from_secs(
        config.task_timeout,
    )));
    let state = AppState::new(storage, &config.checkpoint_dir, config.limits());

    if state.checkpoint.restore_into(&state.storage).await? {
        tracing::info!(
            path = %state.checkpoint.path().display(),
            "restored store from checkpoint"
        );
    } else {
        tracing::info!(
            path = %state.checkpoint.path().display(),
            "no checkpoint found, starting with an empty store"
        );
    }
    Ok(state)
}
