//! Per-connection request handling.

use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Command, ProtocolError, Reply};
use crate::AppState;
use crate::storage::Storage;

/// Default upper bound on a single request.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;
/// Default time a client gets to send its full request.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_request_bytes: usize,
    pub read_timeout: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }
}

/// Run one decoded command against the store.
pub async fn execute(command: Command, state: &AppState) -> Reply {
    match command {
        Command::Add {
            queue,
            length,
            payload,
        } => Reply::TaskId(state.storage.add(&queue, length, payload).await),
        Command::Get { queue } => match state.storage.lease(&queue, Utc::now()).await {
            Some(task) => Reply::Task(task),
            None => Reply::None,
        },
        Command::Ack { queue, task_id } => {
            Reply::from_bool(state.storage.acknowledge(&queue, task_id).await)
        }
        Command::In { queue, task_id } => {
            Reply::from_bool(state.storage.is_active(&queue, task_id).await)
        }
        Command::Save => match state.checkpoint.save(&state.storage).await {
            Ok(_) => Reply::Ok,
            Err(e) => {
                tracing::error!(error = %e, "checkpoint save failed");
                Reply::Error
            }
        },
    }
}

/// Read the whole request, bounded by `max` bytes.
async fn read_request<S>(
    stream: &mut S,
    max: usize,
) -> std::io::Result<Result<Vec<u8>, ProtocolError>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = stream.take(max as u64 + 1);
    limited.read_to_end(&mut buf).await?;
    if buf.len() > max {
        return Ok(Err(ProtocolError::TooLarge(max)));
    }
    Ok(Ok(buf))
}

/// Serve exactly one request on `stream` and close it.
///
/// The request is read completely before anything touches the store, so a
/// client that disconnects or stalls mid-request has no effect.
pub async fn handle_connection<S>(mut stream: S, state: &AppState) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limits = state.limits;
    let request = match tokio::time::timeout(
        limits.read_timeout,
        read_request(&mut stream, limits.max_request_bytes),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(timeout = ?limits.read_timeout, "request read timed out");
            return Ok(());
        }
    };

    let reply = match request.and_then(|bytes| Command::decode(&bytes)) {
        Ok(Some(command)) => {
            let verb = command.verb();
            let reply = execute(command, state).await;
            tracing::debug!(command = verb, ?reply, "request served");
            reply
        }
        Ok(None) => {
            tracing::debug!("empty request");
            return Ok(());
        }
        Err(e) => {
            tracing::debug!(error = %e, "rejected request");
            Reply::Error
        }
    };

    stream.write_all(&reply.encode()).await?;
    stream.shutdown().await?;
    Ok(())
}
