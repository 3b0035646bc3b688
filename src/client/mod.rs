//! Minimal async client for the taskq protocol.
//!
//! Every call opens a fresh connection, sends one command, half-closes the
//! socket and reads the reply until the server closes it.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::storage::{LeasedTask, TaskId};

const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(String),

    #[error("payload must be non-empty without leading or trailing whitespace")]
    InvalidPayload,
}

#[derive(Debug, Clone)]
pub struct Client {
    addr: SocketAddr,
    timeout: Duration,
}

impl Client {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: Duration::from_secs(DEFAULT_CLIENT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a raw request and return the raw reply.
    ///
    /// The server may answer and close before the whole request is written
    /// (an oversized request gets `ERROR`). A failed write therefore still
    /// returns whatever reply arrived.
    pub async fn send(&self, request: &str) -> Result<String, ClientError> {
        let exchange = async {
            let mut stream = TcpStream::connect(self.addr).await?;
            let written = match stream.write_all(request.as_bytes()).await {
                Ok(()) => stream.shutdown().await,
                Err(e) => Err(e),
            };
            let reply = read_reply(&mut stream).await;
            match (written, reply) {
                (Ok(()), reply) => reply,
                (Err(e), Ok(reply)) if reply.is_empty() => Err(e),
                (Err(_), Ok(reply)) => Ok(reply),
                (Err(e), Err(_)) => Err(e),
            }
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        }
    }

    /// Submit `payload`, declaring its byte length.
    ///
    /// The server trims the payload, so one that is empty or starts or ends
    /// with whitespace is rejected here instead of being stored altered.
    pub async fn add(&self, queue: &str, payload: &str) -> Result<TaskId, ClientError> {
        if payload.is_empty() || payload.trim() != payload {
            return Err(ClientError::InvalidPayload);
        }
        let reply = self
            .send(&format!("ADD {} {} {}", queue, payload.len(), payload))
            .await?;
        reply
            .trim()
            .parse()
            .map_err(|_| ClientError::UnexpectedReply(reply))
    }

    pub async fn get(&self, queue: &str) -> Result<Option<LeasedTask>, ClientError> {
        let reply = self.send(&format!("GET {}", queue)).await?;
        if reply == "NONE" {
            return Ok(None);
        }
        parse_leased_task(&reply)
            .map(Some)
            .ok_or(ClientError::UnexpectedReply(reply))
    }

    pub async fn ack(&self, queue: &str, task_id: TaskId) -> Result<bool, ClientError> {
        let reply = self.send(&format!("ACK {} {}", queue, task_id)).await?;
        parse_yes_no(reply)
    }

    pub async fn is_in(&self, queue: &str, task_id: TaskId) -> Result<bool, ClientError> {
        let reply = self.send(&format!("IN {} {}", queue, task_id)).await?;
        parse_yes_no(reply)
    }

    pub async fn save(&self) -> Result<(), ClientError> {
        let reply = self.send("SAVE").await?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(ClientError::UnexpectedReply(reply))
        }
    }
}

/// Read until the server closes the connection.
///
/// A reset that follows a partial reply ends the read with what arrived.
async fn read_reply(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut reply = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => reply.extend_from_slice(&buf[..n]),
            Err(e) if reply.is_empty() => return Err(e),
            Err(_) => break,
        }
    }
    String::from_utf8(reply)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn parse_yes_no(reply: String) -> Result<bool, ClientError> {
    match reply.as_str() {
        "YES" => Ok(true),
        "NO" => Ok(false),
        _ => Err(ClientError::UnexpectedReply(reply)),
    }
}

/// Parse `<id> <length> <data>`; `<data>` may contain spaces.
fn parse_leased_task(reply: &str) -> Option<LeasedTask> {
    let mut parts = reply.splitn(3, ' ');
    let id = parts.next()?.parse().ok()?;
    let length = parts.next()?.parse().ok()?;
    let payload = parts.next()?.to_string();
    Some(LeasedTask {
        id,
        length,
        payload,
    })
}
