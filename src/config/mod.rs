//! Startup configuration.
//!
//! Every option can be given on the command line or through a `TASKQ_*`
//! environment variable (a `.env` file is loaded first by `main`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::protocol::handler::{
    ConnectionLimits, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_READ_TIMEOUT_SECS,
};
use crate::server::ServerOptions;
use crate::shutdown::DEFAULT_DRAIN_TIMEOUT_SECS;
use crate::storage::reclaim::DEFAULT_TASK_TIMEOUT_SECS;

#[derive(Parser, Debug, Clone)]
#[command(name = "taskq")]
#[command(about = "A simple task queue server with a text protocol")]
#[command(version)]
pub struct Config {
    /// Server port
    #[arg(short = 'p', long, env = "TASKQ_PORT", default_value_t = 5555)]
    pub port: u16,

    /// Server IP address
    #[arg(short = 'i', long, env = "TASKQ_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Directory holding the checkpoint file
    #[arg(short = 'c', long, env = "TASKQ_CHECKPOINT_DIR", default_value = ".")]
    pub checkpoint_dir: PathBuf,

    /// Seconds after which an unacknowledged lease may be reclaimed
    #[arg(
        short = 't',
        long = "timeout",
        env = "TASKQ_TASK_TIMEOUT",
        default_value_t = DEFAULT_TASK_TIMEOUT_SECS
    )]
    pub task_timeout: u64,

    /// Also reclaim expired leases across all queues every N seconds
    #[arg(long, env = "TASKQ_SWEEP_INTERVAL", value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval: Option<u64>,

    /// Largest accepted request in bytes
    #[arg(long, env = "TASKQ_MAX_REQUEST_BYTES", default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,

    /// Seconds a client has to send its whole request
    #[arg(long, env = "TASKQ_READ_TIMEOUT", default_value_t = DEFAULT_READ_TIMEOUT_SECS)]
    pub read_timeout: u64,

    /// Seconds in-flight connections get to finish after a shutdown signal
    #[arg(long, env = "TASKQ_DRAIN_TIMEOUT", default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout: u64,
}

impl Config {
    /// Resolve the listen address. `host` may be a name such as `localhost`.
    pub async fn listen_addr(&self) -> std::io::Result<SocketAddr> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("could not resolve {}:{}", self.host, self.port),
                )
            })
    }

    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_request_bytes: self.max_request_bytes,
            read_timeout: Duration::from_secs(self.read_timeout),
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            drain_timeout: Duration::from_secs(self.drain_timeout),
            sweep_interval: self.sweep_interval.map(Duration::from_secs),
        }
    }
}
