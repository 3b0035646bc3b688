#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;

use clap::Parser;
use taskq::AppState;
use taskq::client::Client;
use taskq::config::Config;
use taskq::server::{ServerError, ServerOptions, bind, run_server};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: AppState,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), ServerError>>,
}

pub fn config(dir: &Path, timeout_secs: u64) -> Config {
    config_with(dir, timeout_secs, &[])
}

/// Like `config`, with extra command-line flags appended.
pub fn config_with(dir: &Path, timeout_secs: u64, extra: &[&str]) -> Config {
    let mut args = vec![
        "taskq".to_string(),
        "-p".to_string(),
        "0".to_string(),
        "-c".to_string(),
        dir.display().to_string(),
        "-t".to_string(),
        timeout_secs.to_string(),
    ];
    args.extend(extra.iter().map(|arg| arg.to_string()));
    Config::try_parse_from(args).unwrap()
}

/// Start a server on an ephemeral port, restoring from `dir` if a checkpoint exists.
pub async fn start(dir: &Path, timeout_secs: u64) -> TestServer {
    start_with(dir, timeout_secs, ServerOptions::default()).await
}

pub async fn start_with(dir: &Path, timeout_secs: u64, options: ServerOptions) -> TestServer {
    start_config(&config(dir, timeout_secs), options).await
}

pub async fn start_config(config: &Config, options: ServerOptions) -> TestServer {
    let state = taskq::app(config).await.unwrap();
    let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(run_server(
        listener,
        state.clone(),
        options,
        shutdown.clone(),
    ));

    TestServer {
        addr,
        client: Client::new(addr),
        state,
        shutdown,
        handle,
    }
}

impl TestServer {
    pub async fn send(&self, request: &str) -> String {
        self.client.send(request).await.unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}
