use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use taskq::config::Config;
use taskq::server::{bind, run_server};
use taskq::shutdown::cancel_on_signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    taskq::telemetry::init_logging().context("failed to initialize logging")?;

    let config = Config::parse();
    tracing::debug!(?config, "loaded configuration");

    let state = taskq::app(&config).await.with_context(|| {
        format!(
            "failed to load checkpoint from {}",
            config.checkpoint_dir.display()
        )
    })?;

    let addr = config
        .listen_addr()
        .await
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = bind(addr).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    run_server(listener, state, config.server_options(), shutdown).await?;
    Ok(())
}
