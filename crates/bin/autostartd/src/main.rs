use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use autostartd::Daemon;
use autostartd::config::Config;
use autostartd::console::{self, Exit};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = Config::path();
    let config = Config::load_from(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|err| {
            eprintln!("invalid log filter '{}': {err}", config.logging.filter);
            EnvFilter::new("info")
        }))
        .init();

    let daemon = Arc::new(
        Daemon::build(config)
            .await
            .context("failed to wire the daemon")?
            .with_config_path(&path),
    );
    daemon.start();
    tracing::info!(config = %path.display(), "autostartd running, type 'help' for commands");

    let console = tokio::spawn(console::run(
        Arc::clone(&daemon),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("received Ctrl-C");
        }
        exit = wait_for_quit(console) => {
            tracing::info!(?exit, "console closed");
        }
    }

    daemon.shutdown().await;
    Ok(())
}

/// Resolves on `quit`; a closed stdin keeps the daemon running.
async fn wait_for_quit(console: tokio::task::JoinHandle<std::io::Result<Exit>>) -> Exit {
    match console.await {
        Ok(Ok(Exit::Quit)) => Exit::Quit,
        Ok(Ok(Exit::EndOfInput)) => std::future::pending().await,
        Ok(Err(err)) => {
            tracing::warn!(%err, "console input failed");
            std::future::pending().await
        }
        Err(err) => {
            tracing::error!(%err, "console task failed");
            std::future::pending().await
        }
    }
}
