mod config;
mod dispatch;
mod filter;
mod poller;
mod resolver;
mod storage;
mod transmission;

use anyhow::Context;
use futures::StreamExt;
use poller::FeedPoller;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use storage::SeenFile;
use tracing_subscriber::prelude::*;
use transmission::TransmissionClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with env-declared filters.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "snag_rss=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    tracing::info!("Starting snag-rss");

    //
    // Load configuration.
    let config: config::Config = {
        // Get the config file from the first commandline argument.
        let config_path = std::env::args()
            .nth(1)
            .context("Please provide a path to a configuration file")?;

        // Canonicalize the config path so we know it exists and can use it later.
        let config_path =
            std::fs::canonicalize(&config_path).context("Failed to resolve config path")?;

        // Read file and deserialize.
        let content = std::fs::read_to_string(config_path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to deserialize config file")?
    };
    tracing::info!("Configuration loaded successfully");

    //
    // Forget everything already handed off and exit, when asked to.
    if std::env::args().any(|arg| arg == "--reset-seen") {
        let mut seen = SeenFile::open(&config.seen_file).with_context(|| {
            format!("Failed to open seen file {}", config.seen_file.display())
        })?;
        seen.clear().context("Failed to clear seen file")?;
        tracing::info!("Cleared seen file {}", config.seen_file.display());
        return Ok(());
    }

    //
    // Initialize components.
    let client = TransmissionClient::new(&config.server)?;
    let poller = FeedPoller::new(&config, client)?;

    //
    // Spawn our polling task.
    let poller_handle = tokio::spawn(async move { poller.launch().await });

    //
    // Handle signals.
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT]).unwrap();

    // Sends a message to shutdown_recv if any of the signals are received.
    let (shutdown_send, shutdown_recv) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT | SIGQUIT => {
                    shutdown_send.send(()).unwrap();
                    break;
                }
                _ => unreachable!(),
            }
        }
    });

    //
    // Wait for a signal, or for the poller to finish or fail.
    tokio::select! {
        _ = shutdown_recv => tracing::info!("Received stop signal, shutting down"),
        result = poller_handle => match result {
            Ok(Ok(())) => tracing::info!("Feed poller finished, shutting down"),
            Ok(Err(error)) => return Err(error.context("Feed poller failed")),
            Err(error) => return Err(anyhow::Error::from(error).context("Feed poller panicked")),
        },
    }

    Ok(())
}
