use std::sync::Arc;

use anyhow::{Context, Result};

use window_stats::aggregator::WindowAggregator;
use window_stats::clock::SystemClock;
use window_stats::config::Config;
use window_stats::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set WINDOW_STATS_CONFIG or provide config/default.toml");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    tracing::info!(
        bind = %config.server.bind_address,
        window_secs = config.window.length_secs,
        retention_secs = ?config.window.retention_secs,
        "Starting window-stats"
    );

    let aggregator = Arc::new(WindowAggregator::from_config(&config.window));
    let state = AppState::new(aggregator, Arc::new(SystemClock));

    let addr = config.server.socket_addr()?;
    let listener = server::bind(addr)
        .await
        .context("failed to start HTTP listener")?;
    server::serve(listener, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        config
            .logging
            .level
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl+C received");
}
