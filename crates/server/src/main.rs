use std::future::IntoFuture;
use std::time::Duration;

use anyhow::Result;
use jobwire_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;

fn init_logging(config: &AppConfig) {
    use jobwire_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = jobwire_server::bootstrap_with_config(config)?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        events_path = %app.config.slack.events_path,
        dedup_window_secs = app.guard.window().as_secs(),
        "jobwire-server listening"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let server = axum::serve(listener, app.router).with_graceful_shutdown(async move {
        if let Err(error) = wait_for_shutdown().await {
            tracing::error!(error = %error, "shutdown signal listener failed");
        }
        let _ = stop_tx.send(true);
    });
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    tokio::select! {
        result = server.into_future() => result?,
        () = drain_deadline(stop_rx, grace) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "in-flight requests did not drain in time"
            );
        }
    }

    drain_dispatches(&app.tasks, grace).await;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "jobwire-server stopping"
    );
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Waits up to `grace` for acknowledged Slack events that are still being handled.
async fn drain_dispatches(tasks: &TaskTracker, grace: Duration) {
    tasks.close();
    if tasks.is_empty() {
        return;
    }

    tracing::info!(
        event_name = "system.server.dispatch_draining",
        correlation_id = "shutdown",
        pending = tasks.len(),
        "waiting for in-flight slack dispatches"
    );
    if tokio::time::timeout(grace, tasks.wait()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.dispatch_abandoned",
            correlation_id = "shutdown",
            pending = tasks.len(),
            "slack dispatches still running at shutdown were dropped"
        );
    }
}

/// Resolves `grace` after shutdown begins; never resolves otherwise.
async fn drain_deadline(mut stop_rx: watch::Receiver<bool>, grace: Duration) {
    if stop_rx.wait_for(|stopping| *stopping).await.is_ok() {
        tokio::time::sleep(grace).await;
    } else {
        std::future::pending::<()>().await;
    }
}
