use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use sl_telemetry::{ExporterConfig, Telemetry};

use crate::config::ServerConfig;
use crate::routes::{router, AppState};
use crate::shutdown::ShutdownSignal;

/// Run the server to completion: telemetry readers up, listener bound,
/// graceful drain on ctrl-c, one final telemetry flush on the way out.
pub async fn run(config: ServerConfig) -> Result<()> {
    let telemetry = Telemetry::init(ExporterConfig::from_env())
        .context("failed to initialise telemetry")?;

    let state = AppState::new(telemetry.collector().clone());
    state
        .metrics
        .set_gauge("app_worker_threads", config.workers as i64);

    let shutdown = ShutdownSignal::new();
    spawn_ctrl_c_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(address = %listener.local_addr()?, "listening for connections");

    serve(listener, router(state), shutdown).await?;

    telemetry.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

/// Serve the router until the shutdown signal fires, then drain in-flight
/// requests.
pub async fn serve(
    listener: TcpListener,
    router: axum::Router,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let mut rx = shutdown.subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = rx.recv().await;
        })
        .await
        .context("server error")
}

/// Wire ctrl-c to trigger graceful shutdown.
fn spawn_ctrl_c_handler(shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });
}
