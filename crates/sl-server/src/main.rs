//! sightline server binary — sizes the runtime from the worker formula,
//! initialises logging and telemetry, and serves the instrumented routes.

use anyhow::{Context, Result};
use tracing::info;

use sl_server::config::ServerConfig;

fn main() -> Result<()> {
    // Config loads before the runtime exists: the worker count sizes it.
    let config = ServerConfig::load().unwrap_or_else(|e| {
        eprintln!("failed to load config ({e}), using defaults");
        ServerConfig::default()
    });

    sl_telemetry::logging::init_logging_with_files(
        "sightline",
        &config.log_level,
        &config.access_log,
        &config.error_log,
    )
    .context("failed to initialise logging")?;

    info!(
        bind = %config.bind,
        workers = config.workers,
        version = env!("CARGO_PKG_VERSION"),
        "sightline server starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(sl_server::server::run(config))
}
