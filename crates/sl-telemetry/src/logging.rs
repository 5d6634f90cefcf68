use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter, fmt, EnvFilter, Layer};

use crate::export::TelemetryError;
use crate::middleware::ACCESS_LOG_TARGET;

/// Initialize logging with human-readable output format.
///
/// Uses the `RUST_LOG` environment variable if set, otherwise falls back
/// to `default_level` (e.g. "info", "sl_server=debug,warn"). Finished spans
/// are emitted as close events, which is what carries span output to the
/// console sink.
///
/// Safe to call multiple times (e.g. in tests) -- subsequent calls are no-ops.
pub fn init_logging(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (human-readable)");
}

/// Initialize logging with JSON output format (suitable for Vector / Loki / ELK).
///
/// Safe to call multiple times -- subsequent calls are no-ops.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::info!(service = service_name, "logging initialised (json)");
}

/// Initialize logging with console output plus access/error log files.
///
/// Events with the [`ACCESS_LOG_TARGET`] target go to the access log file;
/// everything else goes to the error log file. The console sink receives
/// all events and span close events regardless, so exported telemetry stays
/// visible when running in the foreground.
///
/// Safe to call multiple times -- subsequent calls are no-ops.
pub fn init_logging_with_files(
    service_name: &str,
    default_level: &str,
    access_path: &Path,
    error_path: &Path,
) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let access_file = Arc::new(open_append(access_path)?);
    let error_file = Arc::new(open_append(error_path)?);

    let console_layer = fmt::layer().with_span_events(FmtSpan::CLOSE);
    let error_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(error_file)
        .with_filter(filter::filter_fn(|meta| {
            meta.target() != ACCESS_LOG_TARGET
        }));
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(access_file)
        .with_filter(filter::filter_fn(|meta| {
            meta.target() == ACCESS_LOG_TARGET
        }));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(error_layer)
        .with(access_layer)
        .try_init()
        .ok();

    tracing::info!(
        service = service_name,
        access_log = %access_path.display(),
        error_log = %error_path.display(),
        "logging initialised (console + files)"
    );
    Ok(())
}

fn open_append(path: &Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::LogFile {
            path: path.display().to_string(),
            source,
        })
}
