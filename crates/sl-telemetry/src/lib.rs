//! Telemetry and observability infrastructure for sightline services.
//!
//! This crate provides the process-wide observability layer: structured
//! logging, a thread-safe metrics collector, periodic metric export, and
//! per-request instrumentation for axum handlers. Handles are created once
//! at startup and passed into the server by dependency injection rather
//! than looked up through a hidden global.
//!
//! Key components:
//! - **Logging**: Human-readable and JSON-formatted output via
//!   `tracing-subscriber`, with optional access/error log file sinks.
//!   Finished spans are emitted to the same sinks, which doubles as the
//!   console span exporter.
//! - **Metrics**: Thread-safe counters, gauges, and histograms with label
//!   sets, exported in Prometheus text and JSON formats.
//! - **Export**: A periodic console reader, plus an OTLP/HTTP reader when
//!   a collector endpoint is configured in the environment.
//! - **Middleware**: Axum middleware for request IDs and access logging.
//! - **Tracing**: OpenTelemetry-compatible trace IDs minted per request
//!   and attached to a request span for correlation across services.

pub mod export;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod tracing_setup;

pub use export::{ExporterConfig, MetricReader, Telemetry, TelemetryError};
pub use metrics::{instrument_request, MetricsCollector, RequestTimer};
