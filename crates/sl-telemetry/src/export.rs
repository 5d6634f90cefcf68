//! Periodic metric export.
//!
//! Two kinds of readers drain the collector on a fixed interval:
//! - a console reader, always active, which logs a JSON snapshot through
//!   the `tracing` pipeline;
//! - an OTLP/HTTP reader, active only when a collector endpoint is
//!   configured in the environment, which POSTs the snapshot encoded as
//!   OTLP JSON (cumulative temporality).
//!
//! The reader set is derived from [`ExporterConfig`] as a pure function so
//! the selection logic is testable without spawning tasks or touching the
//! network.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::{MetricsCollector, MetricsSnapshot};

/// Fixed export interval, matching the periodic reader cadence of the
/// upstream collectors this service is pointed at.
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(5);

const DEFAULT_SERVICE_NAME: &str = "sightline-app";

/// Log target used by the console reader, so file sinks can route export
/// snapshots separately from application logs if they want to.
pub const EXPORT_LOG_TARGET: &str = "sl_telemetry::export";

/// Error type for telemetry initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: String,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// ExporterConfig
// ---------------------------------------------------------------------------

/// Export settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Value of the `service.name` resource attribute on exported payloads.
    pub service_name: String,
    /// Interval between export ticks.
    pub interval: Duration,
    /// Full OTLP metrics endpoint URL, when a remote collector is configured.
    pub otlp_endpoint: Option<String>,
}

impl ExporterConfig {
    /// Resolve the exporter configuration from the standard OTel environment
    /// variables: `OTEL_EXPORTER_OTLP_METRICS_ENDPOINT` (preferred),
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`, and `OTEL_SERVICE_NAME`.
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT").ok(),
            std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            std::env::var("OTEL_SERVICE_NAME").ok(),
        )
    }

    /// Pure resolution of the exporter configuration.
    ///
    /// A metrics-specific endpoint is used verbatim; a generic endpoint gets
    /// the `/v1/metrics` signal path appended, per the OTLP convention.
    /// Empty values are treated as unset.
    pub fn resolve(
        metrics_endpoint: Option<String>,
        generic_endpoint: Option<String>,
        service_name: Option<String>,
    ) -> Self {
        let metrics_endpoint = metrics_endpoint.filter(|s| !s.is_empty());
        let generic_endpoint = generic_endpoint.filter(|s| !s.is_empty());

        let otlp_endpoint = metrics_endpoint.or_else(|| {
            generic_endpoint.map(|base| format!("{}/v1/metrics", base.trim_end_matches('/')))
        });

        Self {
            service_name: service_name
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            interval: DEFAULT_EXPORT_INTERVAL,
            otlp_endpoint,
        }
    }
}

/// One configured metric reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricReader {
    Console,
    Otlp { endpoint: String },
}

/// Derive the reader set for a configuration: always the console reader,
/// plus an OTLP reader iff a remote endpoint is configured.
pub fn configured_readers(config: &ExporterConfig) -> Vec<MetricReader> {
    let mut readers = vec![MetricReader::Console];
    if let Some(endpoint) = &config.otlp_endpoint {
        readers.push(MetricReader::Otlp {
            endpoint: endpoint.clone(),
        });
    }
    readers
}

// ---------------------------------------------------------------------------
// Telemetry handle
// ---------------------------------------------------------------------------

/// Process-wide telemetry handle.
///
/// Owns the metrics collector and the spawned reader tasks. Created once at
/// startup; the collector is handed to the server by dependency injection.
/// [`Telemetry::shutdown`] stops the readers after one final flush so
/// samples recorded just before exit still reach the sinks.
pub struct Telemetry {
    collector: Arc<MetricsCollector>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Telemetry {
    /// Create a fresh collector and spawn the configured readers on the
    /// current runtime.
    pub fn init(config: ExporterConfig) -> Result<Self, TelemetryError> {
        Self::with_collector(Arc::new(MetricsCollector::new()), config)
    }

    /// Spawn the configured readers around an existing collector.
    pub fn with_collector(
        collector: Arc<MetricsCollector>,
        config: ExporterConfig,
    ) -> Result<Self, TelemetryError> {
        let (stop, _) = watch::channel(false);
        let mut tasks = Vec::new();

        for reader in configured_readers(&config) {
            match reader {
                MetricReader::Console => {
                    tasks.push(spawn_console_reader(
                        collector.clone(),
                        config.interval,
                        stop.subscribe(),
                    ));
                }
                MetricReader::Otlp { endpoint } => {
                    let client = reqwest::Client::builder()
                        .timeout(Duration::from_secs(10))
                        .build()?;
                    tracing::info!(endpoint = %endpoint, "OTLP metrics reader active");
                    tasks.push(spawn_otlp_reader(
                        collector.clone(),
                        client,
                        endpoint,
                        config.service_name.clone(),
                        config.interval,
                        stop.subscribe(),
                    ));
                }
            }
        }

        Ok(Self {
            collector,
            stop,
            tasks,
        })
    }

    /// The shared metrics collector.
    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Stop the readers after one final export of whatever is pending.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Reader loops
// ---------------------------------------------------------------------------

fn spawn_console_reader(
    collector: Arc<MetricsCollector>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => export_console(&collector),
                _ = stop.changed() => {
                    export_console(&collector);
                    break;
                }
            }
        }
    })
}

fn spawn_otlp_reader(
    collector: Arc<MetricsCollector>,
    client: reqwest::Client,
    endpoint: String,
    service_name: String,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    export_otlp(&client, &endpoint, &collector, &service_name).await;
                }
                _ = stop.changed() => {
                    export_otlp(&client, &endpoint, &collector, &service_name).await;
                    break;
                }
            }
        }
    })
}

fn export_console(collector: &MetricsCollector) {
    let snapshot = collector.export_json();
    tracing::info!(
        target: EXPORT_LOG_TARGET,
        metrics = %snapshot,
        "periodic metrics export"
    );
}

async fn export_otlp(
    client: &reqwest::Client,
    endpoint: &str,
    collector: &MetricsCollector,
    service_name: &str,
) {
    let payload = otlp_payload(&collector.snapshot(), service_name);
    match client.post(endpoint).json(&payload).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(endpoint = %endpoint, "OTLP metrics export ok");
        }
        Ok(response) => {
            warn!(
                endpoint = %endpoint,
                status = %response.status(),
                "collector rejected metrics export"
            );
        }
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "OTLP metrics export failed");
        }
    }
}

// ---------------------------------------------------------------------------
// OTLP JSON encoding
// ---------------------------------------------------------------------------

/// Encode a snapshot as an OTLP/HTTP JSON `ExportMetricsServiceRequest`.
///
/// Counters become monotonic cumulative sums, gauges become gauges, and
/// histograms become cumulative histogram data points. Per the proto3 JSON
/// mapping, 64-bit integers are encoded as strings.
pub fn otlp_payload(snapshot: &MetricsSnapshot, service_name: &str) -> serde_json::Value {
    let ts = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string();

    let mut metrics = Vec::new();

    for sample in &snapshot.counters {
        metrics.push(json!({
            "name": sample.name,
            "sum": {
                "aggregationTemporality": 2,
                "isMonotonic": true,
                "dataPoints": [{
                    "asInt": sample.value.to_string(),
                    "timeUnixNano": ts,
                    "attributes": otlp_attributes(sample.labels.pairs()),
                }],
            },
        }));
    }

    for sample in &snapshot.gauges {
        metrics.push(json!({
            "name": sample.name,
            "gauge": {
                "dataPoints": [{
                    "asInt": sample.value.to_string(),
                    "timeUnixNano": ts,
                }],
            },
        }));
    }

    for sample in &snapshot.histograms {
        // Convert cumulative per-bound counts to the per-bucket counts OTLP
        // expects, with the overflow bucket appended.
        let mut bucket_counts = Vec::with_capacity(sample.cumulative_counts.len() + 1);
        let mut previous = 0u64;
        for cumulative in &sample.cumulative_counts {
            bucket_counts.push(cumulative.saturating_sub(previous).to_string());
            previous = *cumulative;
        }
        bucket_counts.push(sample.count.saturating_sub(previous).to_string());

        metrics.push(json!({
            "name": sample.name,
            "histogram": {
                "aggregationTemporality": 2,
                "dataPoints": [{
                    "count": sample.count.to_string(),
                    "sum": sample.sum,
                    "bucketCounts": bucket_counts,
                    "explicitBounds": sample.bounds,
                    "timeUnixNano": ts,
                    "attributes": otlp_attributes(sample.labels.pairs()),
                }],
            },
        }));
    }

    json!({
        "resourceMetrics": [{
            "resource": {
                "attributes": [{
                    "key": "service.name",
                    "value": { "stringValue": service_name },
                }],
            },
            "scopeMetrics": [{
                "scope": { "name": "sl-telemetry" },
                "metrics": metrics,
            }],
        }],
    })
}

fn otlp_attributes(pairs: &[(String, String)]) -> Vec<serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| json!({ "key": k, "value": { "stringValue": v } }))
        .collect()
}
