use std::sync::Arc;

use axum::{
    extract::State, middleware as axum_middleware, response::IntoResponse, routing::get, Json,
    Router,
};

use sl_telemetry::metrics::{instrument_request, MetricsCollector};
use sl_telemetry::middleware::access_log_middleware;
use sl_telemetry::tracing_setup::request_id_middleware;

/// Shared state for HTTP handlers. The collector is injected at startup
/// rather than looked up through a global.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }
}

/// Build the application router: the two instrumented routes, the metric
/// exposition routes, and the access-log/request-id middleware pair.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/test", get(test))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))
        .layer(axum_middleware::from_fn(access_log_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// GET / — fixed body; one counter increment and one duration sample for
/// the `/` series. The timer guard records on every exit path.
async fn root(State(state): State<AppState>) -> &'static str {
    let _timer = instrument_request(&state.metrics, "/");
    "ok"
}

/// GET /test — fixed body; counts the request and runs `test_operation`
/// with a custom attribute attached for trace verification.
async fn test(State(state): State<AppState>) -> &'static str {
    let _timer = instrument_request(&state.metrics, "/test");

    let span = tracing::info_span!("test_operation", custom.key = "custom.value");
    let _guard = span.enter();
    "done"
}

/// GET /health — liveness probe.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /metrics — Prometheus text exposition.
async fn get_metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.export_prometheus();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

/// GET /metrics/json — JSON format export.
async fn get_metrics_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.export_json())
}
