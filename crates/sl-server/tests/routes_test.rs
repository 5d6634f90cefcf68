use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;

use sl_server::routes::{router, AppState};
use sl_telemetry::metrics::{
    MetricsCollector, REQUESTS_TOTAL, REQUEST_DURATION_SECONDS, TARGET_LABEL,
};
use sl_telemetry::middleware::ACCESS_LOG_TARGET;

fn test_state() -> AppState {
    AppState::new(Arc::new(MetricsCollector::new()))
}

async fn get(state: &AppState, uri: &str) -> axum::response::Response {
    router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ---------------------------------------------------------------------------
// Instrumented routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_root_returns_ok_and_counts_once() {
    let state = test_state();
    let response = get(&state, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");

    assert_eq!(
        state.metrics.get_counter(REQUESTS_TOTAL, &[(TARGET_LABEL, "/")]),
        1
    );
    assert_eq!(
        state
            .metrics
            .get_histogram_count(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/")]),
        1
    );
}

#[tokio::test]
async fn test_test_route_returns_done_and_counts_once() {
    let state = test_state();
    let response = get(&state, "/test").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "done");

    assert_eq!(
        state
            .metrics
            .get_counter(REQUESTS_TOTAL, &[(TARGET_LABEL, "/test")]),
        1
    );
    assert_eq!(
        state
            .metrics
            .get_histogram_count(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/test")]),
        1
    );
}

#[tokio::test]
async fn test_one_duration_sample_per_request() {
    let state = test_state();
    for _ in 0..5 {
        get(&state, "/").await;
    }
    for _ in 0..3 {
        get(&state, "/test").await;
    }

    assert_eq!(
        state.metrics.get_counter(REQUESTS_TOTAL, &[(TARGET_LABEL, "/")]),
        5
    );
    assert_eq!(
        state
            .metrics
            .get_histogram_count(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/")]),
        5
    );
    assert_eq!(
        state
            .metrics
            .get_counter(REQUESTS_TOTAL, &[(TARGET_LABEL, "/test")]),
        3
    );
    assert_eq!(
        state
            .metrics
            .get_histogram_count(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/test")]),
        3
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_instrumented() {
    let state = test_state();
    let response = get(&state, "/nope").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        state
            .metrics
            .get_counter(REQUESTS_TOTAL, &[(TARGET_LABEL, "/nope")]),
        0
    );
}

#[tokio::test]
async fn test_response_carries_request_id() {
    let state = test_state();
    let response = get(&state, "/").await;
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_incoming_request_id_is_reused() {
    let state = test_state();
    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/")
                .header("x-request-id", "abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc123");
}

// ---------------------------------------------------------------------------
// Spans and access logs
// ---------------------------------------------------------------------------

/// Test layer recording every opened span (name + fields) and the target of
/// every emitted event.
#[derive(Clone, Default)]
struct TelemetryCapture {
    spans: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
    event_targets: Arc<Mutex<Vec<String>>>,
}

struct FieldCollector<'a>(&'a mut Vec<(String, String)>);

impl tracing::field::Visit for FieldCollector<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for TelemetryCapture {
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut fields = Vec::new();
        attrs.record(&mut FieldCollector(&mut fields));
        self.spans
            .lock()
            .unwrap()
            .push((attrs.metadata().name().to_string(), fields));
    }

    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        self.event_targets
            .lock()
            .unwrap()
            .push(event.metadata().target().to_string());
    }
}

#[tokio::test]
async fn test_test_route_emits_operation_span_with_attribute() {
    let capture = TelemetryCapture::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let state = test_state();
    get(&state, "/test").await;

    let spans = capture.spans.lock().unwrap();
    let operations: Vec<_> = spans
        .iter()
        .filter(|(name, _)| name.as_str() == "test_operation")
        .collect();
    assert_eq!(operations.len(), 1);
    assert!(operations[0]
        .1
        .iter()
        .any(|(key, value)| key.as_str() == "custom.key" && value.as_str() == "custom.value"));

    // The request middleware wraps the handler in exactly one request span.
    assert_eq!(
        spans
            .iter()
            .filter(|(name, _)| name.as_str() == "http_request")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_requests_emit_access_log_events() {
    let capture = TelemetryCapture::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let state = test_state();
    get(&state, "/").await;

    let targets = capture.event_targets.lock().unwrap();
    assert!(targets.iter().any(|t| t.as_str() == ACCESS_LOG_TARGET));
}

// ---------------------------------------------------------------------------
// Exposition routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus() {
    let state = test_state();
    get(&state, "/").await;
    get(&state, "/test").await;

    let response = get(&state, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );

    let body = body_string(response).await;
    assert!(body.contains("app_requests_total{http_target=\"/\"} 1"));
    assert!(body.contains("app_requests_total{http_target=\"/test\"} 1"));
    assert!(body.contains("# TYPE app_request_duration_seconds histogram"));
}

#[tokio::test]
async fn test_metrics_json_endpoint() {
    let state = test_state();
    get(&state, "/test").await;

    let response = get(&state, "/metrics/json").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["counters"]["app_requests_total{http_target=\"/test\"}"], 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = test_state();
    let response = get(&state, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
}
