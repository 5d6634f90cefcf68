use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Generate an OpenTelemetry-compatible trace ID (32 hex characters).
///
/// A UUID without hyphens is exactly 32 hex chars (128 bits), which is what
/// correlating collectors expect in a `trace_id` field.
pub fn generate_trace_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Axum middleware that injects `X-Request-Id` headers and wraps each
/// request in an `http_request` span.
///
/// If the incoming request already has an `X-Request-Id` header, that value
/// is reused. Otherwise a new trace ID is generated. The response always
/// includes the `X-Request-Id` header for correlation.
///
/// The handler future is instrumented with the span instead of holding an
/// entered guard across the await, so the span stays attached while the
/// task is suspended.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_trace_id);

    // Insert/overwrite so downstream handlers can read it
    request.headers_mut().insert(
        "x-request-id",
        request_id
            .parse()
            .unwrap_or_else(|_| axum::http::HeaderValue::from_static("unknown")),
    );

    let span = tracing::info_span!(
        "http_request",
        trace_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = async {
        tracing::debug!("processing request");
        next.run(request).await
    }
    .instrument(span)
    .await;

    // Attach the request ID to the response
    if let Ok(val) = request_id.parse() {
        response.headers_mut().insert("x-request-id", val);
    }

    response
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
