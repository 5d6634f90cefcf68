use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Log target for access-log lines. The file sink installed by
/// [`crate::logging::init_logging_with_files`] routes events with this
/// target into the access log instead of the error log.
pub const ACCESS_LOG_TARGET: &str = "sl_telemetry::access";

/// Axum middleware that writes one structured access-log line per request:
/// method, path, status, and wall-clock duration.
///
/// Runs outside the handler, so error responses are logged the same way as
/// successes.
pub async fn access_log_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    tracing::info!(
        target: ACCESS_LOG_TARGET,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_secs = duration,
        "request"
    );

    response
}
