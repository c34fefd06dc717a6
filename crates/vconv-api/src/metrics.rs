//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vconv_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vconv_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vconv_http_requests_in_flight";

    // Queue metrics
    pub const QUEUE_LENGTH: &str = "vconv_queue_length";
    pub const QUEUE_DLQ_LENGTH: &str = "vconv_queue_dlq_length";
    pub const UPLOADS_TOTAL: &str = "vconv_uploads_total";
    pub const UPLOAD_BYTES: &str = "vconv_upload_bytes";
}

/// Paths used as metric labels. Anything else is collapsed so scanners
/// cannot blow up label cardinality.
const KNOWN_PATHS: &[&str] = &["/login", "/upload", "/download", "/health", "/healthz", "/ready", "/metrics"];

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Update queue length gauge.
pub fn set_queue_length(queue: &str, length: u64) {
    gauge!(names::QUEUE_LENGTH, "queue" => queue.to_string()).set(length as f64);
}

/// Update dead-letter length gauge.
pub fn set_dlq_length(queue: &str, length: u64) {
    gauge!(names::QUEUE_DLQ_LENGTH, "queue" => queue.to_string()).set(length as f64);
}

/// Record an upload attempt; `result` is "accepted" or "failed".
pub fn record_upload(result: &'static str, size_bytes: usize) {
    counter!(names::UPLOADS_TOTAL, "result" => result).increment(1);
    if result == "accepted" {
        histogram!(names::UPLOAD_BYTES).record(size_bytes as f64);
    }
}

fn sanitize_path(path: &str) -> String {
    if KNOWN_PATHS.contains(&path) {
        path.to_string()
    } else {
        "other".to_string()
    }
}

/// Middleware to record HTTP metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
