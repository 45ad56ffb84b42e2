//! Request Metrics
//!
//! Per-request counters and latency recorded into the metrics registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::observability::{labels, MetricsRegistry};

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_MS: &str = "http_request_duration_ms";
pub const HTTP_ERRORS_TOTAL: &str = "http_errors_total";

/// Record one completed request
pub fn record_request(
    registry: &MetricsRegistry,
    method: &str,
    route: &str,
    status: u16,
    latency: Duration,
) {
    let status_str = status.to_string();
    registry.inc(
        HTTP_REQUESTS_TOTAL,
        labels([("method", method), ("route", route), ("status", status_str.as_str())]),
    );
    registry.record_histogram(
        HTTP_REQUEST_DURATION_MS,
        latency.as_secs_f64() * 1000.0,
        labels([("method", method), ("route", route)]),
    );
    if status >= 400 {
        registry.inc(
            HTTP_ERRORS_TOTAL,
            labels([("method", method), ("route", route), ("status", status_str.as_str())]),
        );
    }
}

/// Middleware timing every request. Install with `route_layer` so the
/// matched route template is known; unmatched requests count as `unknown`.
pub async fn track_requests(
    State(registry): State<Arc<MetricsRegistry>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    record_request(
        &registry,
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}
