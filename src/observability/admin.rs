//! Admin HTTP API
//!
//! Probe and metrics endpoints polled by orchestrators and scrapers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use super::health::HealthAggregator;
use super::prometheus_metrics::{JsonSample, MetricsRegistry};

/// Prometheus text exposition content type
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Shared state for the admin routes
#[derive(Clone)]
pub struct AdminState {
    pub health: Arc<HealthAggregator>,
    pub metrics: Arc<MetricsRegistry>,
}

impl AdminState {
    pub fn new(health: Arc<HealthAggregator>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { health, metrics }
    }
}

#[derive(Serialize)]
struct MetricsJson {
    service: String,
    timestamp: String,
    metrics: IndexMap<String, Vec<JsonSample>>,
}

/// `/health/live`, `/health/ready`, `/health`, `/metrics`, `/metrics/json`
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route("/metrics/json", get(metrics_json))
        .with_state(state)
}

async fn liveness(State(state): State<AdminState>) -> Response {
    (StatusCode::OK, Json(state.health.liveness())).into_response()
}

async fn readiness(State(state): State<AdminState>) -> Response {
    let report = state.health.readiness().await;
    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

async fn health(State(state): State<AdminState>) -> Response {
    let result = state.health.check().await;
    let status =
        StatusCode::from_u16(result.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(result)).into_response()
}

async fn metrics_text(State(state): State<AdminState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.prometheus_format(),
    )
        .into_response()
}

async fn metrics_json(State(state): State<AdminState>) -> Response {
    let body = MetricsJson {
        service: state.health.service().to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        metrics: state.metrics.to_json(),
    };
    (StatusCode::OK, Json(body)).into_response()
}
