//! Observability Module
//!
//! Dependency checks, health aggregation, Prometheus metrics and the admin
//! routes that serve them.

mod admin;
mod checks;
mod health;
mod prometheus_metrics;

pub use admin::{router as admin_router, AdminState, PROMETHEUS_CONTENT_TYPE};
pub use checks::{
    cache_check, database_check, http_check, Dependency, HttpProbe, Ping, PingProbe, Probe,
    ProbeResult, CACHE_DEGRADED_AFTER, DATABASE_DEGRADED_AFTER, HTTP_DEGRADED_AFTER,
    PROBE_TIMEOUT,
};
pub use health::{
    overall_status, DependencyResult, HealthAggregator, HealthCheckResult, HealthStatus,
    LivenessReport, MemoryUsage, ReadinessReport, SystemInfo,
};
pub use prometheus_metrics::{
    labels, percentile, register_default_metrics, HistogramStats, JsonSample, Labels,
    MetricDefinition, MetricType, MetricsRegistry, Observation, DEFAULT_HISTOGRAM_CAPACITY,
};
