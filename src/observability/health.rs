//! Health Checks
//!
//! Liveness, readiness and full health over the registered dependencies.
//! Every pass runs its checks concurrently and waits for all of them; nothing
//! is cached between passes.

use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use super::checks::{Dependency, ProbeResult};
use crate::error::DependencyError;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy or degraded
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result for one dependency within a full health pass
#[derive(Debug, Clone, Serialize)]
pub struct DependencyResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub critical: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryUsage {
    pub used_mb: u64,
    pub total_mb: u64,
    pub percentage: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub memory: MemoryUsage,
    pub uptime_seconds: u64,
}

/// Full health snapshot served on `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub service: String,
    pub dependencies: IndexMap<String, DependencyResult>,
    pub system: SystemInfo,
}

impl HealthCheckResult {
    /// 503 when unhealthy, 200 otherwise (degraded included)
    pub fn http_status(&self) -> u16 {
        match self.status {
            HealthStatus::Unhealthy => 503,
            _ => 200,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessReport {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Names of the critical dependencies that failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failing: Vec<String>,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Derive the overall status from `(critical, status)` pairs.
///
/// A critical failure is unhealthy. Any degradation, or a non-critical
/// failure, is degraded. Otherwise healthy.
pub fn overall_status(results: impl IntoIterator<Item = (bool, HealthStatus)>) -> HealthStatus {
    let mut overall = HealthStatus::Healthy;
    for (critical, status) in results {
        match status {
            HealthStatus::Unhealthy if critical => return HealthStatus::Unhealthy,
            HealthStatus::Unhealthy | HealthStatus::Degraded => overall = HealthStatus::Degraded,
            HealthStatus::Healthy => {}
        }
    }
    overall
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Dependency registry plus the three probe views over it
pub struct HealthAggregator {
    service: String,
    version: String,
    dependencies: Vec<Dependency>,
    start_time: Instant,
}

impl HealthAggregator {
    pub fn new(service: &str, version: &str) -> Self {
        Self {
            service: service.to_string(),
            version: version.to_string(),
            dependencies: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Register a dependency check. Names are unique; a duplicate is ignored.
    pub fn register(&mut self, dependency: Dependency) {
        if self.dependencies.iter().any(|d| d.name == dependency.name) {
            warn!(name = %dependency.name, "health check already registered, ignoring");
            return;
        }
        info!(
            name = %dependency.name,
            critical = dependency.critical,
            "registered health check"
        );
        self.dependencies.push(dependency);
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.register(dependency);
        self
    }

    /// Registered checks, in registration order
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Is the process running. Runs no checks.
    pub fn liveness(&self) -> LivenessReport {
        LivenessReport {
            status: "alive",
            timestamp: now_rfc3339(),
            uptime_seconds: self.uptime().as_secs(),
        }
    }

    /// Ready when every critical check is healthy or degraded
    pub async fn readiness(&self) -> ReadinessReport {
        let critical: Vec<&Dependency> =
            self.dependencies.iter().filter(|d| d.critical).collect();
        let results = join_all(critical.iter().map(|d| d.run())).await;

        let mut errors = Vec::new();
        let mut failing = Vec::new();
        for (dep, result) in critical.iter().zip(results) {
            if result.status.is_operational() {
                continue;
            }
            let reason = DependencyError::Unhealthy {
                name: dep.name.clone(),
            };
            warn!(error = ?result.error, "readiness: {}", reason);
            errors.push(result.error.unwrap_or_else(|| reason.to_string()));
            failing.push(dep.name.clone());
        }

        ReadinessReport {
            status: if failing.is_empty() { "ready" } else { "not_ready" },
            timestamp: now_rfc3339(),
            errors,
            failing,
        }
    }

    /// Run every check and derive the overall status
    pub async fn check(&self) -> HealthCheckResult {
        let results: Vec<ProbeResult> =
            join_all(self.dependencies.iter().map(|d| d.run())).await;

        let mut dependencies = IndexMap::with_capacity(results.len());
        for (dep, result) in self.dependencies.iter().zip(results) {
            match result.status {
                HealthStatus::Healthy => {}
                HealthStatus::Degraded => warn!(
                    error = ?result.error,
                    "{}",
                    DependencyError::Degraded { name: dep.name.clone() }
                ),
                HealthStatus::Unhealthy => warn!(
                    error = ?result.error,
                    critical = dep.critical,
                    "{}",
                    DependencyError::Unhealthy { name: dep.name.clone() }
                ),
            }
            dependencies.insert(
                dep.name.clone(),
                DependencyResult {
                    status: result.status,
                    latency_ms: result.latency_ms,
                    error: result.error,
                    critical: dep.critical,
                },
            );
        }

        let status = overall_status(dependencies.values().map(|d| (d.critical, d.status)));
        let uptime_seconds = self.uptime().as_secs();
        let (memory, process_uptime) = sample_process();

        HealthCheckResult {
            status,
            timestamp: now_rfc3339(),
            uptime_seconds,
            version: self.version.clone(),
            service: self.service.clone(),
            dependencies,
            system: SystemInfo {
                memory,
                uptime_seconds: process_uptime.unwrap_or(uptime_seconds),
            },
        }
    }
}

/// Resident memory of this process against host memory, and its run time
fn sample_process() -> (MemoryUsage, Option<u64>) {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return (MemoryUsage::default(), None);
    };
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.refresh_process(pid);
    let Some(process) = system.process(pid) else {
        return (MemoryUsage::default(), None);
    };

    let used = process.memory();
    let total = system.total_memory().max(used);
    (memory_usage(used, total), Some(process.run_time()))
}

fn memory_usage(used: u64, total: u64) -> MemoryUsage {
    let percentage = if total == 0 {
        0
    } else {
        ((used as f64 / total as f64) * 100.0).round() as u64
    };
    MemoryUsage {
        used_mb: to_mb(used),
        total_mb: to_mb(total),
        percentage,
    }
}

fn to_mb(bytes: u64) -> u64 {
    (bytes as f64 / 1024.0 / 1024.0).round() as u64
}
