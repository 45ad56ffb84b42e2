//! Dependency Checks
//!
//! Probes for the resources a service depends on. Each probe bounds its own
//! latency; the aggregator never times a probe out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;

use super::health::HealthStatus;

/// Database round trips slower than this are degraded
pub const DATABASE_DEGRADED_AFTER: Duration = Duration::from_millis(1000);
/// Cache round trips slower than this are degraded
pub const CACHE_DEGRADED_AFTER: Duration = Duration::from_millis(500);
/// External HTTP calls slower than this are degraded
pub const HTTP_DEGRADED_AFTER: Duration = Duration::from_millis(2000);
/// Upper bound on any built-in probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const HIGH_LATENCY: &str = "High latency";

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms: None,
            error: None,
        }
    }

    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(latency.as_millis() as u64);
        self
    }

    /// Classify a successful round trip against a latency threshold
    pub fn from_latency(latency: Duration, degraded_after: Duration) -> Self {
        let result = if latency > degraded_after {
            Self::degraded(HIGH_LATENCY)
        } else {
            Self::healthy()
        };
        result.with_latency(latency)
    }
}

/// An async health predicate
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> ProbeResult;
}

/// A backend that can answer a cheap round trip (`SELECT 1`, `PING`)
#[async_trait]
pub trait Ping: Send + Sync {
    async fn ping(&self) -> Result<(), String>;
}

/// Named, possibly critical, dependency check
#[derive(Clone)]
pub struct Dependency {
    pub name: String,
    /// Failure makes the service unfit for traffic
    pub critical: bool,
    probe: Arc<dyn Probe>,
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("critical", &self.critical)
            .finish_non_exhaustive()
    }
}

impl Dependency {
    pub fn new(name: &str, critical: bool, probe: impl Probe + 'static) -> Self {
        Self {
            name: name.to_string(),
            critical,
            probe: Arc::new(probe),
        }
    }

    /// Build a dependency from an async closure
    pub fn from_fn<F, Fut>(name: &str, critical: bool, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult> + Send + 'static,
    {
        Self::new(name, critical, FnProbe(f))
    }

    pub async fn run(&self) -> ProbeResult {
        self.probe.probe().await
    }
}

struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeResult> + Send + 'static,
{
    async fn probe(&self) -> ProbeResult {
        (self.0)().await
    }
}

/// Ping-based probe with a latency threshold and a hard timeout
pub struct PingProbe<P> {
    pinger: P,
    degraded_after: Duration,
    timeout: Duration,
}

impl<P: Ping> PingProbe<P> {
    pub fn new(pinger: P, degraded_after: Duration) -> Self {
        Self {
            pinger,
            degraded_after,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<P: Ping> Probe for PingProbe<P> {
    async fn probe(&self) -> ProbeResult {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.pinger.ping()).await {
            Ok(Ok(())) => ProbeResult::from_latency(start.elapsed(), self.degraded_after),
            Ok(Err(e)) => ProbeResult::unhealthy(e).with_latency(start.elapsed()),
            Err(_) => ProbeResult::unhealthy(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))
            .with_latency(start.elapsed()),
        }
    }
}

/// HTTP GET probe for an external API
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    degraded_after: Duration,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            degraded_after: HTTP_DEGRADED_AFTER,
            timeout: PROBE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_degraded_after(mut self, degraded_after: Duration) -> Self {
        self.degraded_after = degraded_after;
        self
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self) -> ProbeResult {
        let start = Instant::now();
        let request = self.client.get(&self.url).timeout(self.timeout);
        match request.send().await {
            Ok(resp) if !resp.status().is_success() => {
                ProbeResult::unhealthy(format!("HTTP {}", resp.status().as_u16()))
                    .with_latency(start.elapsed())
            }
            Ok(_) => ProbeResult::from_latency(start.elapsed(), self.degraded_after),
            Err(e) if e.is_timeout() => ProbeResult::unhealthy(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))
            .with_latency(start.elapsed()),
            Err(e) => ProbeResult::unhealthy(e.to_string()).with_latency(start.elapsed()),
        }
    }
}

/// Critical `database` check over a pinger
pub fn database_check(pinger: impl Ping + 'static) -> Dependency {
    Dependency::new(
        "database",
        true,
        PingProbe::new(pinger, DATABASE_DEGRADED_AFTER),
    )
}

/// Non-critical `redis` check over a pinger
pub fn cache_check(pinger: impl Ping + 'static) -> Dependency {
    Dependency::new("redis", false, PingProbe::new(pinger, CACHE_DEGRADED_AFTER))
}

/// GET `url`, unhealthy on non-2xx or transport failure
pub fn http_check(name: &str, url: &str, critical: bool) -> Result<Dependency, reqwest::Error> {
    Ok(Dependency::new(name, critical, HttpProbe::new(url)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticPing(Result<(), String>);

    #[async_trait]
    impl Ping for StaticPing {
        async fn ping(&self) -> Result<(), String> {
            self.0.clone()
        }
    }

    struct SlowPing(Duration);

    #[async_trait]
    impl Ping for SlowPing {
        async fn ping(&self) -> Result<(), String> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    #[test]
    fn test_latency_classification() {
        let fast = ProbeResult::from_latency(Duration::from_millis(10), CACHE_DEGRADED_AFTER);
        assert_eq!(fast.status, HealthStatus::Healthy);
        assert_eq!(fast.latency_ms, Some(10));

        let slow = ProbeResult::from_latency(Duration::from_millis(501), CACHE_DEGRADED_AFTER);
        assert_eq!(slow.status, HealthStatus::Degraded);
        assert_eq!(slow.error.as_deref(), Some("High latency"));

        let edge = ProbeResult::from_latency(Duration::from_millis(1000), DATABASE_DEGRADED_AFTER);
        assert_eq!(edge.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_database_check() {
        let ok = database_check(StaticPing(Ok(())));
        assert!(ok.critical);
        assert_eq!(ok.name, "database");
        assert_eq!(ok.run().await.status, HealthStatus::Healthy);

        let down = database_check(StaticPing(Err("connection refused".to_string())));
        let result = down.run().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_cache_check_is_not_critical() {
        let cache = cache_check(StaticPing(Ok(())));
        assert!(!cache.critical);
        assert_eq!(cache.name, "redis");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_probe_times_out() {
        let probe = PingProbe::new(SlowPing(Duration::from_secs(60)), CACHE_DEGRADED_AFTER)
            .with_timeout(Duration::from_millis(50));
        let result = probe.probe().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("timed out after 50ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ping_is_degraded() {
        let probe = PingProbe::new(SlowPing(Duration::from_millis(700)), CACHE_DEGRADED_AFTER);
        assert_eq!(probe.probe().await.status, HealthStatus::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_check_latency_threshold() {
        let fast = database_check(SlowPing(Duration::from_millis(900))).run().await;
        assert_eq!(fast.status, HealthStatus::Healthy);
        assert!(fast.latency_ms.is_some_and(|ms| (900..1000).contains(&ms)));

        let slow = database_check(SlowPing(Duration::from_millis(1200))).run().await;
        assert_eq!(slow.status, HealthStatus::Degraded);
        assert_eq!(slow.error.as_deref(), Some("High latency"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_check_times_out_after_five_seconds() {
        let result = database_check(SlowPing(Duration::from_secs(30))).run().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("timed out after 5000ms"));
        assert!(result.latency_ms.is_some_and(|ms| ms >= 5000));
    }

    #[tokio::test]
    async fn test_from_fn() {
        let dep = Dependency::from_fn("queue", false, || async {
            ProbeResult::degraded("backlog")
        });
        assert_eq!(dep.run().await.status, HealthStatus::Degraded);
    }
}
