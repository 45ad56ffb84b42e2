//! Prometheus Metrics Export
//!
//! Counters, gauges and histograms keyed by `(name, labels)`, exported in
//! Prometheus text format and as JSON.
//!
//! Series are created on first use even when the metric was never
//! registered. Registering is still preferred: it supplies the `# HELP` text
//! and the declared label names.

use std::collections::{BTreeMap, VecDeque};

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

/// Label set, kept sorted so equal sets always render identically
pub type Labels = BTreeMap<String, String>;

/// Samples retained per histogram before the oldest are dropped
pub const DEFAULT_HISTOGRAM_CAPACITY: usize = 10_000;

/// Build a label set from `(key, value)` pairs
pub fn labels<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Labels
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
        }
    }

    fn keeps_samples(&self) -> bool {
        matches!(self, MetricType::Histogram | MetricType::Summary)
    }
}

/// Declared metric
#[derive(Debug, Clone)]
pub struct MetricDefinition {
    pub name: String,
    pub metric_type: MetricType,
    pub help: String,
    pub unit: Option<String>,
    pub label_names: Vec<String>,
}

impl MetricDefinition {
    pub fn new(name: &str, metric_type: MetricType, help: &str) -> Self {
        Self {
            name: name.to_string(),
            metric_type,
            help: help.to_string(),
            unit: None,
            label_names: Vec::new(),
        }
    }

    pub fn counter(name: &str, help: &str) -> Self {
        Self::new(name, MetricType::Counter, help)
    }

    pub fn gauge(name: &str, help: &str) -> Self {
        Self::new(name, MetricType::Gauge, help)
    }

    pub fn histogram(name: &str, help: &str) -> Self {
        Self::new(name, MetricType::Histogram, help)
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_labels(mut self, names: &[&str]) -> Self {
        self.label_names = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

/// One histogram observation
#[derive(Debug, Clone)]
pub struct Observation {
    pub value: f64,
    pub labels: Labels,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Reduced view of a histogram's retained samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramStats {
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl HistogramStats {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut sorted: Vec<f64> = values.into_iter().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        Self {
            count,
            sum,
            avg: if count > 0 { sum / count as f64 } else { 0.0 },
            p50: percentile(&sorted, 0.5),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            min: sorted.first().copied().unwrap_or(0.0),
            max: sorted.last().copied().unwrap_or(0.0),
        }
    }
}

/// Nearest-rank percentile over ascending values: index `ceil(n*p) - 1`,
/// clamped to `[0, n-1]`. Empty input yields 0.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() as f64 * p).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[index]
}

/// Entry in the JSON export
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonSample {
    Counter {
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        labels: Option<Labels>,
        timestamp: i64,
    },
    Gauge {
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        labels: Option<Labels>,
        timestamp: i64,
    },
    Histogram {
        count: usize,
        sum: f64,
        avg: f64,
        p50: f64,
        p95: f64,
        p99: f64,
        min: f64,
        max: f64,
        timestamp: i64,
    },
}

impl JsonSample {
    fn histogram(stats: HistogramStats, timestamp: i64) -> Self {
        JsonSample::Histogram {
            count: stats.count,
            sum: stats.sum,
            avg: stats.avg,
            p50: stats.p50,
            p95: stats.p95,
            p99: stats.p99,
            min: stats.min,
            max: stats.max,
            timestamp,
        }
    }
}

type SeriesKey = (String, Labels);

#[derive(Default)]
struct Inner {
    definitions: IndexMap<String, MetricDefinition>,
    counters: IndexMap<SeriesKey, f64>,
    gauges: IndexMap<SeriesKey, f64>,
    histograms: IndexMap<String, VecDeque<Observation>>,
}

impl Inner {
    fn ensure_defined(&mut self, name: &str, metric_type: MetricType) {
        if !self.definitions.contains_key(name) {
            self.definitions
                .insert(name.to_string(), MetricDefinition::new(name, metric_type, ""));
        }
    }

    fn help(&self, name: &str) -> &str {
        self.definitions
            .get(name)
            .map(|d| d.help.as_str())
            .unwrap_or("")
    }
}

/// Metrics registry.
///
/// An explicit instance, shared by `Arc`; tests build their own.
pub struct MetricsRegistry {
    inner: Mutex<Inner>,
    histogram_capacity: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_histogram_capacity(DEFAULT_HISTOGRAM_CAPACITY)
    }

    pub fn with_histogram_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            histogram_capacity: capacity.max(1),
        }
    }

    /// Register a metric. Re-registering replaces the definition only.
    pub fn register(&self, definition: MetricDefinition) {
        let mut inner = self.inner.lock();
        inner
            .definitions
            .insert(definition.name.clone(), definition);
    }

    pub fn definition(&self, name: &str) -> Option<MetricDefinition> {
        self.inner.lock().definitions.get(name).cloned()
    }

    /// Add `amount` to a counter series
    pub fn increment_counter(&self, name: &str, amount: f64, labels: Labels) {
        if amount < 0.0 || amount.is_nan() {
            warn!(metric = name, amount, "counter increment must be non-negative, ignoring");
            return;
        }
        let mut inner = self.inner.lock();
        inner.ensure_defined(name, MetricType::Counter);
        *inner
            .counters
            .entry((name.to_string(), labels))
            .or_insert(0.0) += amount;
    }

    /// Increment a counter series by one
    pub fn inc(&self, name: &str, labels: Labels) {
        self.increment_counter(name, 1.0, labels);
    }

    /// Overwrite a gauge series
    pub fn set_gauge(&self, name: &str, value: f64, labels: Labels) {
        let mut inner = self.inner.lock();
        inner.ensure_defined(name, MetricType::Gauge);
        inner.gauges.insert((name.to_string(), labels), value);
    }

    /// Append a histogram observation, evicting the oldest when full
    pub fn record_histogram(&self, name: &str, value: f64, labels: Labels) {
        let observation = Observation {
            value,
            labels,
            timestamp: Utc::now().timestamp_millis(),
        };
        let mut inner = self.inner.lock();
        inner.ensure_defined(name, MetricType::Histogram);
        let samples = inner.histograms.entry(name.to_string()).or_default();
        if samples.len() >= self.histogram_capacity {
            samples.pop_front();
        }
        samples.push_back(observation);
    }

    pub fn counter(&self, name: &str, labels: &Labels) -> Option<f64> {
        let inner = self.inner.lock();
        inner
            .counters
            .get(&(name.to_string(), labels.clone()))
            .copied()
    }

    pub fn gauge(&self, name: &str, labels: &Labels) -> Option<f64> {
        let inner = self.inner.lock();
        inner.gauges.get(&(name.to_string(), labels.clone())).copied()
    }

    /// Statistics over a histogram's retained samples, across all label sets
    pub fn histogram_stats(&self, name: &str) -> Option<HistogramStats> {
        let inner = self.inner.lock();
        inner
            .histograms
            .get(name)
            .map(|samples| HistogramStats::from_values(samples.iter().map(|o| o.value)))
    }

    /// Export counters and gauges in Prometheus text format
    pub fn prometheus_format(&self) -> String {
        let inner = self.inner.lock();
        let mut output = String::new();

        for (series, metric_type) in [
            (&inner.counters, MetricType::Counter),
            (&inner.gauges, MetricType::Gauge),
        ] {
            // Group series by family so HELP/TYPE appear once per metric.
            let mut families: IndexMap<&str, Vec<(&Labels, f64)>> = IndexMap::new();
            for ((name, labels), value) in series {
                families
                    .entry(name.as_str())
                    .or_default()
                    .push((labels, *value));
            }

            for (name, samples) in families {
                let help = inner.help(name);
                output.push_str(&format!(
                    "# HELP {} {}\n",
                    name,
                    escape_help(help).trim_end()
                ));
                output.push_str(&format!("# TYPE {} {}\n", name, metric_type.as_str()));
                for (labels, value) in samples {
                    output.push_str(&format!(
                        "{}{} {}\n",
                        name,
                        format_labels(labels),
                        format_value(value)
                    ));
                }
                output.push('\n');
            }
        }

        output
    }

    /// Export all metrics as JSON: `name -> [samples]`
    pub fn to_json(&self) -> IndexMap<String, Vec<JsonSample>> {
        let inner = self.inner.lock();
        let timestamp = Utc::now().timestamp_millis();
        let mut result: IndexMap<String, Vec<JsonSample>> = IndexMap::new();

        let label_field = |labels: &Labels| (!labels.is_empty()).then(|| labels.clone());

        for ((name, labels), value) in &inner.counters {
            result.entry(name.clone()).or_default().push(JsonSample::Counter {
                value: *value,
                labels: label_field(labels),
                timestamp,
            });
        }

        for ((name, labels), value) in &inner.gauges {
            result.entry(name.clone()).or_default().push(JsonSample::Gauge {
                value: *value,
                labels: label_field(labels),
                timestamp,
            });
        }

        for (name, samples) in &inner.histograms {
            let keeps_samples = inner
                .definitions
                .get(name)
                .is_some_and(|d| d.metric_type.keeps_samples());
            if !keeps_samples {
                continue;
            }
            let stats = HistogramStats::from_values(samples.iter().map(|o| o.value));
            result
                .entry(name.clone())
                .or_default()
                .push(JsonSample::histogram(stats, timestamp));
        }

        result
    }

    /// Clear all counters, gauges and histogram samples. Definitions stay.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.counters.clear();
        inner.gauges.clear();
        inner.histograms.clear();
    }
}

/// Register the metrics every service exposes
pub fn register_default_metrics(registry: &MetricsRegistry) {
    // HTTP
    registry.register(
        MetricDefinition::counter("http_requests_total", "Total number of HTTP requests")
            .with_labels(&["method", "route", "status"]),
    );
    registry.register(
        MetricDefinition::histogram(
            "http_request_duration_ms",
            "HTTP request duration in milliseconds",
        )
        .with_unit("ms")
        .with_labels(&["method", "route"]),
    );
    registry.register(
        MetricDefinition::counter("http_errors_total", "Total number of HTTP errors")
            .with_labels(&["method", "route", "status"]),
    );

    // Database
    registry.register(MetricDefinition::gauge(
        "db_connections_active",
        "Number of active database connections",
    ));
    registry.register(
        MetricDefinition::histogram(
            "db_query_duration_ms",
            "Database query duration in milliseconds",
        )
        .with_unit("ms"),
    );
    registry.register(MetricDefinition::counter(
        "db_queries_total",
        "Total number of database queries",
    ));

    // Application
    registry.register(
        MetricDefinition::counter("app_errors_total", "Total number of application errors")
            .with_labels(&["type", "severity"]),
    );
    registry.register(
        MetricDefinition::counter("app_events_processed", "Total number of events processed")
            .with_labels(&["event_type"]),
    );

    // Business
    registry.register(MetricDefinition::gauge(
        "users_active",
        "Number of currently active users",
    ));
    registry.register(
        MetricDefinition::counter(
            "operations_completed",
            "Total number of completed operations",
        )
        .with_labels(&["operation_type", "status"]),
    );
}

fn format_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let registry = MetricsRegistry::new();
        registry.increment_counter("x", 3.0, labels([("a", "1")]));
        registry.increment_counter("x", 2.0, labels([("a", "1")]));

        assert_eq!(registry.counter("x", &labels([("a", "1")])), Some(5.0));
        assert!(registry.prometheus_format().contains("x{a=\"1\"} 5\n"));
    }

    #[test]
    fn test_negative_increment_ignored() {
        let registry = MetricsRegistry::new();
        registry.inc("x", Labels::new());
        registry.increment_counter("x", -4.0, Labels::new());
        assert_eq!(registry.counter("x", &Labels::new()), Some(1.0));
    }

    #[test]
    fn test_gauge_overwrites() {
        let registry = MetricsRegistry::new();
        registry.set_gauge("users_active", 10.0, Labels::new());
        registry.set_gauge("users_active", 4.0, Labels::new());
        assert_eq!(registry.gauge("users_active", &Labels::new()), Some(4.0));
    }

    #[test]
    fn test_prometheus_export() {
        let registry = MetricsRegistry::new();
        register_default_metrics(&registry);
        registry.inc(
            "http_requests_total",
            labels([("method", "GET"), ("route", "/a"), ("status", "200")]),
        );
        registry.inc(
            "http_requests_total",
            labels([("method", "GET"), ("route", "/b"), ("status", "200")]),
        );
        registry.set_gauge("users_active", 7.0, Labels::new());
        registry.record_histogram("http_request_duration_ms", 12.0, Labels::new());

        let output = registry.prometheus_format();
        assert_eq!(
            output.matches("# TYPE http_requests_total counter").count(),
            1
        );
        assert!(output.contains("# HELP http_requests_total Total number of HTTP requests\n"));
        assert!(output
            .contains("http_requests_total{method=\"GET\",route=\"/a\",status=\"200\"} 1\n"));
        assert!(output.contains("# TYPE users_active gauge\nusers_active 7\n"));
        assert!(!output.contains("http_request_duration_ms"));
    }

    #[test]
    fn test_label_escaping() {
        let registry = MetricsRegistry::new();
        registry.inc("x", labels([("path", "a\"b\\c\nd")]));
        assert!(registry
            .prometheus_format()
            .contains(r#"x{path="a\"b\\c\nd"} 1"#));
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&values, 0.5), 50.0);
        assert_eq!(percentile(&values, 0.95), 95.0);
        assert_eq!(percentile(&values, 0.99), 99.0);
        assert_eq!(percentile(&[7.0], 0.0), 7.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_histogram_stats() {
        let registry = MetricsRegistry::new();
        for v in (1..=100).rev() {
            registry.record_histogram("latency", f64::from(v), Labels::new());
        }
        let stats = registry.histogram_stats("latency").unwrap();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.sum, 5050.0);
        assert_eq!(stats.avg, 50.5);
        assert_eq!(stats.p50, 50.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 100.0);
    }

    #[test]
    fn test_histogram_ring_buffer() {
        let registry = MetricsRegistry::with_histogram_capacity(3);
        for v in 1..=5 {
            registry.record_histogram("h", f64::from(v), Labels::new());
        }
        let stats = registry.histogram_stats("h").unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 3.0);
        assert_eq!(stats.max, 5.0);
    }

    #[test]
    fn test_json_export() {
        let registry = MetricsRegistry::new();
        registry.inc("requests", labels([("route", "/")]));
        registry.set_gauge("temperature", 21.5, Labels::new());
        registry.record_histogram("latency", 4.0, Labels::new());

        let json = serde_json::to_value(registry.to_json()).unwrap();
        assert_eq!(json["requests"][0]["type"], "counter");
        assert_eq!(json["requests"][0]["value"], 1.0);
        assert_eq!(json["requests"][0]["labels"]["route"], "/");
        assert_eq!(json["temperature"][0]["type"], "gauge");
        assert!(json["temperature"][0].get("labels").is_none());
        assert_eq!(json["latency"][0]["type"], "histogram");
        assert_eq!(json["latency"][0]["count"], 1);
        assert_eq!(json["latency"][0]["p99"], 4.0);
    }

    #[test]
    fn test_reset_keeps_definitions() {
        let registry = MetricsRegistry::new();
        register_default_metrics(&registry);
        registry.inc("http_requests_total", Labels::new());
        registry.record_histogram("http_request_duration_ms", 1.0, Labels::new());

        registry.reset();
        assert!(registry.prometheus_format().is_empty());
        assert!(registry.to_json().is_empty());
        assert!(registry.definition("http_requests_total").is_some());
    }

    #[test]
    fn test_prometheus_exact_output() {
        let registry = MetricsRegistry::new();
        registry.register(MetricDefinition::counter("jobs", "Jobs run"));
        registry.increment_counter("jobs", 2.0, labels([("queue", "mail")]));
        registry.inc("jobs", labels([("queue", "sms")]));
        registry.set_gauge("workers", 3.0, Labels::new());

        assert_eq!(
            registry.prometheus_format(),
            "# HELP jobs Jobs run\n\
             # TYPE jobs counter\n\
             jobs{queue=\"mail\"} 2\n\
             jobs{queue=\"sms\"} 1\n\
             \n\
             # HELP workers \n\
             # TYPE workers gauge\n\
             workers 3\n\
             \n"
        );
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = MetricsRegistry::new();
        registry.inc("jobs", Labels::new());
        registry.register(MetricDefinition::counter("jobs", "Jobs run"));
        registry.register(MetricDefinition::counter("jobs", "Jobs run"));

        assert_eq!(registry.counter("jobs", &Labels::new()), Some(1.0));
        assert!(registry.prometheus_format().contains("# HELP jobs Jobs run\n"));
    }
}
