use ahash::AHashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Metric names
// ---------------------------------------------------------------------------

/// Counter incremented once per instrumented request.
pub const REQUESTS_TOTAL: &str = "app_requests_total";

/// Histogram of request durations in seconds, labeled by route.
pub const REQUEST_DURATION_SECONDS: &str = "app_request_duration_seconds";

/// Label key carrying the request target (route path).
pub const TARGET_LABEL: &str = "http_target";

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// A histogram that tracks the distribution of observed values across buckets.
///
/// Bucket counts are cumulative: `counts[i]` is the number of observations
/// less than or equal to `buckets[i]`.
#[derive(Debug)]
pub struct Histogram {
    pub buckets: Vec<f64>,
    pub counts: Vec<AtomicU64>,
    pub sum: AtomicU64,
    pub count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with the given bucket boundaries.
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value into the histogram.
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // Store sum as bits so we can do atomic add on f64
        loop {
            let current = self.sum.load(Ordering::Relaxed);
            let current_f = f64::from_bits(current);
            let new_f = current_f + value;
            match self.sum.compare_exchange_weak(
                current,
                new_f.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(_) => continue,
            }
        }
        for (i, boundary) in self.buckets.iter().enumerate() {
            if value <= *boundary {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get the current sum of all observed values.
    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    /// Get the total number of observations.
    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Default HTTP duration buckets (in seconds).
fn default_duration_buckets() -> Vec<f64> {
    vec![
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// A label set is a sorted list of key=value pairs, used to distinguish
/// series within a counter or histogram family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        Self(v)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The sorted key/value pairs in this label set.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Format labels as `{key="value",key2="value2"}` for Prometheus output.
    pub fn prometheus_str(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        format!("{{{}}}", inner.join(","))
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A point-in-time copy of every registered series, sorted by name and
/// labels so exports are deterministic.
#[derive(Debug)]
pub struct MetricsSnapshot {
    pub counters: Vec<CounterSample>,
    pub gauges: Vec<GaugeSample>,
    pub histograms: Vec<HistogramSample>,
}

#[derive(Debug)]
pub struct CounterSample {
    pub name: String,
    pub labels: Labels,
    pub value: u64,
}

#[derive(Debug)]
pub struct GaugeSample {
    pub name: String,
    pub value: i64,
}

#[derive(Debug)]
pub struct HistogramSample {
    pub name: String,
    pub labels: Labels,
    pub bounds: Vec<f64>,
    /// Cumulative per-bucket counts, parallel to `bounds`.
    pub cumulative_counts: Vec<u64>,
    pub sum: f64,
    pub count: u64,
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Central metrics collector supporting counters, gauges, and histograms.
///
/// Thread-safe via interior mutability (`RwLock` for dynamic registration,
/// `Atomic*` for values). Created once at startup and shared via `Arc`.
#[derive(Debug)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<(String, Labels), AtomicU64>>,
    gauges: RwLock<AHashMap<String, AtomicI64>>,
    histograms: RwLock<AHashMap<(String, Labels), Histogram>>,
}

impl MetricsCollector {
    /// Create a new empty collector.
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(AHashMap::new()),
            gauges: RwLock::new(AHashMap::new()),
            histograms: RwLock::new(AHashMap::new()),
        }
    }

    // -- Counters -----------------------------------------------------------

    /// Increment a counter by 1.
    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    /// Increment a counter by an arbitrary amount.
    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = (name.to_string(), Labels::new(labels));
        // Fast-path: read lock
        {
            let map = self.counters.read().unwrap();
            if let Some(c) = map.get(&key) {
                c.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }
        // Slow-path: write lock to insert
        let mut map = self.counters.write().unwrap();
        let c = map.entry(key).or_insert_with(|| AtomicU64::new(0));
        c.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get the current value of a counter.
    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        let map = self.counters.read().unwrap();
        map.get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Gauges -------------------------------------------------------------

    /// Set a gauge to an absolute value.
    pub fn set_gauge(&self, name: &str, value: i64) {
        {
            let map = self.gauges.read().unwrap();
            if let Some(g) = map.get(name) {
                g.store(value, Ordering::Relaxed);
                return;
            }
        }
        let mut map = self.gauges.write().unwrap();
        let g = map
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0));
        g.store(value, Ordering::Relaxed);
    }

    /// Get the current value of a gauge.
    pub fn get_gauge(&self, name: &str) -> i64 {
        let map = self.gauges.read().unwrap();
        map.get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    // -- Histograms ---------------------------------------------------------

    /// Record a value into a histogram series. If the series does not exist
    /// it is created with default duration buckets.
    pub fn record_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = self.histograms.read().unwrap();
            if let Some(h) = map.get(&key) {
                h.observe(value);
                return;
            }
        }
        let mut map = self.histograms.write().unwrap();
        let h = map
            .entry(key)
            .or_insert_with(|| Histogram::new(default_duration_buckets()));
        h.observe(value);
    }

    /// Get the number of observations recorded into a histogram series.
    pub fn get_histogram_count(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        let map = self.histograms.read().unwrap();
        map.get(&key).map(|h| h.get_count()).unwrap_or(0)
    }

    /// Get the sum of observations recorded into a histogram series.
    pub fn get_histogram_sum(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = (name.to_string(), Labels::new(labels));
        let map = self.histograms.read().unwrap();
        map.get(&key).map(|h| h.get_sum()).unwrap_or(0.0)
    }

    // -- Snapshot & export ---------------------------------------------------

    /// Take a deterministic snapshot of all registered series.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters: Vec<CounterSample> = {
            let map = self.counters.read().unwrap();
            map.iter()
                .map(|((name, labels), val)| CounterSample {
                    name: name.clone(),
                    labels: labels.clone(),
                    value: val.load(Ordering::Relaxed),
                })
                .collect()
        };
        counters.sort_by(|a, b| (&a.name, a.labels.pairs()).cmp(&(&b.name, b.labels.pairs())));

        let mut gauges: Vec<GaugeSample> = {
            let map = self.gauges.read().unwrap();
            map.iter()
                .map(|(name, val)| GaugeSample {
                    name: name.clone(),
                    value: val.load(Ordering::Relaxed),
                })
                .collect()
        };
        gauges.sort_by(|a, b| a.name.cmp(&b.name));

        let mut histograms: Vec<HistogramSample> = {
            let map = self.histograms.read().unwrap();
            map.iter()
                .map(|((name, labels), h)| HistogramSample {
                    name: name.clone(),
                    labels: labels.clone(),
                    bounds: h.buckets.clone(),
                    cumulative_counts: h
                        .counts
                        .iter()
                        .map(|c| c.load(Ordering::Relaxed))
                        .collect(),
                    sum: h.get_sum(),
                    count: h.get_count(),
                })
                .collect()
        };
        histograms.sort_by(|a, b| (&a.name, a.labels.pairs()).cmp(&(&b.name, b.labels.pairs())));

        MetricsSnapshot {
            counters,
            gauges,
            histograms,
        }
    }

    /// Export all metrics in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        let mut last_name = "";
        for sample in &snapshot.counters {
            if sample.name != last_name {
                out.push_str(&format!("# TYPE {} counter\n", sample.name));
            }
            out.push_str(&format!(
                "{}{} {}\n",
                sample.name,
                sample.labels.prometheus_str(),
                sample.value
            ));
            last_name = &sample.name;
        }

        for sample in &snapshot.gauges {
            out.push_str(&format!("# TYPE {} gauge\n", sample.name));
            out.push_str(&format!("{} {}\n", sample.name, sample.value));
        }

        let mut last_name = "";
        for sample in &snapshot.histograms {
            if sample.name != last_name {
                out.push_str(&format!("# TYPE {} histogram\n", sample.name));
            }
            for (bound, cumulative) in sample.bounds.iter().zip(&sample.cumulative_counts) {
                out.push_str(&format!(
                    "{}_bucket{} {}\n",
                    sample.name,
                    merge_le_label(&sample.labels, &bound.to_string()),
                    cumulative
                ));
            }
            out.push_str(&format!(
                "{}_bucket{} {}\n",
                sample.name,
                merge_le_label(&sample.labels, "+Inf"),
                sample.count
            ));
            out.push_str(&format!(
                "{}_sum{} {}\n",
                sample.name,
                sample.labels.prometheus_str(),
                sample.sum
            ));
            out.push_str(&format!(
                "{}_count{} {}\n",
                sample.name,
                sample.labels.prometheus_str(),
                sample.count
            ));
            last_name = &sample.name;
        }

        out
    }

    /// Export all metrics as a JSON value.
    pub fn export_json(&self) -> serde_json::Value {
        let snapshot = self.snapshot();

        let mut counters_json = serde_json::Map::new();
        for sample in &snapshot.counters {
            counters_json.insert(series_key(&sample.name, &sample.labels), sample.value.into());
        }

        let mut gauges_json = serde_json::Map::new();
        for sample in &snapshot.gauges {
            gauges_json.insert(sample.name.clone(), sample.value.into());
        }

        let mut histograms_json = serde_json::Map::new();
        for sample in &snapshot.histograms {
            let buckets: Vec<serde_json::Value> = sample
                .bounds
                .iter()
                .zip(&sample.cumulative_counts)
                .map(|(b, c)| serde_json::json!({ "le": b, "count": c }))
                .collect();
            histograms_json.insert(
                series_key(&sample.name, &sample.labels),
                serde_json::json!({
                    "buckets": buckets,
                    "sum": sample.sum,
                    "count": sample.count,
                }),
            );
        }

        serde_json::json!({
            "counters": counters_json,
            "gauges": gauges_json,
            "histograms": histograms_json,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn series_key(name: &str, labels: &Labels) -> String {
    if labels.is_empty() {
        name.to_string()
    } else {
        format!("{}{}", name, labels.prometheus_str())
    }
}

/// Merge a `le` bucket boundary into an existing label set for Prometheus
/// histogram bucket lines.
fn merge_le_label(labels: &Labels, le: &str) -> String {
    let mut inner: Vec<String> = labels
        .pairs()
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    inner.push(format!("le=\"{}\"", le));
    format!("{{{}}}", inner.join(","))
}

// ---------------------------------------------------------------------------
// Request instrumentation
// ---------------------------------------------------------------------------

/// Drop guard that records one request-duration sample when it goes out of
/// scope, so the sample is emitted on every exit path, panics included.
pub struct RequestTimer {
    collector: Arc<MetricsCollector>,
    target: String,
    start: Instant,
}

impl RequestTimer {
    pub fn new(collector: Arc<MetricsCollector>, target: &str) -> Self {
        Self {
            collector,
            target: target.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.collector.record_histogram(
            REQUEST_DURATION_SECONDS,
            &[(TARGET_LABEL, &self.target)],
            duration,
        );
    }
}

/// Instrument one request for the given route target: increments the request
/// counter immediately and returns the timer guard that records the duration
/// histogram on drop.
///
/// Hold the guard for the whole handler body:
///
/// ```ignore
/// let _timer = instrument_request(&state.metrics, "/");
/// ```
pub fn instrument_request(collector: &Arc<MetricsCollector>, target: &str) -> RequestTimer {
    collector.increment_counter(REQUESTS_TOTAL, &[(TARGET_LABEL, target)]);
    RequestTimer::new(collector.clone(), target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increment() {
        let m = MetricsCollector::new();
        m.increment_counter("requests", &[("target", "/")]);
        m.increment_counter("requests", &[("target", "/")]);
        m.increment_counter("requests", &[("target", "/test")]);

        assert_eq!(m.get_counter("requests", &[("target", "/")]), 2);
        assert_eq!(m.get_counter("requests", &[("target", "/test")]), 1);
        assert_eq!(m.get_counter("requests", &[("target", "/other")]), 0);
    }

    #[test]
    fn test_counter_increment_by() {
        let m = MetricsCollector::new();
        m.increment_counter_by("bytes_sent", &[("target", "/")], 150);
        m.increment_counter_by("bytes_sent", &[("target", "/")], 50);
        assert_eq!(m.get_counter("bytes_sent", &[("target", "/")]), 200);
    }

    #[test]
    fn test_gauge_set() {
        let m = MetricsCollector::new();
        m.set_gauge("worker_threads", 4);
        assert_eq!(m.get_gauge("worker_threads"), 4);
        m.set_gauge("worker_threads", 2);
        assert_eq!(m.get_gauge("worker_threads"), 2);
    }

    #[test]
    fn test_histogram_labeled_series() {
        let m = MetricsCollector::new();
        m.record_histogram(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/")], 0.05);
        m.record_histogram(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/")], 0.5);
        m.record_histogram(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/test")], 2.0);

        assert_eq!(
            m.get_histogram_count(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/")]),
            2
        );
        assert_eq!(
            m.get_histogram_count(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/test")]),
            1
        );
        let sum = m.get_histogram_sum(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/")]);
        assert!((sum - 0.55).abs() < 0.001);
    }

    #[test]
    fn test_prometheus_export() {
        let m = MetricsCollector::new();
        m.increment_counter(REQUESTS_TOTAL, &[(TARGET_LABEL, "/")]);
        m.set_gauge("worker_threads", 2);
        m.record_histogram(REQUEST_DURATION_SECONDS, &[(TARGET_LABEL, "/")], 0.1);

        let output = m.export_prometheus();
        assert!(output.contains("# TYPE app_requests_total counter"));
        assert!(output.contains("app_requests_total{http_target=\"/\"} 1"));
        assert!(output.contains("# TYPE worker_threads gauge"));
        assert!(output.contains("worker_threads 2"));
        assert!(output.contains("# TYPE app_request_duration_seconds histogram"));
        assert!(output.contains("app_request_duration_seconds_count{http_target=\"/\"} 1"));
        assert!(output.contains("le=\"+Inf\""));
    }

    #[test]
    fn test_json_export() {
        let m = MetricsCollector::new();
        m.increment_counter(REQUESTS_TOTAL, &[(TARGET_LABEL, "/")]);
        m.set_gauge("worker_threads", 4);

        let json = m.export_json();
        assert_eq!(json["gauges"]["worker_threads"], 4);
        assert_eq!(json["counters"]["app_requests_total{http_target=\"/\"}"], 1);
    }

    #[test]
    fn test_labels_prometheus_format() {
        let l = Labels::new(&[("status", "200"), ("method", "GET")]);
        assert_eq!(l.prometheus_str(), "{method=\"GET\",status=\"200\"}");

        let empty = Labels::empty();
        assert_eq!(empty.prometheus_str(), "");
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let m = MetricsCollector::new();
        m.increment_counter("b_total", &[]);
        m.increment_counter("a_total", &[]);
        let snapshot = m.snapshot();
        assert_eq!(snapshot.counters[0].name, "a_total");
        assert_eq!(snapshot.counters[1].name, "b_total");
    }
}
