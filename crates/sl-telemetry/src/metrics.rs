use ahash::AHashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const ASSIGNMENTS_TOTAL: &str = "sluice_assignments_total";
pub const OUTCOMES_TOTAL: &str = "sluice_outcomes_total";
pub const LOCK_CONFLICTS_TOTAL: &str = "sluice_lock_conflicts_total";
pub const RECLAIMS_TOTAL: &str = "sluice_reclaims_total";
pub const INGESTED_TOTAL: &str = "sluice_tasks_ingested_total";
pub const ADMISSION_BLOCKED: &str = "sluice_admission_blocked";
pub const QUEUE_DEPTH: &str = "sluice_queue_depth";
pub const API_REQUESTS_TOTAL: &str = "api_requests_total";
pub const API_REQUEST_DURATION: &str = "api_request_duration_seconds";

/// Latency buckets in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// Fixed-bucket histogram. Each observation lands in exactly one bucket
/// (the first upper bound it fits under, or the implicit `+Inf` slot);
/// cumulative counts are computed at export time.
#[derive(Debug)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bounds: &[f64]) -> Self {
        let mut bounds = bounds.to_vec();
        bounds.sort_by(|a, b| a.total_cmp(b));
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum_bits: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        let slot = self
            .bounds
            .iter()
            .position(|b| value <= *b)
            .unwrap_or(self.bounds.len());
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    /// `(upper_bound, cumulative_count)` pairs, ending with `+Inf`.
    pub fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        self.bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(self.counts.iter())
            .map(|(bound, c)| {
                running += c.load(Ordering::Relaxed);
                (bound, running)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Sorted label set, so `{a,b}` and `{b,a}` name the same series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort();
        Self(v)
    }

    fn prometheus(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let body: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect();
        format!("{{{}}}", body.join(","))
    }

    fn with_extra(&self, key: &str, value: &str) -> String {
        let mut pairs = self.0.clone();
        pairs.push((key.to_string(), value.to_string()));
        Labels(pairs).prometheus()
    }

    fn json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

type SeriesKey = (String, Labels);

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Thread-safe in-process metrics registry.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<SeriesKey, AtomicU64>>,
    gauges: RwLock<AHashMap<SeriesKey, AtomicI64>>,
    histograms: RwLock<AHashMap<SeriesKey, Histogram>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = (name.to_string(), Labels::new(labels));
        if let Some(c) = read(&self.counters).get(&key) {
            c.fetch_add(n, Ordering::Relaxed);
            return;
        }
        write(&self.counters)
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.counters)
            .get(&key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = (name.to_string(), Labels::new(labels));
        if let Some(g) = read(&self.gauges).get(&key) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        write(&self.gauges)
            .entry(key)
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn get_gauge(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.gauges)
            .get(&key)
            .map_or(0, |g| g.load(Ordering::Relaxed))
    }

    pub fn record_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = (name.to_string(), Labels::new(labels));
        if let Some(h) = read(&self.histograms).get(&key) {
            h.observe(value);
            return;
        }
        write(&self.histograms)
            .entry(key)
            .or_insert_with(|| Histogram::new(DEFAULT_BUCKETS))
            .observe(value);
    }

    /// Observation count for a histogram series.
    pub fn histogram_count(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        read(&self.histograms).get(&key).map_or(0, Histogram::count)
    }

    // -- coordinator metric families --

    pub fn record_assignment(&self) {
        self.increment_counter(ASSIGNMENTS_TOTAL, &[]);
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.increment_counter(OUTCOMES_TOTAL, &[("outcome", outcome)]);
    }

    pub fn record_lock_conflicts(&self, n: usize) {
        if n > 0 {
            self.increment_counter_by(LOCK_CONFLICTS_TOTAL, &[], n as u64);
        }
    }

    pub fn record_reclaims(&self, n: usize) {
        if n > 0 {
            self.increment_counter_by(RECLAIMS_TOTAL, &[], n as u64);
        }
    }

    pub fn record_ingested(&self, n: usize) {
        if n > 0 {
            self.increment_counter_by(INGESTED_TOTAL, &[], n as u64);
        }
    }

    pub fn set_admission_blocked(&self, blocked: bool) {
        self.set_gauge(ADMISSION_BLOCKED, &[], i64::from(blocked));
    }

    pub fn set_queue_depth(&self, status: &str, depth: usize) {
        self.set_gauge(QUEUE_DEPTH, &[("status", status)], depth as i64);
    }

    /// Render every series in the Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        let counters = read(&self.counters);
        let mut keys: Vec<&SeriesKey> = counters.keys().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1 .0.cmp(&b.1 .0)));
        let mut last = "";
        for key in keys {
            if key.0 != last {
                let _ = writeln!(out, "# TYPE {} counter", key.0);
                last = &key.0;
            }
            let v = counters[key].load(Ordering::Relaxed);
            let _ = writeln!(out, "{}{} {v}", key.0, key.1.prometheus());
        }

        let gauges = read(&self.gauges);
        let mut keys: Vec<&SeriesKey> = gauges.keys().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1 .0.cmp(&b.1 .0)));
        let mut last = "";
        for key in keys {
            if key.0 != last {
                let _ = writeln!(out, "# TYPE {} gauge", key.0);
                last = &key.0;
            }
            let v = gauges[key].load(Ordering::Relaxed);
            let _ = writeln!(out, "{}{} {v}", key.0, key.1.prometheus());
        }

        let histograms = read(&self.histograms);
        let mut keys: Vec<&SeriesKey> = histograms.keys().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1 .0.cmp(&b.1 .0)));
        let mut last = "";
        for key in keys {
            if key.0 != last {
                let _ = writeln!(out, "# TYPE {} histogram", key.0);
                last = &key.0;
            }
            let h = &histograms[key];
            for (bound, cum) in h.cumulative() {
                let le = if bound.is_infinite() {
                    "+Inf".to_string()
                } else {
                    bound.to_string()
                };
                let _ = writeln!(
                    out,
                    "{}_bucket{} {cum}",
                    key.0,
                    key.1.with_extra("le", &le)
                );
            }
            let _ = writeln!(out, "{}_sum{} {}", key.0, key.1.prometheus(), h.sum());
            let _ = writeln!(out, "{}_count{} {}", key.0, key.1.prometheus(), h.count());
        }

        out
    }

    /// Render every series as a JSON document.
    pub fn export_json(&self) -> serde_json::Value {
        let counters: Vec<serde_json::Value> = read(&self.counters)
            .iter()
            .map(|((name, labels), v)| {
                serde_json::json!({
                    "name": name,
                    "labels": labels.json(),
                    "value": v.load(Ordering::Relaxed),
                })
            })
            .collect();
        let gauges: Vec<serde_json::Value> = read(&self.gauges)
            .iter()
            .map(|((name, labels), v)| {
                serde_json::json!({
                    "name": name,
                    "labels": labels.json(),
                    "value": v.load(Ordering::Relaxed),
                })
            })
            .collect();
        let histograms: Vec<serde_json::Value> = read(&self.histograms)
            .iter()
            .map(|((name, labels), h)| {
                serde_json::json!({
                    "name": name,
                    "labels": labels.json(),
                    "count": h.count(),
                    "sum": h.sum(),
                })
            })
            .collect();

        serde_json::json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

static GLOBAL_METRICS: OnceLock<MetricsCollector> = OnceLock::new();

/// Process-wide collector.
pub fn global_metrics() -> &'static MetricsCollector {
    GLOBAL_METRICS.get_or_init(MetricsCollector::new)
}
