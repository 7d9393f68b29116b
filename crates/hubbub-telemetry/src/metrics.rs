use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Observations kept per histogram; older ones are discarded.
const HISTOGRAM_WINDOW: usize = 1024;

/// Kind of series in a [`MetricsSnapshot`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

/// Point-in-time value of one metric series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
    pub metric_type: MetricType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<HistogramSummary>,
}

/// Windowed percentiles over the most recent observations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl HistogramSummary {
    fn from_window(window: &VecDeque<f64>) -> Self {
        let mut values: Vec<f64> = window.iter().copied().collect();
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(f64::total_cmp);
        let rank = |q: f64| values[((values.len() as f64 * q) as usize).min(values.len() - 1)];
        Self {
            count: values.len() as u64,
            sum: values.iter().sum(),
            p50: rank(0.5),
            p95: rank(0.95),
            p99: rank(0.99),
        }
    }
}

/// Series identity. Labels are kept sorted so `[("a", _), ("b", _)]` and
/// `[("b", _), ("a", _)]` name the same series.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct SeriesKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        labels.sort();
        Self {
            name: name.to_owned(),
            labels,
        }
    }
}

/// Gauge value stored as raw `f64` bits.
#[derive(Default)]
struct GaugeCell(AtomicU64);

impl GaugeCell {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn add(&self, delta: f64) {
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + delta).to_bits())
        });
    }
}

#[derive(Default)]
struct HistogramCell(Mutex<VecDeque<f64>>);

impl HistogramCell {
    fn push(&self, value: f64) {
        let mut window = self.0.lock();
        if window.len() == HISTOGRAM_WINDOW {
            window.pop_front();
        }
        window.push_back(value);
    }

    fn summary(&self) -> HistogramSummary {
        HistogramSummary::from_window(&self.0.lock())
    }
}

type SeriesMap<T> = RwLock<HashMap<SeriesKey, T>>;

/// Run `f` on the series, creating it on first use. The common path only
/// takes the read lock.
fn with_series<T: Default>(map: &SeriesMap<T>, key: SeriesKey, f: impl FnOnce(&T)) {
    if let Some(cell) = map.read().get(&key) {
        f(cell);
        return;
    }
    f(map.write().entry(key).or_default());
}

/// Thread-safe in-memory metrics recorder shared by every hub component.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: SeriesMap<AtomicU64>,
    gauges: SeriesMap<GaugeCell>,
    histograms: SeriesMap<HistogramCell>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        with_series(&self.counters, SeriesKey::new(name, labels), |c| {
            c.fetch_add(n, Ordering::Relaxed);
        });
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        with_series(&self.gauges, SeriesKey::new(name, labels), |g| g.store(value));
    }

    /// Add `delta` (may be negative). A missing gauge starts at zero.
    pub fn gauge_inc(&self, name: &str, labels: &[(&str, &str)], delta: f64) {
        with_series(&self.gauges, SeriesKey::new(name, labels), |g| g.add(delta));
    }

    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        with_series(&self.histograms, SeriesKey::new(name, labels), |h| h.push(value));
    }

    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        self.histograms
            .read()
            .get(&SeriesKey::new(name, labels))
            .map(HistogramCell::summary)
            .unwrap_or_default()
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .get(&SeriesKey::new(name, labels))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.gauges
            .read()
            .get(&SeriesKey::new(name, labels))
            .map_or(0.0, GaugeCell::load)
    }

    /// Current value of every series, sorted by name then labels. Histograms
    /// report p50 as `value` with the full summary alongside.
    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        let timestamp = Utc::now().to_rfc3339();
        let entry = |key: &SeriesKey, value: f64, metric_type, summary| MetricsSnapshot {
            timestamp: timestamp.clone(),
            name: key.name.clone(),
            value,
            labels: key.labels.iter().cloned().collect(),
            metric_type,
            summary,
        };

        let mut out: Vec<MetricsSnapshot> = Vec::new();
        out.extend(self.counters.read().iter().map(|(key, c)| {
            entry(key, c.load(Ordering::Relaxed) as f64, MetricType::Counter, None)
        }));
        out.extend(
            self.gauges
                .read()
                .iter()
                .map(|(key, g)| entry(key, g.load(), MetricType::Gauge, None)),
        );
        out.extend(self.histograms.read().iter().map(|(key, h)| {
            let summary = h.summary();
            entry(key, summary.p50, MetricType::Histogram, Some(summary))
        }));

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        out
    }
}
