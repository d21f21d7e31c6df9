//! Metrics sink contract.
//!
//! Protocols report counters, gauges, and duration observations to an
//! injected [`MetricsSink`]; no control decision ever reads a metric
//! back. The sink is injected per protocol instance rather than
//! registered globally, so embedders wire their exporter of choice and
//! tests assert on [`MemoryMetricsSink`].

use std::cell::RefCell;
use std::collections::BTreeMap;

/// Receiver for protocol metrics.
///
/// `labels` are (key, value) pairs identifying the node or chunk a sample
/// belongs to. Implementations must be side-effect-only.
pub trait MetricsSink {
    /// Add `value` to a named counter.
    fn incr_counter_by(&self, name: &str, labels: &[(&str, &str)], value: u64);

    /// Increment a named counter by one.
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.incr_counter_by(name, labels, 1);
    }

    /// Set a gauge to an absolute value.
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);

    /// Record one observation of a distribution, e.g. a duration in
    /// seconds.
    fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn incr_counter_by(&self, _name: &str, _labels: &[(&str, &str)], _value: u64) {}

    fn set_gauge(&self, _name: &str, _labels: &[(&str, &str)], _value: f64) {}

    fn observe(&self, _name: &str, _labels: &[(&str, &str)], _value: f64) {}
}

/// In-memory sink for tests and ad-hoc inspection.
///
/// Samples are keyed by `name{k="v",...}` with labels in the order they
/// were reported.
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    inner: RefCell<MemoryMetricsInner>,
}

#[derive(Debug, Default)]
struct MemoryMetricsInner {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, f64>,
    observations: BTreeMap<String, Vec<f64>>,
}

impl MemoryMetricsSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, zero if never incremented.
    pub fn counter(&self, key: &str) -> u64 {
        self.inner
            .borrow()
            .counters
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// Last value set on a gauge.
    pub fn gauge(&self, key: &str) -> Option<f64> {
        self.inner.borrow().gauges.get(key).copied()
    }

    /// All observations recorded under a key.
    pub fn observations(&self, key: &str) -> Vec<f64> {
        self.inner
            .borrow()
            .observations
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys of all counters that have been incremented.
    pub fn counter_keys(&self) -> Vec<String> {
        self.inner.borrow().counters.keys().cloned().collect()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn incr_counter_by(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        *self
            .inner
            .borrow_mut()
            .counters
            .entry(key(name, labels))
            .or_default() += value;
    }

    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.inner
            .borrow_mut()
            .gauges
            .insert(key(name, labels), value);
    }

    fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.inner
            .borrow_mut()
            .observations
            .entry(key(name, labels))
            .or_default()
            .push(value);
    }
}

fn key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{name}{{{}}}", rendered.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let sink = MemoryMetricsSink::new();
        sink.incr_counter("attempts", &[("node", "a")]);
        sink.incr_counter("attempts", &[("node", "a")]);
        sink.incr_counter_by("attempts", &[("node", "b")], 5);

        assert_eq!(sink.counter("attempts{node=\"a\"}"), 2);
        assert_eq!(sink.counter("attempts{node=\"b\"}"), 5);
        assert_eq!(sink.counter("attempts{node=\"c\"}"), 0);
    }

    #[test]
    fn test_gauge_keeps_last_value() {
        let sink = MemoryMetricsSink::new();
        sink.set_gauge("duration", &[], 1.5);
        sink.set_gauge("duration", &[], 2.5);

        assert_eq!(sink.gauge("duration"), Some(2.5));
    }

    #[test]
    fn test_observations_accumulate_in_order() {
        let sink = MemoryMetricsSink::new();
        sink.observe("latency", &[], 0.1);
        sink.observe("latency", &[], 0.2);

        assert_eq!(sink.observations("latency"), vec![0.1, 0.2]);
    }

    #[test]
    fn test_unlabelled_key_is_bare_name() {
        let sink = MemoryMetricsSink::new();
        sink.incr_counter("runs", &[]);
        assert_eq!(sink.counter_keys(), vec!["runs".to_string()]);
    }
}
