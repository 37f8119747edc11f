//! Operational counters, latency histogram, and a fixed-capacity operation
//! log.

use std::collections::VecDeque;
use std::time::Duration;

use hdrhistogram::Histogram;

/// Outcome recorded for a single logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss,
    Error,
}

/// One ring-buffer entry: `{timestamp, operation, outcome}`. `timestamp` is
/// caller-supplied (millis since an arbitrary epoch) since this crate never
/// reads the wall clock itself.
#[derive(Debug, Clone)]
pub struct OperationLogEntry {
    pub timestamp_ms: u64,
    pub operation: &'static str,
    pub outcome: Outcome,
}

/// Fixed-capacity ring buffer of recent operations. Never grows past
/// `capacity`; the oldest entry is dropped to make room for a new one.
pub struct OperationLog {
    capacity: usize,
    entries: VecDeque<OperationLogEntry>,
}

impl OperationLog {
    pub fn new(capacity: usize) -> Self {
        OperationLog {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn record(&mut self, timestamp_ms: u64, operation: &'static str, outcome: Outcome) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(OperationLogEntry {
            timestamp_ms,
            operation,
            outcome,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationLogEntry> {
        self.entries.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Default operation log capacity.
pub const DEFAULT_OPERATION_LOG_CAPACITY: usize = 256;

/// Upper bound of the query-latency histogram, in nanoseconds (10s).
const QUERY_LATENCY_HIGH_NS: u64 = 10_000_000_000;

/// Snapshot view returned by [`Metrics::snapshot`].
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub query_count: u64,
    pub mutation_count: u64,
    pub query_latency_mean_ns: f64,
    pub query_latency_p99_ns: u64,
    pub operation_log_len: usize,
}

/// Counters plus a latency histogram the resolver updates on every public
/// call; never allocates beyond the histogram's fixed bucket layout and the
/// operation log's fixed capacity.
pub struct Metrics {
    query_count: u64,
    mutation_count: u64,
    query_latency_ns: Histogram<u64>,
    operation_log: OperationLog,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::with_operation_log_capacity(DEFAULT_OPERATION_LOG_CAPACITY)
    }

    pub fn with_operation_log_capacity(capacity: usize) -> Self {
        Metrics {
            query_count: 0,
            mutation_count: 0,
            // 1ns..10s range, 3 significant digits, matches typical
            // interactive-latency histograms.
            query_latency_ns: Histogram::new_with_bounds(1, QUERY_LATENCY_HIGH_NS, 3)
                .expect("static histogram bounds are valid"),
            operation_log: OperationLog::new(capacity),
        }
    }

    pub fn record_query(&mut self, latency: Duration, timestamp_ms: u64, operation: &'static str, outcome: Outcome) {
        self.query_count += 1;
        let ns = (latency.as_nanos() as u64).min(QUERY_LATENCY_HIGH_NS);
        let _ = self.query_latency_ns.record(ns.max(1));
        self.operation_log.record(timestamp_ms, operation, outcome);
    }

    pub fn record_mutation(&mut self, timestamp_ms: u64, operation: &'static str, outcome: Outcome) {
        self.mutation_count += 1;
        self.operation_log.record(timestamp_ms, operation, outcome);
    }

    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    pub fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.operation_log
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            query_count: self.query_count,
            mutation_count: self.mutation_count,
            query_latency_mean_ns: self.query_latency_ns.mean(),
            query_latency_p99_ns: self.query_latency_ns.value_at_percentile(99.0),
            operation_log_len: self.operation_log.len(),
        }
    }

    pub fn reset(&mut self) {
        self.query_count = 0;
        self.mutation_count = 0;
        self.query_latency_ns.reset();
        self.operation_log = OperationLog::new(self.operation_log.capacity());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_log_evicts_oldest_past_capacity() {
        let mut log = OperationLog::new(3);
        for i in 0..5 {
            log.record(i, "find_closest", Outcome::Hit);
        }
        assert_eq!(log.len(), 3);
        let first = log.iter().next().unwrap();
        assert_eq!(first.timestamp_ms, 2);
    }

    #[test]
    fn records_query_latency_and_counts() {
        let mut m = Metrics::new();
        m.record_query(Duration::from_micros(500), 0, "find_closest", Outcome::Hit);
        m.record_query(Duration::from_micros(1500), 1, "find_closest", Outcome::Miss);
        assert_eq!(m.query_count(), 2);
        let snap = m.snapshot();
        assert!(snap.query_latency_mean_ns > 0.0);
        assert_eq!(snap.operation_log_len, 2);
    }

    #[test]
    fn mutation_count_independent_of_query_count() {
        let mut m = Metrics::new();
        m.record_mutation(0, "add_snap_point", Outcome::Hit);
        m.record_mutation(1, "remove_snap_point", Outcome::Hit);
        assert_eq!(m.mutation_count(), 2);
        assert_eq!(m.query_count(), 0);
    }

    #[test]
    fn reset_clears_counters_and_log() {
        let mut m = Metrics::new();
        m.record_query(Duration::from_micros(10), 0, "find_closest", Outcome::Hit);
        m.reset();
        assert_eq!(m.query_count(), 0);
        assert!(m.operation_log().is_empty());
    }
}
