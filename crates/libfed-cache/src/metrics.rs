//! In-process metrics collector (spec §4.9 step 8, §5 "single in-process
//! instance"). A minimal counter/timer store — the spec treats the real
//! metrics backend as an external collaborator, so this crate only needs
//! something concrete enough to drive and test the coordinator.

use std::collections::HashMap;
use std::sync::Mutex;

/// One coordinator-observable event, recorded by [`MetricsCollector::record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricEvent {
    /// A search completed, successfully or partially; `from_cache` breaks
    /// out cache hits from fresh fan-outs.
    Completed { from_cache: bool },
    /// One system's adapter call succeeded.
    Success { protocol: String },
    /// One system's adapter call timed out.
    Timeout { protocol: String },
    /// One system's adapter call failed for a non-timeout reason.
    Error { protocol: String, error_type: String },
    /// A system was skipped because its circuit breaker was open.
    CircuitOpen { protocol: String },
}

#[derive(Default)]
pub struct MetricsCollector {
    counters: Mutex<HashMap<String, u64>>,
    durations_ms: Mutex<Vec<u64>>,
}

fn event_key(event: &MetricEvent) -> String {
    match event {
        MetricEvent::Completed { from_cache } => format!("completed.from_cache={from_cache}"),
        MetricEvent::Success { protocol } => format!("success.{protocol}"),
        MetricEvent::Timeout { protocol } => format!("timeout.{protocol}"),
        MetricEvent::Error { protocol, error_type } => format!("error.{protocol}.{error_type}"),
        MetricEvent::CircuitOpen { protocol } => format!("circuit_open.{protocol}"),
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: MetricEvent) {
        let mut counters = self.counters.lock().unwrap();
        *counters.entry(event_key(&event)).or_insert(0) += 1;
    }

    pub fn record_completed(&self, from_cache: bool, elapsed_ms: u64) {
        self.record(MetricEvent::Completed { from_cache });
        self.durations_ms.lock().unwrap().push(elapsed_ms);
    }

    pub fn count(&self, event: &MetricEvent) -> u64 {
        *self.counters.lock().unwrap().get(&event_key(event)).unwrap_or(&0)
    }

    /// Snapshot every counter, keyed by its serialized event key. Intended
    /// for a periodic report timer (spec §5) to drain/export.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_distinct_events_independently() {
        let metrics = MetricsCollector::new();
        metrics.record(MetricEvent::Success { protocol: "sru".into() });
        metrics.record(MetricEvent::Success { protocol: "sru".into() });
        metrics.record(MetricEvent::Timeout { protocol: "sru".into() });

        assert_eq!(metrics.count(&MetricEvent::Success { protocol: "sru".into() }), 2);
        assert_eq!(metrics.count(&MetricEvent::Timeout { protocol: "sru".into() }), 1);
        assert_eq!(metrics.count(&MetricEvent::CircuitOpen { protocol: "sru".into() }), 0);
    }

    #[test]
    fn record_completed_tracks_duration() {
        let metrics = MetricsCollector::new();
        metrics.record_completed(false, 120);
        assert_eq!(metrics.count(&MetricEvent::Completed { from_cache: false }), 1);
        assert_eq!(metrics.durations_ms.lock().unwrap().len(), 1);
    }
}
