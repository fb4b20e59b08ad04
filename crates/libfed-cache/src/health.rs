//! Per-system health tracker (spec §3 `HealthRecord`): running counters of
//! successes/failures, total duration, and last success/failure timestamps,
//! keyed by system id and never TTL-evicted.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use libfed_domain::SystemId;

#[derive(Debug, Clone, Default)]
pub struct HealthRecord {
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
}

impl HealthRecord {
    /// Mean observed latency across recorded successes and failures.
    pub fn average_duration_ms(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / total as f64
        }
    }
}

/// One writer at a time per key, per spec §5 "Shared resources".
#[derive(Default)]
pub struct HealthTracker {
    records: Mutex<HashMap<SystemId, HealthRecord>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, system: &SystemId, duration_ms: u64) {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(system.clone()).or_default();
        record.successes += 1;
        record.total_duration_ms += duration_ms;
        record.last_success = Some(Utc::now());
    }

    pub fn record_failure(&self, system: &SystemId, duration_ms: u64, message: impl Into<String>) {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(system.clone()).or_default();
        record.failures += 1;
        record.total_duration_ms += duration_ms;
        record.last_failure = Some(Utc::now());
        record.last_error_message = Some(message.into());
    }

    pub fn get(&self, system: &SystemId) -> Option<HealthRecord> {
        self.records.lock().unwrap().get(system).cloned()
    }

    /// Snapshot of every tracked system's health, for `/health/systems`.
    pub fn snapshot(&self) -> HashMap<SystemId, HealthRecord> {
        self.records.lock().unwrap().clone()
    }
}
