//! Per-host concurrency limiter (spec §4.4).
//!
//! Runs up to `max_per_host_concurrency` operations concurrently per key;
//! further operations queue FIFO via `tokio::sync::Semaphore`, whose
//! `acquire` is cancel-safe -- a caller that is dropped while waiting for a
//! permit never takes a slot away from admitted operations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

/// Independent, lazily created limiters keyed by an arbitrary host/system
/// key (e.g. a [`libfed_domain::SystemId`] rendered as a string).
pub struct HostLimiter {
    max_per_key: usize,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    pub fn new(max_per_key: usize) -> Self {
        Self {
            max_per_key: max_per_key.max(1),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore_for(&self, key: &str) -> Arc<Semaphore> {
        let mut map = self.semaphores.lock().unwrap();
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_key)))
            .clone()
    }

    /// Run `fut` once a concurrency slot for `key` is available. The
    /// result (success or failure) of `fut` is returned unchanged; the
    /// slot is released when `fut` completes or is dropped.
    pub async fn run<F, T>(&self, key: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let sem = self.semaphore_for(key);
        let _permit = sem.acquire_owned().await.expect("semaphore never closed");
        fut.await
    }
}
