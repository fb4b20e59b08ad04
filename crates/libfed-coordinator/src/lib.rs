//! The search coordinator (spec §4.9): cache lookup, breaker-gated
//! concurrent fan-out across every enabled library system, outcome
//! collection under three nested deadlines, aggregation, and cache
//! population.
//!
//! Ties together every other crate in the workspace: [`libfed_config`]'s
//! [`Settings`] for tunables, [`libfed_adapters`]'s registry and base
//! adapter, [`libfed_resilience`]'s breaker/host-limiter/retry primitives,
//! [`libfed_cache`]'s in-process stores, and [`libfed_aggregator`] for the
//! final dedup/grouping pass.

mod error;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use libfed_adapters::{AdapterRegistry, AdapterError, BaseAdapter, CatalogAdapter};
use libfed_cache::{HealthTracker, MetricEvent, MetricsCollector, SearchCache};
use libfed_config::Settings;
use libfed_domain::{ErrorKind, ParsedIsbn, Protocol, SearchResult, SystemError, SystemId};
use libfed_resilience::retry::retry as retry_with_policy;
use libfed_resilience::{CircuitBreaker, HostLimiter, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

pub use error::CoordinatorError;

/// One spawned per-system task's outcome, carrying enough identity back to
/// the coordinator to build a [`SystemError`] or fold holdings in without a
/// second registry lookup.
struct SystemTaskResult {
    system_id: SystemId,
    system_name: String,
    protocol: Protocol,
    result: Result<Vec<libfed_domain::BookHolding>, AdapterError>,
}

/// Orchestrates one ISBN search end to end (spec §4.9 `search`). Cheap to
/// clone (every field is an `Arc` or a `Mutex`-guarded map); constructed
/// once at startup and shared across every incoming request.
pub struct SearchCoordinator {
    registry: Arc<AdapterRegistry>,
    breakers: Mutex<HashMap<SystemId, Arc<CircuitBreaker>>>,
    host_limiter: Arc<HostLimiter>,
    retry_policy: RetryPolicy,
    cache: Arc<SearchCache>,
    health: Arc<HealthTracker>,
    metrics: Arc<MetricsCollector>,
    settings: Settings,
}

impl SearchCoordinator {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        cache: Arc<SearchCache>,
        health: Arc<HealthTracker>,
        metrics: Arc<MetricsCollector>,
        settings: Settings,
    ) -> Arc<Self> {
        let host_limiter = Arc::new(HostLimiter::new(settings.max_host_concurrency));
        let retry_policy = RetryPolicy::new(settings.retry_max_retries, settings.retry_base_delay_ms);
        Arc::new(Self {
            registry,
            breakers: Mutex::new(HashMap::new()),
            host_limiter,
            retry_policy,
            cache,
            health,
            metrics,
            settings,
        })
    }

    /// Every system's circuit breaker, created lazily on first reference
    /// and never destroyed for the life of the process (spec §3
    /// `CircuitBreaker` lifecycle).
    fn breaker_for(&self, system_id: &SystemId) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(system_id.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.settings.breaker_failure_threshold, self.settings.breaker_reset_timeout())))
            .clone()
    }

    /// Run one ISBN search (spec §4.9). The only way this returns `Err` is
    /// an ISBN that failed validation; every per-system failure instead
    /// surfaces inside the returned [`SearchResult`]'s `errors` list.
    pub async fn search(self: &Arc<Self>, isbn_raw: &str) -> Result<SearchResult, CoordinatorError> {
        let parsed = libfed_domain::parse_isbn(isbn_raw)?;
        let search_id = Uuid::new_v4();

        if let Some(mut cached) = self.cache.get(&parsed.isbn13) {
            cached.search_id = search_id;
            cached.from_cache = true;
            self.metrics.record_completed(true, 0);
            return Ok(cached);
        }

        let started_at = Utc::now();
        let global_token = CancellationToken::new();

        let mut join_set = tokio::task::JoinSet::new();
        let mut spawned_meta: Vec<(SystemId, String, Protocol)> = Vec::new();
        let mut skipped: u32 = 0;

        for system_id in self.registry.systems().cloned().collect::<Vec<_>>() {
            let breaker = self.breaker_for(&system_id);
            if breaker.is_open() {
                for adapter in self.registry.adapters_for(&system_id) {
                    self.metrics.record(MetricEvent::CircuitOpen { protocol: adapter.protocol().to_string() });
                }
                skipped += 1;
                continue;
            }

            let Some(adapter) = self.registry.primary_adapter(&system_id) else {
                continue;
            };
            let system_name = self.registry.system_name(&system_id).unwrap_or("").to_string();
            let protocol = adapter.protocol();

            spawned_meta.push((system_id.clone(), system_name.clone(), protocol));
            join_set.spawn(Self::run_system(
                self.clone(),
                system_id,
                system_name,
                adapter,
                parsed.clone(),
                global_token.clone(),
            ));
        }

        let task_results = self.collect_with_global_deadline(join_set, &global_token).await;
        let completed: HashSet<SystemId> = task_results.iter().map(|r| r.system_id.clone()).collect();

        let mut holdings = Vec::new();
        let mut errors = Vec::new();
        let mut succeeded: u32 = 0;
        let mut failed: u32 = 0;
        let mut timed_out: u32 = 0;

        for task in task_results {
            match task.result {
                Ok(h) => {
                    succeeded += 1;
                    holdings.extend(h);
                }
                Err(err) => {
                    if matches!(err.kind(), ErrorKind::Timeout) {
                        timed_out += 1;
                    } else {
                        failed += 1;
                    }
                    errors.push(SystemError {
                        system_id: task.system_id,
                        system_name: task.system_name,
                        protocol: task.protocol,
                        error_type: err.kind(),
                        message: err.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        // Systems the global deadline aborted before they ever reported an
        // outcome. Their own per-system timer never got to record the
        // failure, so the coordinator records it here instead (spec §9:
        // propagate cancellation rather than leak the task, but still
        // surface the timeout the caller observes).
        for (system_id, system_name, protocol) in spawned_meta {
            if completed.contains(&system_id) {
                continue;
            }
            timed_out += 1;
            let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
            self.breaker_for(&system_id).record_failure();
            self.health.record_failure(&system_id, elapsed_ms, "global search deadline elapsed");
            self.metrics.record(MetricEvent::Timeout { protocol: protocol.to_string() });
            errors.push(SystemError {
                system_id,
                system_name,
                protocol,
                error_type: ErrorKind::Timeout,
                message: format!("global deadline of {:?} elapsed before this system's search completed", self.settings.global_timeout()),
                timestamp: Utc::now(),
            });
        }

        let aggregated = libfed_aggregator::aggregate(holdings);
        let systems_failed = failed + skipped;
        let is_partial = systems_failed > 0 || timed_out > 0;
        let completed_at = Utc::now();

        let result = SearchResult {
            search_id,
            isbn: isbn_raw.to_string(),
            normalized_isbn13: parsed.isbn13.clone(),
            started_at,
            completed_at,
            holdings: aggregated.holdings,
            errors,
            systems_searched: succeeded + systems_failed + timed_out,
            systems_succeeded: succeeded,
            systems_failed,
            systems_timed_out: timed_out,
            is_partial,
            from_cache: false,
        };

        self.cache.set(&parsed.isbn13, result.clone());
        let elapsed_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;
        self.metrics.record_completed(false, elapsed_ms);

        Ok(result)
    }

    /// Drain `join_set` until every task finishes or `global_timeout`
    /// elapses, whichever comes first. On timeout, cancels the shared
    /// token and aborts every still-running task rather than leaving them
    /// to run unobserved in the background (spec §9).
    async fn collect_with_global_deadline(
        &self,
        mut join_set: tokio::task::JoinSet<SystemTaskResult>,
        global_token: &CancellationToken,
    ) -> Vec<SystemTaskResult> {
        let deadline = tokio::time::Instant::now() + self.settings.global_timeout();
        let mut results = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok(outcome))) => results.push(outcome),
                Ok(Some(Err(join_err))) => {
                    warn!(error = %join_err, "per-system search task failed to join");
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    global_token.cancel();
                    join_set.abort_all();
                    while let Some(res) = join_set.join_next().await {
                        if let Ok(outcome) = res {
                            results.push(outcome);
                        }
                    }
                    break;
                }
            }
        }

        results
    }

    /// One system's full journey: host-limited, retried, per-system-timed
    /// adapter call, with breaker/health/metrics bookkeeping recorded
    /// around the result (spec §4.9 step 4).
    async fn run_system(
        self: Arc<Self>,
        system_id: SystemId,
        system_name: String,
        adapter: Arc<dyn CatalogAdapter>,
        isbn: ParsedIsbn,
        global_token: CancellationToken,
    ) -> SystemTaskResult {
        let protocol = adapter.protocol();
        let base = BaseAdapter::new(adapter);
        let signal = global_token.child_token();
        let per_system_timeout = self.settings.per_system_timeout();
        let key = system_id.to_string();
        let policy = self.retry_policy;

        let start = std::time::Instant::now();

        let timer_signal = signal.clone();
        let timed_out = async move {
            tokio::time::sleep(per_system_timeout).await;
            timer_signal.cancel();
        };

        let attempt = self.host_limiter.run(&key, async {
            retry_with_policy(&policy, |e: &AdapterError| e.is_retryable(), || base.search(&isbn, &signal))
                .await
                .map(|outcome| outcome.holdings)
        });

        let result = tokio::select! {
            _ = timed_out => Err(AdapterError::Timeout(format!(
                "system '{system_id}' exceeded its per-system timeout of {per_system_timeout:?}"
            ))),
            r = attempt => r,
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                self.breaker_for(&system_id).record_success();
                self.health.record_success(&system_id, elapsed_ms);
                self.metrics.record(MetricEvent::Success { protocol: protocol.to_string() });
            }
            Err(err) => {
                self.breaker_for(&system_id).record_failure();
                self.health.record_failure(&system_id, elapsed_ms, err.to_string());
                match err.kind() {
                    ErrorKind::Timeout => self.metrics.record(MetricEvent::Timeout { protocol: protocol.to_string() }),
                    kind => self.metrics.record(MetricEvent::Error {
                        protocol: protocol.to_string(),
                        error_type: format!("{kind:?}").to_lowercase(),
                    }),
                }
            }
        }

        SystemTaskResult {
            system_id,
            system_name,
            protocol,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use libfed_domain::{BookHolding, BranchId, MaterialType, SearchResult, Status};
    use std::time::Duration;

    struct FakeAdapter {
        protocol: Protocol,
        behavior: Behavior,
    }

    enum Behavior {
        Succeeds { holdings: Vec<BookHolding> },
        Fails(fn() -> AdapterError),
        Sleeps(Duration),
    }

    #[async_trait]
    impl CatalogAdapter for FakeAdapter {
        async fn execute_search(&self, isbn: &ParsedIsbn, _signal: &CancellationToken) -> Result<Vec<BookHolding>, AdapterError> {
            match &self.behavior {
                Behavior::Succeeds { holdings } => Ok(holdings.iter().cloned().map(|mut h| {
                    h.isbn = isbn.isbn13.clone();
                    h
                }).collect()),
                Behavior::Fails(f) => Err(f()),
                Behavior::Sleeps(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(vec![])
                }
            }
        }

        async fn execute_health_check(&self) -> Result<(), AdapterError> {
            Ok(())
        }

        fn protocol(&self) -> Protocol {
            self.protocol
        }
    }

    fn holding(system_id: &str, branch: &str) -> BookHolding {
        let sid = SystemId::from(system_id);
        BookHolding {
            isbn: "9780306406157".to_string(),
            system_id: sid.clone(),
            branch_id: BranchId::new(&sid, branch),
            system_name: format!("{system_id} library"),
            branch_name: branch.to_string(),
            call_number: None,
            collection: String::new(),
            volume: None,
            material_type: MaterialType::Book,
            status: Status::Available,
            due_date: None,
            hold_count: None,
            copy_count: None,
            raw_status: "Available".to_string(),
            catalog_url: "https://example.org".to_string(),
            fingerprint: format!("{system_id}:9780306406157:{branch}"),
            is_secondary_source: false,
        }
    }

    fn settings_fast() -> Settings {
        Settings {
            per_system_timeout_ms: 150,
            global_timeout_ms: 400,
            cache_ttl_secs: 3_600,
            max_host_concurrency: 4,
            breaker_failure_threshold: 5,
            breaker_reset_timeout_ms: 60_000,
            retry_max_retries: 0,
            retry_base_delay_ms: 1,
        }
    }

    fn build_coordinator(adapters: HashMap<SystemId, Vec<Arc<dyn CatalogAdapter>>>, names: HashMap<SystemId, String>, settings: Settings) -> Arc<SearchCoordinator> {
        let registry = Arc::new(AdapterRegistry::from_adapters(adapters, names));
        SearchCoordinator::new(
            registry,
            Arc::new(SearchCache::new(Duration::from_secs(3_600))),
            Arc::new(HealthTracker::new()),
            Arc::new(MetricsCollector::new()),
            settings,
        )
    }

    #[tokio::test]
    async fn invalid_isbn_is_rejected_before_fan_out() {
        let coordinator = build_coordinator(HashMap::new(), HashMap::new(), settings_fast());
        let err = coordinator.search("9780306406158").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidIsbn(_)));
    }

    #[tokio::test]
    async fn partial_failure_scenario() {
        let sys_a: Arc<dyn CatalogAdapter> = Arc::new(FakeAdapter {
            protocol: Protocol::Sru,
            behavior: Behavior::Succeeds { holdings: vec![holding("sys-a", "main")] },
        });
        let sys_b: Arc<dyn CatalogAdapter> = Arc::new(FakeAdapter {
            protocol: Protocol::WebScrape,
            behavior: Behavior::Sleeps(Duration::from_millis(500)),
        });
        let sys_c: Arc<dyn CatalogAdapter> = Arc::new(FakeAdapter {
            protocol: Protocol::OclcWorldcat,
            behavior: Behavior::Fails(|| AdapterError::Parse("malformed XML".to_string())),
        });

        let mut adapters = HashMap::new();
        adapters.insert(SystemId::from("sys-a"), vec![sys_a]);
        adapters.insert(SystemId::from("sys-b"), vec![sys_b]);
        adapters.insert(SystemId::from("sys-c"), vec![sys_c]);
        let mut names = HashMap::new();
        names.insert(SystemId::from("sys-a"), "Sys A".to_string());
        names.insert(SystemId::from("sys-b"), "Sys B".to_string());
        names.insert(SystemId::from("sys-c"), "Sys C".to_string());

        let coordinator = build_coordinator(adapters, names, settings_fast());
        let result: SearchResult = coordinator.search("9780306406157").await.unwrap();

        assert_eq!(result.systems_searched, 3);
        assert_eq!(result.systems_succeeded, 1);
        assert_eq!(result.systems_timed_out, 1);
        assert_eq!(result.systems_failed, 1);
        assert!(result.is_partial);
        assert_eq!(result.holdings.len(), 1);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().any(|e| matches!(e.error_type, ErrorKind::Timeout)));
        assert!(result.errors.iter().any(|e| matches!(e.error_type, ErrorKind::Parse)));
    }

    #[tokio::test]
    async fn circuit_open_system_is_skipped_without_an_adapter_call() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        struct CountingFails(Arc<std::sync::atomic::AtomicUsize>);
        #[async_trait]
        impl CatalogAdapter for CountingFails {
            async fn execute_search(&self, _isbn: &ParsedIsbn, _signal: &CancellationToken) -> Result<Vec<BookHolding>, AdapterError> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(AdapterError::Connection("refused".to_string()))
            }
            async fn execute_health_check(&self) -> Result<(), AdapterError> {
                Ok(())
            }
            fn protocol(&self) -> Protocol {
                Protocol::Sru
            }
        }

        let adapter: Arc<dyn CatalogAdapter> = Arc::new(CountingFails(calls.clone()));
        let mut adapters = HashMap::new();
        adapters.insert(SystemId::from("flaky"), vec![adapter]);
        let mut names = HashMap::new();
        names.insert(SystemId::from("flaky"), "Flaky".to_string());

        let mut settings = settings_fast();
        settings.breaker_failure_threshold = 5;
        settings.breaker_reset_timeout_ms = 60_000;
        let coordinator = build_coordinator(adapters, names, settings);

        for _ in 0..5 {
            let result = coordinator.search("9780306406157").await.unwrap();
            assert_eq!(result.systems_failed, 1);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 5);

        let result = coordinator.search("9780306406157").await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 5, "breaker must skip the 6th call");
        assert_eq!(result.systems_failed, 1);
        assert!(result.is_partial);
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_fan_out() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        struct CountingSuccess(Arc<std::sync::atomic::AtomicUsize>);
        #[async_trait]
        impl CatalogAdapter for CountingSuccess {
            async fn execute_search(&self, _isbn: &ParsedIsbn, _signal: &CancellationToken) -> Result<Vec<BookHolding>, AdapterError> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(vec![])
            }
            async fn execute_health_check(&self) -> Result<(), AdapterError> {
                Ok(())
            }
            fn protocol(&self) -> Protocol {
                Protocol::Sru
            }
        }

        let adapter: Arc<dyn CatalogAdapter> = Arc::new(CountingSuccess(calls.clone()));
        let mut adapters = HashMap::new();
        adapters.insert(SystemId::from("sys-a"), vec![adapter]);
        let mut names = HashMap::new();
        names.insert(SystemId::from("sys-a"), "Sys A".to_string());

        let coordinator = build_coordinator(adapters, names, settings_fast());

        let first = coordinator.search("9780306406157").await.unwrap();
        assert!(!first.from_cache);
        let second = coordinator.search("9780306406157").await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.search_id, second.search_id);
        assert_ne!(second.search_id, first.search_id);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
