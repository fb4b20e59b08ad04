//! The polymorphic adapter contract (spec §4.6): a closed two-method
//! interface (`search`, `health_check`) plus the shared base-adapter
//! bookkeeping — timing, error-taxonomy mapping, and the normalization/
//! fingerprint helpers every concrete adapter needs.
//!
//! Composition over inheritance, per spec §9's explicit redesign guidance:
//! [`BaseAdapter`] wraps a concrete [`CatalogAdapter`] impl rather than the
//! concrete adapter inheriting shared behavior, the same shape the
//! teacher's orchestrator wraps each `LlmBackend` behind one trait object
//! it only ever drives through `search`/`health_check`.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libfed_domain::{BookHolding, Protocol};
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;

/// Result of a successful `search` call: the normalized holdings plus
/// observability fields the base wrapper fills in uniformly.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub holdings: Vec<BookHolding>,
    pub response_time_ms: u64,
    pub protocol: Protocol,
}

/// Result of a `health_check` call. Never an `Err`: internal failures are
/// folded into `healthy = false` with `message` set, per spec §4.6.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    pub protocol: Protocol,
    pub healthy: bool,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// The concrete per-catalog behavior every adapter pattern in spec §4.7
/// implements. Deliberately thin: the "how do we format and call this
/// catalog" logic only, never timing or cancellation-to-error mapping —
/// that bookkeeping lives once in [`BaseAdapter`].
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    async fn execute_search(
        &self,
        isbn: &libfed_domain::ParsedIsbn,
        signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError>;

    async fn execute_health_check(&self) -> Result<(), AdapterError>;

    fn protocol(&self) -> Protocol;
}

/// Wraps any [`CatalogAdapter`] with the shared timing/error-mapping
/// bookkeeping spec §4.6 assigns to the "base" layer.
pub struct BaseAdapter<A: CatalogAdapter> {
    inner: A,
}

impl<A: CatalogAdapter> BaseAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Run the wrapped adapter's search, timing it and filling in
    /// `response_time_ms`/`protocol` uniformly. Cancellation observed on
    /// `signal` after the call returns is surfaced as `AdapterError::Timeout`
    /// even if the inner call itself returned `Ok`, since a cancelled
    /// per-system deadline means the result arrived too late to use.
    pub async fn search(
        &self,
        isbn: &libfed_domain::ParsedIsbn,
        signal: &CancellationToken,
    ) -> Result<SearchOutcome, AdapterError> {
        let start = Instant::now();
        let result = self.inner.execute_search(isbn, signal).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        if signal.is_cancelled() {
            return Err(AdapterError::Timeout(format!(
                "{} search cancelled after {response_time_ms}ms",
                self.inner.protocol()
            )));
        }

        let holdings = result?;
        Ok(SearchOutcome {
            holdings,
            response_time_ms,
            protocol: self.inner.protocol(),
        })
    }

    /// Run the wrapped adapter's health check; never propagates an error,
    /// folding any failure into `healthy = false` per spec §4.6.
    pub async fn health_check(&self) -> HealthProbe {
        let start = Instant::now();
        let result = self.inner.execute_health_check().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        HealthProbe {
            protocol: self.inner.protocol(),
            healthy: result.is_ok(),
            latency_ms,
            message: result.err().map(|e| e.to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl CatalogAdapter for std::sync::Arc<dyn CatalogAdapter> {
    async fn execute_search(
        &self,
        isbn: &libfed_domain::ParsedIsbn,
        signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError> {
        (**self).execute_search(isbn, signal).await
    }

    async fn execute_health_check(&self) -> Result<(), AdapterError> {
        (**self).execute_health_check().await
    }

    fn protocol(&self) -> Protocol {
        (**self).protocol()
    }
}

/// Build the dedup fingerprint from this search's system/branch/call-number/
/// copy-key context (spec §3, §4.6 step 4). Thin re-export over
/// [`libfed_domain::fingerprint`] so adapters don't need to import both
/// crates to build one.
pub fn fingerprint(
    system_id: &str,
    isbn13: &str,
    branch: Option<&str>,
    call_number: Option<&str>,
    copy_key: Option<&str>,
) -> String {
    libfed_domain::fingerprint(&[Some(system_id), Some(isbn13), branch, call_number, copy_key])
}

#[cfg(test)]
mod tests {
    use super::*;
    use libfed_domain::parse_isbn;

    struct AlwaysFails;

    #[async_trait]
    impl CatalogAdapter for AlwaysFails {
        async fn execute_search(
            &self,
            _isbn: &libfed_domain::ParsedIsbn,
            _signal: &CancellationToken,
        ) -> Result<Vec<BookHolding>, AdapterError> {
            Err(AdapterError::Parse("malformed XML".into()))
        }

        async fn execute_health_check(&self) -> Result<(), AdapterError> {
            Err(AdapterError::Connection("refused".into()))
        }

        fn protocol(&self) -> Protocol {
            Protocol::Sru
        }
    }

    #[tokio::test]
    async fn search_propagates_inner_error() {
        let base = BaseAdapter::new(AlwaysFails);
        let isbn = parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let err = base.search(&isbn, &signal).await.unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }

    #[tokio::test]
    async fn health_check_never_propagates_error() {
        let base = BaseAdapter::new(AlwaysFails);
        let probe = base.health_check().await;
        assert!(!probe.healthy);
        assert!(probe.message.is_some());
    }

    #[tokio::test]
    async fn cancelled_signal_overrides_ok_result() {
        struct AlwaysOk;
        #[async_trait]
        impl CatalogAdapter for AlwaysOk {
            async fn execute_search(
                &self,
                _isbn: &libfed_domain::ParsedIsbn,
                _signal: &CancellationToken,
            ) -> Result<Vec<BookHolding>, AdapterError> {
                Ok(vec![])
            }
            async fn execute_health_check(&self) -> Result<(), AdapterError> {
                Ok(())
            }
            fn protocol(&self) -> Protocol {
                Protocol::WebScrape
            }
        }

        let base = BaseAdapter::new(AlwaysOk);
        let isbn = parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        signal.cancel();
        let err = base.search(&isbn, &signal).await.unwrap_err();
        assert!(matches!(err, AdapterError::Timeout(_)));
    }

    #[test]
    fn fingerprint_matches_domain_helper() {
        let fp = fingerprint("Sys-A", "9780306406157", Some("Main"), None, None);
        assert_eq!(fp, "sys-a:9780306406157:main");
    }
}
