//! Shared `reqwest` client construction: one client per process, rustls
//! TLS, pooled connections, a per-call timeout applied at request-build
//! time rather than baked into the client so each adapter can honor its
//! own configured `timeout_ms`.

use std::time::Duration;

use reqwest::Client;

use crate::error::AdapterError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 8;

/// Build the shared client. Adapters hold an `Arc<Client>` (via
/// `reqwest::Client`'s own internal `Arc`, so cloning is cheap) and apply
/// their own per-request timeout on each `RequestBuilder`.
pub fn build_client() -> Result<Client, AdapterError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .cookie_store(true)
        .build()
        .map_err(|e| AdapterError::Adapter(format!("failed to build HTTP client: {e}")))
}
