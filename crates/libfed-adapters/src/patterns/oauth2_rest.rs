//! Pattern (b): cached-token OAuth2 REST (spec §4.7b). Covers
//! `aspen_discovery_api` and `apollo_api`.
//!
//! Token refresh is coalesced the way the teacher's `budgeted_backend`
//! decorator wraps a backend with one shared piece of mutable state: a
//! `tokio::sync::Mutex<Option<CachedToken>>` guards the cache, and a
//! second mutex (held only across the network call) ensures concurrent
//! callers that miss the cache await one shared refresh rather than each
//! issuing their own request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use libfed_domain::{BookHolding, BranchId, ParsedIsbn, Protocol, SystemId};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::base::{fingerprint, CatalogAdapter};
use crate::error::AdapterError;
use crate::normalize::{normalize_material, normalize_status};

/// Safety margin subtracted from the token's reported lifetime before it's
/// treated as expired, so a request never races a token that dies mid-call.
const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct Oauth2RestAdapter {
    client: Client,
    base_url: String,
    token_url: String,
    client_key: String,
    client_secret: String,
    scope: Option<String>,
    timeout: Duration,
    system_id: SystemId,
    system_name: String,
    protocol: Protocol,
    token: Arc<Mutex<Option<CachedToken>>>,
    refresh_lock: Arc<Mutex<()>>,
}

impl Oauth2RestAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        base_url: String,
        token_url: String,
        client_key: String,
        client_secret: String,
        scope: Option<String>,
        timeout: Duration,
        system_id: SystemId,
        system_name: String,
        protocol: Protocol,
    ) -> Self {
        Self {
            client,
            base_url,
            token_url,
            client_key,
            client_secret,
            scope,
            timeout,
            system_id,
            system_name,
            protocol,
            token: Arc::new(Mutex::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the cached token if unexpired, else coalesces concurrent
    /// refreshes behind `refresh_lock` so exactly one outbound POST happens
    /// per expiry window.
    async fn get_token(&self) -> Result<String, AdapterError> {
        {
            let cached = self.token.lock().await;
            if let Some(t) = cached.as_ref() {
                if Instant::now() < t.expires_at {
                    return Ok(t.access_token.clone());
                }
            }
        }

        let _refresh_guard = self.refresh_lock.lock().await;

        // Re-check: another caller may have refreshed while we waited for
        // `refresh_lock`.
        {
            let cached = self.token.lock().await;
            if let Some(t) = cached.as_ref() {
                if Instant::now() < t.expires_at {
                    return Ok(t.access_token.clone());
                }
            }
        }

        debug!(system = %self.system_id, "refreshing OAuth2 token");
        let mut form = vec![("grant_type", "client_credentials".to_string())];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.clone()));
        }

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_key, Some(&self.client_secret))
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth(format!("token request rejected: {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(AdapterError::Connection(format!("token endpoint returned {}", response.status())));
        }

        let body: TokenResponse = response.json().await.map_err(AdapterError::from_reqwest)?;
        let cached = CachedToken {
            access_token: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_SAFETY_MARGIN),
        };

        *self.token.lock().await = Some(cached);
        Ok(body.access_token)
    }

    /// A 401/403 on a real API call invalidates the cached token so the
    /// next caller refreshes, and re-raises as `AdapterError::Auth`.
    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    fn parse_holdings(&self, isbn13: &str, payload: &Value) -> Vec<BookHolding> {
        let items = payload
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        items
            .iter()
            .map(|item| {
                let branch_name = item.get("branch").and_then(Value::as_str).unwrap_or("Unknown").to_string();
                let call_number = item.get("callNumber").and_then(Value::as_str).map(str::to_string);
                let raw_status = item.get("status").and_then(Value::as_str).unwrap_or("").to_string();
                let material = item.get("format").and_then(Value::as_str).unwrap_or("");
                let branch_id = BranchId::new(&self.system_id, &branch_name);

                BookHolding {
                    isbn: isbn13.to_string(),
                    system_id: self.system_id.clone(),
                    branch_id,
                    system_name: self.system_name.clone(),
                    branch_name: branch_name.clone(),
                    call_number: call_number.clone(),
                    collection: String::new(),
                    volume: None,
                    material_type: normalize_material(material),
                    status: normalize_status(&raw_status),
                    due_date: None,
                    hold_count: item.get("holdCount").and_then(Value::as_u64).map(|n| n as u32),
                    copy_count: item.get("copyCount").and_then(Value::as_u64).map(|n| n as u32),
                    raw_status,
                    catalog_url: self.base_url.clone(),
                    fingerprint: fingerprint(
                        self.system_id.as_ref(),
                        isbn13,
                        Some(&branch_name),
                        call_number.as_deref(),
                        None,
                    ),
                    is_secondary_source: false,
                }
            })
            .collect()
    }
}

#[async_trait]
impl CatalogAdapter for Oauth2RestAdapter {
    async fn execute_search(
        &self,
        isbn: &ParsedIsbn,
        _signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError> {
        let token = self.get_token().await?;
        let url = format!("{}/availability?isbn={}", self.base_url, isbn.isbn13);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
            self.invalidate_token().await;
            return Err(AdapterError::Auth(format!("request rejected: {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(AdapterError::Connection(format!("endpoint returned {}", response.status())));
        }

        let payload: Value = response.json().await.map_err(AdapterError::from_reqwest)?;
        Ok(self.parse_holdings(&isbn.isbn13, &payload))
    }

    async fn execute_health_check(&self) -> Result<(), AdapterError> {
        self.get_token().await.map(|_| ())
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }
}
