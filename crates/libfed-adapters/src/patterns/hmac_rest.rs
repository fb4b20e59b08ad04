//! Pattern (c): HMAC-signed REST (spec §4.7c). Covers `polaris_papi`
//! (Polaris PAPI's `PolarisDate`/`PWS` signing scheme).

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use libfed_domain::{BookHolding, BranchId, ParsedIsbn, Protocol, SystemId};
use reqwest::Client;
use serde_json::Value;
use sha1::Sha1;
use tokio_util::sync::CancellationToken;

use crate::base::{fingerprint, CatalogAdapter};
use crate::error::AdapterError;
use crate::normalize::{normalize_material, normalize_status};

type HmacSha1 = Hmac<Sha1>;

pub struct HmacRestAdapter {
    client: Client,
    base_url: String,
    access_key: String,
    access_secret: String,
    timeout: Duration,
    system_id: SystemId,
    system_name: String,
}

impl HmacRestAdapter {
    pub fn new(
        client: Client,
        base_url: String,
        access_key_env: &str,
        access_secret_env: &str,
        timeout: Duration,
        system_id: SystemId,
        system_name: String,
    ) -> Result<Self, AdapterError> {
        let access_key = libfed_config::resolve_credential(access_key_env).map_err(|e| AdapterError::Auth(e.to_string()))?;
        let access_secret = libfed_config::resolve_credential(access_secret_env).map_err(|e| AdapterError::Auth(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            access_key,
            access_secret,
            timeout,
            system_id,
            system_name,
        })
    }

    /// `Base64(HMAC-SHA1(secret, method + url + httpDate))`, per spec §4.7c.
    fn sign(&self, method: &str, url: &str, http_date: &str) -> Result<String, AdapterError> {
        let mut mac = HmacSha1::new_from_slice(self.access_secret.as_bytes())
            .map_err(|e| AdapterError::Adapter(format!("failed to build HMAC: {e}")))?;
        mac.update(method.as_bytes());
        mac.update(url.as_bytes());
        mac.update(http_date.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    fn signed_request(&self, method: reqwest::Method, url: &str) -> Result<reqwest::RequestBuilder, AdapterError> {
        let http_date = httpdate::fmt_http_date(SystemTime::now());
        let signature = self.sign(method.as_str(), url, &http_date)?;
        let auth = format!("PWS {}:{}", self.access_key, signature);

        Ok(self
            .client
            .request(method, url)
            .header("PolarisDate", http_date)
            .header("Authorization", auth)
            .timeout(self.timeout))
    }

    fn parse_holdings(&self, isbn13: &str, payload: &Value) -> Vec<BookHolding> {
        let items = payload
            .get("GetBibHoldingsResult")
            .and_then(|r| r.get("Holdings"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        items
            .iter()
            .map(|item| {
                let branch_name = item.get("OrganizationName").and_then(Value::as_str).unwrap_or("Unknown").to_string();
                let call_number = item.get("CallNumber").and_then(Value::as_str).map(str::to_string);
                let raw_status = item.get("StatusDescription").and_then(Value::as_str).unwrap_or("").to_string();
                let material = item.get("MaterialType").and_then(Value::as_str).unwrap_or("");
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
                    hold_count: None,
                    copy_count: None,
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
impl CatalogAdapter for HmacRestAdapter {
    async fn execute_search(
        &self,
        isbn: &ParsedIsbn,
        _signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError> {
        let url = format!("{}/public/v1/bib/isbn/{}/holdings", self.base_url, isbn.isbn13);
        let response = self
            .signed_request(reqwest::Method::GET, &url)?
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth(format!("request rejected: {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(AdapterError::Connection(format!("endpoint returned {}", response.status())));
        }

        let payload: Value = response.json().await.map_err(AdapterError::from_reqwest)?;
        Ok(self.parse_holdings(&isbn.isbn13, &payload))
    }

    async fn execute_health_check(&self) -> Result<(), AdapterError> {
        let url = format!("{}/public/v1/status", self.base_url);
        let response = self
            .signed_request(reqwest::Method::GET, &url)?
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AdapterError::Connection(format!("health check returned {}", response.status())))
        }
    }

    fn protocol(&self) -> Protocol {
        Protocol::PolarisPapi
    }
}
