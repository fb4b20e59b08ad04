//! Pattern (d): two-phase search (spec §4.7d). Covers `sierra_rest` and
//! `tlc_api` — first phase resolves bibliographic record identifiers by
//! ISBN, second phase fetches items/holdings per identifier. A non-200 on
//! the second phase degrades that one bib to an `unknown` holding rather
//! than failing the whole search.

use std::time::Duration;

use async_trait::async_trait;
use libfed_domain::{BookHolding, BranchId, MaterialType, ParsedIsbn, Protocol, Status, SystemId};
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::base::{fingerprint, CatalogAdapter};
use crate::error::AdapterError;
use crate::normalize::{normalize_material, normalize_status};

pub struct TwoPhaseRestAdapter {
    client: Client,
    base_url: String,
    auth_token_env: Option<String>,
    timeout: Duration,
    system_id: SystemId,
    system_name: String,
    protocol: Protocol,
}

impl TwoPhaseRestAdapter {
    pub fn new(
        client: Client,
        base_url: String,
        auth_token_env: Option<String>,
        timeout: Duration,
        system_id: SystemId,
        system_name: String,
        protocol: Protocol,
    ) -> Self {
        Self {
            client,
            base_url,
            auth_token_env,
            timeout,
            system_id,
            system_name,
            protocol,
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url).timeout(self.timeout);
        if let Some(env_var) = &self.auth_token_env {
            if let Ok(token) = std::env::var(env_var) {
                builder = builder.bearer_auth(token);
            }
        }
        builder
    }

    async fn search_bibs(&self, isbn13: &str) -> Result<Vec<String>, AdapterError> {
        let url = format!("{}/bibs?isbn={}", self.base_url, isbn13);
        let response = self.request(reqwest::Method::GET, &url).send().await.map_err(AdapterError::from_reqwest)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth(format!("bib search rejected: {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(AdapterError::Connection(format!("bib search returned {}", response.status())));
        }

        let payload: Value = response.json().await.map_err(AdapterError::from_reqwest)?;
        let ids = payload
            .get("entries")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("id").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    /// Fetch items for one bib id. Degrades to a single `unknown` holding
    /// on a non-200 response rather than propagating an error — the whole
    /// search only fails if the *first* phase fails.
    async fn fetch_items(&self, bib_id: &str, isbn13: &str) -> Vec<BookHolding> {
        let url = format!("{}/bibs/{}/items", self.base_url, bib_id);
        let response = match self.request(reqwest::Method::GET, &url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(bib_id, error = %libfed_redaction::redact_user_string(&e.to_string()), "item fetch failed, degrading to bib-level holding");
                return vec![self.unknown_bib_holding(bib_id, isbn13)];
            }
        };

        if !response.status().is_success() {
            warn!(bib_id, status = %response.status(), "item fetch returned non-200, degrading to bib-level holding");
            return vec![self.unknown_bib_holding(bib_id, isbn13)];
        }

        let payload: Value = match response.json().await {
            Ok(v) => v,
            Err(_) => return vec![self.unknown_bib_holding(bib_id, isbn13)],
        };

        let entries = payload.get("entries").and_then(Value::as_array).cloned().unwrap_or_default();
        if entries.is_empty() {
            return vec![self.unknown_bib_holding(bib_id, isbn13)];
        }

        entries
            .iter()
            .map(|entry| {
                let branch_name = entry.get("location").and_then(|l| l.get("name")).and_then(Value::as_str).unwrap_or("Unknown").to_string();
                let call_number = entry.get("callNumber").and_then(Value::as_str).map(str::to_string);
                let raw_status = entry.get("status").and_then(|s| s.get("display")).and_then(Value::as_str).unwrap_or("").to_string();
                let material = entry.get("fixedFields").and_then(|f| f.get("format")).and_then(Value::as_str).unwrap_or("");
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
                    fingerprint: fingerprint(self.system_id.as_ref(), isbn13, Some(&branch_name), call_number.as_deref(), Some(bib_id)),
                    is_secondary_source: false,
                }
            })
            .collect()
    }

    fn unknown_bib_holding(&self, bib_id: &str, isbn13: &str) -> BookHolding {
        let branch_id = BranchId::new(&self.system_id, "unknown");
        BookHolding {
            isbn: isbn13.to_string(),
            system_id: self.system_id.clone(),
            branch_id,
            system_name: self.system_name.clone(),
            branch_name: "Unknown".to_string(),
            call_number: None,
            collection: String::new(),
            volume: None,
            material_type: MaterialType::Unknown,
            status: Status::Unknown,
            due_date: None,
            hold_count: None,
            copy_count: None,
            raw_status: String::new(),
            catalog_url: self.base_url.clone(),
            fingerprint: fingerprint(self.system_id.as_ref(), isbn13, Some("unknown"), None, Some(bib_id)),
            is_secondary_source: false,
        }
    }
}

#[async_trait]
impl CatalogAdapter for TwoPhaseRestAdapter {
    async fn execute_search(
        &self,
        isbn: &ParsedIsbn,
        _signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError> {
        let bib_ids = self.search_bibs(&isbn.isbn13).await?;
        let mut holdings = Vec::new();
        for bib_id in &bib_ids {
            holdings.extend(self.fetch_items(bib_id, &isbn.isbn13).await);
        }
        Ok(holdings)
    }

    async fn execute_health_check(&self) -> Result<(), AdapterError> {
        let url = format!("{}/info/token", self.base_url);
        let response = self.request(reqwest::Method::GET, &url).send().await.map_err(AdapterError::from_reqwest)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AdapterError::Connection(format!("health check returned {}", response.status())))
        }
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: String) -> TwoPhaseRestAdapter {
        TwoPhaseRestAdapter::new(
            build_client().unwrap(),
            base_url,
            None,
            Duration::from_secs(5),
            SystemId::from("sys-a"),
            "Sys A".to_string(),
            Protocol::SierraRest,
        )
    }

    #[tokio::test]
    async fn two_phase_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bibs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [{"id": "1000001"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bibs/1000001/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [{"location": {"name": "main"}, "status": {"display": "AVAILABLE"}}]
            })))
            .mount(&server)
            .await;

        let a = adapter(server.uri());
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let holdings = a.execute_search(&isbn, &signal).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].status, Status::Available);
    }

    #[tokio::test]
    async fn second_phase_non_200_degrades_not_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bibs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [{"id": "1000001"}, {"id": "1000002"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/bibs/.*/items$"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let a = adapter(server.uri());
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let holdings = a.execute_search(&isbn, &signal).await.unwrap();
        assert_eq!(holdings.len(), 2);
        assert!(holdings.iter().all(|h| h.status == Status::Unknown));
    }

    #[tokio::test]
    async fn first_phase_failure_fails_whole_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bibs"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let a = adapter(server.uri());
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let err = a.execute_search(&isbn, &signal).await.unwrap_err();
        assert!(matches!(err, AdapterError::Connection(_)));
    }
}
