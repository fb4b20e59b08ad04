//! Aggregate-source adapter. Covers `oclc_worldcat` — a union catalog that
//! reports *which* systems hold a title without that system's real-time
//! per-copy status (spec §4.10, §9). Holdings from this adapter are always
//! marked `is_secondary_source: true` and carry
//! [`libfed_domain::AGGREGATE_SOURCE_SENTINEL`] as `raw_status`, so the
//! aggregator can prefer a direct-source holding for the same system over
//! this one when both are present in a result set.

use std::time::Duration;

use async_trait::async_trait;
use libfed_domain::{
    BookHolding, BranchId, MaterialType, ParsedIsbn, Protocol, Status, SystemId, AGGREGATE_SOURCE_SENTINEL,
};
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::base::{fingerprint, CatalogAdapter};
use crate::error::AdapterError;

pub struct OclcWorldcatAdapter {
    client: Client,
    base_url: String,
    wskey_env_var: String,
    timeout: Duration,
    system_id: SystemId,
    system_name: String,
}

impl OclcWorldcatAdapter {
    pub fn new(
        client: Client,
        base_url: String,
        wskey_env_var: String,
        timeout: Duration,
        system_id: SystemId,
        system_name: String,
    ) -> Result<Self, AdapterError> {
        libfed_config::resolve_credential(&wskey_env_var).map_err(|e| AdapterError::Auth(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            wskey_env_var,
            timeout,
            system_id,
            system_name,
        })
    }

    fn wskey(&self) -> Result<String, AdapterError> {
        libfed_config::resolve_credential(&self.wskey_env_var).map_err(|e| AdapterError::Auth(e.to_string()))
    }

    /// Holding libraries reported for this ISBN, each a distinct branch of
    /// the same union-catalog "system" (spec §4.10: aggregate holdings
    /// group under the library systems they name, not under WorldCat
    /// itself).
    fn parse_holdings(&self, isbn13: &str, payload: &Value) -> Vec<BookHolding> {
        let institutions = payload.get("briefRecords").and_then(Value::as_array).cloned().unwrap_or_default();

        institutions
            .iter()
            .flat_map(|record| {
                record
                    .get("institutionHolding")
                    .and_then(|h| h.get("institutionIdentifiers"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            })
            .map(|inst| {
                let branch_name = inst.get("name").and_then(Value::as_str).unwrap_or("Unknown institution").to_string();
                let branch_id = BranchId::new(&self.system_id, &branch_name);

                BookHolding {
                    isbn: isbn13.to_string(),
                    system_id: self.system_id.clone(),
                    branch_id,
                    system_name: self.system_name.clone(),
                    branch_name: branch_name.clone(),
                    call_number: None,
                    collection: String::new(),
                    volume: None,
                    material_type: MaterialType::Unknown,
                    status: Status::Unknown,
                    due_date: None,
                    hold_count: None,
                    copy_count: None,
                    raw_status: AGGREGATE_SOURCE_SENTINEL.to_string(),
                    catalog_url: self.base_url.clone(),
                    fingerprint: fingerprint(self.system_id.as_ref(), isbn13, Some(&branch_name), None, None),
                    is_secondary_source: true,
                }
            })
            .collect()
    }
}

#[async_trait]
impl CatalogAdapter for OclcWorldcatAdapter {
    async fn execute_search(
        &self,
        isbn: &ParsedIsbn,
        _signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError> {
        let wskey = self.wskey()?;
        let url = format!("{}/search/brief-bibs?q=bn:{}&wskey={}", self.base_url, isbn.isbn13, wskey);
        let response = self.client.get(&url).timeout(self.timeout).send().await.map_err(AdapterError::from_reqwest)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth(format!("WorldCat search rejected: {}", response.status())));
        }
        if !response.status().is_success() {
            return Err(AdapterError::Connection(format!("WorldCat search returned {}", response.status())));
        }

        let payload: Value = response.json().await.map_err(AdapterError::from_reqwest)?;
        Ok(self.parse_holdings(&isbn.isbn13, &payload))
    }

    async fn execute_health_check(&self) -> Result<(), AdapterError> {
        let wskey = self.wskey()?;
        let url = format!("{}/search/brief-bibs?q=bn:0000000000000&wskey={}", self.base_url, wskey);
        let response = self.client.get(&url).timeout(self.timeout).send().await.map_err(AdapterError::from_reqwest)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AdapterError::Connection(format!("health check returned {}", response.status())))
        }
    }

    fn protocol(&self) -> Protocol {
        Protocol::OclcWorldcat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn set_key() {
        std::env::set_var("LIBFED_TEST_OCLC_WSKEY", "key-abc");
    }

    #[test]
    fn construction_fails_when_wskey_unset() {
        let err = OclcWorldcatAdapter::new(
            build_client().unwrap(),
            "https://worldcat.example.org".to_string(),
            "LIBFED_TEST_OCLC_WSKEY_DEFINITELY_UNSET".to_string(),
            Duration::from_secs(5),
            SystemId::from("oclc"),
            "WorldCat".to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::Auth(_)));
    }

    #[tokio::test]
    async fn holdings_are_marked_secondary_with_sentinel_status() {
        set_key();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/brief-bibs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "briefRecords": [{
                    "institutionHolding": {
                        "institutionIdentifiers": [
                            {"name": "Springfield Public Library"},
                            {"name": "Shelbyville Public Library"}
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let a = OclcWorldcatAdapter::new(
            build_client().unwrap(),
            server.uri(),
            "LIBFED_TEST_OCLC_WSKEY".to_string(),
            Duration::from_secs(5),
            SystemId::from("oclc"),
            "WorldCat".to_string(),
        )
        .unwrap();

        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let holdings = a.execute_search(&isbn, &signal).await.unwrap();
        assert_eq!(holdings.len(), 2);
        assert!(holdings.iter().all(|h| h.is_secondary_source));
        assert!(holdings.iter().all(|h| h.raw_status == AGGREGATE_SOURCE_SENTINEL));
        assert!(holdings.iter().all(|h| h.is_aggregate_source()));
    }

    #[tokio::test]
    async fn auth_rejection_maps_to_auth_error() {
        set_key();
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/search/brief-bibs")).respond_with(ResponseTemplate::new(401)).mount(&server).await;

        let a = OclcWorldcatAdapter::new(
            build_client().unwrap(),
            server.uri(),
            "LIBFED_TEST_OCLC_WSKEY".to_string(),
            Duration::from_secs(5),
            SystemId::from("oclc"),
            "WorldCat".to_string(),
        )
        .unwrap();

        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let err = a.execute_search(&isbn, &signal).await.unwrap_err();
        assert!(matches!(err, AdapterError::Auth(_)));
    }
}
