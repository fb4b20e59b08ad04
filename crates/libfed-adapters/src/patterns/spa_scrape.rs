//! Pattern (f): multi-step authenticated scrape (spec §4.7f). Covers
//! `sirsi_enterprise_scrape` and `bibliocommons_scrape` — vendor SPA
//! catalogs gated by a CSRF token embedded in an inline script and a
//! detail-panel XHR the adapter cross-references against the search HTML.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use libfed_domain::{BookHolding, BranchId, ParsedIsbn, Protocol, SystemId};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::base::{fingerprint, CatalogAdapter};
use crate::error::AdapterError;
use crate::normalize::normalize_status;

static CSRF_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:csrfToken|csrf_token)\s*[:=]\s*['"]([^'"]+)['"]"#).unwrap());

/// A simple name->value cookie jar, reconstructed from `Set-Cookie`
/// response headers and reserialized as one `Cookie` request header, since
/// this adapter drives its own multi-request flow rather than letting
/// `reqwest`'s cookie store (shared process-wide) own it.
#[derive(Default)]
struct CookieJar(Mutex<HashMap<String, String>>);

impl CookieJar {
    fn absorb(&self, response: &reqwest::Response) {
        let mut jar = self.0.lock().unwrap();
        for header in response.headers().get_all(reqwest::header::SET_COOKIE) {
            if let Ok(raw) = header.to_str() {
                let pair = raw.split(';').next().unwrap_or(raw);
                if let Some((name, value)) = pair.split_once('=') {
                    jar.insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }
    }

    fn header_value(&self) -> String {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct SpaScrapeAdapter {
    client: Client,
    base_url: String,
    search_path_template: String,
    lookup_path: String,
    timeout: Duration,
    system_id: SystemId,
    system_name: String,
    protocol: Protocol,
}

impl SpaScrapeAdapter {
    pub fn new(
        client: Client,
        base_url: String,
        search_path_template: String,
        lookup_path: String,
        timeout: Duration,
        system_id: SystemId,
        system_name: String,
        protocol: Protocol,
    ) -> Self {
        Self {
            client,
            base_url,
            search_path_template,
            lookup_path,
            timeout,
            system_id,
            system_name,
            protocol,
        }
    }

    fn extract_csrf_token(html: &str) -> Option<String> {
        CSRF_TOKEN_RE.captures(html).map(|c| c[1].to_string())
    }

    /// Per-barcode branch name embedded in the HTML detail panel, used as
    /// a fallback when the XHR JSON omits `branchName` for that barcode
    /// (spec §4.7f "cross-reference the XHR JSON against the HTML").
    fn extract_barcode_to_branch(html: &str) -> HashMap<String, String> {
        let document = Html::parse_document(html);
        let row_selector = Selector::parse("[data-barcode]").unwrap();
        document
            .select(&row_selector)
            .filter_map(|el| {
                let barcode = el.value().attr("data-barcode")?.to_string();
                let branch = el.value().attr("data-branch").unwrap_or("").trim().to_string();
                if branch.is_empty() {
                    None
                } else {
                    Some((barcode, branch))
                }
            })
            .collect()
    }

    fn parse_lookup_json(&self, isbn13: &str, payload: &Value, barcode_branches: &HashMap<String, String>) -> Vec<BookHolding> {
        let items = payload.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
        items
            .iter()
            .map(|item| {
                let barcode = item.get("barcode").and_then(Value::as_str).unwrap_or("").to_string();
                let branch_name = item
                    .get("branchName")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| barcode_branches.get(&barcode).cloned())
                    .unwrap_or_else(|| "Unknown".to_string());
                let raw_status = item.get("status").and_then(Value::as_str).unwrap_or("").to_string();
                let call_number = item.get("callNumber").and_then(Value::as_str).map(str::to_string);
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
                    material_type: libfed_domain::MaterialType::Unknown,
                    status: normalize_status(&raw_status),
                    due_date: None,
                    hold_count: None,
                    copy_count: None,
                    raw_status,
                    catalog_url: self.base_url.clone(),
                    fingerprint: fingerprint(self.system_id.as_ref(), isbn13, Some(&branch_name), call_number.as_deref(), Some(&barcode)),
                    is_secondary_source: false,
                }
            })
            .collect()
    }
}

#[async_trait]
impl CatalogAdapter for SpaScrapeAdapter {
    async fn execute_search(
        &self,
        isbn: &ParsedIsbn,
        _signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError> {
        let jar = CookieJar::default();

        let search_url = format!("{}{}", self.base_url, self.search_path_template.replace("{isbn}", &isbn.isbn13));
        let search_response = self.client.get(&search_url).timeout(self.timeout).send().await.map_err(AdapterError::from_reqwest)?;
        if !search_response.status().is_success() {
            return Err(AdapterError::Connection(format!("search page returned {}", search_response.status())));
        }
        jar.absorb(&search_response);
        let html = search_response.text().await.map_err(AdapterError::from_reqwest)?;

        let csrf_token = Self::extract_csrf_token(&html)
            .ok_or_else(|| AdapterError::Parse("CSRF token not found in search page".to_string()))?;
        let barcode_branches = Self::extract_barcode_to_branch(&html);

        let lookup_url = format!("{}{}", self.base_url, self.lookup_path);
        let lookup_response = self
            .client
            .post(&lookup_url)
            .header("Cookie", jar.header_value())
            .header("X-CSRF-Token", csrf_token)
            .json(&serde_json::json!({ "isbn": isbn.isbn13 }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if lookup_response.status() == reqwest::StatusCode::UNAUTHORIZED || lookup_response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth(format!("lookup rejected: {}", lookup_response.status())));
        }
        if !lookup_response.status().is_success() {
            return Err(AdapterError::Connection(format!("lookup returned {}", lookup_response.status())));
        }

        let payload: Value = lookup_response.json().await.map_err(AdapterError::from_reqwest)?;
        Ok(self.parse_lookup_json(&isbn.isbn13, &payload, &barcode_branches))
    }

    async fn execute_health_check(&self) -> Result<(), AdapterError> {
        let response = self.client.get(&self.base_url).timeout(self.timeout).send().await.map_err(AdapterError::from_reqwest)?;
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

    #[test]
    fn extracts_csrf_token_from_inline_script() {
        let html = r#"<script>var config = { csrfToken: "abc-123-xyz" };</script>"#;
        assert_eq!(SpaScrapeAdapter::extract_csrf_token(html).as_deref(), Some("abc-123-xyz"));
    }

    #[test]
    fn missing_csrf_token_returns_none() {
        let html = r#"<html><body>no token here</body></html>"#;
        assert!(SpaScrapeAdapter::extract_csrf_token(html).is_none());
    }

    #[test]
    fn cookie_jar_reserializes_set_cookie_headers() {
        let jar = CookieJar::default();
        jar.0.lock().unwrap().insert("session".to_string(), "xyz".to_string());
        jar.0.lock().unwrap().insert("lang".to_string(), "en".to_string());
        let header = jar.header_value();
        assert!(header.contains("session=xyz"));
        assert!(header.contains("lang=en"));
    }

    #[test]
    fn extracts_barcode_to_branch_map_from_html() {
        let html = r#"<div data-barcode="B1" data-branch="Main">row</div><div data-barcode="B2" data-branch="Annex">row</div>"#;
        let map = SpaScrapeAdapter::extract_barcode_to_branch(html);
        assert_eq!(map.get("B1"), Some(&"Main".to_string()));
        assert_eq!(map.get("B2"), Some(&"Annex".to_string()));
    }
}
