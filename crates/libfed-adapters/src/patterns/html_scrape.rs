//! Pattern (e): static HTML scrape (spec §4.7e). Covers `web_scrape`,
//! `atriuum_scrape`, and `spydus_scrape` — vendor differences are entirely
//! expressed in the CSS-selector configuration, not in code.

use std::time::Duration;

use async_trait::async_trait;
use libfed_domain::{BookHolding, BranchId, MaterialType, ParsedIsbn, Protocol, Status, SystemId};
use reqwest::Client;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

use crate::base::{fingerprint, CatalogAdapter};
use crate::error::AdapterError;
use crate::normalize::{normalize_material, normalize_status};

/// Selector/template configuration pulled from `AdapterConfig.extra`
/// (spec §4.7e). Missing `search_url_template` is a construction-time
/// `ParseError`, per spec.
#[derive(Debug, Clone)]
pub struct HtmlScrapeConfig {
    pub search_url_template: String,
    pub row_selector: String,
    pub title_selector: Option<String>,
    pub branch_selector: Option<String>,
    pub status_selector: Option<String>,
    pub call_number_selector: Option<String>,
}

impl HtmlScrapeConfig {
    pub fn from_extra(extra: &std::collections::HashMap<String, serde_json::Value>) -> Result<Self, AdapterError> {
        let get_str = |key: &str| extra.get(key).and_then(serde_json::Value::as_str).map(str::to_string);

        let search_url_template = get_str("search_url_template")
            .ok_or_else(|| AdapterError::Parse("missing 'search_url_template' in adapter config 'extra'".to_string()))?;
        let row_selector = get_str("row_selector").unwrap_or_else(|| "tr.result-row".to_string());

        Ok(Self {
            search_url_template,
            row_selector,
            title_selector: get_str("title_selector"),
            branch_selector: get_str("branch_selector"),
            status_selector: get_str("status_selector"),
            call_number_selector: get_str("call_number_selector"),
        })
    }
}

pub struct HtmlScrapeAdapter {
    client: Client,
    config: HtmlScrapeConfig,
    timeout: Duration,
    system_id: SystemId,
    system_name: String,
    protocol: Protocol,
}

impl HtmlScrapeAdapter {
    pub fn new(
        client: Client,
        config: HtmlScrapeConfig,
        timeout: Duration,
        system_id: SystemId,
        system_name: String,
        protocol: Protocol,
    ) -> Self {
        Self {
            client,
            config,
            timeout,
            system_id,
            system_name,
            protocol,
        }
    }

    fn search_url(&self, isbn13: &str) -> String {
        self.config.search_url_template.replace("{isbn}", isbn13)
    }

    fn text_via(&self, row: &scraper::ElementRef, selector_str: &Option<String>) -> Option<String> {
        let selector_str = selector_str.as_ref()?;
        let selector = Selector::parse(selector_str).ok()?;
        row.select(&selector).next().map(|el| el.text().collect::<String>().trim().to_string())
    }

    fn parse_rows(&self, isbn13: &str, html: &str) -> Result<Vec<BookHolding>, AdapterError> {
        let document = Html::parse_document(html);
        let row_selector = Selector::parse(&self.config.row_selector)
            .map_err(|e| AdapterError::Parse(format!("invalid row selector: {e:?}")))?;

        Ok(document
            .select(&row_selector)
            .map(|row| {
                let branch_name = self.text_via(&row, &self.config.branch_selector).filter(|s| !s.is_empty()).unwrap_or_else(|| "Unknown".to_string());
                let call_number = self.text_via(&row, &self.config.call_number_selector).filter(|s| !s.is_empty());
                let raw_status = self.text_via(&row, &self.config.status_selector).unwrap_or_default();
                let material_text = self.text_via(&row, &self.config.title_selector).unwrap_or_default();

                let status = if raw_status.is_empty() { Status::Unknown } else { normalize_status(&raw_status) };
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
                    material_type: if material_text.is_empty() { MaterialType::Unknown } else { normalize_material(&material_text) },
                    status,
                    due_date: None,
                    hold_count: None,
                    copy_count: None,
                    raw_status,
                    catalog_url: self.search_url(isbn13),
                    fingerprint: fingerprint(self.system_id.as_ref(), isbn13, Some(&branch_name), call_number.as_deref(), None),
                    is_secondary_source: false,
                }
            })
            .collect())
    }
}

#[async_trait]
impl CatalogAdapter for HtmlScrapeAdapter {
    async fn execute_search(
        &self,
        isbn: &ParsedIsbn,
        _signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError> {
        let url = self.search_url(&isbn.isbn13);
        let response = self.client.get(&url).timeout(self.timeout).send().await.map_err(AdapterError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(AdapterError::Connection(format!("search page returned {}", response.status())));
        }

        let html = response.text().await.map_err(AdapterError::from_reqwest)?;
        self.parse_rows(&isbn.isbn13, &html)
    }

    async fn execute_health_check(&self) -> Result<(), AdapterError> {
        let url = self.search_url("0000000000000");
        let response = self.client.get(&url).timeout(self.timeout).send().await.map_err(AdapterError::from_reqwest)?;
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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> HtmlScrapeConfig {
        HtmlScrapeConfig {
            search_url_template: "SET_BELOW/search?q={isbn}".to_string(),
            row_selector: "tr.result".to_string(),
            title_selector: Some("td.title".to_string()),
            branch_selector: Some("td.branch".to_string()),
            status_selector: Some("td.status".to_string()),
            call_number_selector: Some("td.call".to_string()),
        }
    }

    #[test]
    fn missing_template_fails_construction() {
        let extra = std::collections::HashMap::new();
        let err = HtmlScrapeConfig::from_extra(&extra).unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }

    #[tokio::test]
    async fn parses_rows_with_all_fields() {
        let server = MockServer::start().await;
        let mut cfg = config();
        cfg.search_url_template = format!("{}/search?q={{isbn}}", server.uri());

        let html = r#"
<table>
  <tr class="result">
    <td class="title">Book Title</td>
    <td class="branch">Main Library</td>
    <td class="status">Available</td>
    <td class="call">FIC GAT</td>
  </tr>
</table>
"#;
        Mock::given(method("GET")).and(path("/search")).respond_with(ResponseTemplate::new(200).set_body_string(html)).mount(&server).await;

        let a = HtmlScrapeAdapter::new(build_client().unwrap(), cfg, Duration::from_secs(5), SystemId::from("sys-a"), "Sys A".to_string(), Protocol::WebScrape);
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let holdings = a.execute_search(&isbn, &signal).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].branch_name, "Main Library");
        assert_eq!(holdings[0].status, Status::Available);
        assert_eq!(holdings[0].call_number.as_deref(), Some("FIC GAT"));
    }

    #[tokio::test]
    async fn empty_row_yields_unknown_branch_and_status() {
        let server = MockServer::start().await;
        let mut cfg = config();
        cfg.search_url_template = format!("{}/search?q={{isbn}}", server.uri());

        let html = r#"<table><tr class="result"></tr></table>"#;
        Mock::given(method("GET")).and(path("/search")).respond_with(ResponseTemplate::new(200).set_body_string(html)).mount(&server).await;

        let a = HtmlScrapeAdapter::new(build_client().unwrap(), cfg, Duration::from_secs(5), SystemId::from("sys-a"), "Sys A".to_string(), Protocol::WebScrape);
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let holdings = a.execute_search(&isbn, &signal).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].branch_name, "Unknown");
        assert_eq!(holdings[0].status, Status::Unknown);
        assert!(holdings[0].call_number.is_none());
    }

    #[tokio::test]
    async fn no_rows_yields_empty_vec() {
        let server = MockServer::start().await;
        let mut cfg = config();
        cfg.search_url_template = format!("{}/search?q={{isbn}}", server.uri());

        Mock::given(method("GET")).and(path("/search")).respond_with(ResponseTemplate::new(200).set_body_string("<html></html>")).mount(&server).await;

        let a = HtmlScrapeAdapter::new(build_client().unwrap(), cfg, Duration::from_secs(5), SystemId::from("sys-a"), "Sys A".to_string(), Protocol::WebScrape);
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let holdings = a.execute_search(&isbn, &signal).await.unwrap();
        assert!(holdings.is_empty());
    }
}
