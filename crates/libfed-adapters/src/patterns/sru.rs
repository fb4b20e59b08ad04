//! Pattern (a): SRU/MARC XML (spec §4.7a). Covers the `koha_sru` and
//! `sru` protocol tags.

use async_trait::async_trait;
use libfed_domain::{BookHolding, BranchId, MaterialType, ParsedIsbn, Protocol, Status, SystemId};
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::base::{fingerprint, CatalogAdapter};
use crate::error::AdapterError;
use crate::marc::{parse_records, MarcRecord};

pub struct SruAdapter {
    client: Client,
    base_url: String,
    timeout: Duration,
    system_id: SystemId,
    system_name: String,
    protocol: Protocol,
}

impl SruAdapter {
    pub fn new(
        client: Client,
        base_url: String,
        timeout: Duration,
        system_id: SystemId,
        system_name: String,
        protocol: Protocol,
    ) -> Self {
        Self {
            client,
            base_url,
            timeout,
            system_id,
            system_name,
            protocol,
        }
    }

    fn search_url(&self, isbn13: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{base}{sep}operation=searchRetrieve&version=1.1&recordSchema=marcxml&query=bath.isbn={isbn}",
            base = self.base_url,
            sep = separator,
            isbn = isbn13,
        )
    }

    fn holdings_from_record(&self, record: &MarcRecord, isbn13: &str) -> Vec<BookHolding> {
        let bib_call_number = record
            .first_field("090")
            .or_else(|| record.first_field("050"))
            .and_then(|f| f.subfield('a'))
            .map(str::to_string);

        let items: Vec<_> = record.fields_with_tag("952").collect();
        if items.is_empty() {
            let call_number = bib_call_number.clone();
            let branch_id = BranchId::new(&self.system_id, "unknown");
            return vec![BookHolding {
                isbn: isbn13.to_string(),
                system_id: self.system_id.clone(),
                branch_id,
                system_name: self.system_name.clone(),
                branch_name: "Unknown".to_string(),
                call_number: call_number.clone(),
                collection: String::new(),
                volume: None,
                material_type: MaterialType::Book,
                status: Status::Unknown,
                due_date: None,
                hold_count: None,
                copy_count: None,
                raw_status: String::new(),
                catalog_url: self.base_url.clone(),
                fingerprint: fingerprint(
                    self.system_id.as_ref(),
                    isbn13,
                    Some("unknown"),
                    call_number.as_deref(),
                    None,
                ),
                is_secondary_source: false,
            }];
        }

        items
            .iter()
            .map(|item| {
                let branch_code = item.subfield('a').unwrap_or("unknown");
                let collection = item.subfield('c').unwrap_or_default().to_string();
                let call_number = item.subfield('o').map(str::to_string).or_else(|| bib_call_number.clone());
                let not_for_loan = item.subfield('7').and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);
                let due_date_raw = item.subfield('q');
                let due_date = due_date_raw.and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

                let (status, raw_status) = if let Some(due) = due_date_raw {
                    (Status::CheckedOut, format!("Due {due}"))
                } else if not_for_loan != 0 {
                    (Status::Missing, "Not for loan".to_string())
                } else {
                    (Status::Available, "Available".to_string())
                };

                let branch_id = BranchId::new(&self.system_id, branch_code);
                BookHolding {
                    isbn: isbn13.to_string(),
                    system_id: self.system_id.clone(),
                    branch_id,
                    system_name: self.system_name.clone(),
                    branch_name: branch_code.to_string(),
                    call_number: call_number.clone(),
                    collection,
                    volume: None,
                    material_type: MaterialType::Book,
                    status,
                    due_date,
                    hold_count: None,
                    copy_count: None,
                    raw_status,
                    catalog_url: self.base_url.clone(),
                    fingerprint: fingerprint(
                        self.system_id.as_ref(),
                        isbn13,
                        Some(branch_code),
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
impl CatalogAdapter for SruAdapter {
    async fn execute_search(
        &self,
        isbn: &ParsedIsbn,
        _signal: &CancellationToken,
    ) -> Result<Vec<BookHolding>, AdapterError> {
        let url = self.search_url(&isbn.isbn13);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(AdapterError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(AdapterError::Parse(format!(
                "SRU endpoint returned {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(AdapterError::from_reqwest)?;
        let records = parse_records(&body)?;

        Ok(records
            .iter()
            .flat_map(|record| self.holdings_from_record(record, &isbn.isbn13))
            .collect())
    }

    async fn execute_health_check(&self) -> Result<(), AdapterError> {
        let response = self
            .client
            .get(&self.base_url)
            .timeout(self.timeout)
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
        self.protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base_url: String) -> SruAdapter {
        SruAdapter::new(
            build_client().unwrap(),
            base_url,
            Duration::from_secs(5),
            SystemId::from("sys-a"),
            "Sys A".to_string(),
            Protocol::Sru,
        )
    }

    #[tokio::test]
    async fn parses_holdings_from_items() {
        let server = MockServer::start().await;
        let body = r#"
<searchRetrieveResponse>
  <records>
    <record>
      <datafield tag="952">
        <subfield code="a">main</subfield>
        <subfield code="c">fiction</subfield>
        <subfield code="o">F GAT</subfield>
        <subfield code="7">0</subfield>
      </datafield>
    </record>
  </records>
</searchRetrieveResponse>
"#;
        Mock::given(method("GET"))
            .and(path("/sru"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let a = adapter(format!("{}/sru", server.uri()));
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let holdings = a.execute_search(&isbn, &signal).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].status, Status::Available);
        assert_eq!(holdings[0].branch_name, "main");
    }

    #[tokio::test]
    async fn empty_item_list_yields_single_bib_holding() {
        let server = MockServer::start().await;
        let body = r#"<records><record><datafield tag="090"><subfield code="a">F GAT</subfield></datafield></record></records>"#;
        Mock::given(method("GET"))
            .and(path("/sru"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let a = adapter(format!("{}/sru", server.uri()));
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let holdings = a.execute_search(&isbn, &signal).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].status, Status::Unknown);
        assert_eq!(holdings[0].call_number.as_deref(), Some("F GAT"));
    }

    #[tokio::test]
    async fn non_200_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sru"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let a = adapter(format!("{}/sru", server.uri()));
        let isbn = libfed_domain::parse_isbn("9780306406157").unwrap();
        let signal = CancellationToken::new();
        let err = a.execute_search(&isbn, &signal).await.unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }
}
