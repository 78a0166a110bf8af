//! A-record lookups over DNS-over-HTTPS (JSON wire format).
//!
//! Queries `<doh_url>?name=<host>&type=A` with `Accept: application/dns-json`,
//! the format served by Google (`dns.google/resolve`) and Cloudflare.

use leadlens_shared::{LeadLensError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// DNS RR type code for A records.
const RR_TYPE_A: u16 = 1;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

/// Resolves A records through a DoH JSON endpoint.
pub(crate) struct DohResolver {
    client: Client,
    url: String,
}

impl DohResolver {
    pub(crate) fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Return the A-record addresses for `host`.
    ///
    /// A non-zero resolver status (NXDOMAIN, SERVFAIL, ...) yields an empty
    /// list; only transport or payload problems are errors.
    pub(crate) async fn resolve_a(&self, host: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("name", host), ("type", "A")])
            .header("Accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| LeadLensError::Network(format!("DoH query for {host}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadLensError::Network(format!(
                "DoH query for {host}: HTTP {status}"
            )));
        }

        let body: DohResponse = response
            .json()
            .await
            .map_err(|e| LeadLensError::parse(format!("DoH response for {host}: {e}")))?;

        if body.status != 0 {
            debug!(host, status = body.status, "resolver returned non-zero status");
            return Ok(Vec::new());
        }

        let addrs: Vec<String> = body
            .answer
            .into_iter()
            .filter(|a| a.record_type == RR_TYPE_A)
            .map(|a| a.data)
            .collect();

        debug!(host, count = addrs.len(), "A records resolved");
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_a_records_and_skips_cnames() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve"))
            .and(query_param("name", "acme.com"))
            .and(query_param("type", "A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json_body(
                r#"{"Status":0,"Answer":[
                    {"name":"acme.com.","type":5,"TTL":300,"data":"edge.acme.net."},
                    {"name":"edge.acme.net.","type":1,"TTL":300,"data":"93.184.216.34"}
                ]}"#,
            )))
            .mount(&server)
            .await;

        let resolver = DohResolver::new(Client::new(), format!("{}/resolve", server.uri()));
        let addrs = resolver.resolve_a("acme.com").await.expect("resolve");
        assert_eq!(addrs, vec!["93.184.216.34"]);
    }

    #[tokio::test]
    async fn nxdomain_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json_body(r#"{"Status":3}"#)),
            )
            .mount(&server)
            .await;

        let resolver = DohResolver::new(Client::new(), format!("{}/resolve", server.uri()));
        let addrs = resolver.resolve_a("nope.invalid").await.expect("resolve");
        assert!(addrs.is_empty());
    }

    #[tokio::test]
    async fn resolver_http_error_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let resolver = DohResolver::new(Client::new(), format!("{}/resolve", server.uri()));
        assert!(resolver.resolve_a("acme.com").await.is_err());
    }

    fn serde_json_body(raw: &str) -> serde_json::Value {
        serde_json::from_str(raw).expect("valid test json")
    }
}
