//! Organization-directory lookup via the Knowledge Graph Search API.

use async_trait::async_trait;
use leadlens_shared::{DomainCandidate, normalize_domain, sources};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{DiscoveryError, DiscoveryQuery, DomainDiscoverer};

/// Entities requested per lookup.
const RESULT_LIMIT: &str = "5";

/// `resultScore` points per confidence point. Scores are unbounded, so the
/// mapped confidence is capped at 100.
const RESULT_SCORE_PER_POINT: f64 = 10.0;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "itemListElement", default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    result: EntityResult,
    #[serde(rename = "resultScore", default)]
    result_score: f64,
}

#[derive(Debug, Default, Deserialize)]
struct EntityResult {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Knowledge Graph `entities:search` restricted to organizations.
pub struct KnowledgeGraphDirectory {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl KnowledgeGraphDirectory {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

/// Map an unbounded `resultScore` onto 0–100.
pub(crate) fn score_to_confidence(result_score: f64) -> u8 {
    if !result_score.is_finite() || result_score <= 0.0 {
        return 0;
    }
    (result_score / RESULT_SCORE_PER_POINT).round().min(100.0) as u8
}

#[async_trait]
impl DomainDiscoverer for KnowledgeGraphDirectory {
    fn name(&self) -> &'static str {
        sources::GOOGLE_KNOWLEDGE_GRAPH
    }

    fn skip_reason(&self, query: &DiscoveryQuery) -> Option<String> {
        if self.api_key.is_none() {
            return Some("no knowledge-graph API key configured".into());
        }
        if query.company.trim().is_empty() {
            return Some("empty company name".into());
        }
        None
    }

    async fn discover(
        &self,
        query: &DiscoveryQuery,
    ) -> Result<Option<DomainCandidate>, DiscoveryError> {
        let Some(key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        let url = format!("{}/v1/entities:search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query.company.trim()),
                ("types", "Organization"),
                ("limit", RESULT_LIMIT),
                ("key", key),
            ])
            .send()
            .await
            .map_err(|e| DiscoveryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Parse(e.to_string()))?;

        let hit = body.items.iter().find_map(|item| {
            let domain = item.result.url.as_deref().and_then(normalize_domain)?;
            Some((domain, item))
        });

        let Some((domain, item)) = hit else {
            debug!(results = body.items.len(), "no directory entity with a website");
            return Ok(None);
        };

        debug!(
            entity = item.result.name.as_deref().unwrap_or_default(),
            score = item.result_score,
            %domain,
            "directory entity matched"
        );

        Ok(Some(DomainCandidate {
            domain,
            confidence: score_to_confidence(item.result_score),
            source: sources::GOOGLE_KNOWLEDGE_GRAPH.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query() -> DiscoveryQuery {
        DiscoveryQuery {
            company: "Acme Widgets".into(),
            location: None,
            email: None,
        }
    }

    #[test]
    fn confidence_mapping_is_capped() {
        assert_eq!(score_to_confidence(0.0), 0);
        assert_eq!(score_to_confidence(-4.0), 0);
        assert_eq!(score_to_confidence(254.0), 25);
        assert_eq!(score_to_confidence(12_000.0), 100);
    }

    #[tokio::test]
    async fn first_entity_with_url_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/entities:search"))
            .and(query_param("query", "Acme Widgets"))
            .and(query_param("types", "Organization"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "itemListElement": [
                    {"result": {"name": "Acme (band)"}, "resultScore": 900.0},
                    {"result": {"name": "Acme Widgets", "url": "https://www.acmewidgets.com/"}, "resultScore": 412.7}
                ]
            })))
            .mount(&server)
            .await;

        let kg =
            KnowledgeGraphDirectory::new(Client::new(), &server.uri(), Some("test-key".into()));
        let c = kg.discover(&query()).await.unwrap().unwrap();

        assert_eq!(c.domain, "acmewidgets.com");
        assert_eq!(c.confidence, 41);
        assert_eq!(c.source, sources::GOOGLE_KNOWLEDGE_GRAPH);
    }

    #[tokio::test]
    async fn empty_results_are_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let kg = KnowledgeGraphDirectory::new(Client::new(), &server.uri(), Some("k".into()));
        assert!(kg.discover(&query()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let kg = KnowledgeGraphDirectory::new(Client::new(), &server.uri(), Some("k".into()));
        let err = kg.discover(&query()).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Status { status: 403 }));
    }

    #[test]
    fn missing_key_skips() {
        let kg = KnowledgeGraphDirectory::new(Client::new(), "http://unused", None);
        assert!(kg.skip_reason(&query()).is_some());
    }
}
