//! Web-search domain lookup over an HTML results page.
//!
//! The default endpoint is DuckDuckGo's HTML interface, whose result links
//! are redirect URLs carrying the target in a `uddg` query parameter.

use std::sync::LazyLock;

use async_trait::async_trait;
use leadlens_shared::{DomainCandidate, company_tokens, normalize_domain, sources};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::{DiscoveryError, DiscoveryQuery, DomainDiscoverer};

/// Confidence when the result host contains a company-name token.
const NAME_MATCH_CONFIDENCE: u8 = 60;
/// Confidence for the first organic result otherwise.
const FIRST_RESULT_CONFIDENCE: u8 = 35;

/// Result links, most specific selector first.
static RESULT_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.result__a, h2 > a[href]").expect("static selector")
});

/// Directories, social networks, and aggregators that list companies but
/// are never the company's own site.
const NON_COMPANY_HOSTS: &[&str] = &[
    "duckduckgo.com",
    "google.com",
    "bing.com",
    "linkedin.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "youtube.com",
    "wikipedia.org",
    "yelp.com",
    "yellowpages.com",
    "bbb.org",
    "crunchbase.com",
    "zoominfo.com",
    "bloomberg.com",
    "dnb.com",
    "manta.com",
    "mapquest.com",
    "indeed.com",
    "glassdoor.com",
    "opencorporates.com",
    "amazon.com",
];

fn is_non_company_host(host: &str) -> bool {
    NON_COMPANY_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{h}")))
}

/// Web search for the company's own site.
pub struct WebSearch {
    client: Client,
    search_url: String,
}

impl WebSearch {
    pub fn new(client: Client, search_url: &str) -> Self {
        Self {
            client,
            search_url: search_url.to_string(),
        }
    }
}

/// Resolve a result link to the target URL, unwrapping search redirects.
fn result_target(href: &str, page_url: &Url) -> Option<Url> {
    let url = page_url.join(href).ok()?;
    let redirect = url
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned());
    match redirect {
        Some(target) => Url::parse(&target).ok(),
        None => Some(url),
    }
}

/// Pick the first organic company result from a results page.
pub(crate) fn pick_result(html: &str, page_url: &Url, company: &str) -> Option<DomainCandidate> {
    let doc = Html::parse_document(html);
    let tokens = company_tokens(company);

    for link in doc.select(&RESULT_LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(target) = result_target(href, page_url) else {
            continue;
        };
        let Some(domain) = target.host_str().and_then(normalize_domain) else {
            continue;
        };
        if is_non_company_host(&domain) {
            debug!(%domain, "skipping directory/aggregator result");
            continue;
        }

        let confidence = if tokens.iter().any(|t| domain.contains(t.as_str())) {
            NAME_MATCH_CONFIDENCE
        } else {
            FIRST_RESULT_CONFIDENCE
        };
        return Some(DomainCandidate {
            domain,
            confidence,
            source: sources::WEB_SEARCH.to_string(),
        });
    }
    None
}

#[async_trait]
impl DomainDiscoverer for WebSearch {
    fn name(&self) -> &'static str {
        sources::WEB_SEARCH
    }

    fn skip_reason(&self, query: &DiscoveryQuery) -> Option<String> {
        query
            .company
            .trim()
            .is_empty()
            .then(|| "empty company name".to_string())
    }

    async fn discover(
        &self,
        query: &DiscoveryQuery,
    ) -> Result<Option<DomainCandidate>, DiscoveryError> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", query.search_phrase())])
            .send()
            .await
            .map_err(|e| DiscoveryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
            });
        }

        let page_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| DiscoveryError::Http(format!("failed to read body: {e}")))?;

        Ok(pick_result(&body, &page_url, &query.company))
    }
}
