//! Company domain discovery.
//!
//! Three independent strategies each propose at most one [`DomainCandidate`]:
//! an organization-directory lookup ([`KnowledgeGraphDirectory`]), a web
//! search ([`WebSearch`]), and the lead's business email ([`EmailDomain`]).
//! [`DiscoveryChain`] runs them in that order, records every attempt, and
//! folds the candidates with [`reduce_candidates`] so later high-confidence
//! sources overwrite earlier low-confidence ones.

mod email;
mod knowledge_graph;
mod web_search;

use std::time::Duration;

use async_trait::async_trait;
use leadlens_shared::{
    DiscoveryConfig, DomainCandidate, EnrichmentLogEntry, Lead, LogStep, resolve_secret,
};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

pub use email::{EmailDomain, is_personal_provider};
pub use knowledge_graph::KnowledgeGraphDirectory;
pub use web_search::WebSearch;

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("LeadLens/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow for discovery APIs.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a single discovery adapter. Never aborts the chain.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("unreadable response: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

// ---------------------------------------------------------------------------
// Query and trait
// ---------------------------------------------------------------------------

/// What an adapter knows about the lead when searching for its domain.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryQuery {
    pub company: String,
    pub location: Option<String>,
    pub email: Option<String>,
}

impl DiscoveryQuery {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            company: lead.company_name.clone(),
            location: lead.location.clone(),
            email: lead.email.clone(),
        }
    }

    /// Company name plus location, as a free-text search phrase.
    pub fn search_phrase(&self) -> String {
        match self.location.as_deref().map(str::trim) {
            Some(loc) if !loc.is_empty() => format!("{} {loc}", self.company.trim()),
            _ => self.company.trim().to_string(),
        }
    }
}

/// A single domain-discovery strategy.
#[async_trait]
pub trait DomainDiscoverer: Send + Sync {
    /// Provenance tag used in log entries when nothing was found.
    fn name(&self) -> &'static str;

    /// Why this adapter does not apply to `query`, if it doesn't.
    fn skip_reason(&self, _query: &DiscoveryQuery) -> Option<String> {
        None
    }

    /// Propose a domain. `Ok(None)` means the lookup ran and found nothing.
    async fn discover(
        &self,
        query: &DiscoveryQuery,
    ) -> Result<Option<DomainCandidate>, DiscoveryError>;
}

// ---------------------------------------------------------------------------
// Attempts and reduction
// ---------------------------------------------------------------------------

/// What happened when one adapter ran.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Found(DomainCandidate),
    NotFound,
    Skipped(String),
    Failed(String),
}

/// One adapter's attempt, in chain order.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryAttempt {
    pub adapter: &'static str,
    pub outcome: AttemptOutcome,
}

impl DiscoveryAttempt {
    pub fn action(&self) -> &'static str {
        match self.outcome {
            AttemptOutcome::Found(_) => "found",
            AttemptOutcome::NotFound => "not_found",
            AttemptOutcome::Skipped(_) => "skipped",
            AttemptOutcome::Failed(_) => "failed",
        }
    }

    /// The `discover_domain` audit entry for this attempt.
    ///
    /// Found entries carry `domain` and `confidence`, which makes them
    /// fallback candidates later.
    pub fn to_log_entry(&self) -> EnrichmentLogEntry {
        match &self.outcome {
            AttemptOutcome::Found(c) => {
                EnrichmentLogEntry::new(LogStep::DiscoverDomain, self.action(), &c.source)
                    .with_domain(&c.domain)
                    .with_confidence(c.confidence)
            }
            AttemptOutcome::NotFound => {
                EnrichmentLogEntry::new(LogStep::DiscoverDomain, self.action(), self.adapter)
            }
            AttemptOutcome::Skipped(reason) => {
                EnrichmentLogEntry::new(LogStep::DiscoverDomain, self.action(), self.adapter)
                    .with_detail("reason", reason.as_str())
            }
            AttemptOutcome::Failed(error) => {
                EnrichmentLogEntry::new(LogStep::DiscoverDomain, self.action(), self.adapter)
                    .with_detail("error", error.as_str())
            }
        }
    }
}

/// Result of running the whole chain.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRun {
    pub attempts: Vec<DiscoveryAttempt>,
    pub best: Option<DomainCandidate>,
}

impl DiscoveryRun {
    pub fn candidates(&self) -> impl Iterator<Item = &DomainCandidate> {
        self.attempts.iter().filter_map(|a| match &a.outcome {
            AttemptOutcome::Found(c) => Some(c),
            _ => None,
        })
    }
}

/// Fold candidates in chain order: a later candidate replaces the current
/// one when its confidence is at least as high.
pub fn reduce_candidates<I>(candidates: I) -> Option<DomainCandidate>
where
    I: IntoIterator<Item = DomainCandidate>,
{
    candidates
        .into_iter()
        .fold(None, |best: Option<DomainCandidate>, next| match best {
            Some(current) if next.confidence < current.confidence => Some(current),
            _ => Some(next),
        })
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Ordered list of discovery strategies. Every strategy is attempted.
pub struct DiscoveryChain {
    adapters: Vec<Box<dyn DomainDiscoverer>>,
    call_timeout: Option<Duration>,
}

impl DiscoveryChain {
    pub fn new(adapters: Vec<Box<dyn DomainDiscoverer>>) -> Self {
        Self {
            adapters,
            call_timeout: None,
        }
    }

    /// Bound each adapter call; an adapter that overruns counts as failed.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Directory, then web search, then email domain.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let client = build_client(config.timeout_secs)?;
        let api_key = resolve_secret(&config.knowledge_graph_key_env);
        if api_key.is_none() {
            debug!(
                env = %config.knowledge_graph_key_env,
                "no knowledge-graph key; directory lookups will be skipped"
            );
        }

        Ok(Self::new(vec![
            Box::new(KnowledgeGraphDirectory::new(
                client.clone(),
                &config.knowledge_graph_url,
                api_key,
            )),
            Box::new(WebSearch::new(client, &config.search_url)),
            Box::new(EmailDomain),
        ]))
    }

    pub fn adapter_names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Run every adapter in order. Never fails.
    #[instrument(skip_all, fields(company = %query.company))]
    pub async fn run(&self, query: &DiscoveryQuery) -> DiscoveryRun {
        let mut attempts = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let outcome = if let Some(reason) = adapter.skip_reason(query) {
                debug!(adapter = adapter.name(), %reason, "adapter skipped");
                AttemptOutcome::Skipped(reason)
            } else {
                match self.call(adapter.as_ref(), query).await {
                    Ok(Some(candidate)) => {
                        info!(
                            adapter = adapter.name(),
                            domain = %candidate.domain,
                            confidence = candidate.confidence,
                            "domain candidate found"
                        );
                        AttemptOutcome::Found(candidate)
                    }
                    Ok(None) => AttemptOutcome::NotFound,
                    Err(e) => {
                        warn!(adapter = adapter.name(), error = %e, "discovery adapter failed");
                        AttemptOutcome::Failed(e.to_string())
                    }
                }
            };
            attempts.push(DiscoveryAttempt {
                adapter: adapter.name(),
                outcome,
            });
        }

        let mut run = DiscoveryRun {
            attempts,
            best: None,
        };
        run.best = reduce_candidates(run.candidates().cloned());
        run
    }

    async fn call(
        &self,
        adapter: &dyn DomainDiscoverer,
        query: &DiscoveryQuery,
    ) -> Result<Option<DomainCandidate>, DiscoveryError> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, adapter.discover(query))
                .await
                .unwrap_or_else(|_| Err(DiscoveryError::Timeout(limit))),
            None => adapter.discover(query).await,
        }
    }
}

/// Build the HTTP client shared by the network adapters.
pub fn build_client(timeout_secs: u64) -> Result<Client, DiscoveryError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DiscoveryError::Http(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(domain: &str, confidence: u8, source: &str) -> DomainCandidate {
        DomainCandidate {
            domain: domain.into(),
            confidence,
            source: source.into(),
        }
    }

    struct Fixed(&'static str, Result<Option<DomainCandidate>, u16>);

    #[async_trait]
    impl DomainDiscoverer for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn discover(
            &self,
            _query: &DiscoveryQuery,
        ) -> Result<Option<DomainCandidate>, DiscoveryError> {
            self.1
                .clone()
                .map_err(|status| DiscoveryError::Status { status })
        }
    }

    #[test]
    fn reducer_prefers_later_on_ties_and_higher_confidence() {
        let best = reduce_candidates(vec![
            cand("a.com", 60, "x"),
            cand("b.com", 60, "y"),
            cand("c.com", 40, "z"),
        ]);
        assert_eq!(best.unwrap().domain, "b.com");

        let best = reduce_candidates(vec![cand("a.com", 35, "x"), cand("b.com", 95, "y")]);
        assert_eq!(best.unwrap().domain, "b.com");

        assert!(reduce_candidates(Vec::new()).is_none());
    }

    #[test]
    fn search_phrase_includes_location() {
        let q = DiscoveryQuery {
            company: " Acme Widgets ".into(),
            location: Some("Duluth, MN".into()),
            email: None,
        };
        assert_eq!(q.search_phrase(), "Acme Widgets Duluth, MN");

        let q = DiscoveryQuery {
            company: "Acme".into(),
            location: Some("  ".into()),
            email: None,
        };
        assert_eq!(q.search_phrase(), "Acme");
    }

    #[tokio::test]
    async fn chain_attempts_every_adapter_and_records_failures() {
        let chain = DiscoveryChain::new(vec![
            Box::new(Fixed("directory", Ok(Some(cand("acme.com", 80, "directory"))))),
            Box::new(Fixed("search", Err(503))),
            Box::new(Fixed("email", Ok(Some(cand("acme-corp.com", 70, "email"))))),
        ]);
        let query = DiscoveryQuery {
            company: "Acme".into(),
            ..Default::default()
        };

        let run = chain.run(&query).await;

        assert_eq!(run.attempts.len(), 3);
        assert_eq!(run.attempts[1].action(), "failed");
        // 70 < 80, so the directory hit stays.
        assert_eq!(run.best.as_ref().unwrap().domain, "acme.com");

        let entries: Vec<_> = run.attempts.iter().map(|a| a.to_log_entry()).collect();
        assert!(entries.iter().all(|e| e.step == LogStep::DiscoverDomain));
        assert_eq!(entries[0].domain.as_deref(), Some("acme.com"));
        assert_eq!(entries[0].confidence, Some(80));
        assert_eq!(entries[1].domain, None);
        assert!(entries[1].details.contains_key("error"));
    }

    struct Stalled;

    #[async_trait]
    impl DomainDiscoverer for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn discover(
            &self,
            _query: &DiscoveryQuery,
        ) -> Result<Option<DomainCandidate>, DiscoveryError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn overrunning_adapter_counts_as_failed() {
        let chain = DiscoveryChain::new(vec![
            Box::new(Stalled),
            Box::new(Fixed("email", Ok(Some(cand("acme.com", 70, "email"))))),
        ])
        .with_call_timeout(Duration::from_millis(50));

        let run = chain
            .run(&DiscoveryQuery {
                company: "Acme".into(),
                ..Default::default()
            })
            .await;

        assert_eq!(run.attempts[0].action(), "failed");
        assert_eq!(run.best.unwrap().domain, "acme.com");
    }

    #[tokio::test]
    async fn chain_with_nothing_found_has_no_best() {
        let chain = DiscoveryChain::new(vec![
            Box::new(Fixed("directory", Ok(None))),
            Box::new(EmailDomain),
        ]);
        let query = DiscoveryQuery {
            company: "Acme".into(),
            location: None,
            email: Some("owner@gmail.com".into()),
        };

        let run = chain.run(&query).await;
        assert!(run.best.is_none());
        assert_eq!(run.attempts[0].action(), "not_found");
        assert_eq!(run.attempts[1].action(), "skipped");
    }
}
