//! Contracts for the external services the pipeline calls.
//!
//! Every method returns `Result<T, SoftError>`: a failure is logged, the
//! stage is marked failed, and the pipeline moves on. None of these errors
//! ever aborts a run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadlens_discovery::DiscoveryChain;
use leadlens_shared::{
    Coordinates, Diagnosis, EnrichmentLogEntry, Lead, LeadId, Notification, SocialNetwork,
    SocialProfiles,
};
use leadlens_validator::DomainValidation;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SoftError
// ---------------------------------------------------------------------------

/// A collaborator failure that degrades a stage but never the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SoftError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Run a collaborator call under `limit`; overrunning becomes [`SoftError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, SoftError>
where
    F: Future<Output = Result<T, SoftError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(SoftError::Timeout { after: limit }))
}

// ---------------------------------------------------------------------------
// Shared payloads
// ---------------------------------------------------------------------------

/// Lead identity and context fields handed to every collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadContext {
    pub lead_id: LeadId,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl LeadContext {
    pub fn with_domain(mut self, domain: Option<&str>) -> Self {
        self.domain = domain.map(String::from);
        self
    }
}

impl From<&Lead> for LeadContext {
    fn from(lead: &Lead) -> Self {
        Self {
            lead_id: lead.id.clone(),
            company: lead.company_name.clone(),
            contact_name: lead.contact_name.clone(),
            email: lead.email.clone(),
            location: lead.location.clone(),
            industry: lead.industry.clone(),
            domain: lead.domain.clone(),
        }
    }
}

/// Firmographic data returned by company enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    #[serde(default)]
    pub industry: Option<String>,
    /// 0–100 fit of the company's industry to ours.
    #[serde(default)]
    pub industry_relevance_score: Option<u8>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub employee_count: Option<u32>,
}

/// A person found by the contact services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub socials: SocialProfiles,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub published_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CompanyEnricher: Send + Sync {
    async fn enrich_company(&self, ctx: &LeadContext) -> Result<CompanyProfile, SoftError>;
    async fn deep_enrich(&self, ctx: &LeadContext) -> Result<CompanyProfile, SoftError>;
}

#[async_trait]
pub trait ContactFinder: Send + Sync {
    /// Look up the lead's own contact person (contact track).
    async fn find_contact(&self, ctx: &LeadContext) -> Result<ContactProfile, SoftError>;
    /// Find further decision makers at the company (deep branch).
    async fn discover_contacts(&self, ctx: &LeadContext)
    -> Result<Vec<ContactProfile>, SoftError>;
}

#[async_trait]
pub trait NewsLookup: Send + Sync {
    async fn news(&self, ctx: &LeadContext) -> Result<Vec<NewsItem>, SoftError>;
}

#[async_trait]
pub trait SocialSearcher: Send + Sync {
    /// Profile URL for the company on `network`, if one exists.
    async fn search(
        &self,
        network: SocialNetwork,
        ctx: &LeadContext,
    ) -> Result<Option<String>, SoftError>;
}

#[async_trait]
pub trait SocialValidator: Send + Sync {
    /// Return `profiles` with each `validated` flag set.
    async fn validate(
        &self,
        ctx: &LeadContext,
        profiles: &SocialProfiles,
    ) -> Result<SocialProfiles, SoftError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(
        &self,
        domain: &str,
        ctx: &LeadContext,
    ) -> Result<Option<Coordinates>, SoftError>;
}

#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// 0–100 textual relevance of `domain` to the company.
    async fn domain_relevance(&self, ctx: &LeadContext, domain: &str) -> Result<u8, SoftError>;
}

#[async_trait]
pub trait Diagnoser: Send + Sync {
    async fn diagnose(
        &self,
        ctx: &LeadContext,
        logs: &[EnrichmentLogEntry],
    ) -> Result<Diagnosis, SoftError>;
}

#[async_trait]
pub trait CrmSync: Send + Sync {
    async fn sync_contact(&self, ctx: &LeadContext, linkedin_url: &str) -> Result<(), SoftError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), SoftError>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Everything the orchestrator talks to besides the record store.
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<DiscoveryChain>,
    pub validator: Arc<dyn DomainValidation>,
    pub company: Arc<dyn CompanyEnricher>,
    pub contacts: Arc<dyn ContactFinder>,
    pub news: Arc<dyn NewsLookup>,
    pub social_search: Arc<dyn SocialSearcher>,
    pub social_validator: Arc<dyn SocialValidator>,
    pub geocoder: Arc<dyn Geocoder>,
    pub relevance: Arc<dyn RelevanceScorer>,
    pub diagnoser: Arc<dyn Diagnoser>,
    pub crm: Arc<dyn CrmSync>,
    pub notifier: Arc<dyn NotificationSink>,
}
