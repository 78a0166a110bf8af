//! Core domain types for LeadLens lead enrichment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance tags written to `Lead::enrichment_source` and log entries.
pub mod sources {
    /// Domain taken from a business email whose domain matches the company.
    pub const EMAIL_DOMAIN_VERIFIED: &str = "email_domain_verified";
    /// Domain taken from a business email without a company-name match.
    pub const EMAIL_DOMAIN: &str = "email_domain";
    /// Organization-directory (knowledge graph) hit.
    pub const GOOGLE_KNOWLEDGE_GRAPH: &str = "google_knowledge_graph";
    /// Web-search result.
    pub const WEB_SEARCH: &str = "web_search";
    /// Prefix applied when a fallback candidate replaces the original domain.
    pub const FALLBACK_PREFIX: &str = "fallback:";
}

/// Provenance tags written to `Lead::match_score_source`.
pub mod score_sources {
    pub const EMAIL_DOMAIN: &str = "email_domain";
    pub const GOOGLE_KNOWLEDGE_GRAPH: &str = "google_knowledge_graph";
    pub const CALCULATED: &str = "calculated";
    pub const PARKED_DOMAIN: &str = "parked_domain";
    pub const INVALID_DOMAIN: &str = "invalid_domain";
}

// ---------------------------------------------------------------------------
// LeadId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lead identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub Uuid);

impl LeadId {
    /// Generate a new time-sortable lead identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LeadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Social profiles
// ---------------------------------------------------------------------------

/// Social networks searched by the social track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialNetwork {
    Linkedin,
    Facebook,
    Instagram,
}

impl SocialNetwork {
    /// All networks, in search order.
    pub const ALL: [SocialNetwork; 3] = [Self::Linkedin, Self::Facebook, Self::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
        }
    }
}

impl std::fmt::Display for SocialNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A profile URL plus its plausibility verdict (`None` until validated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialProfile {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<bool>,
}

impl SocialProfile {
    pub fn unvalidated(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            validated: None,
        }
    }
}

/// One optional profile slot per [`SocialNetwork`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialProfiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<SocialProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<SocialProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<SocialProfile>,
}

impl SocialProfiles {
    pub fn get(&self, network: SocialNetwork) -> Option<&SocialProfile> {
        match network {
            SocialNetwork::Linkedin => self.linkedin.as_ref(),
            SocialNetwork::Facebook => self.facebook.as_ref(),
            SocialNetwork::Instagram => self.instagram.as_ref(),
        }
    }

    pub fn set(&mut self, network: SocialNetwork, profile: Option<SocialProfile>) {
        match network {
            SocialNetwork::Linkedin => self.linkedin = profile,
            SocialNetwork::Facebook => self.facebook = profile,
            SocialNetwork::Instagram => self.instagram = profile,
        }
    }

    /// Number of networks with a profile URL.
    pub fn found_count(&self) -> usize {
        SocialNetwork::ALL
            .iter()
            .filter(|n| self.get(**n).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.found_count() == 0
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// Failure classification produced by the diagnosis collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub category: String,
    pub explanation: String,
    pub recommendation: String,
}

/// A business-contact record being enriched.
///
/// Mutated in place by every pipeline stage through [`Lead::apply`]; no stage
/// ever deletes a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Free-form location ("Minneapolis, MN").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Current best company domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Provenance of `domain`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_parked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_validation_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_relevance_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_relevance_score: Option<u8>,

    /// Company social profiles (social track).
    #[serde(default)]
    pub socials: SocialProfiles,
    /// Contact-person social profiles (contact track).
    #[serde(default)]
    pub contact_socials: SocialProfiles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,

    /// Stage currently running, if a pipeline is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    /// Wall-clock duration of the last pipeline run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pipeline_ms: Option<u64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a fresh lead with only the company name set.
    pub fn new(company_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: LeadId::new(),
            company_name: company_name.into(),
            contact_name: None,
            email: None,
            location: None,
            industry: None,
            domain: None,
            enrichment_source: None,
            enrichment_confidence: None,
            domain_valid: None,
            domain_parked: None,
            domain_validation_reason: None,
            match_score: None,
            match_score_source: None,
            distance_miles: None,
            domain_relevance_score: None,
            industry_relevance_score: None,
            socials: SocialProfiles::default(),
            contact_socials: SocialProfiles::default(),
            diagnosis: None,
            current_stage: None,
            last_pipeline_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Domain part of the lead's email, lowercased.
    pub fn email_domain(&self) -> Option<String> {
        let email = self.email.as_deref()?.trim();
        let (_, domain) = email.rsplit_once('@')?;
        let domain = domain.trim().to_lowercase();
        if domain.is_empty() || !domain.contains('.') {
            return None;
        }
        Some(domain)
    }

    /// Apply a partial update. Fields left `None` in the patch are untouched.
    pub fn apply(&mut self, patch: LeadPatch) {
        if let Some(v) = patch.industry {
            self.industry = v;
        }
        if let Some(v) = patch.domain {
            self.domain = v;
        }
        if let Some(v) = patch.enrichment_source {
            self.enrichment_source = v;
        }
        if let Some(v) = patch.enrichment_confidence {
            self.enrichment_confidence = v;
        }
        if let Some(v) = patch.domain_valid {
            self.domain_valid = v;
        }
        if let Some(v) = patch.domain_parked {
            self.domain_parked = v;
        }
        if let Some(v) = patch.domain_validation_reason {
            self.domain_validation_reason = v;
        }
        if let Some(v) = patch.match_score {
            self.match_score = v;
        }
        if let Some(v) = patch.match_score_source {
            self.match_score_source = v;
        }
        if let Some(v) = patch.distance_miles {
            self.distance_miles = v;
        }
        if let Some(v) = patch.domain_relevance_score {
            self.domain_relevance_score = v;
        }
        if let Some(v) = patch.industry_relevance_score {
            self.industry_relevance_score = v;
        }
        if let Some(v) = patch.socials {
            self.socials = v;
        }
        if let Some(v) = patch.contact_socials {
            self.contact_socials = v;
        }
        if let Some(v) = patch.diagnosis {
            self.diagnosis = v;
        }
        if let Some(v) = patch.current_stage {
            self.current_stage = v;
        }
        if let Some(v) = patch.last_pipeline_ms {
            self.last_pipeline_ms = v;
        }
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// LeadPatch
// ---------------------------------------------------------------------------

/// Partial update for a [`Lead`].
///
/// `None` leaves a field untouched; `Some(None)` resets a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadPatch {
    pub industry: Option<Option<String>>,
    pub domain: Option<Option<String>>,
    pub enrichment_source: Option<Option<String>>,
    pub enrichment_confidence: Option<Option<u8>>,
    pub domain_valid: Option<Option<bool>>,
    pub domain_parked: Option<Option<bool>>,
    pub domain_validation_reason: Option<Option<String>>,
    pub match_score: Option<Option<u8>>,
    pub match_score_source: Option<Option<String>>,
    pub distance_miles: Option<Option<f64>>,
    pub domain_relevance_score: Option<Option<u8>>,
    pub industry_relevance_score: Option<Option<u8>>,
    pub socials: Option<SocialProfiles>,
    pub contact_socials: Option<SocialProfiles>,
    pub diagnosis: Option<Option<Diagnosis>>,
    pub current_stage: Option<Option<String>>,
    pub last_pipeline_ms: Option<Option<u64>>,
}

impl LeadPatch {
    /// Patch that records a match score and its provenance.
    pub fn score(score: &MatchScore) -> Self {
        Self {
            match_score: Some(Some(score.score)),
            match_score_source: Some(Some(score.source.clone())),
            ..Self::default()
        }
    }

    /// Patch that sets (or clears) the current-stage indicator.
    pub fn stage(stage: Option<&str>) -> Self {
        Self {
            current_stage: Some(stage.map(String::from)),
            ..Self::default()
        }
    }

    /// Patch that folds a validation verdict into the lead.
    pub fn validation(result: &ValidationResult) -> Self {
        Self {
            domain_valid: Some(Some(result.is_valid_domain)),
            domain_parked: Some(Some(result.is_parked)),
            domain_validation_reason: Some(Some(result.reason.clone())),
            ..Self::default()
        }
    }

    /// Patch that forgets everything derived from a previously discovered
    /// domain.
    pub fn clear_domain() -> Self {
        Self {
            domain: Some(None),
            enrichment_source: Some(None),
            enrichment_confidence: Some(None),
            domain_valid: Some(None),
            domain_parked: Some(None),
            domain_validation_reason: Some(None),
            distance_miles: Some(None),
            domain_relevance_score: Some(None),
            ..Self::default()
        }
    }

    /// True when applying this patch would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Enrichment log
// ---------------------------------------------------------------------------

/// Stage that wrote an [`EnrichmentLogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStep {
    DiscoverDomain,
    ValidateDomain,
    DomainFallback,
    CompanyEnrichment,
    ContactEnrichment,
    CrmSync,
    Geocode,
    DomainRelevance,
    MatchScore,
    SocialSearch,
    SocialValidation,
    DeepEnrichment,
    ContactDiscovery,
    News,
    Diagnosis,
    Pipeline,
}

impl LogStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscoverDomain => "discover_domain",
            Self::ValidateDomain => "validate_domain",
            Self::DomainFallback => "domain_fallback",
            Self::CompanyEnrichment => "company_enrichment",
            Self::ContactEnrichment => "contact_enrichment",
            Self::CrmSync => "crm_sync",
            Self::Geocode => "geocode",
            Self::DomainRelevance => "domain_relevance",
            Self::MatchScore => "match_score",
            Self::SocialSearch => "social_search",
            Self::SocialValidation => "social_validation",
            Self::DeepEnrichment => "deep_enrichment",
            Self::ContactDiscovery => "contact_discovery",
            Self::News => "news",
            Self::Diagnosis => "diagnosis",
            Self::Pipeline => "pipeline",
        }
    }
}

impl std::fmt::Display for LogStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable audit-trail record appended by any stage.
///
/// Insertion order is meaningful: the fallback selector breaks confidence
/// ties by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentLogEntry {
    pub step: LogStep,
    pub action: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    pub timestamp: DateTime<Utc>,
    /// Freeform stage-specific fields.
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl EnrichmentLogEntry {
    pub fn new(step: LogStep, action: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            step,
            action: action.into(),
            source: source.into(),
            domain: None,
            confidence: None,
            timestamp: Utc::now(),
            details: serde_json::Map::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Discovery / validation / scoring values
// ---------------------------------------------------------------------------

/// A proposed company domain with its confidence (0–100) and provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCandidate {
    pub domain: String,
    pub confidence: u8,
    pub source: String,
}

/// Outcome of validating one domain. Produced fresh per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub domain: String,
    pub dns_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    pub is_valid_domain: bool,
    pub is_parked: bool,
    pub reason: String,
}

impl ValidationResult {
    /// A domain the pipeline may continue with.
    pub fn is_usable(&self) -> bool {
        self.is_valid_domain && !self.is_parked
    }
}

/// A 0–100 relevance score plus the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub score: u8,
    pub source: String,
}

impl MatchScore {
    pub fn new(score: u8, source: &str) -> Self {
        Self {
            score: score.min(100),
            source: source.to_string(),
        }
    }
}

/// Latitude/longitude in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// User-visible pipeline status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}
