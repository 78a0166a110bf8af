//! Scripted collaborators shared by the crate's tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use leadlens_discovery::{DiscoveryChain, DiscoveryError, DiscoveryQuery, DomainDiscoverer};
use leadlens_shared::{
    Coordinates, Diagnosis, DomainCandidate, EnrichmentLogEntry, Notification, SocialNetwork,
    SocialProfile, SocialProfiles, ValidationResult,
};
use leadlens_validator::DomainValidation;

use crate::collaborators::{
    Collaborators, CompanyEnricher, CompanyProfile, ContactFinder, ContactProfile, CrmSync,
    Diagnoser, Geocoder, LeadContext, NewsItem, NewsLookup, NotificationSink, RelevanceScorer,
    SocialSearcher, SocialValidator, SoftError,
};

/// Validator answering from a fixed table; unknown domains are invalid.
#[derive(Default)]
pub(crate) struct ScriptedValidator {
    verdicts: HashMap<String, (bool, bool)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    pub(crate) fn with(mut self, domain: &str, valid: bool, parked: bool) -> Self {
        self.verdicts.insert(domain.to_string(), (valid, parked));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DomainValidation for ScriptedValidator {
    async fn validate(&self, domain: &str) -> ValidationResult {
        self.calls.lock().unwrap().push(domain.to_string());
        let (valid, parked) = self.verdicts.get(domain).copied().unwrap_or((false, false));
        let reason = match (valid, parked) {
            (_, true) => "parked (redirects to sedoparking.com)",
            (true, false) => "reachable",
            (false, false) => "not found (404)",
        };
        ValidationResult {
            domain: domain.to_string(),
            dns_valid: true,
            http_status: Some(if valid { 200 } else { 404 }),
            redirect_to: None,
            is_valid_domain: valid,
            is_parked: parked,
            reason: reason.into(),
        }
    }
}

/// Discovery adapter returning a fixed answer.
pub(crate) struct FixedDiscoverer(pub Option<DomainCandidate>);

#[async_trait]
impl DomainDiscoverer for FixedDiscoverer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn discover(
        &self,
        _query: &DiscoveryQuery,
    ) -> Result<Option<DomainCandidate>, DiscoveryError> {
        Ok(self.0.clone())
    }
}

pub(crate) fn candidate(domain: &str, confidence: u8, source: &str) -> DomainCandidate {
    DomainCandidate {
        domain: domain.into(),
        confidence,
        source: source.into(),
    }
}

/// One fake standing in for every remote collaborator.
///
/// Calls are recorded by name. Names in `failing` answer with an error and
/// names in `slow` sleep first.
#[derive(Default)]
pub(crate) struct Fakes {
    pub failing: HashSet<&'static str>,
    pub slow: HashMap<&'static str, Duration>,
    pub coordinates: Option<Coordinates>,
    pub relevance: u8,
    pub industry_relevance: Option<u8>,
    pub contact: ContactProfile,
    pub socials: HashMap<SocialNetwork, String>,
    pub(crate) calls: Mutex<Vec<&'static str>>,
    pub(crate) notifications: Mutex<Vec<Notification>>,
    pub(crate) geocodes_in_flight: AtomicUsize,
    pub(crate) max_geocodes_in_flight: AtomicUsize,
}

impl Fakes {
    async fn call(&self, name: &'static str) -> Result<(), SoftError> {
        self.calls.lock().unwrap().push(name);
        if let Some(delay) = self.slow.get(name) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(name) {
            return Err(SoftError::Unavailable(format!("{name} is down")));
        }
        Ok(())
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub(crate) fn max_concurrent_geocodes(&self) -> usize {
        self.max_geocodes_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompanyEnricher for Fakes {
    async fn enrich_company(&self, _ctx: &LeadContext) -> Result<CompanyProfile, SoftError> {
        self.call("enrich_company").await?;
        Ok(CompanyProfile {
            industry: Some("Manufacturing".into()),
            industry_relevance_score: self.industry_relevance,
            ..CompanyProfile::default()
        })
    }

    async fn deep_enrich(&self, _ctx: &LeadContext) -> Result<CompanyProfile, SoftError> {
        self.call("deep_enrich").await?;
        Ok(CompanyProfile {
            description: Some("Makes widgets".into()),
            employee_count: Some(120),
            ..CompanyProfile::default()
        })
    }
}

#[async_trait]
impl ContactFinder for Fakes {
    async fn find_contact(&self, _ctx: &LeadContext) -> Result<ContactProfile, SoftError> {
        self.call("find_contact").await?;
        Ok(self.contact.clone())
    }

    async fn discover_contacts(
        &self,
        _ctx: &LeadContext,
    ) -> Result<Vec<ContactProfile>, SoftError> {
        self.call("discover_contacts").await?;
        Ok(vec![ContactProfile {
            name: Some("Pat Lee".into()),
            title: Some("COO".into()),
            ..ContactProfile::default()
        }])
    }
}

#[async_trait]
impl NewsLookup for Fakes {
    async fn news(&self, _ctx: &LeadContext) -> Result<Vec<NewsItem>, SoftError> {
        self.call("news").await?;
        Ok(vec![NewsItem {
            title: "Acme opens new plant".into(),
            url: "https://news.example/acme".into(),
            published_at: None,
        }])
    }
}

#[async_trait]
impl SocialSearcher for Fakes {
    async fn search(
        &self,
        network: SocialNetwork,
        _ctx: &LeadContext,
    ) -> Result<Option<String>, SoftError> {
        self.call("social_search").await?;
        Ok(self.socials.get(&network).cloned())
    }
}

#[async_trait]
impl SocialValidator for Fakes {
    async fn validate(
        &self,
        _ctx: &LeadContext,
        profiles: &SocialProfiles,
    ) -> Result<SocialProfiles, SoftError> {
        self.call("social_validate").await?;
        let mut validated = SocialProfiles::default();
        for network in SocialNetwork::ALL {
            if let Some(profile) = profiles.get(network) {
                validated.set(
                    network,
                    Some(SocialProfile {
                        validated: Some(true),
                        ..profile.clone()
                    }),
                );
            }
        }
        Ok(validated)
    }
}

#[async_trait]
impl Geocoder for Fakes {
    async fn geocode(
        &self,
        _domain: &str,
        _ctx: &LeadContext,
    ) -> Result<Option<Coordinates>, SoftError> {
        let now = self.geocodes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_geocodes_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.call("geocode").await;
        self.geocodes_in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;
        Ok(self.coordinates)
    }
}

#[async_trait]
impl RelevanceScorer for Fakes {
    async fn domain_relevance(&self, _ctx: &LeadContext, _domain: &str) -> Result<u8, SoftError> {
        self.call("domain_relevance").await?;
        Ok(self.relevance)
    }
}

#[async_trait]
impl Diagnoser for Fakes {
    async fn diagnose(
        &self,
        _ctx: &LeadContext,
        _logs: &[EnrichmentLogEntry],
    ) -> Result<Diagnosis, SoftError> {
        self.call("diagnose").await?;
        Ok(Diagnosis {
            category: "no_web_presence".into(),
            explanation: "No source returned a domain.".into(),
            recommendation: "Ask the contact for a website.".into(),
        })
    }
}

#[async_trait]
impl CrmSync for Fakes {
    async fn sync_contact(&self, _ctx: &LeadContext, _linkedin_url: &str) -> Result<(), SoftError> {
        self.call("crm_sync").await
    }
}

#[async_trait]
impl NotificationSink for Fakes {
    async fn notify(&self, notification: &Notification) -> Result<(), SoftError> {
        self.call("notify").await?;
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Wire `fakes` into every collaborator slot.
pub(crate) fn collaborators(
    fakes: &Arc<Fakes>,
    validator: Arc<ScriptedValidator>,
    discovered: Option<DomainCandidate>,
) -> Collaborators {
    Collaborators {
        discovery: Arc::new(DiscoveryChain::new(vec![Box::new(FixedDiscoverer(discovered))])),
        validator,
        company: fakes.clone(),
        contacts: fakes.clone(),
        news: fakes.clone(),
        social_search: fakes.clone(),
        social_validator: fakes.clone(),
        geocoder: fakes.clone(),
        relevance: fakes.clone(),
        diagnoser: fakes.clone(),
        crm: fakes.clone(),
        notifier: fakes.clone(),
    }
}
