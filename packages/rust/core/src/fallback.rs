//! Domain fallback: when the working domain is invalid or parked, try the
//! other domains seen in the lead's log, best confidence first.

use std::collections::HashSet;
use std::time::Duration;

use leadlens_shared::{
    DomainCandidate, EnrichmentLogEntry, LeadId, LeadPatch, LogStep, Result, ValidationResult,
    normalize_domain, sources,
};
use leadlens_validator::DomainValidation;
use tracing::{debug, info, instrument};

use crate::store::LeadStore;

/// Source tag for entries written by the validator stage.
pub const VALIDATOR_SOURCE: &str = "domain_validator";
/// Source tag for entries written by the selector itself.
pub const SELECTOR_SOURCE: &str = "fallback_selector";

/// Result of one fallback search.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    pub success: bool,
    pub domain: Option<String>,
    pub source: Option<String>,
    pub confidence: Option<u8>,
    /// Every domain considered tried, the original included.
    pub tried_domains: Vec<String>,
}

fn domain_key(domain: &str) -> String {
    normalize_domain(domain).unwrap_or_else(|| domain.trim().to_lowercase())
}

/// Untried candidates from `log`, ranked for validation.
///
/// Keeps entries that carry a domain and are not `validate_domain` entries,
/// drops the current and already-tried domains, keeps the first occurrence
/// of each domain, then sorts by confidence descending. The sort is stable,
/// so equal confidences stay in log order.
pub fn fallback_candidates(
    current_domain: &str,
    log: &[EnrichmentLogEntry],
    already_tried: &[String],
) -> Vec<DomainCandidate> {
    let mut seen: HashSet<String> = already_tried.iter().map(|d| domain_key(d)).collect();
    seen.insert(domain_key(current_domain));

    let mut candidates: Vec<DomainCandidate> = log
        .iter()
        .filter(|e| e.step != LogStep::ValidateDomain)
        .filter_map(|e| {
            let domain = domain_key(e.domain.as_deref()?);
            seen.insert(domain.clone()).then(|| DomainCandidate {
                domain,
                confidence: e.confidence.unwrap_or(0),
                source: e.source.clone(),
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    candidates
}

/// The `validate_domain` audit entry for a verdict.
pub fn validation_entry(result: &ValidationResult) -> EnrichmentLogEntry {
    let action = if result.is_parked {
        "parked"
    } else if result.is_valid_domain {
        "valid"
    } else {
        "invalid"
    };
    let mut entry = EnrichmentLogEntry::new(LogStep::ValidateDomain, action, VALIDATOR_SOURCE)
        .with_domain(&result.domain)
        .with_detail("reason", result.reason.as_str())
        .with_detail("dns_valid", result.dns_valid);
    if let Some(status) = result.http_status {
        entry = entry.with_detail("http_status", status);
    }
    if let Some(target) = &result.redirect_to {
        entry = entry.with_detail("redirect_to", target.as_str());
    }
    entry
}

/// Validate with an upper bound; overrunning is an invalid verdict.
pub async fn validate_within(
    validator: &dyn DomainValidation,
    domain: &str,
    limit: Duration,
) -> ValidationResult {
    match tokio::time::timeout(limit, validator.validate(domain)).await {
        Ok(result) => result,
        Err(_) => ValidationResult {
            domain: domain.to_string(),
            dns_valid: false,
            http_status: None,
            redirect_to: None,
            is_valid_domain: false,
            is_parked: false,
            reason: format!("validation timed out after {}s", limit.as_secs()),
        },
    }
}

/// Drives the validator over ranked fallback candidates.
pub struct FallbackSelector<'a> {
    store: &'a dyn LeadStore,
    validator: &'a dyn DomainValidation,
    call_timeout: Duration,
}

impl<'a> FallbackSelector<'a> {
    pub fn new(
        store: &'a dyn LeadStore,
        validator: &'a dyn DomainValidation,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            validator,
            call_timeout,
        }
    }

    /// Try candidates until one validates or the list is exhausted.
    ///
    /// A winner is persisted on the lead (domain swapped, match score reset)
    /// and logged. Only store errors are returned as `Err`.
    #[instrument(skip_all, fields(lead_id = %lead_id, current = %current_domain))]
    pub async fn find_fallback(
        &self,
        lead_id: &LeadId,
        current_domain: &str,
        log: &[EnrichmentLogEntry],
        already_tried: &[String],
    ) -> Result<FallbackOutcome> {
        let candidates = fallback_candidates(current_domain, log, already_tried);
        let mut seen = HashSet::new();
        let mut tried: Vec<String> = std::iter::once(domain_key(current_domain))
            .chain(already_tried.iter().map(|d| domain_key(d)))
            .filter(|d| seen.insert(d.clone()))
            .collect();

        info!(candidates = candidates.len(), "starting fallback search");

        for candidate in candidates {
            let result =
                validate_within(self.validator, &candidate.domain, self.call_timeout).await;
            tried.push(candidate.domain.clone());

            if result.is_usable() {
                self.apply(lead_id, current_domain, &candidate, &result).await?;
                info!(domain = %candidate.domain, source = %candidate.source, "fallback applied");
                return Ok(FallbackOutcome {
                    success: true,
                    domain: Some(candidate.domain),
                    source: Some(candidate.source),
                    confidence: Some(candidate.confidence),
                    tried_domains: tried,
                });
            }

            debug!(
                domain = %candidate.domain,
                reason = %result.reason,
                "fallback candidate rejected"
            );
            let attempt =
                EnrichmentLogEntry::new(LogStep::DomainFallback, "attempt", &candidate.source)
                    .with_domain(&candidate.domain)
                    .with_confidence(candidate.confidence)
                    .with_detail("reason", result.reason.as_str())
                    .with_detail("parked", result.is_parked);
            self.store.append_log(lead_id, &attempt).await?;
        }

        info!(tried = tried.len(), "fallback candidates exhausted");
        let exhausted =
            EnrichmentLogEntry::new(LogStep::DomainFallback, "exhausted", SELECTOR_SOURCE)
                .with_detail("tried_domains", tried.clone());
        self.store.append_log(lead_id, &exhausted).await?;

        Ok(FallbackOutcome {
            success: false,
            domain: None,
            source: None,
            confidence: None,
            tried_domains: tried,
        })
    }

    async fn apply(
        &self,
        lead_id: &LeadId,
        previous: &str,
        winner: &DomainCandidate,
        result: &ValidationResult,
    ) -> Result<()> {
        let patch = LeadPatch {
            domain: Some(Some(winner.domain.clone())),
            enrichment_source: Some(Some(format!("{}{}", sources::FALLBACK_PREFIX, winner.source))),
            enrichment_confidence: Some(Some(winner.confidence)),
            match_score: Some(None),
            match_score_source: Some(None),
            ..LeadPatch::validation(result)
        };
        self.store.update(lead_id, patch).await?;

        let applied = EnrichmentLogEntry::new(LogStep::DomainFallback, "applied", &winner.source)
            .with_domain(&winner.domain)
            .with_confidence(winner.confidence)
            .with_detail("previous_domain", previous);
        self.store.append_log(lead_id, &applied).await?;
        self.store.append_log(lead_id, &validation_entry(result)).await
    }
}
