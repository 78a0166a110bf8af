//! Progress events streamed from a pipeline run.

use std::time::Duration;

use leadlens_shared::{LeadId, MatchScore};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Named pipeline stages; also written to `Lead::current_stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ContactTrack,
    Discovery,
    CompanyEnrichment,
    Validation,
    Fallback,
    Geocode,
    Relevance,
    Scoring,
    SocialSearch,
    SocialValidation,
    DeepEnrichment,
    ContactDiscovery,
    News,
    Diagnosis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactTrack => "contact_track",
            Self::Discovery => "discovery",
            Self::CompanyEnrichment => "company_enrichment",
            Self::Validation => "validation",
            Self::Fallback => "fallback",
            Self::Geocode => "geocode",
            Self::Relevance => "relevance",
            Self::Scoring => "scoring",
            Self::SocialSearch => "social_search",
            Self::SocialValidation => "social_validation",
            Self::DeepEnrichment => "deep_enrichment",
            Self::ContactDiscovery => "contact_discovery",
            Self::News => "news",
            Self::Diagnosis => "diagnosis",
        }
    }

    /// Human-readable label for progress displays.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ContactTrack => "Enriching contact",
            Self::Discovery => "Discovering domain",
            Self::CompanyEnrichment => "Enriching company",
            Self::Validation => "Validating domain",
            Self::Fallback => "Searching fallback domains",
            Self::Geocode => "Geocoding",
            Self::Relevance => "Scoring domain relevance",
            Self::Scoring => "Computing match score",
            Self::SocialSearch => "Searching social profiles",
            Self::SocialValidation => "Validating social profiles",
            Self::DeepEnrichment => "Deep company enrichment",
            Self::ContactDiscovery => "Discovering contacts",
            Self::News => "Looking up news",
            Self::Diagnosis => "Diagnosing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The score cleared the threshold and deep enrichment ran.
    FullComplete,
    /// No domain was discovered.
    NoDomain,
    /// A domain was handled but the score stayed at or below the threshold.
    Partial,
}

impl PipelineOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullComplete => "full_complete",
            Self::NoDomain => "no_domain",
            Self::Partial => "partial",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::FullComplete => "Full pipeline complete",
            Self::NoDomain => "No-domain pipeline complete",
            Self::Partial => "Partial pipeline complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        lead_id: LeadId,
        stage: Stage,
    },
    StageFailed {
        lead_id: LeadId,
        stage: Stage,
        error: String,
    },
    DomainSwapped {
        lead_id: LeadId,
        from: String,
        to: String,
    },
    ScoreComputed {
        lead_id: LeadId,
        score: MatchScore,
    },
    Finished {
        lead_id: LeadId,
        /// `None` when the run aborted.
        outcome: Option<PipelineOutcome>,
        elapsed_ms: u64,
    },
}

/// Cloneable handle for emitting events; a no-op without a subscriber.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: Option<UnboundedSender<PipelineEvent>>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    pub(crate) fn finished(
        &self,
        lead_id: &LeadId,
        outcome: Option<PipelineOutcome>,
        elapsed: Duration,
    ) {
        self.emit(PipelineEvent::Finished {
            lead_id: lead_id.clone(),
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }
}
