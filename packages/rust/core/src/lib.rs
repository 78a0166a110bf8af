//! Enrichment pipeline orchestration and scoring for LeadLens.
//!
//! This crate ties together domain discovery, validation, fallback
//! selection, scoring, and the remote enrichment collaborators into a single
//! per-lead workflow ([`Orchestrator::run`]).

pub mod collaborators;
pub mod events;
pub mod fallback;
pub mod geo;
pub mod pipeline;
pub mod relevance;
pub mod score;
pub mod store;

#[cfg(test)]
mod testing;

pub use collaborators::{
    Collaborators, CompanyEnricher, CompanyProfile, ContactFinder, ContactProfile, CrmSync,
    Diagnoser, Geocoder, LeadContext, NewsItem, NewsLookup, NotificationSink, RelevanceScorer,
    SocialSearcher, SocialValidator, SoftError, bounded,
};
pub use events::{EventSink, PipelineEvent, PipelineOutcome, Stage};
pub use fallback::{FallbackOutcome, FallbackSelector, fallback_candidates, validate_within};
pub use pipeline::{Orchestrator, PipelineReport, PipelineSettings, SoftFailure};
pub use score::{ScoreInputs, calculate_match_score, distance_score, score_for_lead};
pub use store::{LeadStore, MemoryStore};
