//! Shared types, error model, and configuration for LeadLens.
//!
//! This crate is the foundation depended on by all other LeadLens crates.
//! It provides:
//! - [`LeadLensError`], the unified error type
//! - Domain types ([`Lead`], [`LeadPatch`], [`EnrichmentLogEntry`], [`ValidationResult`], ...)
//! - Configuration ([`AppConfig`], config loading)
//! - Domain-name helpers ([`normalize_domain`], [`company_tokens`])

pub mod config;
pub mod domain;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DiscoveryConfig, NotificationsConfig, PipelineConfig, ServicesConfig,
    StorageConfig, ValidatorConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, resolve_secret,
};
pub use domain::{company_tokens, normalize_domain, registrable_label, same_host, squashed_name};
pub use error::{LeadLensError, Result};
pub use types::{
    Coordinates, Diagnosis, DomainCandidate, EnrichmentLogEntry, Lead, LeadId, LeadPatch, LogStep,
    MatchScore, Notification, Severity, SocialNetwork, SocialProfile, SocialProfiles,
    ValidationResult, score_sources, sources,
};
