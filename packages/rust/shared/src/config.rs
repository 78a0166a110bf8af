//! Application configuration for LeadLens.
//!
//! User config lives at `~/.leadlens/leadlens.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadLensError, Result};
use crate::types::Coordinates;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadlens.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadlens";

// ---------------------------------------------------------------------------
// Config structs (matching leadlens.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.leadlens/leadlens.db".into()
}

/// `[validator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// DNS-over-HTTPS JSON endpoint used for A-record lookups.
    #[serde(default = "default_doh_url")]
    pub doh_url: String,

    /// Per-request timeout for DNS and HTTP probes.
    #[serde(default = "default_validator_timeout")]
    pub timeout_secs: u64,

    /// Marketplace/parking hosts in addition to the built-in list.
    #[serde(default)]
    pub extra_marketplace_hosts: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            doh_url: default_doh_url(),
            timeout_secs: default_validator_timeout(),
            extra_marketplace_hosts: Vec::new(),
        }
    }
}

fn default_doh_url() -> String {
    "https://dns.google/resolve".into()
}
fn default_validator_timeout() -> u64 {
    10
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Base URL of the knowledge-graph entity search API.
    #[serde(default = "default_kg_url")]
    pub knowledge_graph_url: String,

    /// Name of the env var holding the knowledge-graph API key.
    #[serde(default = "default_kg_key_env")]
    pub knowledge_graph_key_env: String,

    /// HTML search results endpoint.
    #[serde(default = "default_search_url")]
    pub search_url: String,

    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            knowledge_graph_url: default_kg_url(),
            knowledge_graph_key_env: default_kg_key_env(),
            search_url: default_search_url(),
            timeout_secs: default_discovery_timeout(),
        }
    }
}

fn default_kg_url() -> String {
    "https://kgsearch.googleapis.com".into()
}
fn default_kg_key_env() -> String {
    "LEADLENS_KG_API_KEY".into()
}
fn default_search_url() -> String {
    "https://html.duckduckgo.com/html/".into()
}
fn default_discovery_timeout() -> u64 {
    15
}

/// `[services]` section: the enrichment backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_services_url")]
    pub base_url: String,

    /// Name of the env var holding the bearer key (never store the key itself).
    #[serde(default = "default_services_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_services_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            base_url: default_services_url(),
            api_key_env: default_services_key_env(),
            timeout_secs: default_services_timeout(),
        }
    }
}

fn default_services_url() -> String {
    "http://localhost:8787".into()
}
fn default_services_key_env() -> String {
    "LEADLENS_SERVICES_KEY".into()
}
fn default_services_timeout() -> u64 {
    30
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on any single collaborator call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Match scores strictly above this run deep enrichment.
    #[serde(default = "default_deep_threshold")]
    pub deep_enrichment_threshold: u8,

    /// Business location distances are measured from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_location: Option<Coordinates>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout(),
            deep_enrichment_threshold: default_deep_threshold(),
            business_location: None,
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

fn default_call_timeout() -> u64 {
    30
}
fn default_deep_threshold() -> u8 {
    50
}

/// `[notifications]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Webhook receiving pipeline summaries. Logged only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadlens/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadLensError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadlens/leadlens.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadLensError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadLensError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadLensError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadLensError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadLensError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| LeadLensError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read a secret from the env var named in config. Missing or empty is `None`.
pub fn resolve_secret(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("doh_url"));
        assert!(toml_str.contains("LEADLENS_SERVICES_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.deep_enrichment_threshold, 50);
        assert_eq!(parsed.validator.timeout_secs, 10);
        assert!(parsed.pipeline.business_location.is_none());
    }

    #[test]
    fn config_with_location_and_webhook() {
        let toml_str = r#"
[pipeline]
call_timeout_secs = 5
business_location = { lat = 44.97, lon = -93.26 }

[validator]
extra_marketplace_hosts = ["parked.example"]

[notifications]
webhook_url = "https://hooks.example.com/leadlens"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.call_timeout(), Duration::from_secs(5));
        let loc = config.pipeline.business_location.expect("location");
        assert!((loc.lat - 44.97).abs() < f64::EPSILON);
        assert_eq!(config.validator.extra_marketplace_hosts, vec!["parked.example"]);
        assert_eq!(config.pipeline.deep_enrichment_threshold, 50);
        assert!(config.notifications.webhook_url.is_some());
    }

    #[test]
    fn missing_secret_is_none() {
        // Use a unique env var name to avoid interfering with other tests
        assert!(resolve_secret("LEADLENS_TEST_NONEXISTENT_KEY_12345").is_none());
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        let p = expand_home("/tmp/leadlens.db").expect("expand");
        assert_eq!(p, PathBuf::from("/tmp/leadlens.db"));
    }
}
