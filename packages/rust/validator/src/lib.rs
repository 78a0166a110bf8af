//! Domain validation: DNS resolvability, HTTP reachability, and parking detection.
//!
//! A candidate domain is checked in two steps. First its A records are
//! resolved over DNS-over-HTTPS; a domain that does not resolve stops there.
//! Then `https://{domain}/` is fetched once without following redirects
//! (falling back to `http://` on a transport failure) and the response is
//! classified by [`classify_response`].
//!
//! Validation never fails: every unreachable or ambiguous state becomes an
//! invalid [`ValidationResult`] with an explanatory reason.

mod dns;
mod marketplace;

use std::time::Duration;

use async_trait::async_trait;
use leadlens_shared::{
    LeadLensError, Result, ValidationResult, ValidatorConfig, normalize_domain, same_host,
};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument};
use url::Url;

pub use marketplace::MarketplaceHosts;

use dns::DohResolver;

/// User-Agent string for validation requests.
const USER_AGENT: &str = concat!("LeadLens/", env!("CARGO_PKG_VERSION"));

pub const REASON_NOT_RESOLVING: &str = "does not resolve";
pub const REASON_PARKED: &str = "parked/for sale";
pub const REASON_EXTERNAL_REDIRECT: &str = "redirects to external site";
pub const REASON_UNREACHABLE: &str = "DNS valid but unreachable";

// ---------------------------------------------------------------------------
// Seam used by the pipeline
// ---------------------------------------------------------------------------

/// Anything that can produce a [`ValidationResult`] for a domain.
#[async_trait]
pub trait DomainValidation: Send + Sync {
    async fn validate(&self, domain: &str) -> ValidationResult;
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the validator.
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// DoH JSON endpoint.
    pub doh_url: String,
    /// Timeout for each DNS or HTTP request.
    pub timeout_secs: u64,
    /// Marketplace hosts beyond the built-in list.
    pub extra_marketplace_hosts: Vec<String>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self::from(&ValidatorConfig::default())
    }
}

impl From<&ValidatorConfig> for ValidatorOptions {
    fn from(config: &ValidatorConfig) -> Self {
        Self {
            doh_url: config.doh_url.clone(),
            timeout_secs: config.timeout_secs,
            extra_marketplace_hosts: config.extra_marketplace_hosts.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// DomainValidator
// ---------------------------------------------------------------------------

/// The single response observed by the HTTP probe.
#[derive(Debug, Clone)]
struct ProbeResponse {
    url: Url,
    status: StatusCode,
    location: Option<String>,
}

/// DNS + HTTP domain validator.
pub struct DomainValidator {
    resolver: DohResolver,
    probe_client: Client,
    marketplaces: MarketplaceHosts,
}

impl DomainValidator {
    pub fn new(opts: &ValidatorOptions) -> Result<Self> {
        let timeout = Duration::from_secs(opts.timeout_secs);

        let dns_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadLensError::Network(format!("failed to build DNS client: {e}")))?;

        // Redirects are inspected, never followed.
        let probe_client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| LeadLensError::Network(format!("failed to build probe client: {e}")))?;

        Ok(Self {
            resolver: DohResolver::new(dns_client, opts.doh_url.clone()),
            probe_client,
            marketplaces: MarketplaceHosts::new(&opts.extra_marketplace_hosts),
        })
    }

    /// Validate a domain (bare or URL form).
    #[instrument(skip_all, fields(domain = %domain))]
    pub async fn check(&self, domain: &str) -> ValidationResult {
        let domain = normalize_domain(domain).unwrap_or_else(|| domain.trim().to_lowercase());
        let host = domain.split(':').next().unwrap_or(&domain).to_string();

        let resolves = match self.resolver.resolve_a(&host).await {
            Ok(addrs) => !addrs.is_empty(),
            Err(e) => {
                debug!(error = %e, "DNS lookup failed");
                false
            }
        };

        if !resolves {
            info!(%domain, "domain does not resolve");
            return ValidationResult {
                domain,
                dns_valid: false,
                http_status: None,
                redirect_to: None,
                is_valid_domain: false,
                is_parked: false,
                reason: REASON_NOT_RESOLVING.to_string(),
            };
        }

        let result = match self.probe(&domain).await {
            Some(response) => classify_response(
                &domain,
                &response.url,
                response.status.as_u16(),
                response.location.as_deref(),
                &self.marketplaces,
            ),
            None => ValidationResult {
                domain: domain.clone(),
                dns_valid: true,
                http_status: None,
                redirect_to: None,
                is_valid_domain: false,
                is_parked: false,
                reason: REASON_UNREACHABLE.to_string(),
            },
        };

        info!(
            %domain,
            valid = result.is_valid_domain,
            parked = result.is_parked,
            reason = %result.reason,
            "domain validated"
        );
        result
    }

    /// Fetch the site root over https, then http if https fails at transport level.
    async fn probe(&self, domain: &str) -> Option<ProbeResponse> {
        for scheme in ["https", "http"] {
            let Ok(url) = Url::parse(&format!("{scheme}://{domain}/")) else {
                return None;
            };

            match self.probe_client.get(url.clone()).send().await {
                Ok(response) => {
                    let location = response
                        .headers()
                        .get(reqwest::header::LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    return Some(ProbeResponse {
                        url,
                        status: response.status(),
                        location,
                    });
                }
                Err(e) => {
                    debug!(%url, error = %e, "probe transport failure");
                }
            }
        }
        None
    }
}

#[async_trait]
impl DomainValidation for DomainValidator {
    async fn validate(&self, domain: &str) -> ValidationResult {
        self.check(domain).await
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify the single HTTP response observed for a resolvable domain.
///
/// `request_url` is the URL that was fetched; relative `Location` headers are
/// resolved against it.
pub fn classify_response(
    domain: &str,
    request_url: &Url,
    status: u16,
    location: Option<&str>,
    marketplaces: &MarketplaceHosts,
) -> ValidationResult {
    let mut result = ValidationResult {
        domain: domain.to_string(),
        dns_valid: true,
        http_status: Some(status),
        redirect_to: None,
        is_valid_domain: false,
        is_parked: false,
        reason: String::new(),
    };

    if let Some(location) = location {
        let target = match request_url.join(location) {
            Ok(target) => target,
            Err(_) => {
                result.redirect_to = Some(location.to_string());
                result.reason = "invalid redirect target".to_string();
                return result;
            }
        };
        result.redirect_to = Some(target.to_string());

        let target_host = target.host_str().unwrap_or_default();
        let request_host = request_url.host_str().unwrap_or_default();

        if marketplaces.contains(target_host) {
            result.is_parked = true;
            result.reason = REASON_PARKED.to_string();
        } else if same_host(target_host, request_host) {
            result.is_valid_domain = true;
            result.reason = "redirects within the same host".to_string();
        } else {
            result.reason = REASON_EXTERNAL_REDIRECT.to_string();
        }
        return result;
    }

    match status {
        200 => {
            result.is_valid_domain = true;
            result.reason = "reachable".to_string();
        }
        403 => {
            result.is_valid_domain = true;
            result.reason = "reachable (403, bot-blocked)".to_string();
        }
        404 => result.reason = "not found (404)".to_string(),
        s if s >= 500 => result.reason = format!("server error ({s})"),
        s => result.reason = format!("unexpected HTTP status {s}"),
    }
    result
}
