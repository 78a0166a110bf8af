//! HTTP clients for the remote enrichment collaborators.
//!
//! Every collaborator is a JSON-over-HTTP endpoint on one service host.
//! [`ServiceClient`] implements the collaborator traits from
//! `leadlens-core`; failures come back as [`SoftError`] so the pipeline can
//! log them and move on.

mod notify;

use std::time::Duration;

use async_trait::async_trait;
use leadlens_core::{
    CompanyEnricher, CompanyProfile, ContactFinder, ContactProfile, CrmSync, Diagnoser, Geocoder,
    LeadContext, NewsItem, NewsLookup, SocialSearcher, SocialValidator, SoftError,
};
use leadlens_shared::{
    Coordinates, Diagnosis, EnrichmentLogEntry, LeadLensError, Result, ServicesConfig,
    SocialNetwork, SocialProfiles, resolve_secret,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

pub use notify::{LogNotifier, WebhookNotifier};

const USER_AGENT: &str = concat!("LeadLens/", env!("CARGO_PKG_VERSION"));

/// Error bodies are cut to this many bytes before being logged.
const ERROR_BODY_LIMIT: usize = 512;

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LeadRequest<'a> {
    lead: &'a LeadContext,
}

#[derive(Serialize)]
struct SocialSearchRequest<'a> {
    network: SocialNetwork,
    lead: &'a LeadContext,
}

#[derive(Serialize)]
struct SocialValidateRequest<'a> {
    lead: &'a LeadContext,
    profiles: &'a SocialProfiles,
}

#[derive(Serialize)]
struct GeocodeRequest<'a> {
    domain: &'a str,
    lead: &'a LeadContext,
}

#[derive(Serialize)]
struct DiagnoseRequest<'a> {
    lead: &'a LeadContext,
    logs: &'a [EnrichmentLogEntry],
}

#[derive(Serialize)]
struct CrmSyncRequest<'a> {
    lead: &'a LeadContext,
    linkedin_url: &'a str,
}

#[derive(Deserialize)]
struct ContactsResponse {
    #[serde(default)]
    contacts: Vec<ContactProfile>,
}

#[derive(Deserialize)]
struct NewsResponse {
    #[serde(default)]
    items: Vec<NewsItem>,
}

#[derive(Deserialize)]
struct SocialSearchResponse {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    coordinates: Option<Coordinates>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// JSON client for the enrichment service host.
pub struct ServiceClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url).map_err(|e| {
            LeadLensError::config(format!("invalid services base_url {base_url:?}: {e}"))
        })?;
        // Endpoints are joined relative to the base path.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadLensError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base,
            api_key,
            timeout,
        })
    }

    /// Build from `[services]`; the bearer key is read from the env var the
    /// config names.
    pub fn from_config(config: &ServicesConfig) -> Result<Self> {
        let api_key = resolve_secret(&config.api_key_env);
        if api_key.is_none() {
            debug!(env = %config.api_key_env, "services key not set; requests are unauthenticated");
        }
        Self::new(
            &config.base_url,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn transport_error(&self, e: reqwest::Error) -> SoftError {
        if e.is_timeout() {
            SoftError::Timeout {
                after: self.timeout,
            }
        } else {
            SoftError::Transport(e.to_string())
        }
    }

    /// POST `body` to `path` and return the raw 2xx response body.
    #[instrument(skip(self, body), fields(endpoint = path))]
    async fn post_raw<B>(&self, path: &str, body: &B) -> std::result::Result<String, SoftError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| SoftError::Transport(format!("bad endpoint {path}: {e}")))?;

        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "service returned an error status");
            return Err(SoftError::Status {
                status: status.as_u16(),
                body: truncate(&text, ERROR_BODY_LIMIT),
            });
        }
        debug!(status = status.as_u16(), bytes = text.len(), "service responded");
        Ok(text)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, SoftError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let text = self.post_raw(path, body).await?;
        serde_json::from_str(&text).map_err(|e| SoftError::Payload(format!("{path}: {e}")))
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

// ---------------------------------------------------------------------------
// Collaborator impls
// ---------------------------------------------------------------------------

#[async_trait]
impl CompanyEnricher for ServiceClient {
    async fn enrich_company(
        &self,
        ctx: &LeadContext,
    ) -> std::result::Result<CompanyProfile, SoftError> {
        self.post("company/enrich", &LeadRequest { lead: ctx }).await
    }

    async fn deep_enrich(
        &self,
        ctx: &LeadContext,
    ) -> std::result::Result<CompanyProfile, SoftError> {
        self.post("company/deep", &LeadRequest { lead: ctx }).await
    }
}

#[async_trait]
impl ContactFinder for ServiceClient {
    async fn find_contact(
        &self,
        ctx: &LeadContext,
    ) -> std::result::Result<ContactProfile, SoftError> {
        self.post("contacts/find", &LeadRequest { lead: ctx }).await
    }

    async fn discover_contacts(
        &self,
        ctx: &LeadContext,
    ) -> std::result::Result<Vec<ContactProfile>, SoftError> {
        let response: ContactsResponse =
            self.post("contacts/discover", &LeadRequest { lead: ctx }).await?;
        Ok(response.contacts)
    }
}

#[async_trait]
impl NewsLookup for ServiceClient {
    async fn news(&self, ctx: &LeadContext) -> std::result::Result<Vec<NewsItem>, SoftError> {
        let response: NewsResponse = self.post("news", &LeadRequest { lead: ctx }).await?;
        Ok(response.items)
    }
}

#[async_trait]
impl SocialSearcher for ServiceClient {
    async fn search(
        &self,
        network: SocialNetwork,
        ctx: &LeadContext,
    ) -> std::result::Result<Option<String>, SoftError> {
        let response: SocialSearchResponse = self
            .post("social/search", &SocialSearchRequest { network, lead: ctx })
            .await?;
        Ok(response.url.filter(|u| !u.trim().is_empty()))
    }
}

#[async_trait]
impl SocialValidator for ServiceClient {
    async fn validate(
        &self,
        ctx: &LeadContext,
        profiles: &SocialProfiles,
    ) -> std::result::Result<SocialProfiles, SoftError> {
        self.post(
            "social/validate",
            &SocialValidateRequest {
                lead: ctx,
                profiles,
            },
        )
        .await
    }
}

#[async_trait]
impl Geocoder for ServiceClient {
    async fn geocode(
        &self,
        domain: &str,
        ctx: &LeadContext,
    ) -> std::result::Result<Option<Coordinates>, SoftError> {
        let response: GeocodeResponse = self
            .post("geocode", &GeocodeRequest { domain, lead: ctx })
            .await?;
        Ok(response.coordinates)
    }
}

#[async_trait]
impl Diagnoser for ServiceClient {
    async fn diagnose(
        &self,
        ctx: &LeadContext,
        logs: &[EnrichmentLogEntry],
    ) -> std::result::Result<Diagnosis, SoftError> {
        self.post("diagnose", &DiagnoseRequest { lead: ctx, logs }).await
    }
}

#[async_trait]
impl CrmSync for ServiceClient {
    async fn sync_contact(
        &self,
        ctx: &LeadContext,
        linkedin_url: &str,
    ) -> std::result::Result<(), SoftError> {
        // Any 2xx body is accepted.
        self.post_raw(
            "crm/sync",
            &CrmSyncRequest {
                lead: ctx,
                linkedin_url,
            },
        )
        .await
        .map(drop)
    }
}
