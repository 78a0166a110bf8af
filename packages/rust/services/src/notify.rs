//! Notification sinks for pipeline summaries.

use std::time::Duration;

use async_trait::async_trait;
use leadlens_core::{NotificationSink, SoftError};
use leadlens_shared::{LeadLensError, Notification, Result, Severity};
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::USER_AGENT;

/// POSTs each notification as JSON to a webhook.
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| LeadLensError::config(format!("invalid webhook_url {url:?}: {e}")))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadLensError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> std::result::Result<(), SoftError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await
            .map_err(|e| SoftError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SoftError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Writes notifications to the log.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, notification: &Notification) -> std::result::Result<(), SoftError> {
        let Notification {
            title,
            description,
            severity,
        } = notification;
        match severity {
            Severity::Error | Severity::Warning => {
                warn!(title = %title, severity = ?severity, "{description}")
            }
            Severity::Info | Severity::Success => {
                info!(title = %title, severity = ?severity, "{description}")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn notification() -> Notification {
        Notification {
            title: "Full pipeline complete".into(),
            description: "acme.com, score 99 (email_domain)".into(),
            severity: Severity::Success,
        }
    }

    #[tokio::test]
    async fn webhook_receives_notification_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/leadlens"))
            .and(body_json(json!({
                "title": "Full pipeline complete",
                "description": "acme.com, score 99 (email_domain)",
                "severity": "success"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            &format!("{}/hooks/leadlens", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        notifier.notify(&notification()).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410).set_body_string("gone"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = notifier.notify(&notification()).await.unwrap_err();
        assert_eq!(
            err,
            SoftError::Status {
                status: 410,
                body: "gone".into()
            }
        );
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        LogNotifier.notify(&notification()).await.unwrap();
    }
}
