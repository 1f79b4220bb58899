//! Delivery providers.

use std::time::Duration;

use async_trait::async_trait;
use brandnotify_core::redact_email;
use reqwest::Client;
use serde_json::json;

use crate::error::SendError;
use crate::message::OutgoingMessage;

const SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";

/// What the provider reported for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub message_id: Option<String>,
}

/// A blocking-per-message delivery backend.
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<ProviderResponse, SendError>;
}

/// `SendGrid` v3 `mail/send` client.
pub struct SendGridProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SendGridProvider {
    /// # Errors
    ///
    /// Returns [`SendError::Permanent`] if the HTTP client cannot be built.
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, SendError> {
        Self::with_base_url(api_key, timeout, SENDGRID_BASE_URL)
    }

    /// Same as [`SendGridProvider::new`] against a different host, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Permanent`] if the HTTP client cannot be built.
    pub fn with_base_url(api_key: &str, timeout: Duration, base_url: &str) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SendError::Permanent(format!("sendgrid client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn payload(message: &OutgoingMessage) -> serde_json::Value {
        let mut personalization = json!({
            "to": [{ "email": message.to }],
            "subject": message.subject,
        });
        if let Some(bcc) = message.bcc.as_deref().filter(|b| *b != message.to) {
            personalization["bcc"] = json!([{ "email": bcc }]);
        }

        let mut payload = json!({
            "personalizations": [personalization],
            "from": { "email": message.from_email, "name": message.from_name },
            "content": [
                { "type": "text/plain", "value": message.text_body },
                { "type": "text/html", "value": message.html_body },
            ],
        });

        if !message.attachments.is_empty() {
            let attachments: Vec<serde_json::Value> = message
                .attachments
                .iter()
                .map(|a| {
                    json!({
                        "content": a.content_base64,
                        "type": a.mime_type,
                        "filename": a.filename,
                        "disposition": "inline",
                        "content_id": a.content_id,
                    })
                })
                .collect();
            payload["attachments"] = serde_json::Value::Array(attachments);
        }

        payload
    }
}

#[async_trait]
impl MailProvider for SendGridProvider {
    async fn send(&self, message: &OutgoingMessage) -> Result<ProviderResponse, SendError> {
        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(|e| SendError::from_reqwest(&e))?;

        let status = response.status();
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status.is_success() {
            return Ok(ProviderResponse {
                status: status.as_u16(),
                message_id,
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(SendError::from_status(status, &body))
    }
}

/// Accepts every message and only logs it. Used when no API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyProvider;

#[async_trait]
impl MailProvider for LogOnlyProvider {
    async fn send(&self, message: &OutgoingMessage) -> Result<ProviderResponse, SendError> {
        tracing::info!(
            to = %redact_email(&message.to),
            subject = %message.subject,
            attachments = message.attachments.len(),
            "delivery disabled, message logged only"
        );
        Ok(ProviderResponse {
            status: 202,
            message_id: None,
        })
    }
}
