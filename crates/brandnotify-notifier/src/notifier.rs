//! Per-recipient fan-out of one brand summary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brandnotify_core::{redact_email, AppConfig, BrandReportSummary, ReportSource};
use futures::future::join_all;

use crate::error::SendError;
use crate::map::MapRenderer;
use crate::message::{build_message, Attachment, MessageSettings};
use crate::provider::{LogOnlyProvider, MailProvider, SendGridProvider};

/// Delivery result for one recipient of a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub result: Result<(), SendError>,
}

impl RecipientOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sends a summary to each of its recipients independently.
///
/// One outcome is returned per entry of `summary.recipients`; a failure for
/// one recipient never prevents attempts for the others.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, summary: &BrandReportSummary) -> Vec<RecipientOutcome>;
}

/// Email implementation of [`Notifier`].
pub struct EmailNotifier {
    provider: Arc<dyn MailProvider>,
    images: Arc<dyn ReportSource>,
    maps: Option<MapRenderer>,
    settings: MessageSettings,
    send_timeout: Duration,
}

impl EmailNotifier {
    #[must_use]
    pub fn new(
        provider: Arc<dyn MailProvider>,
        images: Arc<dyn ReportSource>,
        settings: MessageSettings,
        send_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            images,
            maps: None,
            settings,
            send_timeout,
        }
    }

    /// `SendGrid` delivery when an API key is configured, log-only otherwise,
    /// with map tiles from the configured tile server.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Permanent`] if an HTTP client cannot be built.
    pub fn from_app_config(
        config: &AppConfig,
        images: Arc<dyn ReportSource>,
    ) -> Result<Self, SendError> {
        let send_timeout = Duration::from_secs(config.send_timeout_secs);
        let provider: Arc<dyn MailProvider> = match config.sendgrid_api_key.as_deref() {
            Some(api_key) => Arc::new(SendGridProvider::new(api_key, send_timeout)?),
            None => {
                tracing::warn!("SENDGRID_API_KEY not set; notifications are logged, not sent");
                Arc::new(LogOnlyProvider)
            }
        };
        let maps = MapRenderer::new(&config.map_tile_url, send_timeout)?;

        Ok(Self::new(
            provider,
            images,
            MessageSettings::from_app_config(config),
            send_timeout,
        )
        .with_maps(maps))
    }

    #[must_use]
    pub fn with_maps(mut self, maps: MapRenderer) -> Self {
        self.maps = Some(maps);
        self
    }

    /// Report image of the newest report plus, when possible, the location map.
    ///
    /// A storage failure while loading the image is transient. A failed map
    /// fetch only drops the map.
    async fn build_attachments(
        &self,
        summary: &BrandReportSummary,
    ) -> Result<Vec<Attachment>, SendError> {
        let mut attachments = Vec::new();
        let Some(latest) = summary.latest_item() else {
            return Ok(attachments);
        };

        match self.images.report_image(latest.seq).await {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                attachments.push(Attachment::report_image(&bytes));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(SendError::Transient(format!(
                    "loading image for seq {}: {e}",
                    latest.seq
                )));
            }
        }

        if let Some(maps) = &self.maps {
            match maps.render(latest.latitude, latest.longitude).await {
                Ok(bytes) if !bytes.is_empty() => attachments.push(Attachment::map_image(&bytes)),
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    brand = %summary.brand_key,
                    seq = latest.seq,
                    error = %e,
                    "map tile unavailable, sending without map"
                ),
            }
        }

        Ok(attachments)
    }

    async fn send_one(
        &self,
        summary: &BrandReportSummary,
        recipient: &str,
        attachments: Arc<[Attachment]>,
    ) -> RecipientOutcome {
        let message = build_message(summary, recipient, &self.settings, attachments);

        let result = match tokio::time::timeout(self.send_timeout, self.provider.send(&message)).await {
            Ok(Ok(response)) => {
                tracing::info!(
                    brand = %summary.brand_key,
                    to = %redact_email(recipient),
                    status = response.status,
                    message_id = response.message_id.as_deref().unwrap_or("-"),
                    "email accepted by provider"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SendError::Transient(format!(
                "send timed out after {}s",
                self.send_timeout.as_secs()
            ))),
        };

        if let Err(e) = &result {
            tracing::warn!(
                brand = %summary.brand_key,
                to = %redact_email(recipient),
                retriable = e.is_retriable(),
                error = %e,
                "email delivery failed"
            );
        }

        RecipientOutcome {
            recipient: recipient.to_string(),
            result,
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, summary: &BrandReportSummary) -> Vec<RecipientOutcome> {
        if summary.recipients.is_empty() {
            return Vec::new();
        }

        let attachments: Arc<[Attachment]> = match self.build_attachments(summary).await {
            Ok(attachments) => Arc::from(attachments),
            Err(e) => {
                tracing::warn!(brand = %summary.brand_key, error = %e, "could not build attachments");
                return summary
                    .recipients
                    .iter()
                    .map(|recipient| RecipientOutcome {
                        recipient: recipient.clone(),
                        result: Err(e.clone()),
                    })
                    .collect();
            }
        };

        tracing::info!(
            brand = %summary.brand_key,
            recipients = summary.recipients.len(),
            reports = summary.new_report_count,
            "sending brand notification"
        );

        let sends = summary
            .recipients
            .iter()
            .map(|recipient| self.send_one(summary, recipient, Arc::clone(&attachments)));
        join_all(sends).await
    }
}
