//! Message model and rendering of the per-brand digest.

use std::fmt::Write as _;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use brandnotify_core::{AppConfig, BrandReportSummary, Classification};

pub const REPORT_IMAGE_CID: &str = "report_image";
pub const MAP_IMAGE_CID: &str = "map_image";

const SUBJECT_TITLE_MAX_CHARS: usize = 50;

/// An inline attachment, base64-encoded once when built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub content_id: String,
    pub content_base64: String,
}

impl Attachment {
    #[must_use]
    pub fn inline(filename: &str, mime_type: &str, content_id: &str, bytes: &[u8]) -> Self {
        Self {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            content_id: content_id.to_string(),
            content_base64: STANDARD.encode(bytes),
        }
    }

    #[must_use]
    pub fn report_image(bytes: &[u8]) -> Self {
        Self::inline("report.jpg", "image/jpeg", REPORT_IMAGE_CID, bytes)
    }

    #[must_use]
    pub fn map_image(bytes: &[u8]) -> Self {
        Self::inline("map.png", "image/png", MAP_IMAGE_CID, bytes)
    }
}

/// One email to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from_name: String,
    pub from_email: String,
    pub to: String,
    pub bcc: Option<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    /// Shared across every recipient of the same summary.
    pub attachments: Arc<[Attachment]>,
}

/// Sender identity and the links embedded in every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSettings {
    pub from_name: String,
    pub from_email: String,
    pub bcc: Option<String>,
    pub opt_out_url: String,
    pub dashboard_base_url: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            from_name: "CleanApp".to_string(),
            from_email: "info@cleanapp.io".to_string(),
            bcc: None,
            opt_out_url: "https://cleanapp.io/api/optout".to_string(),
            dashboard_base_url: "https://cleanapp.io".to_string(),
        }
    }
}

impl MessageSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            from_name: config.sendgrid_from_name.clone(),
            from_email: config.sendgrid_from_email.clone(),
            bcc: config.bcc_email.clone(),
            opt_out_url: config.opt_out_url.clone(),
            dashboard_base_url: config.dashboard_base_url.clone(),
        }
    }
}

/// Builds the message for `recipient`. Attachments are passed in prebuilt.
#[must_use]
pub fn build_message(
    summary: &BrandReportSummary,
    recipient: &str,
    settings: &MessageSettings,
    attachments: Arc<[Attachment]>,
) -> OutgoingMessage {
    let has_report = attachments.iter().any(|a| a.content_id == REPORT_IMAGE_CID);
    let has_map = attachments.iter().any(|a| a.content_id == MAP_IMAGE_CID);

    OutgoingMessage {
        from_name: settings.from_name.clone(),
        from_email: settings.from_email.clone(),
        to: recipient.to_string(),
        bcc: settings.bcc.clone(),
        subject: subject_line(summary),
        text_body: text_body(summary, recipient, settings, has_report, has_map),
        html_body: html_body(summary, recipient, settings, has_report, has_map),
        attachments,
    }
}

/// `"{brand} issue #{seq}: {title}"` for one report, `"{brand}: {n} new CleanApp reports"` otherwise.
#[must_use]
pub fn subject_line(summary: &BrandReportSummary) -> String {
    let brand = brand_label(summary);
    match (summary.new_report_count, summary.items.first()) {
        (1, Some(item)) => format!(
            "{brand} issue #{}: {}",
            item.seq,
            truncate_title(&item.title, SUBJECT_TITLE_MAX_CHARS)
        ),
        (count, _) => format!("{brand}: {count} new CleanApp reports"),
    }
}

/// Cut `title` to `max` characters, the last three being `...`.
#[must_use]
pub fn truncate_title(title: &str, max: usize) -> String {
    let title = title.trim();
    if title.chars().count() <= max {
        return title.to_string();
    }
    let head: String = title.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

/// Digital harm links to the brand's digital dashboard; physical to the report map.
#[must_use]
pub fn dashboard_url(summary: &BrandReportSummary, base: &str) -> String {
    let base = base.trim_end_matches('/');
    match summary.classification {
        Classification::Digital => format!("{base}/digital/{}", summary.brand_key),
        Classification::Physical => format!("{base}/reports"),
    }
}

/// `{opt_out_url}?email={recipient}` with the address query-encoded.
#[must_use]
pub fn unsubscribe_url(opt_out_url: &str, recipient: &str) -> String {
    reqwest::Url::parse_with_params(opt_out_url, &[("email", recipient)]).map_or_else(
        |_| format!("{opt_out_url}?email={recipient}"),
        |url| url.to_string(),
    )
}

fn brand_label(summary: &BrandReportSummary) -> &str {
    if summary.display_name.trim().is_empty() {
        summary.brand_key.as_str()
    } else {
        summary.display_name.trim()
    }
}

fn text_body(
    summary: &BrandReportSummary,
    recipient: &str,
    settings: &MessageSettings,
    has_report: bool,
    has_map: bool,
) -> String {
    let brand = brand_label(summary);
    let mut out = String::new();

    let _ = writeln!(out, "Hello,\n");
    let _ = writeln!(
        out,
        "CleanApp received {} new {} about {brand}.\n",
        summary.new_report_count,
        plural(summary.new_report_count)
    );
    for item in &summary.items {
        let _ = writeln!(out, "- #{}: {}", item.seq, item.title.trim());
    }
    if let Some(worst) = summary.worst_item() {
        let _ = writeln!(
            out,
            "\nMost severe: \"{}\" (severity {:.1}, hazard {:.0}%)",
            worst.title.trim(),
            worst.severity_level,
            worst.hazard_probability * 100.0
        );
    }
    let _ = writeln!(
        out,
        "\nSee the reports: {}",
        dashboard_url(summary, &settings.dashboard_base_url)
    );
    if has_report || has_map {
        let _ = writeln!(out, "\nThis email contains:");
        if has_report {
            let _ = writeln!(out, "- The report image");
        }
        if has_map {
            let _ = writeln!(out, "- A map showing the location");
        }
    }
    let _ = writeln!(out, "\nBest regards,\nThe CleanApp Team\n");
    let _ = write!(
        out,
        "Unsubscribe: {}",
        unsubscribe_url(&settings.opt_out_url, recipient)
    );
    out
}

fn html_body(
    summary: &BrandReportSummary,
    recipient: &str,
    settings: &MessageSettings,
    has_report: bool,
    has_map: bool,
) -> String {
    let brand = escape_html(brand_label(summary));
    let mut items = String::new();
    for item in &summary.items {
        let _ = write!(
            items,
            "\n      <li>#{}: {}</li>",
            item.seq,
            escape_html(item.title.trim())
        );
    }

    let mut worst = String::new();
    if let Some(item) = summary.worst_item() {
        let _ = write!(
            worst,
            "\n    <p><strong>Most severe:</strong> {} (severity {:.1}, hazard {:.0}%)</p>",
            escape_html(item.title.trim()),
            item.severity_level,
            item.hazard_probability * 100.0
        );
    }

    let mut images = String::new();
    if has_report {
        let _ = write!(
            images,
            "\n    <h3>Report Image:</h3>\n    <img src=\"cid:{REPORT_IMAGE_CID}\" alt=\"Report Image\" style=\"max-width: 100%; height: auto;\">"
        );
    }
    if has_map {
        let _ = write!(
            images,
            "\n    <h3>Location Map:</h3>\n    <img src=\"cid:{MAP_IMAGE_CID}\" alt=\"Map\" style=\"max-width: 100%; height: auto;\">"
        );
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"utf-8\">\n    <title>CleanApp Report</title>\n</head>\n<body>\n    <h2>Hello,</h2>\n    <p>CleanApp received {count} new {noun} about {brand}.</p>\n    <ul>{items}\n    </ul>{worst}\n    <p><a href=\"{dashboard}\">See the reports</a></p>{images}\n    <p>Best regards,<br>The CleanApp Team</p>\n    <p style=\"font-size: 12px; color: #888;\"><a href=\"{unsubscribe}\">Unsubscribe</a></p>\n</body>\n</html>",
        count = summary.new_report_count,
        noun = plural(summary.new_report_count),
        dashboard = escape_html(&dashboard_url(summary, &settings.dashboard_base_url)),
        unsubscribe = escape_html(&unsubscribe_url(&settings.opt_out_url, recipient)),
    )
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "report"
    } else {
        "reports"
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
