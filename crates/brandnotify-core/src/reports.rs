//! Report, analysis and summary types that cross crate boundaries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::matcher::BrandKey;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").expect("valid regex")
});

/// A submitted report. Immutable and owned by the ingestion side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub seq: i64,
    pub public_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Harm category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Physical,
    Digital,
}

impl Classification {
    /// Parse a stored classification tag. Unknown or empty tags are physical.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("digital") {
            Self::Digital
        } else {
            Self::Physical
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Digital => "digital",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output attached to a report, one per `(seq, language)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAnalysis {
    pub seq: i64,
    pub language: String,
    pub brand_name: String,
    pub brand_display_name: String,
    pub title: String,
    pub description: String,
    pub litter_probability: f64,
    pub hazard_probability: f64,
    pub severity_level: f64,
    /// Comma-separated free text as produced by the classifier.
    pub inferred_contact_emails: String,
    pub classification: Classification,
}

/// Result of asking the classifier boundary for a report's analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisLookup {
    Ready(ReportAnalysis),
    NotYetAnalyzed,
}

/// Inbound unit of work. Only `seq` is trusted; everything else is re-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub seq: i64,
    #[serde(default)]
    pub brand_hint: Option<String>,
}

/// One report line inside a [`BrandReportSummary`].
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryItem {
    pub seq: i64,
    pub title: String,
    pub severity_level: f64,
    pub hazard_probability: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Per-brand aggregate built fresh each cycle and never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct BrandReportSummary {
    pub brand_key: BrandKey,
    pub display_name: String,
    pub seqs: BTreeSet<i64>,
    pub new_report_count: usize,
    pub recipients: BTreeSet<String>,
    /// Recipients inferred from each seq's own analysis.
    pub recipients_by_seq: BTreeMap<i64, BTreeSet<String>>,
    pub classification: Classification,
    /// Ordered by seq.
    pub items: Vec<SummaryItem>,
}

impl BrandReportSummary {
    #[must_use]
    pub fn latest_seq(&self) -> Option<i64> {
        self.seqs.last().copied()
    }

    #[must_use]
    pub fn latest_item(&self) -> Option<&SummaryItem> {
        self.items.iter().max_by_key(|item| item.seq)
    }

    /// The report with the highest severity, ties going to the newest.
    #[must_use]
    pub fn worst_item(&self) -> Option<&SummaryItem> {
        self.items.iter().max_by(|a, b| {
            a.severity_level
                .total_cmp(&b.severity_level)
                .then(a.seq.cmp(&b.seq))
        })
    }

    /// Recipients whose delivery decides the outcome of `seq`.
    ///
    /// A seq that inferred no contacts of its own is covered by every
    /// recipient of the summary.
    #[must_use]
    pub fn recipients_for(&self, seq: i64) -> BTreeSet<String> {
        match self.recipients_by_seq.get(&seq) {
            Some(own) if !own.is_empty() => own.clone(),
            _ => self.recipients.clone(),
        }
    }

    /// Remove `excluded` addresses everywhere in the summary.
    pub fn remove_recipients(&mut self, excluded: &BTreeSet<String>) {
        if excluded.is_empty() {
            return;
        }
        self.recipients.retain(|r| !excluded.contains(r));
        for own in self.recipients_by_seq.values_mut() {
            own.retain(|r| !excluded.contains(r));
        }
    }
}

/// Split a comma-separated contact field into normalized, valid addresses.
///
/// Returns the valid addresses (trimmed, lowercased, deduplicated, in input
/// order) and the number of non-empty parts that were rejected.
#[must_use]
pub fn parse_contact_emails(raw: &str) -> (Vec<String>, usize) {
    let mut valid: Vec<String> = Vec::new();
    let mut rejected = 0usize;

    for part in raw.split(',') {
        let candidate = part.trim().to_lowercase();
        if candidate.is_empty() {
            continue;
        }
        if !EMAIL_RE.is_match(&candidate) {
            rejected += 1;
            continue;
        }
        if !valid.contains(&candidate) {
            valid.push(candidate);
        }
    }

    (valid, rejected)
}

/// `true` if `email`, trimmed and lowercased, looks like a deliverable address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(&email.trim().to_lowercase())
}

/// Mask an address for logging: `jane@example.com` becomes `j***@example.com`.
#[must_use]
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with(by_seq: &[(i64, &[&str])]) -> BrandReportSummary {
        let mut recipients = BTreeSet::new();
        let mut recipients_by_seq = BTreeMap::new();
        for (seq, emails) in by_seq {
            let own: BTreeSet<String> = emails.iter().map(|e| (*e).to_string()).collect();
            recipients.extend(own.iter().cloned());
            recipients_by_seq.insert(*seq, own);
        }
        BrandReportSummary {
            brand_key: crate::normalize("Nike"),
            display_name: "Nike".to_string(),
            seqs: by_seq.iter().map(|(s, _)| *s).collect(),
            new_report_count: by_seq.len(),
            recipients,
            recipients_by_seq,
            classification: Classification::Physical,
            items: vec![],
        }
    }

    #[test]
    fn parse_contact_emails_normalizes_and_filters() {
        let (valid, rejected) =
            parse_contact_emails(" Press@Nike.com, not-an-email,,press@nike.com ,legal@nike.co.uk");
        assert_eq!(valid, vec!["press@nike.com", "legal@nike.co.uk"]);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn parse_contact_emails_empty_input() {
        let (valid, rejected) = parse_contact_emails("   ");
        assert!(valid.is_empty());
        assert_eq!(rejected, 0);
    }

    #[test]
    fn is_valid_email_ignores_case_and_padding() {
        assert!(is_valid_email(" Jane.Doe@Example.COM "));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("not an email"));
    }

    #[test]
    fn redact_email_keeps_first_char_and_domain() {
        assert_eq!(redact_email("jane@example.com"), "j***@example.com");
        assert_eq!(redact_email("garbage"), "***");
    }

    #[test]
    fn classification_from_tag_defaults_to_physical() {
        assert_eq!(Classification::from_tag("digital"), Classification::Digital);
        assert_eq!(Classification::from_tag(" DIGITAL "), Classification::Digital);
        assert_eq!(Classification::from_tag("physical"), Classification::Physical);
        assert_eq!(Classification::from_tag(""), Classification::Physical);
    }

    #[test]
    fn recipients_for_falls_back_to_summary_recipients() {
        let summary = summary_with(&[(1, &["a@x.com"]), (2, &[])]);
        assert_eq!(summary.recipients_for(1).len(), 1);
        assert_eq!(summary.recipients_for(2), summary.recipients);
        assert_eq!(summary.recipients_for(99), summary.recipients);
    }

    #[test]
    fn remove_recipients_applies_everywhere() {
        let mut summary = summary_with(&[(1, &["a@x.com", "b@x.com"]), (2, &["b@x.com"])]);
        let excluded: BTreeSet<String> = ["b@x.com".to_string()].into_iter().collect();
        summary.remove_recipients(&excluded);
        assert_eq!(summary.recipients.len(), 1);
        assert!(summary.recipients_by_seq[&2].is_empty());
        assert_eq!(summary.recipients_for(2), summary.recipients);
    }

    #[test]
    fn analysis_event_brand_hint_is_optional() {
        let event: AnalysisEvent = serde_json::from_str(r#"{"seq": 42}"#).unwrap();
        assert_eq!(event.seq, 42);
        assert!(event.brand_hint.is_none());
    }
}
