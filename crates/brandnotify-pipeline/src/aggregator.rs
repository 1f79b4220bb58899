//! Groups analyzed reports by matched brand into per-brand summaries.
//!
//! Pure: no ledger access. The coordinator decides which reports reach the
//! aggregator and what happens to each summary afterwards.

use std::collections::{BTreeMap, BTreeSet};

use brandnotify_core::{
    parse_contact_emails, BrandCatalog, BrandKey, BrandReportSummary, Classification,
    ConfiguredBrand, Report, ReportAnalysis, SummaryItem,
};

/// A report together with its analysis in the configured language.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedReport {
    pub report: Report,
    pub analysis: ReportAnalysis,
}

impl AnalyzedReport {
    #[must_use]
    pub fn seq(&self) -> i64 {
        self.report.seq
    }

    fn item(&self) -> SummaryItem {
        SummaryItem {
            seq: self.report.seq,
            title: self.analysis.title.clone(),
            severity_level: self.analysis.severity_level,
            hazard_probability: self.analysis.hazard_probability,
            latitude: self.report.latitude,
            longitude: self.report.longitude,
            submitted_at: self.report.submitted_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// One summary per matched brand, ordered by brand key.
    pub summaries: Vec<BrandReportSummary>,
    /// Seqs whose analysis matched no configured brand.
    pub unmatched: Vec<i64>,
}

/// Group `batch` by matched brand.
///
/// Seqs in `completed` are dropped. A seq appearing twice in `batch` is
/// counted once.
#[must_use]
pub fn aggregate(
    catalog: &BrandCatalog,
    batch: &[AnalyzedReport],
    completed: &BTreeSet<i64>,
) -> Aggregation {
    let mut groups: BTreeMap<BrandKey, (&ConfiguredBrand, Vec<&AnalyzedReport>)> = BTreeMap::new();
    let mut unmatched = BTreeSet::new();
    let mut seen = BTreeSet::new();

    for entry in batch {
        let seq = entry.seq();
        if completed.contains(&seq) || !seen.insert(seq) {
            continue;
        }

        match catalog.match_analysis(&entry.analysis.brand_name) {
            Some(brand) => groups
                .entry(brand.key.clone())
                .or_insert_with(|| (brand, Vec::new()))
                .1
                .push(entry),
            None => {
                tracing::debug!(
                    seq,
                    brand_name = %entry.analysis.brand_name,
                    "no configured brand matches analysis"
                );
                unmatched.insert(seq);
            }
        }
    }

    let summaries = groups
        .into_values()
        .map(|(brand, reports)| {
            let brand_contacts = brand_contacts(brand);
            let recipients_by_seq = reports
                .iter()
                .map(|r| {
                    let mut own = inferred_recipients(&r.analysis);
                    own.extend(brand_contacts.iter().cloned());
                    (r.seq(), own)
                })
                .collect();
            summarize(
                brand.key.clone(),
                brand.display_name.clone(),
                &reports,
                recipients_by_seq,
            )
        })
        .collect();

    Aggregation {
        summaries,
        unmatched: unmatched.into_iter().collect(),
    }
}

/// Build the summary for one brand from its reports and per-seq recipients.
///
/// `recipients` is the union of `recipients_by_seq`.
#[must_use]
pub fn summarize(
    brand_key: BrandKey,
    display_name: String,
    reports: &[&AnalyzedReport],
    recipients_by_seq: BTreeMap<i64, BTreeSet<String>>,
) -> BrandReportSummary {
    let mut items: Vec<SummaryItem> = reports.iter().map(|r| r.item()).collect();
    items.sort_by_key(|item| item.seq);

    let seqs: BTreeSet<i64> = items.iter().map(|item| item.seq).collect();
    let recipients = recipients_by_seq.values().flatten().cloned().collect();
    let classification =
        dominant_classification(reports.iter().map(|r| r.analysis.classification));

    BrandReportSummary {
        brand_key,
        display_name,
        new_report_count: seqs.len(),
        seqs,
        recipients,
        recipients_by_seq,
        classification,
        items,
    }
}

/// Majority vote; a tie goes to [`Classification::Physical`].
pub fn dominant_classification<I>(tags: I) -> Classification
where
    I: IntoIterator<Item = Classification>,
{
    let (physical, digital) = tags
        .into_iter()
        .fold((0usize, 0usize), |(p, d), tag| match tag {
            Classification::Physical => (p + 1, d),
            Classification::Digital => (p, d + 1),
        });

    if digital > physical {
        Classification::Digital
    } else {
        Classification::Physical
    }
}

fn inferred_recipients(analysis: &ReportAnalysis) -> BTreeSet<String> {
    let (valid, rejected) = parse_contact_emails(&analysis.inferred_contact_emails);
    if rejected > 0 {
        tracing::warn!(
            seq = analysis.seq,
            rejected,
            "dropped invalid inferred contact emails"
        );
    }
    valid.into_iter().collect()
}

fn brand_contacts(brand: &ConfiguredBrand) -> BTreeSet<String> {
    let (valid, rejected) = parse_contact_emails(&brand.contact_emails.join(","));
    if rejected > 0 {
        tracing::warn!(brand = %brand.key, rejected, "dropped invalid configured contact emails");
    }
    valid.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use brandnotify_core::{normalize, BrandConfig};
    use chrono::{TimeZone, Utc};

    use super::*;

    fn entry(seq: i64, brand: &str, emails: &str, tag: Classification) -> AnalyzedReport {
        AnalyzedReport {
            report: Report {
                seq,
                public_id: format!("r-{seq}"),
                latitude: 47.37,
                longitude: 8.54,
                submitted_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            },
            analysis: ReportAnalysis {
                seq,
                language: "en".to_string(),
                brand_name: brand.to_string(),
                brand_display_name: brand.to_string(),
                title: format!("report {seq}"),
                description: String::new(),
                litter_probability: 0.5,
                hazard_probability: 0.1,
                severity_level: 0.3,
                inferred_contact_emails: emails.to_string(),
                classification: tag,
            },
        }
    }

    fn catalog() -> BrandCatalog {
        BrandCatalog::from_configs(&[
            BrandConfig {
                name: "Nike".to_string(),
                display_name: None,
                cooldown_secs: None,
                contact_emails: vec!["Press@Nike.example".to_string()],
            },
            BrandConfig {
                name: "Coca-Cola".to_string(),
                display_name: Some("The Coca-Cola Company".to_string()),
                cooldown_secs: None,
                contact_emails: vec![],
            },
        ])
        .unwrap()
    }

    #[test]
    fn groups_by_normalized_brand() {
        let batch = vec![
            entry(101, "NIKE", "", Classification::Physical),
            entry(102, "coca cola", "info@coke.example", Classification::Physical),
            entry(103, "nike", "", Classification::Physical),
        ];

        let aggregation = aggregate(&catalog(), &batch, &BTreeSet::new());

        assert!(aggregation.unmatched.is_empty());
        assert_eq!(aggregation.summaries.len(), 2);

        let coke = &aggregation.summaries[0];
        assert_eq!(coke.brand_key, normalize("Coca-Cola"));
        assert_eq!(coke.display_name, "The Coca-Cola Company");
        assert_eq!(coke.seqs, BTreeSet::from([102]));

        let nike = &aggregation.summaries[1];
        assert_eq!(nike.seqs, BTreeSet::from([101, 103]));
        assert_eq!(nike.new_report_count, 2);
    }

    #[test]
    fn recipients_are_deduplicated_union_with_brand_contacts() {
        let batch = vec![
            entry(1, "Nike", "a@nike.example, B@nike.example", Classification::Physical),
            entry(2, "Nike", "b@nike.example,not-an-email", Classification::Physical),
        ];

        let summary = &aggregate(&catalog(), &batch, &BTreeSet::new()).summaries[0];

        let expected: BTreeSet<String> = ["a@nike.example", "b@nike.example", "press@nike.example"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(summary.recipients, expected);
        assert_eq!(
            summary.recipients_for(2),
            ["b@nike.example", "press@nike.example"]
                .into_iter()
                .map(String::from)
                .collect()
        );
    }

    #[test]
    fn unmatched_and_completed_seqs() {
        let batch = vec![
            entry(1, "Adidas", "", Classification::Physical),
            entry(2, "Nike", "", Classification::Physical),
            entry(3, "Nike", "", Classification::Physical),
            entry(3, "Nike", "", Classification::Physical),
        ];

        let aggregation = aggregate(&catalog(), &batch, &BTreeSet::from([2]));

        assert_eq!(aggregation.unmatched, vec![1]);
        assert_eq!(aggregation.summaries.len(), 1);
        assert_eq!(aggregation.summaries[0].seqs, BTreeSet::from([3]));
    }

    #[test]
    fn empty_brand_name_is_unmatched() {
        let batch = vec![entry(9, "", "", Classification::Physical)];
        let aggregation = aggregate(&catalog(), &batch, &BTreeSet::new());
        assert_eq!(aggregation.unmatched, vec![9]);
    }

    #[test]
    fn classification_majority_with_physical_tie_break() {
        use Classification::{Digital, Physical};

        assert_eq!(dominant_classification([Digital, Digital, Physical]), Digital);
        assert_eq!(dominant_classification([Digital, Physical]), Physical);
        assert_eq!(dominant_classification([Physical, Physical, Digital]), Physical);
        assert_eq!(dominant_classification([]), Physical);
    }
}
