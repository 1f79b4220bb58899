//! One-shot notification cycle.
//!
//! Wires the same store, notifier and coordinator the server uses, runs a
//! single cycle and prints the outcome of every seq it touched.

use std::sync::Arc;

use brandnotify_core::{AnalysisEvent, AppConfig, BrandCatalog};
use brandnotify_db::PgStore;
use brandnotify_notifier::EmailNotifier;
use brandnotify_pipeline::{Coordinator, CoordinatorSettings, CycleReport, Ledgers};

/// Run one cycle, optionally treating `seqs` as inbound events.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the cycle aborts on a
/// storage failure.
pub(crate) async fn run_once(
    config: &AppConfig,
    pool: sqlx::PgPool,
    limit: Option<u32>,
    seqs: &[i64],
) -> anyhow::Result<()> {
    let file = brandnotify_core::load_brands(&config.brands_path)?;
    let catalog = Arc::new(BrandCatalog::from_configs(&file.brands)?);

    let mut settings = CoordinatorSettings::from_app_config(config);
    if let Some(limit) = limit {
        settings.batch_limit = i64::from(limit.max(1));
    }

    let store = Arc::new(PgStore::new(pool, config.analysis_language.clone()));
    let notifier = EmailNotifier::from_app_config(config, store.clone())?;
    let coordinator = Coordinator::new(
        Ledgers::from_store(&store),
        catalog,
        Arc::new(notifier),
        settings,
    );

    let events = events_from_seqs(seqs)?;
    tracing::info!(events = events.len(), "running one-shot cycle");
    let report = coordinator.run_cycle(&events, chrono::Utc::now()).await?;
    print_report(&report);
    Ok(())
}

pub(crate) fn events_from_seqs(seqs: &[i64]) -> anyhow::Result<Vec<AnalysisEvent>> {
    if let Some(bad) = seqs.iter().find(|s| **s <= 0) {
        anyhow::bail!("--seq must be positive, got {bad}");
    }
    Ok(seqs
        .iter()
        .map(|&seq| AnalysisEvent {
            seq,
            brand_hint: None,
        })
        .collect())
}

fn print_report(report: &CycleReport) {
    println!("{report}");
    if report.outcomes.is_empty() {
        println!("nothing to do");
        return;
    }

    println!();
    println!("{:<12}OUTCOME", "SEQ");
    for (seq, outcome) in &report.outcomes {
        println!("{seq:<12}{}", outcome.label());
    }
}
