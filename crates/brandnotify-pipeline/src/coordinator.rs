//! Per-seq state machine driving a notification cycle.
//!
//! ```text
//! Pending ─┬─ NotYetAnalyzed (held, re-read next cycle)
//!          └─ Matched ─┬─ NoBrandMatch ──────────────────────────► Completed
//!                      ├─ ThrottledDeferred (re-aggregated next cycle)
//!                      └─ NotificationSent ─┬──────────────────────► Completed
//!                                           └─ RetryScheduled ─┬──► Completed
//!                                                              └──► Abandoned
//! ```
//!
//! A retry is only re-sent by the cycle that claimed it in the retry ledger.
//! Overlapping cycles that lose the claim report `RetryInFlight` and leave the
//! record alone.
//!
//! Every durable fact for a brand (throttle stamp, completion, retry attempt)
//! is committed before the cycle moves on to the next brand, and a seq is only
//! marked completed after the send covering it returned.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use brandnotify_core::{
    redact_email, AbandonedRecord, AnalysisEvent, AnalysisLookup, AppConfig, BrandCatalog,
    BrandKey, BrandReportSummary, CompletionLedger, CursorStore, LedgerError, OptOutList,
    ReportSource, RetryFailure, RetryLedger, RetryPolicy, RetryRecord, ThrottleDecision,
    ThrottleLedger,
};
use brandnotify_notifier::{Notifier, RecipientOutcome, SendError};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::aggregator::{aggregate, summarize, AnalyzedReport};
use crate::error::PipelineError;

/// Storage seams the coordinator reads and writes.
#[derive(Clone)]
pub struct Ledgers {
    pub source: Arc<dyn ReportSource>,
    pub throttle: Arc<dyn ThrottleLedger>,
    pub retries: Arc<dyn RetryLedger>,
    pub completions: Arc<dyn CompletionLedger>,
    pub cursors: Arc<dyn CursorStore>,
    pub opt_outs: Arc<dyn OptOutList>,
}

impl Ledgers {
    /// Use one store for every seam.
    #[must_use]
    pub fn from_store<S>(store: &Arc<S>) -> Self
    where
        S: ReportSource
            + ThrottleLedger
            + RetryLedger
            + CompletionLedger
            + CursorStore
            + OptOutList
            + 'static,
    {
        Self {
            source: store.clone(),
            throttle: store.clone(),
            retries: store.clone(),
            completions: store.clone(),
            cursors: store.clone(),
            opt_outs: store.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub consumer: String,
    pub default_cooldown: Duration,
    pub retry_policy: RetryPolicy,
    pub batch_limit: i64,
    /// How long a claimed retry stays invisible to other cycles. A process
    /// that dies mid-send gets the record back after this.
    pub retry_lease: Duration,
}

const DEFAULT_RETRY_LEASE_MINUTES: i64 = 10;

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            consumer: "brand-notifier".to_string(),
            default_cooldown: Duration::days(7),
            retry_policy: RetryPolicy::default(),
            batch_limit: 500,
            retry_lease: Duration::minutes(DEFAULT_RETRY_LEASE_MINUTES),
        }
    }
}

impl CoordinatorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            consumer: config.consumer_name.clone(),
            default_cooldown: config.default_cooldown(),
            retry_policy: config.retry_policy(),
            batch_limit: config.batch_limit,
            retry_lease: Duration::minutes(DEFAULT_RETRY_LEASE_MINUTES),
        }
    }
}

/// Where a seq ended up after one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOutcome {
    /// Already in the completion ledger; nothing was done.
    AlreadyCompleted,
    /// Already abandoned; nothing was done.
    AlreadyAbandoned,
    /// Analysis not available yet in the configured language.
    NotYetAnalyzed,
    /// No configured brand matched; completed without a send.
    NoBrandMatch,
    /// Every recipient opted out or none was known; completed without a send.
    NoRecipients,
    /// Every recipient covering the seq accepted the notification.
    Completed,
    /// The brand is inside its cooldown window.
    ThrottledDeferred { retry_after: DateTime<Utc> },
    /// At least one recipient failed transiently.
    RetryScheduled {
        attempt: u32,
        next_eligible_at: DateTime<Utc>,
    },
    /// A retry record exists but its back-off has not elapsed.
    RetryNotDue { next_eligible_at: DateTime<Utc> },
    /// Another cycle claimed the retry and is sending it.
    RetryInFlight,
    /// Permanent failure or retries exhausted.
    Abandoned { attempts: u32 },
}

impl SeqOutcome {
    /// `true` when the seq needs no further work from this pipeline.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::AlreadyCompleted
                | Self::AlreadyAbandoned
                | Self::NoBrandMatch
                | Self::NoRecipients
                | Self::Completed
                | Self::Abandoned { .. }
        )
    }

    /// Whether the cursor may move past this seq.
    ///
    /// Throttle-deferred seqs release it: the backlog feed picks them up
    /// again below the cursor.
    #[must_use]
    pub fn releases_cursor(self) -> bool {
        self.is_terminal() || matches!(self, Self::ThrottledDeferred { .. })
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::AlreadyCompleted => "already_completed",
            Self::AlreadyAbandoned => "already_abandoned",
            Self::NotYetAnalyzed => "not_yet_analyzed",
            Self::NoBrandMatch => "no_brand_match",
            Self::NoRecipients => "no_recipients",
            Self::Completed => "completed",
            Self::ThrottledDeferred { .. } => "throttled_deferred",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::RetryNotDue { .. } => "retry_not_due",
            Self::RetryInFlight => "retry_in_flight",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

/// Result of one [`Coordinator::run_cycle`].
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub cursor_before: i64,
    pub cursor_after: i64,
    pub outcomes: BTreeMap<i64, SeqOutcome>,
    /// Summaries handed to the notifier.
    pub notifications: usize,
    /// Individual emails the provider accepted.
    pub emails_delivered: usize,
}

impl CycleReport {
    #[must_use]
    pub fn outcome(&self, seq: i64) -> Option<SeqOutcome> {
        self.outcomes.get(&seq).copied()
    }

    /// Number of seqs per outcome label.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for outcome in self.outcomes.values() {
            *counts.entry(outcome.label()).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cycle {}", self.cycle_id)?;
        writeln!(f, "  cursor: {} -> {}", self.cursor_before, self.cursor_after)?;
        writeln!(
            f,
            "  notifications: {} ({} emails delivered)",
            self.notifications, self.emails_delivered
        )?;
        for (label, count) in self.counts() {
            writeln!(f, "  {label}: {count}")?;
        }
        Ok(())
    }
}

/// Accumulates outcomes and send counters during a cycle.
#[derive(Default)]
struct CycleState {
    outcomes: BTreeMap<i64, SeqOutcome>,
    notifications: usize,
    emails_delivered: usize,
}

impl CycleState {
    fn set(&mut self, seqs: impl IntoIterator<Item = i64>, outcome: SeqOutcome) {
        for seq in seqs {
            self.outcomes.insert(seq, outcome);
        }
    }
}

#[derive(Clone)]
pub struct Coordinator {
    ledgers: Ledgers,
    catalog: Arc<BrandCatalog>,
    notifier: Arc<dyn Notifier>,
    settings: CoordinatorSettings,
    /// Lower bound of the next backlog page. Wraps to 0 after a short page.
    backlog_from: Arc<AtomicI64>,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        ledgers: Ledgers,
        catalog: Arc<BrandCatalog>,
        notifier: Arc<dyn Notifier>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            ledgers,
            catalog,
            notifier,
            settings,
            backlog_from: Arc::new(AtomicI64::new(0)),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Run one cycle over new analyses, the unfinished backlog and `events`,
    /// then advance the cursor.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Ledger`] if storage is unavailable. Writes made before
    /// the failure are idempotent and the next cycle starts over.
    pub async fn run_cycle(
        &self,
        events: &[AnalysisEvent],
        now: DateTime<Utc>,
    ) -> Result<CycleReport, PipelineError> {
        let cycle_id = Uuid::new_v4();
        let consumer = self.settings.consumer.as_str();
        let limit = self.settings.batch_limit;
        let cursor_before = self.ledgers.cursors.read(consumer).await?;

        let fresh = self
            .ledgers
            .source
            .list_analyzed_after(cursor_before, limit)
            .await?;
        let backlog = self.next_backlog_page(cursor_before, limit).await?;

        for event in events {
            if let Some(hint) = &event.brand_hint {
                tracing::debug!(seq = event.seq, brand_hint = %hint, "inbound analysis event");
            }
        }

        let work: BTreeSet<i64> = fresh
            .into_iter()
            .chain(backlog)
            .chain(events.iter().map(|e| e.seq))
            .filter(|seq| *seq > 0)
            .collect();

        tracing::debug!(%cycle_id, cursor = cursor_before, seqs = work.len(), "cycle started");

        let state = self.process_seqs(&work, now).await?;
        let cursor_after = self.advance_cursor(cursor_before, &state.outcomes).await?;

        let report = CycleReport {
            cycle_id,
            cursor_before,
            cursor_after,
            outcomes: state.outcomes,
            notifications: state.notifications,
            emails_delivered: state.emails_delivered,
        };

        tracing::info!(
            %cycle_id,
            cursor_before,
            cursor_after,
            seqs = report.outcomes.len(),
            notifications = report.notifications,
            emails = report.emails_delivered,
            "cycle finished"
        );

        Ok(report)
    }

    /// One page of unfinished seqs at or below the cursor.
    ///
    /// Pages rotate through the backlog so a brand with more deferred seqs
    /// than `limit` cannot hide the seqs queued behind it.
    async fn next_backlog_page(&self, cursor: i64, limit: i64) -> Result<Vec<i64>, LedgerError> {
        let from = self.backlog_from.load(Ordering::SeqCst).min(cursor);
        let page = self
            .ledgers
            .source
            .list_unfinished_up_to(from, cursor, limit)
            .await?;

        let full = usize::try_from(limit).is_ok_and(|limit| limit > 0 && page.len() >= limit);
        let next = match page.last() {
            Some(last) if full => *last,
            _ => 0,
        };
        self.backlog_from.store(next, Ordering::SeqCst);
        tracing::debug!(from, next, seqs = page.len(), "backlog page read");
        Ok(page)
    }

    /// Drive `seqs` through the state machine once, without touching the cursor.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Ledger`] if storage is unavailable.
    pub async fn process(
        &self,
        seqs: &[i64],
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<i64, SeqOutcome>, PipelineError> {
        let seqs: BTreeSet<i64> = seqs.iter().copied().collect();
        Ok(self.process_seqs(&seqs, now).await?.outcomes)
    }

    async fn process_seqs(
        &self,
        seqs: &BTreeSet<i64>,
        now: DateTime<Utc>,
    ) -> Result<CycleState, PipelineError> {
        let mut state = CycleState::default();
        let all: Vec<i64> = seqs.iter().copied().collect();

        let completed = self.ledgers.completions.completed_among(&all).await?;
        let abandoned = self.ledgers.retries.abandoned_among(&all).await?;
        state.set(completed.iter().copied(), SeqOutcome::AlreadyCompleted);
        state.set(abandoned.iter().copied(), SeqOutcome::AlreadyAbandoned);

        let open: Vec<i64> = all
            .into_iter()
            .filter(|seq| !completed.contains(seq) && !abandoned.contains(seq))
            .collect();
        let retries = self.ledgers.retries.get_many(&open).await?;

        let fresh: Vec<i64> = open
            .iter()
            .copied()
            .filter(|seq| !retries.contains_key(seq))
            .collect();

        self.process_fresh(&fresh, &completed, now, &mut state)
            .await?;
        self.process_retries(retries, now, &mut state).await?;

        Ok(state)
    }

    /// Load report and analysis for each seq, recording `NotYetAnalyzed` for
    /// the ones that are not ready.
    async fn load(
        &self,
        seqs: impl IntoIterator<Item = i64>,
        state: &mut CycleState,
    ) -> Result<Vec<AnalyzedReport>, PipelineError> {
        let mut loaded = Vec::new();
        for seq in seqs {
            let analysis = match self.ledgers.source.get_analysis(seq).await? {
                AnalysisLookup::Ready(analysis) => analysis,
                AnalysisLookup::NotYetAnalyzed => {
                    tracing::debug!(seq, "analysis not available yet, deferring");
                    state.set([seq], SeqOutcome::NotYetAnalyzed);
                    continue;
                }
            };
            let Some(report) = self.ledgers.source.get_report(seq).await? else {
                tracing::debug!(seq, "report row not visible yet, deferring");
                state.set([seq], SeqOutcome::NotYetAnalyzed);
                continue;
            };
            loaded.push(AnalyzedReport { report, analysis });
        }
        Ok(loaded)
    }

    async fn process_fresh(
        &self,
        seqs: &[i64],
        completed: &BTreeSet<i64>,
        now: DateTime<Utc>,
        state: &mut CycleState,
    ) -> Result<(), PipelineError> {
        if seqs.is_empty() {
            return Ok(());
        }

        let batch = self.load(seqs.iter().copied(), state).await?;
        let aggregation = aggregate(&self.catalog, &batch, completed);

        if !aggregation.unmatched.is_empty() {
            self.ledgers
                .completions
                .mark_completed(&aggregation.unmatched, now)
                .await?;
            state.set(aggregation.unmatched.iter().copied(), SeqOutcome::NoBrandMatch);
        }

        for mut summary in aggregation.summaries {
            let opted_out = self
                .ledgers
                .opt_outs
                .opted_out_among(&summary.recipients)
                .await?;
            if !opted_out.is_empty() {
                tracing::info!(
                    brand = %summary.brand_key,
                    removed = opted_out.len(),
                    "removed opted-out recipients"
                );
                summary.remove_recipients(&opted_out);
            }

            if summary.recipients.is_empty() {
                let seqs: Vec<i64> = summary.seqs.iter().copied().collect();
                tracing::warn!(
                    brand = %summary.brand_key,
                    seqs = ?seqs,
                    "no deliverable recipients, marking reports processed"
                );
                self.ledgers.completions.mark_completed(&seqs, now).await?;
                state.set(seqs, SeqOutcome::NoRecipients);
                continue;
            }

            let cooldown = self
                .catalog
                .cooldown_for(&summary.brand_key, self.settings.default_cooldown);
            match self
                .ledgers
                .throttle
                .try_acquire(&summary.brand_key, cooldown, now)
                .await?
            {
                ThrottleDecision::Throttled { retry_after } => {
                    tracing::info!(
                        brand = %summary.brand_key,
                        reports = summary.seqs.len(),
                        %retry_after,
                        "brand in cooldown, deferring"
                    );
                    state.set(
                        summary.seqs.iter().copied(),
                        SeqOutcome::ThrottledDeferred { retry_after },
                    );
                }
                ThrottleDecision::Allowed => {
                    let results = self.notifier.send(&summary).await;
                    state.notifications += 1;
                    self.settle(&summary, &results, &BTreeMap::new(), now, state)
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Re-send eligible retries to their pending recipients, grouped per brand.
    ///
    /// The throttle window was consumed by the first attempt and is not
    /// acquired again. Each record is claimed first; only claimed records are
    /// sent.
    async fn process_retries(
        &self,
        records: BTreeMap<i64, RetryRecord>,
        now: DateTime<Utc>,
        state: &mut CycleState,
    ) -> Result<(), PipelineError> {
        let mut by_brand: BTreeMap<BrandKey, Vec<RetryRecord>> = BTreeMap::new();
        for (seq, record) in records {
            if record.is_eligible(now) {
                let claimed = self
                    .ledgers
                    .retries
                    .claim(seq, record.attempts, now, self.settings.retry_lease)
                    .await?;
                if !claimed {
                    tracing::debug!(seq, attempts = record.attempts, "retry claimed elsewhere");
                    state.set([seq], SeqOutcome::RetryInFlight);
                    continue;
                }
                by_brand
                    .entry(record.brand_key.clone())
                    .or_default()
                    .push(record);
            } else {
                tracing::debug!(seq, attempts = record.attempts, "retry not due yet");
                state.set(
                    [seq],
                    SeqOutcome::RetryNotDue {
                        next_eligible_at: record.next_eligible_at,
                    },
                );
            }
        }

        for (brand_key, records) in by_brand {
            let pending: BTreeSet<String> = records
                .iter()
                .flat_map(|r| r.pending_recipients.iter().cloned())
                .collect();
            let opted_out = self.ledgers.opt_outs.opted_out_among(&pending).await?;

            let mut prior_attempts = BTreeMap::new();
            let mut recipients_by_seq = BTreeMap::new();
            let mut nothing_left = Vec::new();
            for record in &records {
                let still_pending: BTreeSet<String> = record
                    .pending_recipients
                    .difference(&opted_out)
                    .cloned()
                    .collect();
                if still_pending.is_empty() {
                    nothing_left.push(record.seq);
                } else {
                    prior_attempts.insert(record.seq, record.attempts);
                    recipients_by_seq.insert(record.seq, still_pending);
                }
            }

            if !nothing_left.is_empty() {
                self.complete(&nothing_left, now).await?;
                state.set(nothing_left.iter().copied(), SeqOutcome::NoRecipients);
            }

            let reports = self.load(recipients_by_seq.keys().copied(), state).await?;
            if reports.is_empty() {
                continue;
            }
            recipients_by_seq.retain(|seq, _| reports.iter().any(|r| r.seq() == *seq));

            let display_name = self
                .catalog
                .get(&brand_key)
                .map_or_else(|| brand_key.to_string(), |b| b.display_name.clone());
            let refs: Vec<&AnalyzedReport> = reports.iter().collect();
            let summary = summarize(brand_key, display_name, &refs, recipients_by_seq);

            tracing::info!(
                brand = %summary.brand_key,
                reports = summary.seqs.len(),
                recipients = summary.recipients.len(),
                "retrying notification"
            );
            let results = self.notifier.send(&summary).await;
            state.notifications += 1;
            self.settle(&summary, &results, &prior_attempts, now, state)
                .await?;
        }

        Ok(())
    }

    /// Partition the summary's seqs by what their recipients reported and
    /// persist the outcome of each.
    async fn settle(
        &self,
        summary: &BrandReportSummary,
        results: &[RecipientOutcome],
        prior_attempts: &BTreeMap<i64, u32>,
        now: DateTime<Utc>,
        state: &mut CycleState,
    ) -> Result<(), PipelineError> {
        state.emails_delivered += results.iter().filter(|r| r.is_delivered()).count();

        let failures: BTreeMap<&str, &SendError> = results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (r.recipient.as_str(), e)))
            .collect();

        let mut sent = Vec::new();
        for &seq in &summary.seqs {
            let failed: Vec<(&str, &SendError)> = summary
                .recipients_for(seq)
                .iter()
                .filter_map(|r| failures.get_key_value(r.as_str()).map(|(k, e)| (*k, *e)))
                .collect();

            if failed.is_empty() {
                sent.push(seq);
                continue;
            }

            let reason = failure_reason(&failed);
            let retriable: BTreeSet<String> = failed
                .iter()
                .filter(|(_, e)| e.is_retriable())
                .map(|(r, _)| (*r).to_string())
                .collect();
            let attempts_so_far = prior_attempts.get(&seq).copied().unwrap_or(0);

            if retriable.is_empty() {
                self.abandon(summary, seq, attempts_so_far + 1, &reason, now, state)
                    .await?;
                continue;
            }

            let attempt = self
                .ledgers
                .retries
                .record_failure(
                    &RetryFailure {
                        seq,
                        brand_key: summary.brand_key.clone(),
                        pending_recipients: retriable,
                        reason: reason.clone(),
                    },
                    &self.settings.retry_policy,
                    now,
                )
                .await?;

            if self.settings.retry_policy.should_abandon(attempt) {
                self.abandon(summary, seq, attempt, &reason, now, state)
                    .await?;
            } else {
                let next_eligible_at = self.settings.retry_policy.next_eligible_at(attempt, now);
                tracing::warn!(
                    brand = %summary.brand_key,
                    seq,
                    attempt,
                    %next_eligible_at,
                    reason = %reason,
                    "notification failed, retry scheduled"
                );
                state.set(
                    [seq],
                    SeqOutcome::RetryScheduled {
                        attempt,
                        next_eligible_at,
                    },
                );
            }
        }

        if !sent.is_empty() {
            self.complete(&sent, now).await?;
            state.set(sent, SeqOutcome::Completed);
        }
        Ok(())
    }

    /// Completion first, then the retry record goes away.
    async fn complete(&self, seqs: &[i64], now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ledgers.completions.mark_completed(seqs, now).await?;
        self.ledgers.retries.clear(seqs).await
    }

    async fn abandon(
        &self,
        summary: &BrandReportSummary,
        seq: i64,
        attempts: u32,
        reason: &str,
        now: DateTime<Utc>,
        state: &mut CycleState,
    ) -> Result<(), LedgerError> {
        self.ledgers
            .retries
            .abandon(&AbandonedRecord {
                seq,
                brand_key: summary.brand_key.clone(),
                attempts,
                reason: reason.to_string(),
                abandoned_at: now,
            })
            .await?;
        tracing::error!(
            brand = %summary.brand_key,
            seq,
            attempts,
            reason = %reason,
            "notification abandoned"
        );
        state.set([seq], SeqOutcome::Abandoned { attempts });
        Ok(())
    }

    /// Move the cursor to the highest seq above it such that every seq in
    /// between released it. A regression is logged and the cycle goes on.
    async fn advance_cursor(
        &self,
        cursor: i64,
        outcomes: &BTreeMap<i64, SeqOutcome>,
    ) -> Result<i64, PipelineError> {
        let target = outcomes
            .range(cursor + 1..)
            .take_while(|(_, outcome)| outcome.releases_cursor())
            .last()
            .map_or(cursor, |(seq, _)| *seq);

        if target <= cursor {
            return Ok(cursor);
        }

        match self
            .ledgers
            .cursors
            .advance(&self.settings.consumer, target)
            .await
        {
            Ok(()) => Ok(target),
            Err(LedgerError::Regression {
                consumer,
                current,
                requested,
            }) => {
                tracing::error!(
                    consumer = %consumer,
                    current,
                    requested,
                    "cursor regression rejected"
                );
                Ok(current)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn failure_reason(failed: &[(&str, &SendError)]) -> String {
    failed
        .iter()
        .map(|(recipient, e)| format!("{}: {e}", redact_email(recipient)))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_release_rules() {
        let at = Utc::now();
        assert!(SeqOutcome::Completed.releases_cursor());
        assert!(SeqOutcome::Abandoned { attempts: 5 }.releases_cursor());
        assert!(SeqOutcome::ThrottledDeferred { retry_after: at }.releases_cursor());
        assert!(!SeqOutcome::ThrottledDeferred { retry_after: at }.is_terminal());
        assert!(!SeqOutcome::NotYetAnalyzed.releases_cursor());
        assert!(!SeqOutcome::RetryScheduled {
            attempt: 1,
            next_eligible_at: at
        }
        .releases_cursor());
        assert!(!SeqOutcome::RetryNotDue {
            next_eligible_at: at
        }
        .releases_cursor());
        assert!(!SeqOutcome::RetryInFlight.releases_cursor());
        assert!(!SeqOutcome::RetryInFlight.is_terminal());
    }

    #[test]
    fn failure_reason_redacts_recipients() {
        let err = SendError::Transient("503 Service Unavailable".to_string());
        let reason = failure_reason(&[("jane@nike.example", &err)]);
        assert!(reason.starts_with("j***@nike.example: "));
        assert!(!reason.contains("jane@"));
    }
}
