//! Storage seams used by the pipeline.
//!
//! Implemented by the Postgres store in `brandnotify-db` and by the in-memory
//! store in `brandnotify-pipeline` (tests and dry runs). Every method that
//! writes is idempotent for the same input. `ThrottleLedger::try_acquire` and
//! `RetryLedger::claim` need mutual exclusion and must each be a single atomic
//! step.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::matcher::BrandKey;
use crate::reports::{AnalysisLookup, Report};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Storage could not be reached or rejected the statement.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("cursor regression for consumer '{consumer}': current {current}, requested {requested}")]
    Regression {
        consumer: String,
        current: i64,
        requested: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// The window was free and has been stamped with `now`.
    Allowed,
    /// The brand was notified too recently; the next send is allowed at `retry_after`.
    Throttled { retry_after: DateTime<Utc> },
}

#[async_trait]
pub trait ThrottleLedger: Send + Sync {
    /// Atomically check `now - last_sent_at >= cooldown` and stamp `now` on success.
    async fn try_acquire(
        &self,
        brand_key: &BrandKey,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<ThrottleDecision, LedgerError>;
}

/// Live retry state for one report seq.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRecord {
    pub seq: i64,
    pub brand_key: BrandKey,
    pub attempts: u32,
    pub last_reason: String,
    pub next_eligible_at: DateTime<Utc>,
    /// Recipients that still have to receive the notification for this seq.
    pub pending_recipients: BTreeSet<String>,
}

impl RetryRecord {
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_eligible_at
    }
}

/// A failed delivery attempt to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub seq: i64,
    pub brand_key: BrandKey,
    pub pending_recipients: BTreeSet<String>,
    pub reason: String,
}

/// Terminal failure for a seq.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedRecord {
    pub seq: i64,
    pub brand_key: BrandKey,
    pub attempts: u32,
    pub reason: String,
    pub abandoned_at: DateTime<Utc>,
}

#[async_trait]
pub trait RetryLedger: Send + Sync {
    async fn get_many(&self, seqs: &[i64]) -> Result<BTreeMap<i64, RetryRecord>, LedgerError>;

    async fn get(&self, seq: i64) -> Result<Option<RetryRecord>, LedgerError> {
        Ok(self.get_many(&[seq]).await?.remove(&seq))
    }

    async fn is_eligible(&self, seq: i64, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        Ok(self.get(seq).await?.is_some_and(|r| r.is_eligible(now)))
    }

    /// Take the right to re-send `seq` for `lease`.
    ///
    /// Succeeds only while the record still has `expected_attempts` and is
    /// eligible at `now`; on success `next_eligible_at` moves to `now + lease`
    /// so no other cycle sees the record as due. Returns `false` when the
    /// record is gone, was settled meanwhile or is held by another cycle.
    async fn claim(
        &self,
        seq: i64,
        expected_attempts: u32,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, LedgerError>;

    /// Increment the attempt count for `failure.seq` and schedule the next try.
    ///
    /// Returns the attempt count after the increment. Counts never decrease.
    async fn record_failure(
        &self,
        failure: &RetryFailure,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<u32, LedgerError>;

    /// Move a seq to the terminal failed state and drop its retry record.
    async fn abandon(&self, record: &AbandonedRecord) -> Result<(), LedgerError>;

    async fn abandoned_among(&self, seqs: &[i64]) -> Result<BTreeSet<i64>, LedgerError>;

    /// Drop retry records for seqs that reached completion.
    async fn clear(&self, seqs: &[i64]) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait CompletionLedger: Send + Sync {
    async fn completed_among(&self, seqs: &[i64]) -> Result<BTreeSet<i64>, LedgerError>;

    /// Mark seqs completed. Marking an already completed seq is a no-op.
    async fn mark_completed(&self, seqs: &[i64], now: DateTime<Utc>) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last processed seq for `consumer`, `0` if none was recorded.
    async fn read(&self, consumer: &str) -> Result<i64, LedgerError>;

    /// Move the cursor forward.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Regression`] if `seq` is below the stored value.
    async fn advance(&self, consumer: &str, seq: i64) -> Result<(), LedgerError>;
}

/// Read side of the ingestion and classifier boundaries.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn get_report(&self, seq: i64) -> Result<Option<Report>, LedgerError>;

    /// Analysis in the configured language.
    async fn get_analysis(&self, seq: i64) -> Result<AnalysisLookup, LedgerError>;

    async fn report_image(&self, seq: i64) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Analyzed seqs strictly after `cursor`, ascending.
    async fn list_analyzed_after(&self, cursor: i64, limit: i64) -> Result<Vec<i64>, LedgerError>;

    /// Seqs in `(after, cursor]` that are neither completed nor abandoned,
    /// ascending.
    async fn list_unfinished_up_to(
        &self,
        after: i64,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<i64>, LedgerError>;
}

#[async_trait]
pub trait OptOutList: Send + Sync {
    async fn is_opted_out(&self, email: &str) -> Result<bool, LedgerError>;

    /// Subset of `emails` that opted out.
    async fn opted_out_among(
        &self,
        emails: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, LedgerError>;

    /// Returns `true` if the address was not opted out before.
    async fn opt_out(&self, email: &str) -> Result<bool, LedgerError>;
}
