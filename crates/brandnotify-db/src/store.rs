//! [`PgStore`]: the Postgres implementation of every pipeline ledger.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use brandnotify_core::{
    AbandonedRecord, AnalysisLookup, BrandKey, CompletionLedger, CursorStore, LedgerError,
    OptOutList, Report, ReportSource, RetryFailure, RetryLedger, RetryPolicy, RetryRecord,
    ThrottleDecision, ThrottleLedger,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::{retry::RetryRow, DbError};

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::CursorRegression {
                consumer,
                current,
                requested,
            } => LedgerError::Regression {
                consumer,
                current,
                requested,
            },
            other => LedgerError::Unavailable(other.to_string()),
        }
    }
}

impl From<RetryRow> for RetryRecord {
    fn from(row: RetryRow) -> Self {
        Self {
            seq: row.seq,
            brand_key: BrandKey::from_normalized(row.brand_key),
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_reason: row.last_reason,
            next_eligible_at: row.next_eligible_at,
            pending_recipients: row.pending_recipients.into_iter().collect(),
        }
    }
}

/// Shared handle over a pool. Analyses are read in `language` only.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    language: String,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, language: impl Into<String>) -> Self {
        Self {
            pool,
            language: language.into(),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ThrottleLedger for PgStore {
    async fn try_acquire(
        &self,
        brand_key: &BrandKey,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<ThrottleDecision, LedgerError> {
        Ok(crate::throttle::try_acquire_throttle(&self.pool, brand_key.as_str(), cooldown, now).await?)
    }
}

#[async_trait]
impl RetryLedger for PgStore {
    async fn get_many(&self, seqs: &[i64]) -> Result<BTreeMap<i64, RetryRecord>, LedgerError> {
        let rows = crate::retry::get_retry_records(&self.pool, seqs).await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.seq, RetryRecord::from(row)))
            .collect())
    }

    async fn claim(
        &self,
        seq: i64,
        expected_attempts: u32,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, LedgerError> {
        let Ok(expected) = i32::try_from(expected_attempts) else {
            return Ok(false);
        };
        Ok(crate::retry::claim_retry(&self.pool, seq, expected, now, lease).await?)
    }

    async fn record_failure(
        &self,
        failure: &RetryFailure,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<u32, LedgerError> {
        let pending: Vec<String> = failure.pending_recipients.iter().cloned().collect();
        let attempts = crate::retry::record_retry_failure(
            &self.pool,
            failure.seq,
            failure.brand_key.as_str(),
            &pending,
            &failure.reason,
            policy,
            now,
        )
        .await?;
        Ok(u32::try_from(attempts).unwrap_or(0))
    }

    async fn abandon(&self, record: &AbandonedRecord) -> Result<(), LedgerError> {
        Ok(crate::retry::abandon_report(&self.pool, record).await?)
    }

    async fn abandoned_among(&self, seqs: &[i64]) -> Result<BTreeSet<i64>, LedgerError> {
        let rows = crate::retry::list_abandoned_among(&self.pool, seqs).await?;
        Ok(rows.into_iter().collect())
    }

    async fn clear(&self, seqs: &[i64]) -> Result<(), LedgerError> {
        crate::retry::clear_retries(&self.pool, seqs).await?;
        Ok(())
    }
}

#[async_trait]
impl CompletionLedger for PgStore {
    async fn completed_among(&self, seqs: &[i64]) -> Result<BTreeSet<i64>, LedgerError> {
        let rows = crate::completion::list_completed_among(&self.pool, seqs).await?;
        Ok(rows.into_iter().collect())
    }

    async fn mark_completed(&self, seqs: &[i64], now: DateTime<Utc>) -> Result<(), LedgerError> {
        crate::completion::mark_completed(&self.pool, seqs, now).await?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for PgStore {
    async fn read(&self, consumer: &str) -> Result<i64, LedgerError> {
        Ok(crate::cursor::read_cursor(&self.pool, consumer).await?)
    }

    async fn advance(&self, consumer: &str, seq: i64) -> Result<(), LedgerError> {
        Ok(crate::cursor::advance_cursor(&self.pool, consumer, seq).await?)
    }
}

#[async_trait]
impl ReportSource for PgStore {
    async fn get_report(&self, seq: i64) -> Result<Option<Report>, LedgerError> {
        let row = crate::reports::get_report(&self.pool, seq).await?;
        Ok(row.map(Report::from))
    }

    async fn get_analysis(&self, seq: i64) -> Result<AnalysisLookup, LedgerError> {
        let row = crate::reports::get_analysis(&self.pool, seq, &self.language).await?;
        Ok(match row {
            Some(row) => AnalysisLookup::Ready(row.into()),
            None => AnalysisLookup::NotYetAnalyzed,
        })
    }

    async fn report_image(&self, seq: i64) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(crate::reports::get_report_image(&self.pool, seq).await?)
    }

    async fn list_analyzed_after(&self, cursor: i64, limit: i64) -> Result<Vec<i64>, LedgerError> {
        Ok(crate::reports::list_analyzed_after(&self.pool, cursor, &self.language, limit).await?)
    }

    async fn list_unfinished_up_to(
        &self,
        after: i64,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<i64>, LedgerError> {
        Ok(
            crate::reports::list_unfinished_up_to(&self.pool, after, cursor, &self.language, limit)
                .await?,
        )
    }
}

#[async_trait]
impl OptOutList for PgStore {
    async fn is_opted_out(&self, email: &str) -> Result<bool, LedgerError> {
        Ok(crate::opt_outs::is_email_opted_out(&self.pool, email).await?)
    }

    async fn opted_out_among(
        &self,
        emails: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, LedgerError> {
        let emails: Vec<String> = emails.iter().cloned().collect();
        let rows = crate::opt_outs::list_opted_out_among(&self.pool, &emails).await?;
        Ok(rows.into_iter().collect())
    }

    async fn opt_out(&self, email: &str) -> Result<bool, LedgerError> {
        Ok(crate::opt_outs::add_opt_out(&self.pool, email).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_regression_maps_to_ledger_regression() {
        let err: LedgerError = DbError::CursorRegression {
            consumer: "brand-notifier".to_string(),
            current: 10,
            requested: 4,
        }
        .into();
        assert_eq!(
            err,
            LedgerError::Regression {
                consumer: "brand-notifier".to_string(),
                current: 10,
                requested: 4,
            }
        );
    }

    #[test]
    fn sqlx_errors_map_to_unavailable() {
        let err: LedgerError = DbError::Sqlx(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }

    #[test]
    fn retry_row_converts_negative_attempts_to_zero() {
        let record = RetryRecord::from(RetryRow {
            seq: 7,
            brand_key: "nike".to_string(),
            attempts: -1,
            last_reason: String::new(),
            next_eligible_at: Utc::now(),
            pending_recipients: vec!["b@x.com".to_string(), "a@x.com".to_string()],
        });
        assert_eq!(record.attempts, 0);
        assert_eq!(record.brand_key.as_str(), "nike");
        assert_eq!(
            record.pending_recipients.iter().next().map(String::as_str),
            Some("a@x.com")
        );
    }
}
