//! Database operations for `report_retry` and `report_abandoned`.

use brandnotify_core::{AbandonedRecord, RetryPolicy};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `report_retry` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RetryRow {
    pub seq: i64,
    pub brand_key: String,
    pub attempts: i32,
    pub last_reason: String,
    pub next_eligible_at: DateTime<Utc>,
    pub pending_recipients: Vec<String>,
}

/// Returns the retry rows for the given seqs. Seqs without a row are absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_retry_records(pool: &PgPool, seqs: &[i64]) -> Result<Vec<RetryRow>, DbError> {
    if seqs.is_empty() {
        return Ok(vec![]);
    }

    let rows = sqlx::query_as::<_, RetryRow>(
        "SELECT seq, brand_key, attempts, last_reason, next_eligible_at, pending_recipients \
         FROM report_retry \
         WHERE seq = ANY($1) \
         ORDER BY seq",
    )
    .bind(seqs)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Leases a due retry row to the caller by pushing `next_eligible_at` to
/// `now + lease`.
///
/// The row only matches while it still carries `expected_attempts` and is due
/// at `now`, so of several cycles racing for the same row exactly one gets
/// `true` back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_retry(
    pool: &PgPool,
    seq: i64,
    expected_attempts: i32,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<bool, DbError> {
    let claimed = sqlx::query_scalar::<_, i64>(
        "UPDATE report_retry \
         SET next_eligible_at = $4, updated_at = $3 \
         WHERE seq = $1 AND attempts = $2 AND next_eligible_at <= $3 \
         RETURNING seq",
    )
    .bind(seq)
    .bind(expected_attempts)
    .bind(now)
    .bind(now + lease)
    .fetch_optional(pool)
    .await?;

    Ok(claimed.is_some())
}

/// Records one more failed attempt for `seq` and schedules the next one.
///
/// The increment and the schedule run in one transaction; the upsert takes the
/// row lock so concurrent failures for the same seq serialize. Returns the new
/// attempt count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn record_retry_failure(
    pool: &PgPool,
    seq: i64,
    brand_key: &str,
    pending_recipients: &[String],
    reason: &str,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Result<i32, DbError> {
    let mut tx = pool.begin().await?;

    let attempts: i32 = sqlx::query_scalar(
        "INSERT INTO report_retry \
             (seq, brand_key, attempts, last_reason, next_eligible_at, pending_recipients, updated_at) \
         VALUES ($1, $2, 1, $3, $4, $5, $4) \
         ON CONFLICT (seq) DO UPDATE SET \
             attempts = report_retry.attempts + 1, \
             brand_key = EXCLUDED.brand_key, \
             last_reason = EXCLUDED.last_reason, \
             pending_recipients = EXCLUDED.pending_recipients, \
             updated_at = EXCLUDED.updated_at \
         RETURNING attempts",
    )
    .bind(seq)
    .bind(brand_key)
    .bind(reason)
    .bind(now)
    .bind(pending_recipients)
    .fetch_one(&mut *tx)
    .await?;

    let next_eligible_at = policy.next_eligible_at(u32::try_from(attempts).unwrap_or(0), now);

    sqlx::query("UPDATE report_retry SET next_eligible_at = $1 WHERE seq = $2")
        .bind(next_eligible_at)
        .bind(seq)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(attempts)
}

/// Moves `record.seq` to `report_abandoned` and deletes its retry row.
///
/// Abandoning an already abandoned seq keeps the first record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails.
pub async fn abandon_report(pool: &PgPool, record: &AbandonedRecord) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO report_abandoned (seq, brand_key, attempts, reason, abandoned_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (seq) DO NOTHING",
    )
    .bind(record.seq)
    .bind(record.brand_key.as_str())
    .bind(i32::try_from(record.attempts).unwrap_or(i32::MAX))
    .bind(&record.reason)
    .bind(record.abandoned_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM report_retry WHERE seq = $1")
        .bind(record.seq)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Returns the subset of `seqs` that were abandoned.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_abandoned_among(pool: &PgPool, seqs: &[i64]) -> Result<Vec<i64>, DbError> {
    if seqs.is_empty() {
        return Ok(vec![]);
    }

    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT seq FROM report_abandoned WHERE seq = ANY($1) ORDER BY seq",
    )
    .bind(seqs)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Deletes retry rows for `seqs`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn clear_retries(pool: &PgPool, seqs: &[i64]) -> Result<u64, DbError> {
    if seqs.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query("DELETE FROM report_retry WHERE seq = ANY($1)")
        .bind(seqs)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
