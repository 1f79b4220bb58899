//! Database operations for `report_completed`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Returns the subset of `seqs` already marked completed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_completed_among(pool: &PgPool, seqs: &[i64]) -> Result<Vec<i64>, DbError> {
    if seqs.is_empty() {
        return Ok(vec![]);
    }

    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT seq FROM report_completed WHERE seq = ANY($1) ORDER BY seq",
    )
    .bind(seqs)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Marks `seqs` completed at `now`. Existing marks keep their original timestamp.
///
/// Returns the number of seqs newly marked.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn mark_completed(
    pool: &PgPool,
    seqs: &[i64],
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    if seqs.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "INSERT INTO report_completed (seq, completed_at) \
         SELECT s, $2 FROM UNNEST($1::bigint[]) AS s \
         ON CONFLICT (seq) DO NOTHING",
    )
    .bind(seqs)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
