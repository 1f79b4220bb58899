//! Database operations for `consumer_cursor`.

use sqlx::PgPool;

use crate::DbError;

/// Returns the last processed seq for `consumer`, or `0` if none was stored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn read_cursor(pool: &PgPool, consumer: &str) -> Result<i64, DbError> {
    let seq = sqlx::query_scalar::<_, i64>(
        "SELECT last_seq FROM consumer_cursor WHERE consumer_name = $1",
    )
    .bind(consumer)
    .fetch_optional(pool)
    .await?;

    Ok(seq.unwrap_or(0))
}

/// Moves the cursor for `consumer` to `seq`.
///
/// The conditional upsert refuses to lower the stored value; re-advancing to
/// the current value is accepted.
///
/// # Errors
///
/// Returns [`DbError::CursorRegression`] if `seq` is below the stored value,
/// or [`DbError::Sqlx`] if a query fails.
pub async fn advance_cursor(pool: &PgPool, consumer: &str, seq: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "INSERT INTO consumer_cursor (consumer_name, last_seq, updated_at) \
         VALUES ($1, $2, NOW()) \
         ON CONFLICT (consumer_name) DO UPDATE \
         SET last_seq = EXCLUDED.last_seq, updated_at = NOW() \
         WHERE consumer_cursor.last_seq <= EXCLUDED.last_seq",
    )
    .bind(consumer)
    .bind(seq)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let current = read_cursor(pool, consumer).await?;
        return Err(DbError::CursorRegression {
            consumer: consumer.to_string(),
            current,
            requested: seq,
        });
    }

    Ok(())
}
