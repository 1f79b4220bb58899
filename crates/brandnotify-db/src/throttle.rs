//! Database operations for `brand_throttle`.

use brandnotify_core::ThrottleDecision;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Atomically claim the notification window for `brand_key`.
///
/// A single `INSERT .. ON CONFLICT DO UPDATE .. WHERE` both checks
/// `now - last_sent_at >= cooldown` and stamps `last_sent_at = now`. Postgres
/// holds the row lock for the conditional update, so two concurrent callers
/// for the same key cannot both see a returned row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn try_acquire_throttle(
    pool: &PgPool,
    brand_key: &str,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> Result<ThrottleDecision, DbError> {
    let acquired = sqlx::query_scalar::<_, String>(
        "INSERT INTO brand_throttle (brand_key, last_sent_at) \
         VALUES ($1, $2) \
         ON CONFLICT (brand_key) DO UPDATE \
         SET last_sent_at = EXCLUDED.last_sent_at \
         WHERE brand_throttle.last_sent_at <= EXCLUDED.last_sent_at - make_interval(secs => $3::double precision) \
         RETURNING brand_key",
    )
    .bind(brand_key)
    .bind(now)
    .bind(cooldown.num_seconds())
    .fetch_optional(pool)
    .await?;

    if acquired.is_some() {
        return Ok(ThrottleDecision::Allowed);
    }

    // Lost the race or still inside the window. The row exists at this point.
    let last_sent_at = get_last_sent_at(pool, brand_key).await?.unwrap_or(now);
    Ok(ThrottleDecision::Throttled {
        retry_after: last_sent_at + cooldown,
    })
}

/// Returns the last time `brand_key` was notified, if ever.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_last_sent_at(
    pool: &PgPool,
    brand_key: &str,
) -> Result<Option<DateTime<Utc>>, DbError> {
    let last = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT last_sent_at FROM brand_throttle WHERE brand_key = $1",
    )
    .bind(brand_key)
    .fetch_optional(pool)
    .await?;

    Ok(last)
}
