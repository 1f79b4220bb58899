//! Database operations for `opted_out_emails`.
//!
//! Addresses are stored lowercased; callers may pass any casing.

use sqlx::PgPool;

use crate::DbError;

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn is_email_opted_out(pool: &PgPool, email: &str) -> Result<bool, DbError> {
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM opted_out_emails WHERE email = $1)",
    )
    .bind(email.trim().to_lowercase())
    .fetch_one(pool)
    .await?;

    Ok(found)
}

/// Returns the subset of `emails` (lowercased) that opted out.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_opted_out_among(pool: &PgPool, emails: &[String]) -> Result<Vec<String>, DbError> {
    if emails.is_empty() {
        return Ok(vec![]);
    }

    let lowered: Vec<String> = emails.iter().map(|e| e.trim().to_lowercase()).collect();
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT email FROM opted_out_emails WHERE email = ANY($1) ORDER BY email",
    )
    .bind(&lowered)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Adds `email` to the opt-out list. Returns `true` if it was not present.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn add_opt_out(pool: &PgPool, email: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO opted_out_emails (email) VALUES ($1) ON CONFLICT (email) DO NOTHING",
    )
    .bind(email.trim().to_lowercase())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
