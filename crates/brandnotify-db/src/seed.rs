use brandnotify_core::BrandConfig;
use sqlx::PgPool;

use crate::DbError;

/// Upsert brands from config into the `brands` table.
///
/// The table is informational; matching always uses the loaded brands file.
/// Returns the number of brands processed. All upserts run inside a single
/// transaction; if any operation fails the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_brands(pool: &PgPool, brands: &[BrandConfig]) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for brand in brands {
        let key = brand.key();
        let display_name = brand.display_name.as_deref().unwrap_or(&brand.name);
        let cooldown_secs = brand.cooldown_secs.and_then(|s| i64::try_from(s).ok());

        sqlx::query(
            "INSERT INTO brands (brand_key, name, display_name, cooldown_secs, contact_emails) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (brand_key) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 display_name = EXCLUDED.display_name, \
                 cooldown_secs = EXCLUDED.cooldown_secs, \
                 contact_emails = EXCLUDED.contact_emails, \
                 updated_at = NOW()",
        )
        .bind(key.as_str())
        .bind(&brand.name)
        .bind(display_name)
        .bind(cooldown_secs)
        .bind(&brand.contact_emails)
        .execute(&mut *tx)
        .await?;

        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}
