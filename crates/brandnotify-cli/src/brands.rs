//! Brand catalog commands.

use brandnotify_core::{AppConfig, BrandCatalog, ConfiguredBrand};
use chrono::Duration;

/// Upsert the brands file into the informational `brands` table.
///
/// # Errors
///
/// Returns an error if the brands file is invalid or the upsert fails.
pub(crate) async fn run_seed_brands(config: &AppConfig, pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let file = brandnotify_core::load_brands(&config.brands_path)?;
    // Validate keys the same way the server does before writing anything.
    BrandCatalog::from_configs(&file.brands)?;

    let count = brandnotify_db::seed_brands(pool, &file.brands).await?;
    println!(
        "seeded {count} brand(s) from {}",
        config.brands_path.display()
    );
    Ok(())
}

/// Print the catalog the matcher would use.
///
/// # Errors
///
/// Returns an error if the brands file cannot be loaded or fails validation.
pub(crate) fn run_brands_list(config: &AppConfig) -> anyhow::Result<()> {
    let file = brandnotify_core::load_brands(&config.brands_path)?;
    let catalog = BrandCatalog::from_configs(&file.brands)?;

    if catalog.is_empty() {
        println!("no brands configured in {}", config.brands_path.display());
        return Ok(());
    }

    let default_cooldown = config.default_cooldown();
    println!(
        "{:<24}{:<24}{:<10}CONTACTS",
        "KEY", "DISPLAY NAME", "COOLDOWN"
    );
    for brand in catalog.brands() {
        println!("{}", format_brand_row(brand, default_cooldown));
    }
    Ok(())
}

pub(crate) fn format_brand_row(brand: &ConfiguredBrand, default_cooldown: Duration) -> String {
    let cooldown = brand.cooldown.unwrap_or(default_cooldown);
    let contacts = if brand.contact_emails.is_empty() {
        "-".to_string()
    } else {
        brand.contact_emails.join(", ")
    };
    format!(
        "{:<24}{:<24}{:<10}{}",
        brand.key.to_string(),
        brand.display_name,
        fmt_cooldown(cooldown),
        contacts
    )
}

/// Render a cooldown in the largest whole unit: `14d`, `6h`, `90s`.
pub(crate) fn fmt_cooldown(cooldown: Duration) -> String {
    let secs = cooldown.num_seconds();
    if secs > 0 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs > 0 && secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else {
        format!("{secs}s")
    }
}
