//! Cursor and opt-out list commands.

use brandnotify_core::AppConfig;
use clap::Subcommand;

/// Sub-commands available under `cursor`.
#[derive(Debug, Subcommand)]
pub enum CursorCommands {
    /// Print the last processed seq for a consumer
    Show {
        /// Consumer name (defaults to `BRANDNOTIFY_CONSUMER_NAME`)
        #[arg(long)]
        consumer: Option<String>,
    },
}

/// Sub-commands available under `opt-out`.
#[derive(Debug, Subcommand)]
pub enum OptOutCommands {
    /// Stop all notifications to an address
    Add { email: String },
    /// Report whether an address has opted out
    Check { email: String },
}

/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_cursor(
    config: &AppConfig,
    pool: &sqlx::PgPool,
    command: CursorCommands,
) -> anyhow::Result<()> {
    match command {
        CursorCommands::Show { consumer } => {
            let consumer = consumer.unwrap_or_else(|| config.consumer_name.clone());
            let seq = brandnotify_db::read_cursor(pool, &consumer).await?;
            println!("{consumer}: {seq}");
        }
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the address is invalid or the database query fails.
pub(crate) async fn run_opt_out(pool: &sqlx::PgPool, command: OptOutCommands) -> anyhow::Result<()> {
    match command {
        OptOutCommands::Add { email } => {
            let email = checked_email(&email)?;
            if brandnotify_db::add_opt_out(pool, &email).await? {
                println!("{email} opted out");
            } else {
                println!("{email} was already opted out");
            }
        }
        OptOutCommands::Check { email } => {
            let email = checked_email(&email)?;
            let opted_out = brandnotify_db::is_email_opted_out(pool, &email).await?;
            println!(
                "{email}: {}",
                if opted_out { "opted out" } else { "subscribed" }
            );
        }
    }
    Ok(())
}

pub(crate) fn checked_email(raw: &str) -> anyhow::Result<String> {
    let email = raw.trim().to_lowercase();
    if !brandnotify_core::is_valid_email(&email) {
        anyhow::bail!("'{raw}' is not a valid email address");
    }
    Ok(email)
}
