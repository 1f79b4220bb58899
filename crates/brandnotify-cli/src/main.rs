mod brands;
mod cycle;
mod ledger;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::ledger::{CursorCommands, OptOutCommands};

#[derive(Debug, Parser)]
#[command(name = "brandnotify-cli")]
#[command(about = "Brand report notifier operator tooling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database connectivity and schema
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run a single notification cycle and print its report
    RunOnce {
        /// Override the per-feed batch limit
        #[arg(long)]
        limit: Option<u32>,
        /// Treat these seqs as inbound analysis events
        #[arg(long = "seq")]
        seqs: Vec<i64>,
    },
    /// Upsert the brands file into the `brands` table
    SeedBrands,
    /// Inspect the configured brand catalog
    Brands {
        #[command(subcommand)]
        command: BrandsCommands,
    },
    /// Inspect the consumer cursor
    Cursor {
        #[command(subcommand)]
        command: CursorCommands,
    },
    /// Manage the opt-out list
    OptOut {
        #[command(subcommand)]
        command: OptOutCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[derive(Debug, Subcommand)]
enum BrandsCommands {
    /// Print every configured brand with its key and cooldown
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("brandnotify-cli: see --help for available commands");
        return Ok(());
    };

    let config = brandnotify_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            let pool = connect(&config).await?;
            brandnotify_db::ping(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let pool = connect(&config).await?;
            let applied = brandnotify_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::RunOnce { limit, seqs } => {
            let pool = connect(&config).await?;
            cycle::run_once(&config, pool, limit, &seqs).await?;
        }
        Commands::SeedBrands => {
            let pool = connect(&config).await?;
            brands::run_seed_brands(&config, &pool).await?;
        }
        Commands::Brands {
            command: BrandsCommands::List,
        } => brands::run_brands_list(&config)?,
        Commands::Cursor { command } => {
            let pool = connect(&config).await?;
            ledger::run_cursor(&config, &pool, command).await?;
        }
        Commands::OptOut { command } => {
            let pool = connect(&config).await?;
            ledger::run_opt_out(&pool, command).await?;
        }
    }

    Ok(())
}

async fn connect(config: &brandnotify_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = brandnotify_db::PoolConfig::from_app_config(config);
    let pool = brandnotify_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests;
