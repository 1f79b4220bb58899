mod api;
mod middleware;
mod scheduler;
mod worker;

use std::sync::Arc;

use brandnotify_core::BrandCatalog;
use brandnotify_db::PgStore;
use brandnotify_notifier::EmailNotifier;
use brandnotify_pipeline::{Coordinator, CoordinatorSettings, Ledgers};
use tokio::sync::{mpsc, Mutex};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::{InternalAuth, PublicQuotas},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(brandnotify_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = brandnotify_db::PoolConfig::from_app_config(&config);
    let pool = brandnotify_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = brandnotify_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let brands = brandnotify_core::load_brands(&config.brands_path)?;
    let catalog = Arc::new(BrandCatalog::from_configs(&brands.brands)?);
    tracing::info!(brands = catalog.len(), "loaded brand catalog");

    let store = Arc::new(PgStore::new(pool.clone(), config.analysis_language.clone()));
    let notifier = EmailNotifier::from_app_config(&config, store.clone())?;
    let coordinator = Coordinator::new(
        Ledgers::from_store(&store),
        catalog,
        Arc::new(notifier),
        CoordinatorSettings::from_app_config(&config),
    );

    let gate = Arc::new(Mutex::new(()));
    let (events_tx, events_rx) = mpsc::channel(worker::EVENT_QUEUE_CAPACITY);
    let worker = worker::spawn_event_worker(coordinator.clone(), Arc::clone(&gate), events_rx);
    let mut scheduler =
        scheduler::build_scheduler(coordinator, gate, &config.poll_cron).await?;

    let auth = InternalAuth::from_config(&config)?;
    let app = build_app(
        AppState {
            pool,
            events: events_tx,
        },
        auth,
        PublicQuotas::from_config(&config),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "brandnotify-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last sender; the worker drains what is queued and exits.
    scheduler.shutdown().await?;
    worker.await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
