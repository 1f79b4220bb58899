//! Background job scheduler.
//!
//! Registers the recurring notification cycle. Event-driven cycles from the
//! worker share the same [`CycleGate`], so a scheduled tick that lands while
//! another cycle is running is skipped rather than queued.

use std::sync::Arc;

use brandnotify_pipeline::Coordinator;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Serializes cycles started by the scheduler and the event worker.
pub type CycleGate = Arc<Mutex<()>>;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the cron expression is invalid or the
/// scheduler fails to start.
pub async fn build_scheduler(
    coordinator: Coordinator,
    gate: CycleGate,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_cycle_job(&scheduler, coordinator, gate, cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_cycle_job(
    scheduler: &JobScheduler,
    coordinator: Coordinator,
    gate: CycleGate,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let coordinator = Arc::new(coordinator);

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let coordinator = Arc::clone(&coordinator);
        let gate = Arc::clone(&gate);

        Box::pin(async move {
            run_scheduled_cycle(&coordinator, &gate).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Runs one cycle unless another is in flight. Returns whether it ran.
pub(crate) async fn run_scheduled_cycle(coordinator: &Coordinator, gate: &CycleGate) -> bool {
    let Ok(_guard) = gate.try_lock() else {
        tracing::debug!("scheduler: previous cycle still running; skipping tick");
        return false;
    };

    match coordinator.run_cycle(&[], chrono::Utc::now()).await {
        Ok(report) => {
            if !report.outcomes.is_empty() {
                tracing::info!(%report, "scheduler: cycle complete");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: cycle aborted; will retry next tick");
        }
    }
    true
}
