//! Drains inbound analysis events and runs a cycle per batch.

use brandnotify_core::AnalysisEvent;
use brandnotify_pipeline::Coordinator;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::scheduler::CycleGate;

pub const EVENT_QUEUE_CAPACITY: usize = 1024;
const MAX_EVENTS_PER_CYCLE: usize = 256;

/// Spawns the worker. It exits once every sender is dropped and the queue is empty.
pub fn spawn_event_worker(
    coordinator: Coordinator,
    gate: CycleGate,
    mut rx: mpsc::Receiver<AnalysisEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let batch = drain_batch(first, &mut rx, MAX_EVENTS_PER_CYCLE);
            let _guard = gate.lock().await;

            match coordinator.run_cycle(&batch, chrono::Utc::now()).await {
                Ok(report) => {
                    tracing::info!(events = batch.len(), %report, "worker: cycle complete");
                }
                Err(e) => {
                    // The seqs stay above the cursor or in the backlog; the
                    // scheduled cycle picks them up again.
                    tracing::error!(
                        events = batch.len(),
                        error = %e,
                        "worker: cycle aborted"
                    );
                }
            }
        }
        tracing::info!("worker: event queue closed; exiting");
    })
}

/// Collects `first` plus whatever is already queued, up to `max` events.
fn drain_batch(
    first: AnalysisEvent,
    rx: &mut mpsc::Receiver<AnalysisEvent>,
    max: usize,
) -> Vec<AnalysisEvent> {
    let mut batch = vec![first];
    while batch.len() < max {
        match rx.try_recv() {
            Ok(event) => batch.push(event),
            Err(_) => break,
        }
    }
    batch
}
