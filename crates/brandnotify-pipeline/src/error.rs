use brandnotify_core::LedgerError;
use thiserror::Error;

/// Failure that aborts a whole cycle.
///
/// Every ledger write made before the failure is idempotent, so the next
/// trigger simply re-runs the cycle from the cursor.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
