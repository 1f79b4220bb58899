//! Report-to-brand notification pipeline: aggregation, the per-seq state
//! machine and in-memory ledgers for tests and dry runs.

pub mod aggregator;
pub mod coordinator;
pub mod error;
pub mod memory;

pub use aggregator::{aggregate, dominant_classification, summarize, Aggregation, AnalyzedReport};
pub use coordinator::{Coordinator, CoordinatorSettings, CycleReport, Ledgers, SeqOutcome};
pub use error::PipelineError;
pub use memory::MemoryStore;
