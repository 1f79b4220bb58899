//! Domain types, brand matching, configuration and the storage seams shared by
//! every brandnotify crate.

pub mod app_config;
pub mod brands;
pub mod config;
pub mod ledger;
pub mod matcher;
pub mod reports;
pub mod retry;

pub use app_config::{AppConfig, Environment};
pub use brands::{load_brands, BrandCatalog, BrandConfig, BrandsFile, ConfiguredBrand};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use ledger::{
    AbandonedRecord, CompletionLedger, CursorStore, LedgerError, OptOutList, ReportSource,
    RetryFailure, RetryLedger, RetryRecord, ThrottleDecision, ThrottleLedger,
};
pub use matcher::{match_brand, normalize, BrandKey};
pub use reports::{
    is_valid_email, parse_contact_emails, redact_email, AnalysisEvent, AnalysisLookup,
    BrandReportSummary, Classification, Report, ReportAnalysis, SummaryItem,
};
pub use retry::RetryPolicy;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read brands file {path}: {source}")]
    BrandsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse brands file: {0}")]
    BrandsFileParse(#[from] serde_yaml::Error),

    #[error("brands validation failed: {0}")]
    Validation(String),

    /// Two configured brand names normalize to the same key.
    #[error("brands '{first}' and '{second}' both normalize to key '{key}'")]
    DuplicateBrandKey {
        key: String,
        first: String,
        second: String,
    },
}
