use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub brands_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub cooldown_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_base_secs: u64,
    pub retry_backoff_cap_secs: u64,
    pub send_timeout_secs: u64,
    pub batch_limit: i64,
    pub poll_cron: String,
    pub analysis_language: String,
    pub consumer_name: String,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_from_name: String,
    pub sendgrid_from_email: String,
    pub bcc_email: Option<String>,
    pub opt_out_url: String,
    pub dashboard_base_url: String,
    pub map_tile_url: String,
    /// Bearer tokens accepted on `/internal/*`. Empty disables auth in development.
    pub api_keys: Vec<String>,
    /// Requests per minute allowed on each public route group.
    pub public_rate_limit: u32,
}

impl AppConfig {
    /// The uniform cooldown applied to brands without an override.
    #[must_use]
    pub fn default_cooldown(&self) -> Duration {
        Duration::seconds(i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX / 1_000))
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            std::time::Duration::from_secs(self.retry_backoff_base_secs),
            std::time::Duration::from_secs(self.retry_backoff_cap_secs),
        )
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("brands_path", &self.brands_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("cooldown_secs", &self.cooldown_secs)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_backoff_base_secs", &self.retry_backoff_base_secs)
            .field("retry_backoff_cap_secs", &self.retry_backoff_cap_secs)
            .field("send_timeout_secs", &self.send_timeout_secs)
            .field("batch_limit", &self.batch_limit)
            .field("poll_cron", &self.poll_cron)
            .field("analysis_language", &self.analysis_language)
            .field("consumer_name", &self.consumer_name)
            .field(
                "sendgrid_api_key",
                &self.sendgrid_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("sendgrid_from_name", &self.sendgrid_from_name)
            .field("sendgrid_from_email", &self.sendgrid_from_email)
            .field("bcc_email", &self.bcc_email.as_ref().map(|_| "[redacted]"))
            .field("opt_out_url", &self.opt_out_url)
            .field("dashboard_base_url", &self.dashboard_base_url)
            .field("map_tile_url", &self.map_tile_url)
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("public_rate_limit", &self.public_rate_limit)
            .finish()
    }
}
