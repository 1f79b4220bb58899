use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
///
/// # Errors
///
/// Returns `ConfigError` if required values are missing or invalid.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let value = parse_u64(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("BRANDNOTIFY_ENV", "development"))?;

    let bind_addr = parse_addr("BRANDNOTIFY_BIND_ADDR", "0.0.0.0:8080")?;
    let log_level = or_default("BRANDNOTIFY_LOG_LEVEL", "info");
    let brands_path = PathBuf::from(or_default(
        "BRANDNOTIFY_BRANDS_PATH",
        "./config/brands.yaml",
    ));

    let db_max_connections = parse_u32("BRANDNOTIFY_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("BRANDNOTIFY_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("BRANDNOTIFY_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let cooldown_secs = parse_positive_u64("BRANDNOTIFY_COOLDOWN_SECS", "604800")?;
    let retry_max_attempts = parse_u32("BRANDNOTIFY_RETRY_MAX_ATTEMPTS", "5")?;
    if retry_max_attempts == 0 {
        return Err(invalid(
            "BRANDNOTIFY_RETRY_MAX_ATTEMPTS",
            "must be greater than zero".to_string(),
        ));
    }
    let retry_backoff_base_secs = parse_positive_u64("BRANDNOTIFY_RETRY_BACKOFF_BASE_SECS", "60")?;
    let retry_backoff_cap_secs = parse_positive_u64("BRANDNOTIFY_RETRY_BACKOFF_CAP_SECS", "3600")?;
    if retry_backoff_cap_secs < retry_backoff_base_secs {
        return Err(invalid(
            "BRANDNOTIFY_RETRY_BACKOFF_CAP_SECS",
            format!("cap {retry_backoff_cap_secs}s is below base {retry_backoff_base_secs}s"),
        ));
    }
    let send_timeout_secs = parse_positive_u64("BRANDNOTIFY_SEND_TIMEOUT_SECS", "30")?;

    let batch_limit = parse_positive_u64("BRANDNOTIFY_BATCH_LIMIT", "500")?;
    let batch_limit = i64::try_from(batch_limit)
        .map_err(|e| invalid("BRANDNOTIFY_BATCH_LIMIT", e.to_string()))?;
    let poll_cron = or_default("BRANDNOTIFY_POLL_CRON", "0/30 * * * * *");
    let analysis_language = or_default("BRANDNOTIFY_ANALYSIS_LANGUAGE", "en");
    let consumer_name = or_default("BRANDNOTIFY_CONSUMER_NAME", "brand-notifier");

    let sendgrid_api_key = optional("SENDGRID_API_KEY");
    if env == Environment::Production && sendgrid_api_key.is_none() {
        return Err(ConfigError::MissingEnvVar("SENDGRID_API_KEY".to_string()));
    }
    let sendgrid_from_name = or_default("SENDGRID_FROM_NAME", "CleanApp");
    let sendgrid_from_email = or_default("SENDGRID_FROM_EMAIL", "info@cleanapp.io");
    let bcc_email = optional("BRANDNOTIFY_BCC_EMAIL");

    let opt_out_url = or_default("BRANDNOTIFY_OPT_OUT_URL", "https://cleanapp.io/api/optout");
    let dashboard_base_url = or_default("BRANDNOTIFY_DASHBOARD_BASE_URL", "https://cleanapp.io");
    let map_tile_url = or_default("BRANDNOTIFY_MAP_TILE_URL", "https://tile.openstreetmap.org");

    let mut api_keys: Vec<String> = or_default("BRANDNOTIFY_API_KEYS", "")
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    api_keys.sort();
    api_keys.dedup();
    let public_rate_limit = parse_u32("BRANDNOTIFY_PUBLIC_RATE_LIMIT", "120")?;
    if public_rate_limit == 0 {
        return Err(invalid(
            "BRANDNOTIFY_PUBLIC_RATE_LIMIT",
            "must be greater than zero".to_string(),
        ));
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        brands_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        cooldown_secs,
        retry_max_attempts,
        retry_backoff_base_secs,
        retry_backoff_cap_secs,
        send_timeout_secs,
        batch_limit,
        poll_cron,
        analysis_language,
        consumer_name,
        sendgrid_api_key,
        sendgrid_from_name,
        sendgrid_from_email,
        bcc_email,
        opt_out_url,
        dashboard_base_url,
        map_tile_url,
        api_keys,
        public_rate_limit,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "BRANDNOTIFY_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
