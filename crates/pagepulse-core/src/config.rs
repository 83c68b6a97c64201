use crate::app_config::{AppConfig, Environment};
use crate::query::{MetricQuery, DEFAULT_PAGE_DIMENSION};
use crate::ConfigError;

const DEFAULT_API_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1beta/";
const DEFAULT_USER_AGENT: &str = "pagepulse/0.1 (realtime-metrics)";
const DEFAULT_METRICS_VAR: &str = "activeUsers,screenPageViews,eventCount,keyEvents";
/// Every five minutes, on the minute.
const DEFAULT_RUN_SCHEDULE: &str = "0 */5 * * * *";
/// `"pagepuls"` read as a big-endian `i64`.
const DEFAULT_RUN_LOCK_KEY: &str = "8097867290364963955";

/// The realtime API cannot look back further than thirty minutes.
const MAX_RUN_INTERVAL_SECS: u64 = 30 * 60;

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

/// Like [`load_app_config`], but `DATABASE_URL` may be absent.
///
/// For commands that never open a pool. A missing URL becomes an empty
/// string, which `connect_pool` rejects if it is ever used.
///
/// # Errors
///
/// Returns `ConfigError` if any other value is invalid.
pub fn load_app_config_without_database() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    build_app_config(database_url_optional(|key| std::env::var(key)))
}

fn database_url_optional<F>(lookup: F) -> impl Fn(&str) -> Result<String, std::env::VarError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    move |key| match lookup(key) {
        Err(std::env::VarError::NotPresent) if key == "DATABASE_URL" => Ok(String::new()),
        other => other,
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the process environment so
/// tests can drive them with a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
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

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("PAGEPULSE_ENV", "development"))?;
    let log_level = or_default("PAGEPULSE_LOG_LEVEL", "info");

    let property_id = lookup("PAGEPULSE_PROPERTY_ID").ok().filter(|v| !v.is_empty());
    let access_token = lookup("PAGEPULSE_ACCESS_TOKEN").ok().filter(|v| !v.is_empty());
    let api_base_url = or_default("PAGEPULSE_API_BASE_URL", DEFAULT_API_BASE_URL);
    let api_timeout_secs = parse_u64("PAGEPULSE_API_TIMEOUT_SECS", "30")?;
    let api_max_attempts = parse_u32("PAGEPULSE_API_MAX_ATTEMPTS", "5")?;
    let api_backoff_base_ms = parse_u64("PAGEPULSE_API_BACKOFF_BASE_MS", "1000")?;
    let api_max_metrics_per_request = parse_usize("PAGEPULSE_API_MAX_METRICS_PER_REQUEST", "10")?;
    let api_min_request_interval_ms = parse_u64("PAGEPULSE_API_MIN_REQUEST_INTERVAL_MS", "0")?;
    let api_row_limit = parse_u32("PAGEPULSE_API_ROW_LIMIT", "10000")?;
    let user_agent = or_default("PAGEPULSE_USER_AGENT", DEFAULT_USER_AGENT);

    if api_max_attempts == 0 {
        return Err(invalid(
            "PAGEPULSE_API_MAX_ATTEMPTS",
            "must be at least 1".to_string(),
        ));
    }
    if api_max_metrics_per_request == 0 {
        return Err(invalid(
            "PAGEPULSE_API_MAX_METRICS_PER_REQUEST",
            "must be at least 1".to_string(),
        ));
    }

    let page_dimension = or_default("PAGEPULSE_PAGE_DIMENSION", DEFAULT_PAGE_DIMENSION);
    let metrics_raw = or_default("PAGEPULSE_METRICS", DEFAULT_METRICS_VAR);
    let metric_query = MetricQuery::new(
        &page_dimension,
        metrics_raw.split(',').map(str::trim).filter(|m| !m.is_empty()),
    )
    .map_err(|e| invalid("PAGEPULSE_METRICS", e.to_string()))?;

    let run_interval_secs = parse_u64("PAGEPULSE_RUN_INTERVAL_SECS", "300")?;
    let run_timeout_secs = parse_u64("PAGEPULSE_RUN_TIMEOUT_SECS", "240")?;
    let run_schedule = or_default("PAGEPULSE_RUN_SCHEDULE", DEFAULT_RUN_SCHEDULE);
    let run_lock_key = or_default("PAGEPULSE_RUN_LOCK_KEY", DEFAULT_RUN_LOCK_KEY)
        .parse::<i64>()
        .map_err(|e| invalid("PAGEPULSE_RUN_LOCK_KEY", e.to_string()))?;

    if run_interval_secs == 0
        || run_interval_secs % 60 != 0
        || run_interval_secs > MAX_RUN_INTERVAL_SECS
    {
        return Err(invalid(
            "PAGEPULSE_RUN_INTERVAL_SECS",
            format!("must be a whole number of minutes between 60 and {MAX_RUN_INTERVAL_SECS}"),
        ));
    }
    if run_timeout_secs == 0 || run_timeout_secs >= run_interval_secs {
        return Err(invalid(
            "PAGEPULSE_RUN_TIMEOUT_SECS",
            format!("must be non-zero and shorter than the run interval ({run_interval_secs}s)"),
        ));
    }

    let raw_retention_hours = parse_u64("PAGEPULSE_RAW_RETENTION_HOURS", "24")?;
    let run_history_retention_days = parse_u64("PAGEPULSE_RUN_HISTORY_RETENTION_DAYS", "30")?;

    if raw_retention_hours == 0 {
        return Err(invalid(
            "PAGEPULSE_RAW_RETENTION_HOURS",
            "must be at least 1".to_string(),
        ));
    }
    if run_history_retention_days.saturating_mul(24) < raw_retention_hours {
        return Err(invalid(
            "PAGEPULSE_RUN_HISTORY_RETENTION_DAYS",
            format!("must cover the raw retention horizon ({raw_retention_hours}h)"),
        ));
    }

    let db_max_connections = parse_u32("PAGEPULSE_DB_MAX_CONNECTIONS", "5")?;
    let db_min_connections = parse_u32("PAGEPULSE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("PAGEPULSE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    if db_min_connections > db_max_connections {
        return Err(invalid(
            "PAGEPULSE_DB_MIN_CONNECTIONS",
            format!("must not exceed PAGEPULSE_DB_MAX_CONNECTIONS ({db_max_connections})"),
        ));
    }
    // The run lock pins one connection for the whole run.
    if db_max_connections < 2 {
        return Err(invalid(
            "PAGEPULSE_DB_MAX_CONNECTIONS",
            "must be at least 2".to_string(),
        ));
    }

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        property_id,
        access_token,
        api_base_url,
        api_timeout_secs,
        api_max_attempts,
        api_backoff_base_ms,
        api_max_metrics_per_request,
        api_min_request_interval_ms,
        api_row_limit,
        user_agent,
        metric_query,
        run_interval_secs,
        run_timeout_secs,
        run_schedule,
        run_lock_key,
        raw_retention_hours,
        run_history_retention_days,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PAGEPULSE_ENV".to_string(),
            reason: format!("expected development, test or production, got {other:?}"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
