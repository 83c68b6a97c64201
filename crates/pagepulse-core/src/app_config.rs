use crate::query::MetricQuery;

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
    pub log_level: String,
    pub property_id: Option<String>,
    pub access_token: Option<String>,
    pub api_base_url: String,
    pub api_timeout_secs: u64,
    pub api_max_attempts: u32,
    pub api_backoff_base_ms: u64,
    pub api_max_metrics_per_request: usize,
    pub api_min_request_interval_ms: u64,
    pub api_row_limit: u32,
    pub user_agent: String,
    pub metric_query: MetricQuery,
    pub run_interval_secs: u64,
    pub run_timeout_secs: u64,
    pub run_schedule: String,
    pub run_lock_key: i64,
    pub raw_retention_hours: u64,
    pub run_history_retention_days: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl AppConfig {
    #[must_use]
    pub fn run_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.run_interval_secs).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn run_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.run_timeout_secs)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("property_id", &self.property_id)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("api_max_attempts", &self.api_max_attempts)
            .field("api_backoff_base_ms", &self.api_backoff_base_ms)
            .field(
                "api_max_metrics_per_request",
                &self.api_max_metrics_per_request,
            )
            .field(
                "api_min_request_interval_ms",
                &self.api_min_request_interval_ms,
            )
            .field("api_row_limit", &self.api_row_limit)
            .field("user_agent", &self.user_agent)
            .field("metric_query", &self.metric_query)
            .field("run_interval_secs", &self.run_interval_secs)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("run_schedule", &self.run_schedule)
            .field("run_lock_key", &self.run_lock_key)
            .field("raw_retention_hours", &self.raw_retention_hours)
            .field(
                "run_history_retention_days",
                &self.run_history_retention_days,
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
