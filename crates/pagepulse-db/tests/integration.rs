//! Offline unit tests for pagepulse-db configuration and row types.
//! These tests do not require a live database connection.

use chrono::{Duration, TimeZone, Utc};
use pagepulse_core::{AppConfig, Environment, MetricQuery, RunStatus};
use pagepulse_db::{PoolConfig, RetentionPolicy, RunWindowRow};
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        property_id: Some("123".to_string()),
        access_token: Some("token".to_string()),
        api_base_url: "https://analyticsdata.googleapis.com/v1beta/".to_string(),
        api_timeout_secs: 30,
        api_max_attempts: 5,
        api_backoff_base_ms: 1_000,
        api_max_metrics_per_request: 10,
        api_min_request_interval_ms: 0,
        api_row_limit: 10_000,
        user_agent: "ua".to_string(),
        metric_query: MetricQuery::default(),
        run_interval_secs: 300,
        run_timeout_secs: 240,
        run_schedule: "0 */5 * * * *".to_string(),
        run_lock_key: 42,
        raw_retention_hours: 6,
        run_history_retention_days: 2,
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn retention_policy_from_app_config_converts_units() {
    let policy = RetentionPolicy::from_app_config(&app_config());
    assert_eq!(policy.raw_retention, Duration::hours(6));
    assert_eq!(policy.run_history_retention, Duration::days(2));
}

#[test]
fn retention_policy_clamps_absurd_horizons() {
    let mut config = app_config();
    config.raw_retention_hours = u64::MAX;
    config.run_history_retention_days = u64::MAX;
    let policy = RetentionPolicy::from_app_config(&config);
    assert_eq!(policy.run_history_retention, Duration::days(36_500));
}

#[test]
fn run_window_row_exposes_domain_window() {
    let start = Utc.with_ymd_and_hms(2026, 9, 9, 17, 0, 0).unwrap();
    let row = RunWindowRow {
        id: 11,
        public_id: Uuid::new_v4(),
        window_start: start,
        window_end: start + Duration::minutes(5),
        status: "running".to_string(),
        started_at: Some(start),
        completed_at: None,
        records_written: 0,
        error_kind: None,
        error_message: None,
        created_at: start,
    };

    let window = row.window();
    assert_eq!(window.id, 11);
    assert_eq!(window.start, start);
    assert_eq!(window.bounds().whole_minutes(), 5);
    assert_eq!(row.status().unwrap(), RunStatus::Running);
}
