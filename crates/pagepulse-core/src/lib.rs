//! Domain types and configuration shared by every pagepulse crate.

pub mod app_config;
pub mod config;
pub mod query;
pub mod records;
pub mod window;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env, load_app_config_without_database};
pub use query::{
    MetricQuery, QueryError, COUNTRY_DIMENSION, DEFAULT_METRICS, DEFAULT_PAGE_DIMENSION,
};
pub use records::{RawMetricRecord, NOT_SET};
pub use window::{hour_bucket, RunStatus, RunWindow, UnknownRunStatus, WindowBounds};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
