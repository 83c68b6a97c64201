//! Client for the analytics realtime reporting API and the transformer that
//! turns its rows into [`pagepulse_core::RawMetricRecord`]s.

pub mod client;
pub mod error;
pub mod merge;
pub mod normalize;
pub(crate) mod retry;
pub mod types;

pub use client::{AnalyticsClient, ClientSettings};
pub use error::{ApiError, ApiErrorKind};
pub use merge::merge_rows;
pub use normalize::{normalize, to_snake_case};
pub use types::{FetchedReport, RawApiRow};
