//! HTTP client for the realtime reporting endpoint.
//!
//! One [`AnalyticsClient::fetch`] call issues one `runRealtimeReport` request
//! per metric chunk, retries transient and quota failures, validates each
//! response against the requested headers and merges the chunks back into a
//! single row set.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use pagepulse_core::{AppConfig, MetricQuery, RunWindow, COUNTRY_DIMENSION};
use reqwest::{Client, StatusCode, Url};
use tokio::time::Instant;

use crate::error::ApiError;
use crate::merge::merge_rows;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::types::{
    ErrorEnvelope, FetchedReport, MinuteRange, NamedField, RawApiRow, RealtimeReportRequest,
    RealtimeReportResponse,
};

const ACCESS_CHECK_METRIC: &str = "activeUsers";
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Everything needed to build an [`AnalyticsClient`].
#[derive(Clone)]
pub struct ClientSettings {
    pub property_id: String,
    pub access_token: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_metrics_per_request: usize,
    pub min_request_interval_ms: u64,
    pub row_limit: u32,
}

impl ClientSettings {
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the property id or access token is not
    /// configured.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ApiError> {
        let property_id = config
            .property_id
            .clone()
            .ok_or_else(|| ApiError::Config("PAGEPULSE_PROPERTY_ID is not set".to_string()))?;
        let access_token = config
            .access_token
            .clone()
            .ok_or_else(|| ApiError::Config("PAGEPULSE_ACCESS_TOKEN is not set".to_string()))?;

        Ok(Self {
            property_id,
            access_token,
            base_url: config.api_base_url.clone(),
            timeout_secs: config.api_timeout_secs,
            user_agent: config.user_agent.clone(),
            max_attempts: config.api_max_attempts,
            backoff_base_ms: config.api_backoff_base_ms,
            max_metrics_per_request: config.api_max_metrics_per_request,
            min_request_interval_ms: config.api_min_request_interval_ms,
            row_limit: config.api_row_limit,
        })
    }
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("property_id", &self.property_id)
            .field("access_token", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("max_metrics_per_request", &self.max_metrics_per_request)
            .field("min_request_interval_ms", &self.min_request_interval_ms)
            .field("row_limit", &self.row_limit)
            .finish_non_exhaustive()
    }
}

/// Client for the realtime reporting API of a single property.
pub struct AnalyticsClient {
    client: Client,
    report_url: Url,
    access_token: String,
    retry: RetryPolicy,
    max_metrics_per_request: usize,
    min_request_interval: Duration,
    row_limit: u32,
    /// Earliest instant the next request may be sent.
    next_slot: Mutex<Option<Instant>>,
}

impl AnalyticsClient {
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the property id is not numeric, the
    /// base URL does not parse, or the `reqwest::Client` cannot be built.
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let report_url = Self::report_url(&settings.base_url, &settings.property_id)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            report_url,
            access_token: settings.access_token,
            retry: RetryPolicy {
                max_attempts: settings.max_attempts,
                backoff_base_ms: settings.backoff_base_ms,
            },
            max_metrics_per_request: settings.max_metrics_per_request,
            min_request_interval: Duration::from_millis(settings.min_request_interval_ms),
            row_limit: settings.row_limit,
            next_slot: Mutex::new(None),
        })
    }

    /// `{base}properties/{id}:runRealtimeReport`, with the base normalised to
    /// end in exactly one slash.
    pub(crate) fn report_url(base_url: &str, property_id: &str) -> Result<Url, ApiError> {
        if property_id.is_empty() || !property_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ApiError::Config(format!(
                "property id must be numeric, got {property_id:?}"
            )));
        }
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        Url::parse(&format!(
            "{normalised}properties/{property_id}:runRealtimeReport"
        ))
        .map_err(|e| ApiError::Config(format!("invalid base URL '{base_url}': {e}")))
    }

    /// Fetches every requested metric for the window's dimension
    /// combinations.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Transient`] or [`ApiError::Quota`] once retries are spent.
    /// - [`ApiError::Auth`] on 401/403, without retrying.
    /// - [`ApiError::Malformed`] if a response does not match the request.
    /// - [`ApiError::Rejected`] on any other 4xx.
    pub async fn fetch(
        &self,
        query: &MetricQuery,
        window: &RunWindow,
    ) -> Result<FetchedReport, ApiError> {
        let dimensions = query.dimensions();
        let start_minutes_ago = window.bounds().whole_minutes() - 1;

        let mut chunks = Vec::new();
        for metrics in query.metric_chunks(self.max_metrics_per_request) {
            let rows = self
                .run_report(&dimensions, metrics, start_minutes_ago, self.row_limit)
                .await?;
            chunks.push(rows);
        }
        let requests = chunks.len();
        let rows = merge_rows(chunks);

        tracing::debug!(
            run_window_id = window.id,
            requests,
            rows = rows.len(),
            "realtime report fetched"
        );

        Ok(FetchedReport {
            page_dimension: query.page_dimension().to_string(),
            rows,
            fetched_at: Utc::now(),
            requests,
        })
    }

    /// Issues a minimal one-metric report to verify the credentials and
    /// property. Returns the number of rows the API reported.
    ///
    /// # Errors
    ///
    /// Same as [`AnalyticsClient::fetch`].
    pub async fn check_access(&self) -> Result<usize, ApiError> {
        let rows = self
            .run_report(
                &[COUNTRY_DIMENSION],
                &[ACCESS_CHECK_METRIC.to_string()],
                0,
                1,
            )
            .await?;
        Ok(rows.len())
    }

    async fn run_report(
        &self,
        dimensions: &[&str],
        metrics: &[String],
        start_minutes_ago: i64,
        limit: u32,
    ) -> Result<Vec<RawApiRow>, ApiError> {
        let request = RealtimeReportRequest {
            dimensions: dimensions.iter().map(|d| NamedField::new(*d)).collect(),
            metrics: metrics.iter().map(|m| NamedField::new(m.as_str())).collect(),
            minute_ranges: vec![MinuteRange {
                name: "window".to_string(),
                start_minutes_ago: start_minutes_ago.max(0),
                end_minutes_ago: 0,
            }],
            limit,
        };
        let context = format!("runRealtimeReport(metrics={})", metrics.join(","));

        let response = retry_with_backoff(self.retry, || {
            let request = &request;
            let context = context.as_str();
            async move {
                self.pace().await;
                let response = self
                    .client
                    .post(self.report_url.clone())
                    .bearer_auth(&self.access_token)
                    .json(request)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<u64>().ok());
                    let body = response.text().await.unwrap_or_default();
                    return Err(classify_status(status, &body, retry_after));
                }

                let body = response.text().await?;
                serde_json::from_str::<RealtimeReportResponse>(&body).map_err(|e| {
                    ApiError::Malformed {
                        context: context.to_string(),
                        reason: format!("invalid JSON body: {e}"),
                    }
                })
            }
        })
        .await?;

        validate_response(response, dimensions, metrics, &context)
    }

    /// Waits until the pacing interval since the previous request has passed.
    async fn pace(&self) {
        if self.min_request_interval.is_zero() {
            return;
        }
        let wait_until = {
            let mut next = self
                .next_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.min_request_interval);
            slot
        };
        tokio::time::sleep_until(wait_until).await;
    }
}

/// Maps a non-2xx response onto the error taxonomy.
pub(crate) fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after_secs: Option<u64>,
) -> ApiError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let exhausted = envelope
        .as_ref()
        .and_then(|e| e.error.status.as_deref())
        .is_some_and(|s| s == "RESOURCE_EXHAUSTED");
    let message = envelope
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect());
    let code = status.as_u16();

    if status == StatusCode::TOO_MANY_REQUESTS || exhausted {
        ApiError::Quota {
            attempts: 1,
            message,
            retry_after_secs,
        }
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ApiError::Auth {
            status: code,
            message,
        }
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiError::Transient {
            attempts: 1,
            message: format!("HTTP {code}: {message}"),
        }
    } else {
        ApiError::Rejected {
            status: code,
            message,
        }
    }
}

/// Checks a response against the request and flattens it into
/// [`RawApiRow`]s.
pub(crate) fn validate_response(
    response: RealtimeReportResponse,
    dimensions: &[&str],
    metrics: &[String],
    context: &str,
) -> Result<Vec<RawApiRow>, ApiError> {
    let malformed = |reason: String| ApiError::Malformed {
        context: context.to_string(),
        reason,
    };

    let has_headers =
        !response.dimension_headers.is_empty() || !response.metric_headers.is_empty();
    if !has_headers && response.rows.is_empty() {
        return Ok(Vec::new());
    }

    let dimension_headers: Vec<&str> = response
        .dimension_headers
        .iter()
        .map(|h| h.name.as_str())
        .collect();
    if dimension_headers != dimensions {
        return Err(malformed(format!(
            "dimension headers {dimension_headers:?} do not match requested {dimensions:?}"
        )));
    }
    let metric_headers: Vec<&str> = response
        .metric_headers
        .iter()
        .map(|h| h.name.as_str())
        .collect();
    if metric_headers != metrics {
        return Err(malformed(format!(
            "metric headers {metric_headers:?} do not match requested {metrics:?}"
        )));
    }

    let returned = response.rows.len();
    if let Some(row_count) = response.row_count {
        let total = usize::try_from(row_count)
            .map_err(|_| malformed(format!("negative rowCount {row_count}")))?;
        if total < returned {
            return Err(malformed(format!(
                "rowCount {total} is smaller than the {returned} rows returned"
            )));
        }
        if total > returned {
            tracing::warn!(
                context,
                row_count = total,
                returned,
                "realtime report truncated by row limit"
            );
        }
    }

    response
        .rows
        .into_iter()
        .enumerate()
        .map(|(idx, row)| {
            if row.dimension_values.len() != dimensions.len()
                || row.metric_values.len() != metrics.len()
            {
                return Err(malformed(format!(
                    "row {idx} has {} dimension and {} metric values, expected {} and {}",
                    row.dimension_values.len(),
                    row.metric_values.len(),
                    dimensions.len(),
                    metrics.len()
                )));
            }
            Ok(RawApiRow {
                dimensions: dimensions
                    .iter()
                    .zip(row.dimension_values)
                    .map(|(name, cell)| ((*name).to_string(), cell.value.unwrap_or_default()))
                    .collect(),
                metrics: metrics
                    .iter()
                    .zip(row.metric_values)
                    .map(|(name, cell)| (name.clone(), cell.value.unwrap_or_default()))
                    .collect(),
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
