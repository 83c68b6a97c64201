//! The realtime report query: which dimensions and metrics to request.

use serde::Serialize;
use thiserror::Error;

/// API name of the country dimension. Always requested.
pub const COUNTRY_DIMENSION: &str = "country";

/// Default page dimension; `pagePath` is the common alternative.
pub const DEFAULT_PAGE_DIMENSION: &str = "unifiedScreenName";

/// Metrics requested when none are configured.
pub const DEFAULT_METRICS: [&str; 4] =
    ["activeUsers", "screenPageViews", "eventCount", "keyEvents"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("at least one metric must be requested")]
    NoMetrics,

    #[error("blank dimension or metric name")]
    BlankName,

    #[error("metric {0} is listed more than once")]
    DuplicateMetric(String),

    #[error("page dimension must not be the country dimension")]
    PageDimensionIsCountry,
}

/// Dimensions and metrics requested for every run window.
///
/// Built once from configuration; the dimension pair is fixed to
/// `(page, country)` because records are keyed on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricQuery {
    page_dimension: String,
    metrics: Vec<String>,
}

impl MetricQuery {
    /// # Errors
    ///
    /// Returns [`QueryError`] if `metrics` is empty, contains a blank or
    /// repeated name, or the page dimension collides with `country`.
    pub fn new<I, S>(page_dimension: &str, metrics: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let page_dimension = page_dimension.trim();
        if page_dimension.is_empty() {
            return Err(QueryError::BlankName);
        }
        if page_dimension == COUNTRY_DIMENSION {
            return Err(QueryError::PageDimensionIsCountry);
        }

        let mut seen: Vec<String> = Vec::new();
        for metric in metrics {
            let metric: String = metric.into().trim().to_string();
            if metric.is_empty() {
                return Err(QueryError::BlankName);
            }
            if seen.contains(&metric) {
                return Err(QueryError::DuplicateMetric(metric));
            }
            seen.push(metric);
        }
        if seen.is_empty() {
            return Err(QueryError::NoMetrics);
        }

        Ok(Self {
            page_dimension: page_dimension.to_string(),
            metrics: seen,
        })
    }

    #[must_use]
    pub fn page_dimension(&self) -> &str {
        &self.page_dimension
    }

    /// Requested dimensions in request order: page first, then country.
    #[must_use]
    pub fn dimensions(&self) -> [&str; 2] {
        [self.page_dimension.as_str(), COUNTRY_DIMENSION]
    }

    #[must_use]
    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Metric list split to respect a per-request cap. A cap of zero is
    /// treated as one.
    pub fn metric_chunks(&self, max_per_request: usize) -> impl Iterator<Item = &[String]> {
        self.metrics.chunks(max_per_request.max(1))
    }
}

impl Default for MetricQuery {
    fn default() -> Self {
        Self {
            page_dimension: DEFAULT_PAGE_DIMENSION.to_string(),
            metrics: DEFAULT_METRICS.iter().map(ToString::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query_requests_page_and_country() {
        let query = MetricQuery::default();
        assert_eq!(query.dimensions(), ["unifiedScreenName", "country"]);
        assert_eq!(query.metrics().len(), 4);
    }

    #[test]
    fn new_trims_and_rejects_duplicates() {
        let err = MetricQuery::new("pagePath", ["activeUsers", " activeUsers "]).unwrap_err();
        assert_eq!(err, QueryError::DuplicateMetric("activeUsers".to_string()));
    }

    #[test]
    fn new_rejects_empty_metric_list() {
        let err = MetricQuery::new("pagePath", Vec::<String>::new()).unwrap_err();
        assert_eq!(err, QueryError::NoMetrics);
    }

    #[test]
    fn new_rejects_country_as_page_dimension() {
        let err = MetricQuery::new("country", ["activeUsers"]).unwrap_err();
        assert_eq!(err, QueryError::PageDimensionIsCountry);
    }

    #[test]
    fn metric_chunks_respects_cap() {
        let query = MetricQuery::default();
        let chunks: Vec<&[String]> = query.metric_chunks(3).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 3);
        assert_eq!(chunks[1], ["keyEvents".to_string()]);
    }

    #[test]
    fn metric_chunks_treats_zero_cap_as_one() {
        let query = MetricQuery::new("pagePath", ["activeUsers", "eventCount"]).unwrap();
        assert_eq!(query.metric_chunks(0).count(), 2);
    }
}
