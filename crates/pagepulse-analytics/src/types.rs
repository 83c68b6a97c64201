//! Wire types for the `runRealtimeReport` endpoint plus the flattened row
//! shape handed to the transformer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{ "name": "..." }`, used for both dimensions and metrics in requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedField {
    pub name: String,
}

impl NamedField {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinuteRange {
    pub name: String,
    pub start_minutes_ago: i64,
    pub end_minutes_ago: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeReportRequest {
    pub dimensions: Vec<NamedField>,
    pub metrics: Vec<NamedField>,
    pub minute_ranges: Vec<MinuteRange>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeReportResponse {
    #[serde(default)]
    pub dimension_headers: Vec<NamedField>,
    #[serde(default)]
    pub metric_headers: Vec<MetricHeader>,
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default)]
    pub row_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricHeader {
    pub name: String,
    #[serde(rename = "type", default)]
    pub metric_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    #[serde(default)]
    pub dimension_values: Vec<CellValue>,
    #[serde(default)]
    pub metric_values: Vec<CellValue>,
}

/// A single cell. The API omits `value` for empty dimension values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CellValue {
    #[serde(default)]
    pub value: Option<String>,
}

/// Google-style error envelope: `{ "error": { "code", "message", "status" } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// One report row with header names attached: `(name, raw value)` pairs in
/// request order. Dimension values the API omitted are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawApiRow {
    pub dimensions: Vec<(String, String)>,
    pub metrics: Vec<(String, String)>,
}

impl RawApiRow {
    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn has_metric(&self, name: &str) -> bool {
        self.metrics.iter().any(|(n, _)| n == name)
    }
}

/// Every row returned for one run window, merged across metric chunks.
#[derive(Debug, Clone)]
pub struct FetchedReport {
    /// The page dimension the report was keyed on.
    pub page_dimension: String,
    pub rows: Vec<RawApiRow>,
    pub fetched_at: DateTime<Utc>,
    /// Number of logical report requests issued (one per metric chunk).
    pub requests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_camel_case_keys() {
        let req = RealtimeReportRequest {
            dimensions: vec![NamedField::new("unifiedScreenName"), NamedField::new("country")],
            metrics: vec![NamedField::new("activeUsers")],
            minute_ranges: vec![MinuteRange {
                name: "window".to_string(),
                start_minutes_ago: 4,
                end_minutes_ago: 0,
            }],
            limit: 10_000,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["minuteRanges"][0]["startMinutesAgo"], 4);
        assert_eq!(json["dimensions"][1]["name"], "country");
        assert_eq!(json["limit"], 10_000);
    }

    #[test]
    fn response_tolerates_missing_rows_and_values() {
        let body = serde_json::json!({
            "dimensionHeaders": [{ "name": "unifiedScreenName" }, { "name": "country" }],
            "metricHeaders": [{ "name": "activeUsers", "type": "TYPE_INTEGER" }],
            "rows": [{
                "dimensionValues": [{}, { "value": "Japan" }],
                "metricValues": [{ "value": "3" }]
            }]
        });
        let resp: RealtimeReportResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.rows.len(), 1);
        assert!(resp.rows[0].dimension_values[0].value.is_none());
        assert!(resp.row_count.is_none());

        let empty: RealtimeReportResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.rows.is_empty());
    }
}
