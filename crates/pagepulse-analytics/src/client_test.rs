use super::*;
use crate::error::ApiErrorKind;
use crate::types::{CellValue, MetricHeader, ReportRow};

fn cells(values: &[&str]) -> Vec<CellValue> {
    values
        .iter()
        .map(|v| CellValue {
            value: Some((*v).to_string()),
        })
        .collect()
}

fn row(dims: &[&str], metrics: &[&str]) -> ReportRow {
    ReportRow {
        dimension_values: cells(dims),
        metric_values: cells(metrics),
    }
}

fn response(dims: &[&str], metrics: &[&str], rows: Vec<ReportRow>) -> RealtimeReportResponse {
    RealtimeReportResponse {
        dimension_headers: dims.iter().map(|d| NamedField::new(*d)).collect(),
        metric_headers: metrics
            .iter()
            .map(|m| MetricHeader {
                name: (*m).to_string(),
                metric_type: Some("TYPE_INTEGER".to_string()),
            })
            .collect(),
        rows,
        row_count: None,
    }
}

fn metrics(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

#[test]
fn report_url_appends_property_path() {
    let url = AnalyticsClient::report_url("https://analyticsdata.googleapis.com/v1beta", "123456")
        .unwrap();
    assert_eq!(
        url.as_str(),
        "https://analyticsdata.googleapis.com/v1beta/properties/123456:runRealtimeReport"
    );
}

#[test]
fn report_url_rejects_non_numeric_property() {
    let err = AnalyticsClient::report_url("https://example.test/", "properties/1").unwrap_err();
    assert!(matches!(err, ApiError::Config(_)));
}

#[test]
fn too_many_requests_is_quota_with_hint() {
    let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "", Some(12));
    assert!(matches!(
        err,
        ApiError::Quota {
            retry_after_secs: Some(12),
            ..
        }
    ));
}

#[test]
fn resource_exhausted_on_forbidden_is_quota() {
    let body = r#"{"error":{"code":403,"message":"Exhausted property tokens per day","status":"RESOURCE_EXHAUSTED"}}"#;
    let err = classify_status(StatusCode::FORBIDDEN, body, None);
    assert_eq!(err.kind(), ApiErrorKind::Quota);
    assert!(err.to_string().contains("Exhausted property tokens per day"));
}

#[test]
fn unauthorized_and_forbidden_are_auth() {
    let body = r#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#;
    assert_eq!(
        classify_status(StatusCode::UNAUTHORIZED, body, None).kind(),
        ApiErrorKind::Auth
    );
    assert_eq!(
        classify_status(StatusCode::FORBIDDEN, "denied", None).kind(),
        ApiErrorKind::Auth
    );
}

#[test]
fn server_errors_are_transient() {
    assert_eq!(
        classify_status(StatusCode::SERVICE_UNAVAILABLE, "", None).kind(),
        ApiErrorKind::Transient
    );
    assert_eq!(
        classify_status(StatusCode::REQUEST_TIMEOUT, "", None).kind(),
        ApiErrorKind::Transient
    );
}

#[test]
fn bad_request_is_rejected() {
    let err = classify_status(StatusCode::BAD_REQUEST, "Field foo is not valid", None);
    assert!(matches!(err, ApiError::Rejected { status: 400, .. }));
    assert_eq!(err.kind(), ApiErrorKind::Malformed);
}

#[test]
fn validate_flattens_rows_and_fills_missing_values() {
    let mut resp = response(
        &["unifiedScreenName", "country"],
        &["activeUsers"],
        vec![row(&["/home", "US"], &["4"])],
    );
    resp.rows[0].dimension_values[1].value = None;
    let rows = validate_response(
        resp,
        &["unifiedScreenName", "country"],
        &metrics(&["activeUsers"]),
        "test",
    )
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].dimension("unifiedScreenName"), Some("/home"));
    assert_eq!(rows[0].dimension("country"), Some(""));
    assert_eq!(rows[0].metrics, vec![("activeUsers".to_string(), "4".to_string())]);
}

#[test]
fn validate_accepts_empty_body() {
    let rows = validate_response(
        RealtimeReportResponse::default(),
        &["pagePath", "country"],
        &metrics(&["activeUsers"]),
        "test",
    )
    .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn validate_rejects_header_mismatch() {
    let resp = response(&["pagePath", "country"], &["eventCount"], vec![]);
    let err = validate_response(
        resp,
        &["pagePath", "country"],
        &metrics(&["activeUsers"]),
        "test",
    )
    .unwrap_err();
    assert!(matches!(err, ApiError::Malformed { .. }));
}

#[test]
fn validate_rejects_short_rows() {
    let resp = response(
        &["pagePath", "country"],
        &["activeUsers", "eventCount"],
        vec![row(&["/a", "US"], &["1"])],
    );
    let err = validate_response(
        resp,
        &["pagePath", "country"],
        &metrics(&["activeUsers", "eventCount"]),
        "test",
    )
    .unwrap_err();
    assert!(err.to_string().contains("row 0"));
}

#[test]
fn validate_rejects_row_count_below_rows() {
    let mut resp = response(
        &["pagePath", "country"],
        &["activeUsers"],
        vec![row(&["/a", "US"], &["1"]), row(&["/b", "US"], &["2"])],
    );
    resp.row_count = Some(1);
    let err = validate_response(
        resp,
        &["pagePath", "country"],
        &metrics(&["activeUsers"]),
        "test",
    )
    .unwrap_err();
    assert!(matches!(err, ApiError::Malformed { .. }));
}

#[test]
fn validate_keeps_rows_when_truncated() {
    let mut resp = response(
        &["pagePath", "country"],
        &["activeUsers"],
        vec![row(&["/a", "US"], &["1"])],
    );
    resp.row_count = Some(50);
    let rows = validate_response(
        resp,
        &["pagePath", "country"],
        &metrics(&["activeUsers"]),
        "test",
    )
    .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn settings_debug_redacts_token() {
    let settings = ClientSettings {
        property_id: "1".to_string(),
        access_token: "ya29.secret".to_string(),
        base_url: "https://example.test/".to_string(),
        timeout_secs: 5,
        user_agent: "test".to_string(),
        max_attempts: 1,
        backoff_base_ms: 0,
        max_metrics_per_request: 10,
        min_request_interval_ms: 0,
        row_limit: 10,
    };
    assert!(!format!("{settings:?}").contains("ya29.secret"));
}
