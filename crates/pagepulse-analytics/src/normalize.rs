//! Transforms merged report rows into [`RawMetricRecord`]s.
//!
//! The transformation is pure: the same report and window always produce the
//! same records in the same order, sorted by `(page_path, country)`.

use std::collections::BTreeMap;

use pagepulse_core::{RawMetricRecord, RunWindow, COUNTRY_DIMENSION, NOT_SET};

use crate::types::{FetchedReport, RawApiRow};

/// Largest float that still represents every integer below it exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Converts an API field name to `snake_case`.
///
/// `screenPageViews` becomes `screen_page_views`; separators such as `.`,
/// `-`, `:` and spaces become underscores. Runs of uppercase letters are kept
/// together, so `sessionsPerUser` and `userID` map to `sessions_per_user` and
/// `user_id`.
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '.' | '-' | ' ' | ':' | '_') {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let starts_word = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if starts_word && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out.trim_end_matches('_').to_string()
}

/// Where a metric's value lands on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MetricSlot {
    ActiveUsers,
    PageViews,
    EventCount,
    Conversions,
    Extra(String),
}

impl MetricSlot {
    fn for_metric(api_name: &str) -> Self {
        match to_snake_case(api_name).as_str() {
            "active_users" => MetricSlot::ActiveUsers,
            "screen_page_views" | "page_views" => MetricSlot::PageViews,
            "event_count" => MetricSlot::EventCount,
            "key_events" | "conversions" => MetricSlot::Conversions,
            other => MetricSlot::Extra(other.to_string()),
        }
    }

    fn column_name(&self) -> &str {
        match self {
            MetricSlot::ActiveUsers => "active_users",
            MetricSlot::PageViews => "page_views",
            MetricSlot::EventCount => "event_count",
            MetricSlot::Conversions => "conversions",
            MetricSlot::Extra(name) => name,
        }
    }
}

/// Parses a raw metric value.
///
/// Returns `Some(0)` for an empty value, `Some(n)` for a non-negative integer
/// or integral float, and `None` for anything else.
fn coerce_metric(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return (n >= 0).then_some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= MAX_EXACT_FLOAT {
        #[allow(clippy::cast_possible_truncation)]
        return Some(f as i64);
    }
    None
}

fn dimension_value(row: &RawApiRow, name: &str) -> String {
    match row.dimension(name).map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NOT_SET.to_string(),
    }
}

#[derive(Default)]
struct Accumulator {
    active_users: i64,
    page_views: i64,
    event_count: i64,
    conversions: i64,
    extra_metrics: BTreeMap<String, i64>,
    flagged: Vec<String>,
}

impl Accumulator {
    fn add(&mut self, slot: &MetricSlot, value: i64) {
        let target = match slot {
            MetricSlot::ActiveUsers => &mut self.active_users,
            MetricSlot::PageViews => &mut self.page_views,
            MetricSlot::EventCount => &mut self.event_count,
            MetricSlot::Conversions => &mut self.conversions,
            MetricSlot::Extra(name) => self.extra_metrics.entry(name.clone()).or_insert(0),
        };
        *target = target.saturating_add(value);
    }

    fn flag(&mut self, name: &str) {
        if !self.flagged.iter().any(|f| f == name) {
            self.flagged.push(name.to_string());
        }
    }
}

/// Normalizes a fetched report into records for `window`.
///
/// Rows sharing a `(page_path, country)` key are summed; metrics that could
/// not be coerced are stored as `0` and listed in `flagged_metrics`.
#[must_use]
pub fn normalize(report: &FetchedReport, window: &RunWindow) -> Vec<RawMetricRecord> {
    let mut grouped: BTreeMap<(String, String), Accumulator> = BTreeMap::new();

    for row in &report.rows {
        let key = (
            dimension_value(row, &report.page_dimension),
            dimension_value(row, COUNTRY_DIMENSION),
        );
        let acc = grouped.entry(key).or_default();

        for (api_name, raw) in &row.metrics {
            let slot = MetricSlot::for_metric(api_name);
            match coerce_metric(raw) {
                Some(value) => acc.add(&slot, value),
                None => {
                    tracing::debug!(
                        metric = %api_name,
                        value = %raw,
                        "non-integer metric value coerced to 0"
                    );
                    acc.add(&slot, 0);
                    acc.flag(slot.column_name());
                }
            }
        }
    }

    grouped
        .into_iter()
        .map(|((page_path, country), mut acc)| {
            acc.flagged.sort();
            RawMetricRecord {
                run_window_id: window.id,
                page_path,
                country,
                active_users: acc.active_users,
                page_views: acc.page_views,
                event_count: acc.event_count,
                conversions: acc.conversions,
                extra_metrics: acc.extra_metrics,
                flagged_metrics: acc.flagged,
                fetched_at: report.fetched_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pagepulse_core::WindowBounds;

    use super::*;

    fn window() -> RunWindow {
        let end = Utc.with_ymd_and_hms(2026, 9, 9, 17, 5, 0).unwrap();
        RunWindow::new(7, WindowBounds::ending_at(end, chrono::Duration::minutes(5)))
    }

    fn report(rows: Vec<RawApiRow>) -> FetchedReport {
        FetchedReport {
            page_dimension: "unifiedScreenName".to_string(),
            rows,
            fetched_at: Utc.with_ymd_and_hms(2026, 9, 9, 17, 5, 2).unwrap(),
            requests: 1,
        }
    }

    fn row(page: &str, country: &str, metrics: &[(&str, &str)]) -> RawApiRow {
        RawApiRow {
            dimensions: vec![
                ("unifiedScreenName".to_string(), page.to_string()),
                ("country".to_string(), country.to_string()),
            ],
            metrics: metrics
                .iter()
                .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("screenPageViews"), "screen_page_views");
        assert_eq!(to_snake_case("activeUsers"), "active_users");
        assert_eq!(to_snake_case("keyEvents:purchase"), "key_events_purchase");
        assert_eq!(to_snake_case("userID"), "user_id");
        assert_eq!(to_snake_case("HTTPStatus"), "http_status");
        assert_eq!(to_snake_case("country"), "country");
    }

    #[test]
    fn single_row_maps_to_named_columns() {
        let records = normalize(
            &report(vec![row(
                "/iphone-preorder",
                "US",
                &[("activeUsers", "120"), ("screenPageViews", "340")],
            )]),
            &window(),
        );
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.run_window_id, 7);
        assert_eq!(rec.page_path, "/iphone-preorder");
        assert_eq!(rec.country, "US");
        assert_eq!(rec.active_users, 120);
        assert_eq!(rec.page_views, 340);
        assert_eq!(rec.event_count, 0);
        assert!(!rec.is_flagged());
        assert_eq!(rec.fetched_at, Utc.with_ymd_and_hms(2026, 9, 9, 17, 5, 2).unwrap());
    }

    #[test]
    fn key_events_land_in_conversions_and_unknown_metrics_in_extra() {
        let records = normalize(
            &report(vec![row(
                "/checkout",
                "DE",
                &[("keyEvents", "4"), ("userEngagementDuration", "95")],
            )]),
            &window(),
        );
        assert_eq!(records[0].conversions, 4);
        assert_eq!(
            records[0].extra_metrics.get("user_engagement_duration"),
            Some(&95)
        );
    }

    #[test]
    fn empty_dimension_becomes_not_set() {
        let records = normalize(
            &report(vec![row("", "  ", &[("activeUsers", "1")])]),
            &window(),
        );
        assert_eq!(records[0].page_path, NOT_SET);
        assert_eq!(records[0].country, NOT_SET);
    }

    #[test]
    fn unparseable_values_are_zeroed_and_flagged() {
        let records = normalize(
            &report(vec![row(
                "/a",
                "US",
                &[
                    ("activeUsers", "12.5"),
                    ("screenPageViews", "NaN"),
                    ("eventCount", "-3"),
                    ("keyEvents", "8.0"),
                ],
            )]),
            &window(),
        );
        let rec = &records[0];
        assert_eq!(rec.active_users, 0);
        assert_eq!(rec.page_views, 0);
        assert_eq!(rec.event_count, 0);
        assert_eq!(rec.conversions, 8);
        assert_eq!(
            rec.flagged_metrics,
            vec!["active_users", "event_count", "page_views"]
        );
    }

    #[test]
    fn empty_metric_value_is_zero_and_not_flagged() {
        let records = normalize(&report(vec![row("/a", "US", &[("activeUsers", "")])]), &window());
        assert_eq!(records[0].active_users, 0);
        assert!(!records[0].is_flagged());
    }

    #[test]
    fn duplicate_keys_are_summed_and_sorted() {
        let records = normalize(
            &report(vec![
                row("/z", "US", &[("activeUsers", "1")]),
                row("/a", "US", &[("activeUsers", "2"), ("eventCount", "x")]),
                row("/a", "US", &[("activeUsers", "5"), ("eventCount", "3")]),
            ]),
            &window(),
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].page_path, "/a");
        assert_eq!(records[0].active_users, 7);
        assert_eq!(records[0].event_count, 3);
        assert_eq!(records[0].flagged_metrics, vec!["event_count"]);
        assert_eq!(records[1].page_path, "/z");
    }

    #[test]
    fn sums_saturate_instead_of_overflowing() {
        let max = i64::MAX.to_string();
        let records = normalize(
            &report(vec![
                row("/a", "US", &[("activeUsers", max.as_str())]),
                row("/a", "US", &[("activeUsers", "10")]),
            ]),
            &window(),
        );
        assert_eq!(records[0].active_users, i64::MAX);
    }

    #[test]
    fn normalization_is_deterministic() {
        let rows = vec![
            row("/b", "FR", &[("activeUsers", "1")]),
            row("/a", "JP", &[("activeUsers", "2")]),
        ];
        let first = normalize(&report(rows.clone()), &window());
        let second = normalize(&report(rows), &window());
        assert_eq!(first, second);
    }
}
