use std::collections::HashMap;

use crate::types::RawApiRow;

/// Joins the row sets of several metric chunks into one row per dimension
/// tuple.
///
/// Each chunk returns the same dimension columns with a disjoint metric
/// subset. A row is merged into the first earlier row with identical
/// dimensions that does not already carry its metrics; otherwise it starts a
/// new row. Duplicate dimension tuples within one chunk therefore stay
/// separate and are summed later by the transformer. First-seen order is
/// preserved.
#[must_use]
pub fn merge_rows<I>(chunks: I) -> Vec<RawApiRow>
where
    I: IntoIterator<Item = Vec<RawApiRow>>,
{
    let mut merged: Vec<RawApiRow> = Vec::new();
    let mut slots: HashMap<Vec<(String, String)>, Vec<usize>> = HashMap::new();

    for chunk in chunks {
        for row in chunk {
            let candidates = slots.entry(row.dimensions.clone()).or_default();
            let target = candidates.iter().copied().find(|&idx| {
                row.metrics
                    .iter()
                    .all(|(name, _)| !merged[idx].has_metric(name))
            });
            match target {
                Some(idx) => merged[idx].metrics.extend(row.metrics),
                None => {
                    candidates.push(merged.len());
                    merged.push(row);
                }
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn single_chunk_passes_through_unchanged() {
        let rows = vec![row("/a", "US", &[("activeUsers", "1")])];
        assert_eq!(merge_rows([rows.clone()]), rows);
    }

    #[test]
    fn chunks_join_on_dimension_tuple() {
        let first = vec![
            row("/a", "US", &[("activeUsers", "3")]),
            row("/b", "JP", &[("activeUsers", "1")]),
        ];
        let second = vec![
            row("/b", "JP", &[("eventCount", "7")]),
            row("/a", "US", &[("eventCount", "9")]),
        ];
        let merged = merge_rows([first, second]);
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged[0],
            row("/a", "US", &[("activeUsers", "3"), ("eventCount", "9")])
        );
        assert_eq!(
            merged[1],
            row("/b", "JP", &[("activeUsers", "1"), ("eventCount", "7")])
        );
    }

    #[test]
    fn duplicates_within_a_chunk_stay_separate() {
        let first = vec![
            row("/a", "US", &[("activeUsers", "2")]),
            row("/a", "US", &[("activeUsers", "5")]),
        ];
        let second = vec![
            row("/a", "US", &[("eventCount", "1")]),
            row("/a", "US", &[("eventCount", "4")]),
        ];
        let merged = merge_rows([first, second]);
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged[0],
            row("/a", "US", &[("activeUsers", "2"), ("eventCount", "1")])
        );
        assert_eq!(
            merged[1],
            row("/a", "US", &[("activeUsers", "5"), ("eventCount", "4")])
        );
    }

    #[test]
    fn row_missing_from_a_later_chunk_keeps_partial_metrics() {
        let first = vec![row("/a", "US", &[("activeUsers", "2")])];
        let second = vec![row("/z", "FR", &[("eventCount", "1")])];
        let merged = merge_rows([first, second]);
        assert_eq!(merged.len(), 2);
        assert!(!merged[0].has_metric("eventCount"));
        assert!(!merged[1].has_metric("activeUsers"));
    }
}
