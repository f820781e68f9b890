//! Live filtering of the profiled column list

use crate::profile::FeatureColumn;

/// Result of applying a query to the column list
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// Columns whose name contains the query, in report order
    Matches(Vec<FeatureColumn>),
    /// The query was cleared: the caller must fetch a fresh profile and
    /// replace the whole report instead of restoring a cached list.
    Refetch,
}

impl FilterOutcome {
    pub fn is_refetch(&self) -> bool {
        matches!(self, FilterOutcome::Refetch)
    }
}

/// Case-sensitive substring filter over column names.
pub fn filter_columns(query: &str, columns: &[FeatureColumn]) -> FilterOutcome {
    if query.is_empty() {
        return FilterOutcome::Refetch;
    }
    FilterOutcome::Matches(
        columns
            .iter()
            .filter(|column| column.name.contains(query))
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{FeatureSeries, FeatureType};

    fn column(key: usize, name: &str) -> FeatureColumn {
        FeatureColumn {
            key,
            name: name.to_string(),
            inferred_type: FeatureType::Text,
            data_type: None,
            missing_ratio: None,
            distinct_count: None,
            extension: None,
            series: FeatureSeries::None,
        }
    }

    fn names(outcome: &FilterOutcome) -> Vec<&str> {
        match outcome {
            FilterOutcome::Matches(cols) => cols.iter().map(|c| c.name.as_str()).collect(),
            FilterOutcome::Refetch => panic!("expected matches"),
        }
    }

    #[test]
    fn substring_match_keeps_order() {
        let cols = vec![column(0, "abcd"), column(1, "xyz")];
        assert_eq!(names(&filter_columns("abc", &cols)), vec!["abcd"]);

        let cols = vec![
            column(0, "loan_amount"),
            column(1, "age"),
            column(2, "amount_due"),
        ];
        assert_eq!(
            names(&filter_columns("amount", &cols)),
            vec!["loan_amount", "amount_due"]
        );
    }

    #[test]
    fn match_is_case_sensitive() {
        let cols = vec![column(0, "Balance"), column(1, "balance_avg")];
        assert_eq!(names(&filter_columns("bal", &cols)), vec!["balance_avg"]);
    }

    #[test]
    fn empty_query_requests_refetch() {
        let cols = vec![column(0, "abcd")];
        assert!(filter_columns("", &cols).is_refetch());
        assert!(filter_columns("", &[]).is_refetch());
    }

    #[test]
    fn no_match_is_empty_not_refetch() {
        let cols = vec![column(0, "abcd")];
        assert_eq!(filter_columns("zzz", &cols), FilterOutcome::Matches(vec![]));
    }
}
