//! Normalized operation results.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The per-operation result shape delivered to callers.
///
/// Serialization round-trips exactly, so a cached entry reproduces the shape
/// the executor originally produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum QueryResult {
    /// All rows of a read.
    Rows(Vec<Json>),
    /// The first row, if any.
    Row(Option<Json>),
    /// An affected-row or COUNT value.
    Count(Option<i64>),
    /// An existence check.
    Flag(bool),
    /// A numeric aggregate, absent when the source set was empty.
    Scalar(Option<f64>),
    /// A page of rows plus the unpaged total.
    Page {
        /// Rows of the requested page.
        items: Vec<Json>,
        /// Unpaged row count.
        count: i64,
    },
    /// A single extracted value, e.g. the generated key after an insert.
    Value(Json),
    /// No result payload (DDL).
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(result: &QueryResult) -> QueryResult {
        let payload = serde_json::to_string(result).unwrap();
        serde_json::from_str(&payload).unwrap()
    }

    #[test]
    fn test_serde_round_trip_preserves_shape() {
        let cases = vec![
            QueryResult::Rows(vec![json!({"id": 1}), json!({"id": 2})]),
            QueryResult::Row(Some(json!({"id": 1}))),
            QueryResult::Row(None),
            QueryResult::Count(Some(12)),
            QueryResult::Count(None),
            QueryResult::Flag(true),
            QueryResult::Scalar(Some(19.5)),
            QueryResult::Scalar(None),
            QueryResult::Page {
                items: vec![json!({"id": 1})],
                count: 40,
            },
            QueryResult::Value(json!(7)),
            QueryResult::Empty,
        ];
        for case in cases {
            assert_eq!(round_trip(&case), case);
        }
    }
}
