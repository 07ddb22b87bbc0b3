//! Tabular query results shared by adapters and caches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows returned by a source fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names, in source order.
    pub columns: Vec<String>,
    /// Rows as JSON values (usually objects keyed by column).
    pub rows: Vec<Value>,
    /// When the rows were fetched.
    pub fetched_at: DateTime<Utc>,
}

impl QueryResult {
    /// Creates a result fetched now.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Value>) -> Self {
        Self {
            columns,
            rows,
            fetched_at: Utc::now(),
        }
    }

    /// Creates a result whose columns are the keys of the first object row.
    #[must_use]
    pub fn from_rows(rows: Vec<Value>) -> Self {
        let columns = rows
            .first()
            .and_then(Value::as_object)
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self::new(columns, rows)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn columns_inferred_from_first_row() {
        let result = QueryResult::from_rows(vec![json!({"b": 1, "a": 2}), json!({"c": 3})]);
        assert_eq!(result.columns, vec!["a", "b"]);
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn no_rows_no_columns() {
        assert!(QueryResult::from_rows(Vec::new()).columns.is_empty());
    }
}
