//! Shapes a row/column preview page into a display table model

use crate::{DataProbeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Display width given to the pinned edge columns
pub const PINNED_COLUMN_WIDTH: u32 = 150;

/// One page of raw preview rows as returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewPayload {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Total rows in the dataset, when the service reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// Page selector for the preview endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_num: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self {
            page_num: 1,
            page_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pin {
    #[default]
    None,
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub title: String,
    pub key: String,
    pub pinned: Pin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl ColumnSpec {
    fn new(header: &str) -> Self {
        Self {
            title: header.to_string(),
            key: header.to_string(),
            pinned: Pin::None,
            width: None,
        }
    }
}

/// Cells of one row keyed by header, in header order
pub type RowRecord = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayTable {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<RowRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
}

/// Build the display table for a preview page.
///
/// Tables with two or more columns get the first column pinned to the start
/// and the last pinned to the end. A single-column table is left unpinned.
pub fn shape_preview(payload: &PreviewPayload) -> Result<DisplayTable> {
    if payload.headers.is_empty() {
        return Err(DataProbeError::MalformedPreview(
            "preview has no headers".to_string(),
        ));
    }

    let mut rows = Vec::with_capacity(payload.rows.len());
    for (index, row) in payload.rows.iter().enumerate() {
        if row.len() != payload.headers.len() {
            return Err(DataProbeError::MalformedPreview(format!(
                "row {} has {} cells, expected {}",
                index,
                row.len(),
                payload.headers.len()
            )));
        }
        let record: RowRecord = payload
            .headers
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect();
        rows.push(record);
    }

    let mut columns: Vec<ColumnSpec> = payload.headers.iter().map(|h| ColumnSpec::new(h)).collect();
    pin_edges(&mut columns);

    Ok(DisplayTable {
        columns,
        rows,
        total_rows: payload.count,
    })
}

fn pin_edges(columns: &mut [ColumnSpec]) {
    for column in columns.iter_mut() {
        column.pinned = Pin::None;
        column.width = None;
    }
    if columns.len() < 2 {
        return;
    }
    if let Some(first) = columns.first_mut() {
        first.pinned = Pin::Start;
        first.width = Some(PINNED_COLUMN_WIDTH);
    }
    if let Some(last) = columns.last_mut() {
        last.pinned = Pin::End;
        last.width = Some(PINNED_COLUMN_WIDTH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(headers: &[&str], rows: Vec<Vec<Value>>) -> PreviewPayload {
        PreviewPayload {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
            count: None,
        }
    }

    #[test]
    fn pins_first_and_last_columns() {
        let p = payload(
            &["id", "age", "city"],
            vec![vec![json!(1), json!(34), json!("Oslo")]],
        );
        let table = shape_preview(&p).unwrap();

        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[0].pinned, Pin::Start);
        assert_eq!(table.columns[0].width, Some(PINNED_COLUMN_WIDTH));
        assert_eq!(table.columns[1].pinned, Pin::None);
        assert_eq!(table.columns[1].width, None);
        assert_eq!(table.columns[2].pinned, Pin::End);
        assert_eq!(table.columns[2].width, Some(PINNED_COLUMN_WIDTH));
        assert_eq!(table.columns[1].title, "age");
        assert_eq!(table.columns[1].key, "age");
    }

    #[test]
    fn rows_keyed_by_header_without_coercion() {
        let p = payload(
            &["id", "score"],
            vec![
                vec![json!("007"), json!(null)],
                vec![json!(8), json!(2.5)],
            ],
        );
        let table = shape_preview(&p).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["id"], json!("007"));
        assert_eq!(table.rows[0]["score"], Value::Null);
        assert_eq!(table.rows[1]["score"], json!(2.5));
        let keys: Vec<_> = table.rows[1].keys().cloned().collect();
        assert_eq!(keys, vec!["id", "score"]);
    }

    #[test]
    fn empty_headers_rejected() {
        let err = shape_preview(&payload(&[], vec![])).unwrap_err();
        assert!(matches!(err, DataProbeError::MalformedPreview(_)));
    }

    #[test]
    fn ragged_row_rejected() {
        let p = payload(&["a", "b"], vec![vec![json!(1)]]);
        let err = shape_preview(&p).unwrap_err();
        assert!(err.to_string().contains("row 0 has 1 cells, expected 2"));
    }

    #[test]
    fn single_column_left_unpinned() {
        let table = shape_preview(&payload(&["only"], vec![vec![json!(1)]])).unwrap();
        assert_eq!(table.columns[0].pinned, Pin::None);
        assert_eq!(table.columns[0].width, None);
    }

    #[test]
    fn reshaping_a_different_payload_repins() {
        let wide = shape_preview(&payload(&["a", "b", "c"], vec![])).unwrap();
        let narrow = shape_preview(&payload(&["x", "y"], vec![])).unwrap();

        assert_eq!(wide.columns[2].pinned, Pin::End);
        assert_eq!(narrow.columns[0].pinned, Pin::Start);
        assert_eq!(narrow.columns[1].pinned, Pin::End);
    }

    #[test]
    fn total_row_count_passes_through() {
        let mut p = payload(&["a", "b"], vec![]);
        p.count = Some(4521);
        assert_eq!(shape_preview(&p).unwrap().total_rows, Some(4521));
    }
}
