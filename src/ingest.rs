//! Record ingestion
//!
//! Turns a batch of schema-less JSON records into a [`NormalizedTable`]:
//! one row per record, one column per distinct (flattened) field name seen
//! anywhere in the batch.

use crate::constants::NESTED_SEPARATOR;
use crate::error::{Result, ScrapError};
use crate::types::{Cell, RawRecord};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// The cells of one record, aligned with [`NormalizedTable::columns`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub cells: Vec<Cell>,
}

/// A batch of records with a fixed column set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedTable {
    /// Column names in first-seen order
    columns: Vec<String>,
    rows: Vec<NormalizedRow>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl NormalizedTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Cell at (`row`, `column`), `None` if either is out of range
    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.cells.get(col))
    }

    fn intern_column(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.columns.len();
        self.columns.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }
}

/// Flatten one record into `(column, cell)` pairs, depth first, in field order.
fn flatten_record(record: &RawRecord) -> Vec<(String, Cell)> {
    let mut out = Vec::with_capacity(record.len());
    for (key, value) in record {
        flatten_value(key.clone(), value, &mut out);
    }
    out
}

fn flatten_value(path: String, value: &Value, out: &mut Vec<(String, Cell)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let child = format!("{path}{NESTED_SEPARATOR}{key}");
                flatten_value(child, nested, out);
            }
        }
        other => out.push((path, Cell::from_json(other))),
    }
}

/// Normalize a batch of raw records.
///
/// `None` means no batch was ever supplied and fails with
/// [`ScrapError::NoData`]; an empty batch yields an empty table.
#[instrument(skip(records), fields(records = records.map_or(0, |r| r.len())))]
pub fn normalize(records: Option<&[RawRecord]>) -> Result<NormalizedTable> {
    let records = records.ok_or_else(|| {
        ScrapError::NoData("no records were ingested; fetch a batch first".into())
    })?;

    let mut table = NormalizedTable::default();
    let flattened: Vec<Vec<(String, Cell)>> = records.iter().map(flatten_record).collect();

    // First pass fixes the column set so every row comes out the same width
    let positions: Vec<Vec<usize>> = flattened
        .iter()
        .map(|fields| {
            fields
                .iter()
                .map(|(name, _)| table.intern_column(name))
                .collect()
        })
        .collect();

    let width = table.columns.len();
    table.rows = flattened
        .into_iter()
        .zip(positions)
        .map(|(fields, cols)| {
            let mut cells = vec![Cell::Missing; width];
            for ((_, cell), col) in fields.into_iter().zip(cols) {
                cells[col] = cell;
            }
            NormalizedRow { cells }
        })
        .collect();

    debug!(
        "Normalized {} records into {} columns",
        table.rows.len(),
        table.columns.len()
    );
    Ok(table)
}
