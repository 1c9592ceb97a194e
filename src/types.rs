use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Raw scrap record as returned by the remote source
pub type RawRecord = Map<String, Value>;

/// One value of a normalized row.
///
/// `Missing` marks a column the record never carried, as opposed to `Null`,
/// where the source sent an explicit JSON null.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Missing,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
}

impl Cell {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            // Every JSON number serde_json parses fits an f64
            Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Null),
            Value::String(s) => Cell::Text(s.clone()),
            Value::Array(items) => Cell::List(items.clone()),
            // Objects are flattened by the ingestor and never reach a cell
            Value::Object(_) => Cell::Null,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Missing | Cell::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Missing => write!(f, "<missing>"),
            Cell::Null => write!(f, "null"),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Text(s) => write!(f, "{s:?}"),
            Cell::List(items) => write!(f, "{}", Value::Array(items.clone())),
        }
    }
}

/// Core trait that every scrap record source must implement
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Short name used in logs
    fn source_name(&self) -> &str;

    /// Fetch one batch of raw records
    async fn fetch_records(&self) -> Result<Vec<RawRecord>>;
}
