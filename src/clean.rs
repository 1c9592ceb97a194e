//! Table cleaning
//!
//! Reduces a [`NormalizedTable`] to the chartable series: drop ditch piles,
//! derive the two-character pile group, sum the chosen measure per
//! (flightday, task_id, pile_group), then order by group and day.

use crate::constants::{DITCH_PILE, FLIGHTDAY_COLUMN, PILE_COLUMN, TASK_ID_COLUMN};
use crate::error::{Result, ScrapError};
use crate::ingest::NormalizedTable;
use crate::metrics::PipelineMetrics;
use crate::types::Cell;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

static PILE_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9]{2})").expect("valid pile group regex"));

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// What to do with a row that has no complete grouping key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UngroupablePolicy {
    /// Drop the row, log it and count it in the [`CleanReport`]
    #[default]
    Drop,
    /// Fail the whole batch
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanOptions {
    pub ungroupable: UngroupablePolicy,
    /// Re-sum rows that share (flight_day, pile_group) after task_id is dropped.
    /// Off by default: each task keeps its own row.
    pub merge_tasks: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRow {
    pub flight_day: NaiveDate,
    pub pile_group: String,
    pub measure_value: f64,
}

/// Row accounting for one cleaning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub input_rows: usize,
    pub ditch_rows: usize,
    pub ungroupable_rows: usize,
    pub output_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedTable {
    measure_column: String,
    rows: Vec<CleanedRow>,
    groups: Vec<String>,
    report: CleanReport,
}

impl CleanedTable {
    fn empty(measure_column: &str) -> Self {
        Self {
            measure_column: measure_column.to_string(),
            rows: Vec::new(),
            groups: Vec::new(),
            report: CleanReport::default(),
        }
    }

    pub fn measure_column(&self) -> &str {
        &self.measure_column
    }

    /// Rows sorted by pile group, then flight day
    pub fn rows(&self) -> &[CleanedRow] {
        &self.rows
    }

    /// Distinct pile groups in output order
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn report(&self) -> &CleanReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_for_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a CleanedRow> {
        self.rows.iter().filter(move |r| r.pile_group == group)
    }
}

/// A flightday or task_id value usable as a grouping key
#[derive(Debug, Clone)]
enum KeyPart {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl KeyPart {
    fn from_cell(cell: &Cell) -> Option<Self> {
        match cell {
            Cell::Bool(b) => Some(KeyPart::Bool(*b)),
            Cell::Number(n) => Some(KeyPart::Number(*n)),
            Cell::Text(s) => Some(KeyPart::Text(s.clone())),
            Cell::Missing | Cell::Null | Cell::List(_) => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            KeyPart::Bool(_) => 0,
            KeyPart::Number(_) => 1,
            KeyPart::Text(_) => 2,
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a.cmp(b),
            (KeyPart::Number(a), KeyPart::Number(b)) => a.total_cmp(b),
            (KeyPart::Text(a), KeyPart::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl std::fmt::Display for KeyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPart::Bool(b) => write!(f, "{b}"),
            KeyPart::Number(n) => write!(f, "{n}"),
            KeyPart::Text(s) => write!(f, "{s}"),
        }
    }
}

type GroupKey = (KeyPart, KeyPart, String);

/// True for the drainage ditch pile: "ditch" in any case, optionally
/// followed by a separator and a suffix ("DITCH-1", "ditch 2").
pub fn is_ditch(pile: &str) -> bool {
    let lower = pile.trim().to_lowercase();
    match lower.strip_prefix(DITCH_PILE) {
        Some(rest) => rest.chars().next().map_or(true, |c| !c.is_alphanumeric()),
        None => false,
    }
}

/// The leading two alphanumeric characters of a pile name, if present
pub fn pile_group(pile: &str) -> Option<&str> {
    PILE_GROUP_RE
        .captures(pile)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parse a flightday value into a calendar date.
///
/// Plain dates and ISO 8601 timestamps are accepted; timestamps keep the
/// date in their own offset.
pub fn parse_flight_day(raw: &str) -> Result<NaiveDate> {
    let value = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(date);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts.date());
        }
    }
    Err(ScrapError::DateParse {
        value: raw.to_string(),
        reason: "expected a YYYY-MM-DD or YYYYMMDD date or an ISO 8601 timestamp".into(),
    })
}

fn measure_of(cell: &Cell, column: &str) -> Result<Option<f64>> {
    if cell.is_empty() {
        return Ok(None);
    }
    let value = match cell {
        Cell::Number(n) => Some(*n),
        Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    };
    match value {
        Some(n) => Ok(Some(n)),
        None => Err(ScrapError::InvalidMeasure {
            column: column.to_string(),
            value: cell.to_string(),
        }),
    }
}

/// Check every column the cleaner reads, reporting all that are absent
fn require_columns(table: &NormalizedTable, measure_column: &str) -> Result<()> {
    let missing: Vec<&str> = [FLIGHTDAY_COLUMN, TASK_ID_COLUMN, PILE_COLUMN, measure_column]
        .into_iter()
        .filter(|name| !table.has_column(name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScrapError::MissingColumn(missing.join(", ")))
    }
}

/// Clean a normalized table into the per-group series for `measure_column`.
///
/// Fails without partial output on a missing column, an unparseable
/// flightday, a non-numeric measure, or (under [`UngroupablePolicy::Reject`])
/// an ungroupable row.
#[instrument(skip(table, options), fields(rows = table.len(), measure = %measure_column))]
pub fn clean(
    table: &NormalizedTable,
    measure_column: &str,
    options: &CleanOptions,
) -> Result<CleanedTable> {
    if table.is_empty() {
        debug!("Empty table; nothing to clean");
        return Ok(CleanedTable::empty(measure_column));
    }
    require_columns(table, measure_column)?;

    // Projection: the only columns read from here on
    let (day_col, task_col, pile_col, measure_col) = match (
        table.column_index(FLIGHTDAY_COLUMN),
        table.column_index(TASK_ID_COLUMN),
        table.column_index(PILE_COLUMN),
        table.column_index(measure_column),
    ) {
        (Some(d), Some(t), Some(p), Some(m)) => (d, t, p, m),
        _ => return Err(ScrapError::MissingColumn(measure_column.to_string())),
    };

    let mut report = CleanReport {
        input_rows: table.len(),
        ..CleanReport::default()
    };
    let mut sums: BTreeMap<GroupKey, f64> = BTreeMap::new();

    for (idx, row) in table.rows().iter().enumerate() {
        let pile = &row.cells[pile_col];
        if pile.as_text().is_some_and(is_ditch) {
            report.ditch_rows += 1;
            continue;
        }

        let key = match group_key(&row.cells[day_col], &row.cells[task_col], pile) {
            Ok(key) => key,
            Err(reason) => match options.ungroupable {
                UngroupablePolicy::Drop => {
                    debug!(row = idx, "Dropping ungroupable row: {}", reason);
                    report.ungroupable_rows += 1;
                    continue;
                }
                UngroupablePolicy::Reject => {
                    return Err(ScrapError::cleaning(ScrapError::Ungroupable {
                        row: idx,
                        reason,
                    }));
                }
            },
        };

        let value = measure_of(&row.cells[measure_col], measure_column)
            .map_err(ScrapError::cleaning)?;
        *sums.entry(key).or_insert(0.0) += value.unwrap_or(0.0);
    }

    if report.ungroupable_rows > 0 {
        warn!(
            "Dropped {} of {} rows without a complete (flightday, task_id, pile group) key",
            report.ungroupable_rows, report.input_rows
        );
    }
    PipelineMetrics::record_ditch_rows(report.ditch_rows);
    PipelineMetrics::record_ungroupable_rows(report.ungroupable_rows);

    // task_id is dropped here; rows per task stay separate unless merged
    let mut rows = Vec::with_capacity(sums.len());
    for ((day, _task, group), total) in sums {
        let flight_day = match &day {
            KeyPart::Text(s) => parse_flight_day(s)?,
            other => {
                return Err(ScrapError::DateParse {
                    value: other.to_string(),
                    reason: "flightday is not a date string".into(),
                })
            }
        };
        rows.push(CleanedRow {
            flight_day,
            pile_group: group,
            measure_value: total,
        });
    }

    if options.merge_tasks {
        rows = merge_by_day_and_group(rows);
    }

    rows.sort_by(|a, b| {
        a.pile_group
            .cmp(&b.pile_group)
            .then_with(|| a.flight_day.cmp(&b.flight_day))
    });

    let mut groups: Vec<String> = rows.iter().map(|r| r.pile_group.clone()).collect();
    groups.dedup();

    report.output_rows = rows.len();
    debug!(
        "Cleaned {} rows into {} rows across {} groups",
        report.input_rows,
        report.output_rows,
        groups.len()
    );

    Ok(CleanedTable {
        measure_column: measure_column.to_string(),
        rows,
        groups,
        report,
    })
}

fn group_key(day: &Cell, task: &Cell, pile: &Cell) -> std::result::Result<GroupKey, String> {
    let pile_text = pile
        .as_text()
        .ok_or_else(|| format!("pile {pile} is not text"))?;
    let group = pile_group(pile_text)
        .ok_or_else(|| format!("pile {pile} does not start with two alphanumerics"))?;
    let day = KeyPart::from_cell(day).ok_or_else(|| format!("flightday is {day}"))?;
    let task = KeyPart::from_cell(task).ok_or_else(|| format!("task_id is {task}"))?;
    Ok((day, task, group.to_string()))
}

fn merge_by_day_and_group(rows: Vec<CleanedRow>) -> Vec<CleanedRow> {
    let mut merged: BTreeMap<(String, NaiveDate), f64> = BTreeMap::new();
    for row in rows {
        *merged.entry((row.pile_group, row.flight_day)).or_insert(0.0) += row.measure_value;
    }
    merged
        .into_iter()
        .map(|((pile_group, flight_day), measure_value)| CleanedRow {
            flight_day,
            pile_group,
            measure_value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalize;
    use crate::types::RawRecord;
    use serde_json::{json, Value};

    fn table(values: Vec<Value>) -> NormalizedTable {
        let records: Vec<RawRecord> = values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        normalize(Some(records.as_slice())).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn ditch_detection() {
        assert!(is_ditch("ditch"));
        assert!(is_ditch("Ditch"));
        assert!(is_ditch("DITCH-1"));
        assert!(is_ditch(" ditch 2"));
        assert!(!is_ditch("Ditchfield"));
        assert!(!is_ditch("AB-12"));
    }

    #[test]
    fn pile_group_takes_two_leading_alphanumerics() {
        assert_eq!(pile_group("AB-12"), Some("AB"));
        assert_eq!(pile_group("7x"), Some("7x"));
        assert_eq!(pile_group("A-1"), None);
        assert_eq!(pile_group("-AB"), None);
        assert_eq!(pile_group(""), None);
    }

    #[test]
    fn flight_day_formats() {
        assert_eq!(parse_flight_day("2024-01-05").unwrap(), day("2024-01-05"));
        assert_eq!(parse_flight_day("2024-01-05T13:00:00Z").unwrap(), day("2024-01-05"));
        assert_eq!(
            parse_flight_day("2024-01-05T23:30:00-05:00").unwrap(),
            day("2024-01-05")
        );
        assert_eq!(parse_flight_day("2024-01-05 08:15:00").unwrap(), day("2024-01-05"));
        assert_eq!(parse_flight_day("01/05/2024").unwrap(), day("2024-01-05"));
        assert_eq!(parse_flight_day("20240105").unwrap(), day("2024-01-05"));
        assert!(matches!(
            parse_flight_day("not-a-date"),
            Err(ScrapError::DateParse { .. })
        ));
    }

    #[test]
    fn same_triple_is_summed() {
        let t = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB-12", "tonnage": 5}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB-99", "tonnage": 3}),
        ]);
        let cleaned = clean(&t, "tonnage", &CleanOptions::default()).unwrap();

        assert_eq!(
            cleaned.rows(),
            &[CleanedRow {
                flight_day: day("2024-01-01"),
                pile_group: "AB".into(),
                measure_value: 8.0,
            }]
        );
        assert_eq!(cleaned.groups(), &["AB"]);
    }

    #[test]
    fn tasks_stay_separate_unless_merged() {
        let t = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB-1", "tonnage": 5}),
            json!({"flightday": "2024-01-01", "task_id": "T2", "pile": "AB-2", "tonnage": 3}),
        ]);

        let per_task = clean(&t, "tonnage", &CleanOptions::default()).unwrap();
        let values: Vec<f64> = per_task.rows().iter().map(|r| r.measure_value).collect();
        assert_eq!(values, vec![5.0, 3.0]);

        let merged = clean(
            &t,
            "tonnage",
            &CleanOptions {
                merge_tasks: true,
                ..CleanOptions::default()
            },
        )
        .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.rows()[0].measure_value, 8.0);
    }

    #[test]
    fn output_sorted_by_group_then_day() {
        let t = table(vec![
            json!({"flightday": "2024-02-01", "task_id": 1, "pile": "ZZ-1", "volume_total": 1.0}),
            json!({"flightday": "2024-03-01", "task_id": 1, "pile": "AA-1", "volume_total": 2.0}),
            json!({"flightday": "2024-01-01", "task_id": 2, "pile": "AA-2", "volume_total": 3.0}),
            json!({"flightday": "2024-01-15", "task_id": 3, "pile": "ZZ-9", "volume_total": 4.0}),
        ]);
        let cleaned = clean(&t, "volume_total", &CleanOptions::default()).unwrap();

        let keys: Vec<(String, NaiveDate)> = cleaned
            .rows()
            .iter()
            .map(|r| (r.pile_group.clone(), r.flight_day))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AA".to_string(), day("2024-01-01")),
                ("AA".to_string(), day("2024-03-01")),
                ("ZZ".to_string(), day("2024-01-15")),
                ("ZZ".to_string(), day("2024-02-01")),
            ]
        );
        assert_eq!(cleaned.groups(), &["AA", "ZZ"]);
    }

    #[test]
    fn ditch_rows_never_grouped() {
        let t = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "Ditch", "tonnage": 100}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "DITCH-1", "tonnage": 100}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "DI-4", "tonnage": 1}),
        ]);
        let cleaned = clean(&t, "tonnage", &CleanOptions::default()).unwrap();

        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.rows()[0].measure_value, 1.0);
        assert_eq!(cleaned.report().ditch_rows, 2);
    }

    #[test]
    fn ungroupable_rows_dropped_and_counted() {
        let t = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "A", "tonnage": 1}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": 42, "tonnage": 1}),
            json!({"flightday": "2024-01-01", "pile": "AB-1", "tonnage": 1}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB-2", "tonnage": 2}),
        ]);
        let cleaned = clean(&t, "tonnage", &CleanOptions::default()).unwrap();

        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.report().ungroupable_rows, 3);
        assert_eq!(cleaned.report().input_rows, 4);
        assert_eq!(cleaned.report().output_rows, 1);
    }

    #[test]
    fn ungroupable_rows_rejected_on_request() {
        let t = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "", "tonnage": 1}),
        ]);
        let options = CleanOptions {
            ungroupable: UngroupablePolicy::Reject,
            ..CleanOptions::default()
        };
        match clean(&t, "tonnage", &options) {
            Err(ScrapError::Cleaning(inner)) => {
                assert!(matches!(*inner, ScrapError::Ungroupable { row: 0, .. }))
            }
            other => panic!("expected cleaning error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_metric_is_missing_column() {
        let t = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB", "tonnage": 1}),
        ]);
        match clean(&t, "unknown_metric", &CleanOptions::default()) {
            Err(ScrapError::MissingColumn(cols)) => assert_eq!(cols, "unknown_metric"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_columns_are_all_listed() {
        let t = table(vec![json!({"pile": "AB", "tonnage": 1})]);
        match clean(&t, "tonnage", &CleanOptions::default()) {
            Err(ScrapError::MissingColumn(cols)) => assert_eq!(cols, "flightday, task_id"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn bad_date_fails_whole_batch() {
        let t = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB", "tonnage": 1}),
            json!({"flightday": "not-a-date", "task_id": "T1", "pile": "CD", "tonnage": 1}),
        ]);
        assert!(matches!(
            clean(&t, "tonnage", &CleanOptions::default()),
            Err(ScrapError::DateParse { .. })
        ));
    }

    #[test]
    fn measure_values_coerce_or_fail() {
        let t = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB", "tonnage": "2.5"}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB", "tonnage": null}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB"}),
        ]);
        let cleaned = clean(&t, "tonnage", &CleanOptions::default()).unwrap();
        assert_eq!(cleaned.rows()[0].measure_value, 2.5);

        let blank = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "CD", "tonnage": null}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "CD", "volume_odm": 1.0}),
        ]);
        let cleaned = clean(&blank, "tonnage", &CleanOptions::default()).unwrap();
        assert_eq!(cleaned.rows()[0].measure_value, 0.0);

        let flag = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB", "tonnage": true}),
        ]);
        assert!(clean(&flag, "tonnage", &CleanOptions::default()).is_err());

        let bad = table(vec![
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB", "tonnage": "heavy"}),
        ]);
        match clean(&bad, "tonnage", &CleanOptions::default()) {
            Err(ScrapError::Cleaning(inner)) => {
                assert!(matches!(*inner, ScrapError::InvalidMeasure { .. }))
            }
            other => panic!("expected cleaning error, got {other:?}"),
        }
    }

    #[test]
    fn empty_table_cleans_to_empty() {
        let cleaned = clean(&NormalizedTable::default(), "tonnage", &CleanOptions::default())
            .unwrap();
        assert!(cleaned.is_empty());
        assert!(cleaned.groups().is_empty());
    }

    #[test]
    fn cleaning_is_idempotent() {
        let t = table(vec![
            json!({"flightday": "2024-01-02", "task_id": "T1", "pile": "CD-1", "tonnage": 4}),
            json!({"flightday": "2024-01-01", "task_id": "T2", "pile": "AB-1", "tonnage": 2}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB-7", "tonnage": 6}),
        ]);
        let first = clean(&t, "tonnage", &CleanOptions::default()).unwrap();
        let second = clean(&t, "tonnage", &CleanOptions::default()).unwrap();
        assert_eq!(first, second);
    }
}
