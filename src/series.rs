//! Chart series
//!
//! Reshapes a [`CleanedTable`] into the dataset list the chart front end
//! plots: one line per pile group, one point per cleaned row.

use crate::clean::CleanedTable;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Flight day as `YYYY-MM-DD`
    pub x: String,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<SeriesPoint>,
    pub border_width: u32,
    pub fill: bool,
}

impl ChartDataset {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            data: Vec::new(),
            border_width: 1,
            fill: false,
        }
    }
}

/// One dataset per pile group, in the table's group order
pub fn to_datasets(table: &CleanedTable) -> Vec<ChartDataset> {
    table
        .groups()
        .iter()
        .map(|group| {
            let mut dataset = ChartDataset::new(group);
            dataset.data = table
                .rows_for_group(group)
                .map(|row| SeriesPoint {
                    x: row.flight_day.format(DATE_FORMAT).to_string(),
                    y: row.measure_value,
                })
                .collect();
            dataset
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::CleanOptions;
    use crate::pipeline::run_pipeline;
    use crate::types::RawRecord;
    use serde_json::json;

    #[test]
    fn datasets_follow_group_order() {
        let records: Vec<RawRecord> = vec![
            json!({"flightday": "2024-01-02", "task_id": "T1", "pile": "CD-1", "tonnage": 4}),
            json!({"flightday": "2024-01-01", "task_id": "T1", "pile": "AB-1", "tonnage": 2}),
            json!({"flightday": "2024-01-03", "task_id": "T1", "pile": "AB-3", "tonnage": 1.5}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        let table = run_pipeline(&records, "tonnage", &CleanOptions::default()).unwrap();

        let datasets = to_datasets(&table);
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].label, "AB");
        assert_eq!(
            datasets[0].data,
            vec![
                SeriesPoint { x: "2024-01-01".into(), y: 2.0 },
                SeriesPoint { x: "2024-01-03".into(), y: 1.5 },
            ]
        );
        assert_eq!(datasets[1].label, "CD");
    }

    #[test]
    fn serializes_chart_shape() {
        let mut dataset = ChartDataset::new("AB");
        dataset.data.push(SeriesPoint { x: "2024-01-01".into(), y: 8.0 });

        assert_eq!(
            serde_json::to_value(&dataset).unwrap(),
            json!({
                "label": "AB",
                "data": [{"x": "2024-01-01", "y": 8.0}],
                "borderWidth": 1,
                "fill": false
            })
        );
    }
}
