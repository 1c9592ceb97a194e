/// Column and metric name constants shared by the pipeline, server and CLI.

// Required columns of a scrap measurement record
pub const FLIGHTDAY_COLUMN: &str = "flightday";
pub const TASK_ID_COLUMN: &str = "task_id";
pub const PILE_COLUMN: &str = "pile";

// Measurement columns a caller may chart
pub const TONNAGE_METRIC: &str = "tonnage";
pub const VOLUME_ODM_METRIC: &str = "volume_odm";
pub const VOLUME_TOTAL_METRIC: &str = "volume_total";

pub const DEFAULT_METRIC: &str = TONNAGE_METRIC;

// Piles with this name hold runoff, not scrap
pub const DITCH_PILE: &str = "ditch";

/// Separator used when flattening nested record fields into column names
pub const NESTED_SEPARATOR: char = '.';

/// Request timeout for the remote record source
pub const FETCH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_PORT: u16 = 5000;

/// Get the metric names the chart UI offers
pub fn get_supported_metrics() -> Vec<&'static str> {
    vec![TONNAGE_METRIC, VOLUME_ODM_METRIC, VOLUME_TOTAL_METRIC]
}

/// Whether `name` is one of the metrics the chart UI offers
pub fn is_known_metric(name: &str) -> bool {
    get_supported_metrics().contains(&name)
}
