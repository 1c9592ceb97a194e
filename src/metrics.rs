//! Pipeline metrics
//!
//! Thin wrappers over the `metrics` facade so metric names live in one place.
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use tracing::{info, warn};

pub const RUNS_TOTAL: &str = "scrap_pipeline_runs_total";
pub const RUN_ERRORS_TOTAL: &str = "scrap_pipeline_errors_total";
pub const RUN_DURATION_SECONDS: &str = "scrap_pipeline_duration_seconds";
pub const INPUT_ROWS: &str = "scrap_input_rows";
pub const OUTPUT_ROWS: &str = "scrap_output_rows";
pub const DITCH_ROWS_TOTAL: &str = "scrap_ditch_rows_total";
pub const UNGROUPABLE_ROWS_TOTAL: &str = "scrap_ungroupable_rows_total";
pub const FETCH_DURATION_SECONDS: &str = "scrap_fetch_duration_seconds";
pub const FETCH_ERRORS_TOTAL: &str = "scrap_fetch_errors_total";

/// Install the Prometheus exporter on `port` (all interfaces).
pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_run(measure: &str, input_rows: usize, output_rows: usize, duration_secs: f64) {
        let measure = measure.to_string();
        ::metrics::counter!(RUNS_TOTAL, "measure" => measure.clone()).increment(1);
        ::metrics::histogram!(INPUT_ROWS, "measure" => measure.clone()).record(input_rows as f64);
        ::metrics::histogram!(OUTPUT_ROWS, "measure" => measure.clone()).record(output_rows as f64);
        ::metrics::histogram!(RUN_DURATION_SECONDS, "measure" => measure).record(duration_secs);
    }

    pub fn record_error(kind: &'static str) {
        ::metrics::counter!(RUN_ERRORS_TOTAL, "kind" => kind).increment(1);
    }

    pub fn record_ditch_rows(count: usize) {
        ::metrics::counter!(DITCH_ROWS_TOTAL).increment(count as u64);
    }

    pub fn record_ungroupable_rows(count: usize) {
        ::metrics::counter!(UNGROUPABLE_ROWS_TOTAL).increment(count as u64);
    }
}

pub struct FetchMetrics;

impl FetchMetrics {
    pub fn record_success(source: &str, duration_secs: f64) {
        ::metrics::histogram!(FETCH_DURATION_SECONDS, "source" => source.to_string())
            .record(duration_secs);
    }

    pub fn record_error(source: &str) {
        ::metrics::counter!(FETCH_ERRORS_TOTAL, "source" => source.to_string()).increment(1);
    }
}
