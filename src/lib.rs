pub mod clean;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod series;
pub mod server;
pub mod types;

pub use clean::{CleanOptions, CleanReport, CleanedRow, CleanedTable, UngroupablePolicy};
pub use error::{Result, ScrapError};
pub use ingest::{NormalizedRow, NormalizedTable};
pub use pipeline::{run_pipeline, PipelineState, ScrapPipeline};
pub use types::{Cell, RawRecord, RecordSource};
