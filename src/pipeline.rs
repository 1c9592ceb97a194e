use crate::clean::{clean, CleanOptions, CleanedTable};
use crate::constants;
use crate::error::{Result, ScrapError};
use crate::ingest::{normalize, NormalizedTable};
use crate::metrics::PipelineMetrics;
use crate::types::RawRecord;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// How far a [`ScrapPipeline`] has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Empty,
    Ingested,
    Normalized,
    Cleaned,
}

/// One batch moving through ingest → normalize → clean.
///
/// Each stage stores its output on the pipeline; accessors hand back the
/// latest artifact or fail when the stage producing it has not run. A
/// pipeline is meant for a single request and is not shared across threads.
#[derive(Debug)]
pub struct ScrapPipeline {
    measure_column: String,
    options: CleanOptions,
    raw: Option<Vec<RawRecord>>,
    normalized: Option<NormalizedTable>,
    cleaned: Option<CleanedTable>,
}

impl ScrapPipeline {
    pub fn new(measure_column: impl Into<String>) -> Self {
        let measure_column = measure_column.into();
        if !constants::is_known_metric(&measure_column) {
            debug!("Measure '{}' is not one of the charted metrics", measure_column);
        }
        Self {
            measure_column,
            options: CleanOptions::default(),
            raw: None,
            normalized: None,
            cleaned: None,
        }
    }

    pub fn with_options(mut self, options: CleanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn measure_column(&self) -> &str {
        &self.measure_column
    }

    pub fn state(&self) -> PipelineState {
        if self.cleaned.is_some() {
            PipelineState::Cleaned
        } else if self.normalized.is_some() {
            PipelineState::Normalized
        } else if self.raw.is_some() {
            PipelineState::Ingested
        } else {
            PipelineState::Empty
        }
    }

    /// Store a fetched batch, discarding anything derived from an earlier one
    pub fn ingest(&mut self, records: Vec<RawRecord>) -> &mut Self {
        debug!("Ingested {} raw records", records.len());
        self.raw = Some(records);
        self.normalized = None;
        self.cleaned = None;
        self
    }

    pub fn normalize(&mut self) -> Result<&mut Self> {
        let table = normalize(self.raw.as_deref())?;
        self.normalized = Some(table);
        self.cleaned = None;
        Ok(self)
    }

    pub fn clean(&mut self) -> Result<&mut Self> {
        let table = self.normalized.as_ref().ok_or_else(|| {
            ScrapError::cleaning(ScrapError::NoData(
                "no normalized table; call normalize() first".into(),
            ))
        })?;
        let cleaned = clean(table, &self.measure_column, &self.options)?;
        self.cleaned = Some(cleaned);
        Ok(self)
    }

    /// Ingest, normalize and clean one batch
    #[instrument(skip(self, records), fields(measure = %self.measure_column, records = records.len()))]
    pub fn run(&mut self, records: Vec<RawRecord>) -> Result<&CleanedTable> {
        let started = Instant::now();
        let input_rows = records.len();

        let outcome = self
            .ingest(records)
            .normalize()
            .and_then(|pipeline| pipeline.clean());
        if let Err(e) = outcome {
            error!("Pipeline failed: {}", e);
            PipelineMetrics::record_error(e.kind());
            return Err(e);
        }

        let cleaned = self.cleaned()?;
        let report = cleaned.report();
        info!(
            "Cleaned {} records into {} rows ({} ditch, {} ungroupable) across {} groups",
            input_rows,
            report.output_rows,
            report.ditch_rows,
            report.ungroupable_rows,
            cleaned.groups().len()
        );
        PipelineMetrics::record_run(
            &self.measure_column,
            input_rows,
            report.output_rows,
            started.elapsed().as_secs_f64(),
        );
        Ok(cleaned)
    }

    pub fn raw(&self) -> Result<&[RawRecord]> {
        self.raw.as_deref().ok_or(ScrapError::NotReady("raw record batch"))
    }

    pub fn normalized(&self) -> Result<&NormalizedTable> {
        self.normalized
            .as_ref()
            .ok_or(ScrapError::NotReady("normalized table"))
    }

    pub fn cleaned(&self) -> Result<&CleanedTable> {
        self.cleaned.as_ref().ok_or(ScrapError::NotReady("cleaned table"))
    }

    pub fn into_cleaned(self) -> Result<CleanedTable> {
        self.cleaned.ok_or(ScrapError::NotReady("cleaned table"))
    }
}

/// Run the three stages over one batch without keeping intermediate tables
pub fn run_pipeline(
    records: &[RawRecord],
    measure_column: &str,
    options: &CleanOptions,
) -> Result<CleanedTable> {
    let table = normalize(Some(records))?;
    clean(&table, measure_column, options)
}
