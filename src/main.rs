use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scrap_series::config::{Config, DEFAULT_CONFIG_PATH};
use scrap_series::constants;
use scrap_series::fetch::{FileRecordSource, HttpRecordSource};
use scrap_series::server::{start_server, AppState};
use scrap_series::{logging, metrics, CleanedTable, RecordSource, ScrapPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "scrap_series")]
#[command(about = "Scrap pile measurement series for charting")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve chart data over HTTP
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Clean one batch and print the series per pile group
    Report {
        /// Metric to aggregate: tonnage, volume_odm, volume_total
        #[arg(long, default_value = constants::DEFAULT_METRIC)]
        metric: String,
        /// Read records from a saved JSON array instead of the API
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn record_source(config: &Config, input: Option<PathBuf>) -> Result<Arc<dyn RecordSource>> {
    match input {
        Some(path) => Ok(Arc::new(FileRecordSource::new(path))),
        None => {
            let source = HttpRecordSource::from_config(&config.source)
                .context("configuring the record API (set source.url or SCRAP_API_URL)")?;
            Ok(Arc::new(source))
        }
    }
}

fn print_report(table: &CleanedTable) {
    println!("\n📊 {} per pile group", table.measure_column());
    for group in table.groups() {
        println!("\n  {group}");
        for row in table.rows_for_group(group) {
            println!("    {}  {:>12.2}", row.flight_day, row.measure_value);
        }
    }

    let report = table.report();
    println!(
        "\n   Input rows: {}\n   Ditch rows: {}\n   Ungroupable rows: {}\n   Output rows: {}",
        report.input_rows, report.ditch_rows, report.ungroupable_rows, report.output_rows
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging("logs");

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(metrics_port) = config.server.metrics_port {
                metrics::init_metrics(metrics_port);
            }
            let state = AppState {
                source: record_source(&config, None)?,
                options: config.cleaning.clone(),
            };
            let port = port.unwrap_or(config.server.port);
            if let Err(e) = start_server(state, port).await {
                error!("Server stopped: {}", e);
                anyhow::bail!("server error: {e}");
            }
        }
        Commands::Report { metric, input } => {
            let source = record_source(&config, input)?;
            info!("Fetching records from {}", source.source_name());
            let records = source.fetch_records().await?;

            let mut pipeline = ScrapPipeline::new(metric).with_options(config.cleaning.clone());
            let table = pipeline.run(records)?;
            print_report(table);
        }
    }
    Ok(())
}
