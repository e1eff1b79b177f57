//! Command line entry point for training, prediction and series download

use clap::{Parser, Subcommand};
use forecast_pipeline::api::{parse_iso_date, ForecastApi, PredictRequest, TrainRequest};
use forecast_pipeline::config::PipelineConfig;
use forecast_pipeline::data::export_dataset_csv;
use forecast_pipeline::ingest::QuoteClient;
use forecast_pipeline::logging::{init_logging, LogConfig};
use forecast_pipeline::models::{AdditiveModel, TrainingOptions};
use forecast_pipeline::orchestrator::ForecastOrchestrator;
use forecast_pipeline::store::entity_file_key;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "forecast_cli")]
#[command(about = "Train and query per-entity forecast models", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults plus FORECAST_* variables when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train one entity over a date window
    Train {
        #[arg(long)]
        entity: String,
        /// First day of the training window (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// Last day of the training window (YYYY-MM-DD)
        #[arg(long)]
        cutoff: String,
    },
    /// Predict every day of a window; writes Parquet when --output-dir is given
    Predict {
        #[arg(long)]
        entity: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        output_dir: Option<String>,
    },
    /// Train every known entity over its full history
    TrainAll,
    /// Load an entity's history and export it normalized as CSV
    Fetch {
        #[arg(long)]
        entity: String,
        /// Target file, default `{export_dir}/{entity}.csv`
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the statistics series as published instead of exporting it
        #[arg(long)]
        raw: bool,
    },
    /// Download daily closes from the quote service and print them as JSON
    Quotes {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::from_env()?,
    };
    let api = ForecastApi::from_config(&config)?;

    match cli.command {
        Commands::Train {
            entity,
            start,
            cutoff,
        } => {
            let response = api.handle_train(&TrainRequest {
                entity_id: entity,
                start_date: start,
                cutoff_date: cutoff,
            });
            print_json(&response)?;
            Ok(response.is_success())
        }
        Commands::Predict {
            entity,
            start,
            end,
            output_dir,
        } => {
            let response = api.handle_predict(&PredictRequest {
                entity_id: entity,
                start_date: start,
                end_date: end,
                batch: output_dir.is_some(),
                output_dir,
            });
            print_json(&response)?;
            Ok(response.is_success())
        }
        Commands::TrainAll => {
            let options = TrainingOptions::from_config(&config.training);
            let report = ForecastOrchestrator::<_, AdditiveModel>::new(api.store())
                .train_all(api.resolver(), &options)?;
            print!("{}", report);
            Ok(report.skipped.is_empty())
        }
        Commands::Fetch { entity, raw: true, .. } => {
            let points = api.resolver().fetch_raw(&entity)?;
            print_json(&points)?;
            Ok(true)
        }
        Commands::Fetch { entity, output, .. } => {
            let dataset = api.resolver().load(&entity)?;
            let path = output.unwrap_or_else(|| {
                config
                    .paths
                    .export_dir
                    .join(format!("{}.csv", entity_file_key(&entity)))
            });
            export_dataset_csv(&dataset, &path)?;
            println!("{} rows written to {}", dataset.len(), path.display());
            Ok(true)
        }
        Commands::Quotes { symbol, start, end } => {
            let start = parse_iso_date("start", &start)?;
            let end = parse_iso_date("end", &end)?;
            let points = QuoteClient::new(&config.api)?.fetch_closes(&symbol, start, end)?;
            print_json(&points)?;
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if let Some(level) = &cli.log_level {
        log_config = log_config.with_default_level(level.as_str());
    }
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
