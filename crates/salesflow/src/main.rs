// crates/salesflow/src/main.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use salesflow_core::stages::{self, StageOutput};
use salesflow_core::PipelineConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Walmart weekly-sales data pipeline
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Parameter file (defaults to ./params.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge the raw extracts and write summaries
    Ingest,
    /// Clean the merged tables
    Preprocess,
    /// Build the modeling tables
    Features,
    /// Log exploratory plots to the tracking backend
    Eda,
    /// Run ingestion, preprocessing and feature engineering in order
    Run(RunArgs),
    /// List the registered stages
    Stages,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Also run the exploratory logging stage
    #[arg(long)]
    with_eda: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();
    if let Err(err) = execute(&cli) {
        let message = format!("{err:#}");
        error!(error = %message, "Command failed");
        return Err(err);
    }
    Ok(())
}

fn execute(cli: &Cli) -> Result<()> {
    let outputs = match &cli.command {
        Command::Stages => {
            print_stages();
            return Ok(());
        }
        Command::Ingest => vec![run_stage("ingest", &load_config(cli)?)?],
        Command::Preprocess => vec![run_stage("preprocess", &load_config(cli)?)?],
        Command::Features => vec![run_stage("features", &load_config(cli)?)?],
        Command::Eda => vec![run_stage("eda", &load_config(cli)?)?],
        Command::Run(args) => stages::run_pipeline(&load_config(cli)?, args.with_eda)
            .context("pipeline run failed")?,
    };

    for output in &outputs {
        print_output(output);
    }
    info!(stages = outputs.len(), "Command finished");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    dotenvy::dotenv().ok();
    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading parameters")?;
    config.tracking = config
        .tracking
        .with_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

fn run_stage(code: &str, config: &PipelineConfig) -> Result<StageOutput> {
    let stage = stages::find_stage(code).with_context(|| format!("unknown stage '{code}'"))?;
    info!(stage = code, version = stage.version(), "Running stage");
    stage
        .run(config)
        .with_context(|| format!("stage '{code}' failed"))
}

fn print_stages() {
    let mut table = Table::new();
    table.set_header(vec!["Stage", "Version", "In `run`", "Description"]);
    for descriptor in stages::all_stage_descriptors() {
        table.add_row(vec![
            descriptor.code.to_string(),
            descriptor.version.to_string(),
            if descriptor.include_in_pipeline { "yes" } else { "--with-eda" }.to_string(),
            descriptor.description.to_string(),
        ]);
    }
    println!("{table}");
}

fn print_output(output: &StageOutput) {
    let mut table = Table::new();
    match output {
        StageOutput::Ingestion(report) => {
            table.set_header(vec!["Artifact", "Rows", "BLAKE3"]);
            for artifact in &report.artifacts {
                table.add_row(vec![
                    artifact.path.display().to_string(),
                    artifact.rows.to_string(),
                    artifact.blake3.chars().take(16).collect::<String>(),
                ]);
            }
            println!(
                "Ingestion: train {} -> {} rows, test {} -> {} rows",
                report.train_rows_in, report.train_rows_out, report.test_rows_in, report.test_rows_out
            );
        }
        StageOutput::Preprocessing(report) => {
            table.set_header(vec!["Treatment", "Cells"]);
            table.add_row(vec!["negatives cleared".to_string(), report.negatives_cleared.to_string()]);
            table.add_row(vec!["dept means imputed".to_string(), report.values_imputed.to_string()]);
            table.add_row(vec!["zero filled".to_string(), report.values_zero_filled.to_string()]);
            table.add_row(vec!["sales capped".to_string(), report.sales_capped.to_string()]);
            println!("Preprocessing: {} train rows, {} test rows", report.train_rows, report.test_rows);
        }
        StageOutput::Features(report) => {
            table.set_header(vec!["Table", "Rows", "Columns"]);
            table.add_row(vec![
                "train".to_string(),
                report.train_rows.to_string(),
                report.train_columns.join(", "),
            ]);
            table.add_row(vec![
                "test".to_string(),
                report.test_rows.to_string(),
                report.test_columns.join(", "),
            ]);
            println!("Feature engineering:");
        }
        StageOutput::Eda(report) => {
            table.set_header(vec!["Logged plot"]);
            for label in &report.artifacts {
                table.add_row(vec![label.clone()]);
            }
            println!("Exploratory logging: run {}", report.run_id);
        }
    }
    println!("{table}");
}
