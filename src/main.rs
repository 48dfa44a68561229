//! Data Pipeline - command line entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use data_pipeline::logging::init_logging;
use data_pipeline::{DatasetDescriptor, Pipeline, PipelineConfig, TableStore, Verifier};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "data_pipeline")]
#[command(about = "Ingest, clean, store and report on tabular datasets")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one dataset
    Run {
        /// Preset dataset name (e.g. iris, titanic)
        #[arg(long)]
        dataset: Option<String>,
        /// CSV URL; takes precedence over --dataset
        #[arg(long)]
        url: Option<String>,
    },
    /// Check stored tables against what was recorded at save time
    Verify {
        /// Dataset to verify; all stored datasets when omitted
        name: Option<String>,
    },
    /// List stored datasets
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = init_logging(&config.log_dir);

    let result = match cli.command {
        Commands::Run { dataset, url } => run(config, DatasetDescriptor::from_args(dataset, url)),
        Commands::Verify { name } => verify(&config, name.as_deref()),
        Commands::List => list(&config),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: PipelineConfig, descriptor: DatasetDescriptor) -> anyhow::Result<bool> {
    let pipeline = Pipeline::new(config);
    let outcome = match pipeline.run(&descriptor) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(stage = %e.stage, error = %e.error, "pipeline failed");
            println!("Pipeline failed at the {} stage: {}", e.stage, e.error);
            return Ok(false);
        }
    };

    println!("\nPipeline results for {}:", outcome.dataset);
    println!("   Source: {}", outcome.origin);
    println!("   Raw rows: {}", outcome.raw_rows);
    println!("   Stored rows: {}", outcome.expectation.row_count);
    println!("   Dropped rows: {}", outcome.cleaning.dropped_count());
    println!("   Charts: {}", outcome.artifacts.len());
    println!("   Report: {}", outcome.report.report.path.display());

    let caveats = outcome.caveats();
    if !caveats.is_empty() {
        println!("\nCaveats:");
        for caveat in &caveats {
            println!("   - {caveat}");
        }
    }
    Ok(true)
}

fn verify(config: &PipelineConfig, name: Option<&str>) -> anyhow::Result<bool> {
    let store = TableStore::open_existing(config.database_path())
        .context("cannot open the pipeline database")?;
    let verifier = Verifier::new(&store);

    let reports = match name {
        Some(name) => vec![(name.to_string(), verifier.verify_recorded(name))],
        None => verifier.verify_all()?,
    };
    if reports.is_empty() {
        println!("No datasets stored.");
        return Ok(true);
    }

    let mut all_ok = true;
    for (dataset, report) in reports {
        match report {
            Ok(report) => {
                all_ok &= report.result.is_ok();
                print!("{report}");
            }
            Err(e) => {
                all_ok = false;
                println!("{dataset}: ERROR {e}");
            }
        }
    }
    Ok(all_ok)
}

fn list(config: &PipelineConfig) -> anyhow::Result<bool> {
    let store = TableStore::open_existing(config.database_path())
        .context("cannot open the pipeline database")?;
    let datasets = store.list()?;
    if datasets.is_empty() {
        println!("No datasets stored.");
    }
    for d in datasets {
        println!("{:<24} {:>8} rows  saved {}", d.name, d.row_count, d.saved_at);
    }
    Ok(true)
}
