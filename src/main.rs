//! Scangate - command line entry point
//!
//! Thin shell around the core: reads one report document, runs the pipeline,
//! prints the findings document and signals the policy verdict through the
//! exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use scangate::application::{GroupingMode, ScanReportService};
use scangate::{init_tracing, Config};

#[derive(Parser)]
#[command(name = "scangate", version, about = "Normalize a scan report and render findings")]
struct Cli {
    /// Path to the raw scan report JSON
    report: PathBuf,

    /// Override the configured findings grouping
    #[arg(long, value_enum)]
    group_by: Option<Grouping>,

    /// Print the structured summary instead of the findings document
    #[arg(long)]
    summary: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Grouping {
    Vulnerability,
    Package,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|_| {
        eprintln!("Failed to load configuration, using defaults");
        Config::default()
    });
    if let Some(grouping) = cli.group_by {
        config.report.grouping = match grouping {
            Grouping::Vulnerability => GroupingMode::Vulnerability,
            Grouping::Package => GroupingMode::Package,
        };
    }

    if let Err(error) = init_tracing(&config.logging) {
        eprintln!("Failed to initialize tracing: {error}");
        return ExitCode::FAILURE;
    }

    match run(&cli, config) {
        Ok(evaluation_failed) => {
            if evaluation_failed {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(error) => {
            tracing::error!(%error, "scan report processing failed");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli, config: Config) -> Result<bool, Box<dyn std::error::Error>> {
    let raw_report = std::fs::read_to_string(&cli.report)?;
    tracing::info!(report = %cli.report.display(), "processing scan report");

    let service = ScanReportService::new(config);
    let outcome = service.execute(&raw_report)?;

    let rendered = if cli.summary {
        serde_json::to_string_pretty(&outcome.summary)?
    } else {
        serde_json::to_string_pretty(&outcome.findings)?
    };
    println!("{rendered}");

    Ok(outcome.evaluation.is_failed())
}
