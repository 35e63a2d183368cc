use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use lumi_runner::report::ExportTargets;
use lumi_runner::utils::config::RunConfig;
use lumi_runner::{report, runner};

#[derive(Parser)]
#[command(name = "lumi-runner")]
#[command(version = "0.1.0")]
#[command(about = "Data-driven HTTP collection runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a collection once per data row (or a fixed number of times)
    Run {
        /// Path to the collection JSON file
        collection: PathBuf,

        /// Run only the requests of this folder
        #[arg(short, long)]
        folder: Option<String>,

        /// Data file (CSV, JSON or YAML) supplying one row per iteration
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Global variables file
        #[arg(short, long)]
        global: Option<PathBuf>,

        /// Environment file
        #[arg(short, long)]
        environment: Option<PathBuf>,

        /// Number of iterations (defaults to the number of data rows)
        #[arg(short = 'n', long)]
        iteration_count: Option<usize>,

        /// Write the iteration log (JSON) to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the collection with its response history to this file
        #[arg(long)]
        collection_output: Option<PathBuf>,

        /// Write the run summary document to this file
        #[arg(long)]
        summary_output: Option<PathBuf>,

        /// Directory for junit.xml
        #[arg(long, default_value = ".")]
        report_dir: PathBuf,

        /// Stop after the first failing request
        #[arg(long, default_value = "false")]
        stop_on_error: bool,

        /// Exit with code 1 when any test failed
        #[arg(long, default_value = "false")]
        exit_code: bool,

        /// Request timeout (ms)
        #[arg(long)]
        request_timeout: Option<u64>,
    },

    /// Generate junit.xml from a saved iteration log
    Report {
        /// Path to the iteration log JSON
        results: PathBuf,

        /// Directory for junit.xml
        #[arg(long, default_value = ".")]
        report_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            collection,
            folder,
            data,
            global,
            environment,
            iteration_count,
            output,
            collection_output,
            summary_output,
            report_dir,
            stop_on_error,
            exit_code,
            request_timeout,
        } => {
            println!(
                "{} Running collection: {}",
                "▶".green().bold(),
                collection.display()
            );
            if let Some(ref name) = folder {
                println!("  Folder: {}", name.cyan());
            }
            if let Some(ref path) = data {
                println!("  Data: {}", path.display().to_string().cyan());
            }
            if stop_on_error {
                println!("  Stop on error: {}", "Enabled".yellow());
            }

            let config = RunConfig {
                collection,
                folder,
                data_file: data,
                globals_file: global,
                environment_file: environment,
                iteration_count,
                request_timeout_ms: request_timeout,
                stop_on_error,
                exports: ExportTargets {
                    output_file: output,
                    collection_output,
                    summary_output,
                    report_dir,
                },
            };

            let outcome = runner::run_collection(&config).await?;

            if exit_code && outcome.has_failures() {
                std::process::exit(1);
            }
        }

        Commands::Report {
            results,
            report_dir,
        } => {
            println!(
                "{} Generating JUnit report from: {}",
                "📊".to_string().blue(),
                results.display()
            );
            let path = report::generate_report(&results, &report_dir)?;
            println!("  Report saved to: {}", path.display().to_string().cyan());
        }
    }

    Ok(())
}
