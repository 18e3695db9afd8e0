use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use runner::pipeline::{self, CheckConfigArgs, CompareArgs, SummaryArgs};

/// tot-search: inspect tree-of-thought trace logs and run configs.
#[derive(Parser)]
#[command(name = "tot-search", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print statistics from a trace log.
    Summary {
        /// Path to the trace log JSON file.
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Compare solve rates across two or more trace logs.
    Compare {
        /// Paths to trace log JSON files.
        #[arg(long, required = true, num_args = 2..)]
        logs: Vec<PathBuf>,
    },
    /// Load, validate and print the effective run config.
    CheckConfig {
        /// Path to the run config TOML file.
        #[arg(long, default_value = "configs/run.toml")]
        config: PathBuf,
        /// Override the solver (bfs, refine or naive).
        #[arg(long)]
        method: Option<String>,
        /// Override the per-problem timeout in seconds (0 disables it).
        #[arg(long)]
        timeout_per_problem: Option<u64>,
        /// Override the beam width.
        #[arg(long)]
        n_select: Option<usize>,
        /// Override the refinement iteration budget.
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Seed for sampling selection.
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Summary { input, json } => pipeline::run_summary(SummaryArgs { input, json }),
        Command::Compare { logs } => pipeline::run_compare(CompareArgs { logs }),
        Command::CheckConfig {
            config,
            method,
            timeout_per_problem,
            n_select,
            max_iterations,
            seed,
        } => pipeline::run_check_config(CheckConfigArgs {
            config,
            method,
            timeout_per_problem,
            n_select,
            max_iterations,
            seed,
        }),
    }
}
