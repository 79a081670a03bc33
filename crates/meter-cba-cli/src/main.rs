mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::analysis::RunArgs;
use commands::monte_carlo::MonteCarloArgs;
use commands::optimizer::OptimizeArgs;
use commands::presets::PresetsArgs;
use commands::scenarios::{CompareMetersArgs, ScenariosArgs, SensitivityArgs};

/// Cost-benefit analysis of municipal smart water meter programmes
#[derive(Parser)]
#[command(
    name = "wmcba",
    version,
    about = "Cost-benefit analysis of municipal smart water meter programmes",
    long_about = "A CLI for evaluating residential smart water meter deployments: \
                  deterministic NPV/BCR/payback runs, Monte Carlo uncertainty, \
                  deployment schedule optimization, sensitivity and scenario analysis."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log configuration loading and timings to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the deterministic cost-benefit analysis
    Run(RunArgs),
    /// Monte Carlo simulation over uncertain parameters
    MonteCarlo(MonteCarloArgs),
    /// Search adoption schedules under capacity and budget limits
    Optimize(OptimizeArgs),
    /// Tornado, elasticity or two-way grid sensitivity
    Sensitivity(SensitivityArgs),
    /// Probability-weighted scenario comparison
    Scenarios(ScenariosArgs),
    /// Compare AMI, AMR and manual meters on the same programme
    CompareMeters(CompareMetersArgs),
    /// List presets or show one
    Presets(PresetsArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Run(args) => commands::analysis::run(args),
        Commands::MonteCarlo(args) => commands::monte_carlo::run_monte_carlo(args),
        Commands::Optimize(args) => commands::optimizer::run_optimize(args),
        Commands::Sensitivity(args) => commands::scenarios::run_sensitivity(args),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
        Commands::CompareMeters(args) => commands::scenarios::run_compare_meters(args),
        Commands::Presets(args) => commands::presets::run_presets(args),
        Commands::Version => {
            println!("wmcba {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
