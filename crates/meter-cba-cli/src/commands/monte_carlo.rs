use clap::Args;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use meter_cba_core::monte_carlo::{run_monte_carlo_analysis, MonteCarloConfig, UncertainVariable};

use super::analysis::ConfigArgs;
use crate::input;

/// Arguments for Monte Carlo simulation
#[derive(Args, Debug)]
pub struct MonteCarloArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Number of draws
    #[arg(long, default_value_t = 1000)]
    pub simulations: u32,

    /// Seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON or YAML list of distributions; calibrated ranges when omitted
    #[arg(long)]
    pub distributions: Option<String>,
}

pub fn run_monte_carlo(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = args.config.load()?;

    let mut mc = match &args.distributions {
        Some(path) => {
            let distributions: Vec<UncertainVariable> = input::file::read_document(path)?;
            MonteCarloConfig {
                distributions,
                ..MonteCarloConfig::default()
            }
        }
        None => MonteCarloConfig::calibrated(&config),
    }
    .with_simulations(args.simulations);
    if let Some(seed) = args.seed {
        mc = mc.with_seed(seed);
    }
    info!(
        simulations = mc.num_simulations,
        variables = mc.distributions.len(),
        "starting Monte Carlo"
    );

    let start = Instant::now();
    let output = run_monte_carlo_analysis(&config, &mc)?;
    debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Monte Carlo finished");
    Ok(serde_json::to_value(output)?)
}
