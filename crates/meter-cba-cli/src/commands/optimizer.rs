use clap::{Args, ValueEnum};
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

use meter_cba_core::optimizer::{
    optimize_deployment_analysis, DeploymentConstraints, Objective, SearchSpace,
};

use super::analysis::ConfigArgs;
use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ObjectiveArg {
    Npv,
    Payback,
}

/// Arguments for deployment schedule optimization
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Meters the installers can fit in one year
    #[arg(long)]
    pub max_installs: Option<u64>,

    /// Meter CAPEX the city can spend in one year ($)
    #[arg(long)]
    pub max_budget: Option<f64>,

    /// What the best schedule maximizes
    #[arg(long, value_enum, default_value = "npv")]
    pub objective: ObjectiveArg,

    /// JSON or YAML search space; the default grid when omitted
    #[arg(long)]
    pub search_space: Option<String>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = args.config.load()?;
    let constraints = DeploymentConstraints {
        max_budget_per_year: args.max_budget,
        max_installs_per_year: args.max_installs,
    };
    let space: SearchSpace = match &args.search_space {
        Some(path) => input::file::read_document(path)?,
        None => SearchSpace::default(),
    };
    let objective = match args.objective {
        ObjectiveArg::Npv => Objective::MaximizeNpv,
        ObjectiveArg::Payback => Objective::MinimizePayback,
    };

    let start = Instant::now();
    let output = optimize_deployment_analysis(&config, &constraints, objective, &space)?;
    debug!(elapsed_ms = start.elapsed().as_millis() as u64, "optimization finished");
    Ok(serde_json::to_value(output)?)
}
