use clap::{Args, ValueEnum};
use serde_json::Value;

use meter_cba_core::config::{MeterClass, Parameter};
use meter_cba_core::scenarios::{
    compare_meter_classes, compare_persistence, compare_scenarios_analysis, elasticities,
    sensitivity_grid_analysis, tornado_analysis, ScenarioSpec, SensitivityVariable,
};
use meter_cba_core::PresetRegistry;

use super::analysis::ConfigArgs;
use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SensitivityKind {
    Tornado,
    Elasticity,
    Grid,
}

/// Arguments for sensitivity analysis
#[derive(Args, Debug)]
pub struct SensitivityArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long, value_enum, default_value = "tornado")]
    pub kind: SensitivityKind,

    /// Relative variation for tornado and elasticity
    #[arg(long, default_value_t = 0.10)]
    pub delta: f64,

    /// First grid variable in format parameter:min:max:step
    /// (e.g. "social_value:2:8:1")
    #[arg(long)]
    pub var1: Option<String>,

    /// Second grid variable
    #[arg(long)]
    pub var2: Option<String>,
}

/// Arguments for probability-weighted scenario analysis
#[derive(Args, Debug)]
pub struct ScenariosArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// JSON or YAML list of scenarios; pessimistic/base/optimistic when omitted
    #[arg(long)]
    pub scenarios: Option<String>,

    /// Compare every registered persistence scenario instead
    #[arg(long)]
    pub sweep_persistence: bool,
}

/// Arguments for the meter class comparison
#[derive(Args, Debug)]
pub struct CompareMetersArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// AMI hardware cost override ($)
    #[arg(long)]
    pub ami_cost: Option<f64>,

    /// AMR hardware cost override ($)
    #[arg(long)]
    pub amr_cost: Option<f64>,

    /// Manual meter hardware cost override ($)
    #[arg(long)]
    pub manual_cost: Option<f64>,
}

fn parse_parameter(name: &str) -> Result<Parameter, Box<dyn std::error::Error>> {
    serde_json::from_value(Value::String(name.to_string())).map_err(|_| {
        let known: Vec<String> = Parameter::ALL
            .iter()
            .filter_map(|p| serde_json::to_value(p).ok())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        format!("Unknown parameter '{}'; expected one of {}", name, known.join(", ")).into()
    })
}

fn parse_sens_var(spec: &str) -> Result<SensitivityVariable, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 4 {
        return Err(format!(
            "Sensitivity variable must be parameter:min:max:step, got '{}'",
            spec
        )
        .into());
    }
    Ok(SensitivityVariable {
        parameter: parse_parameter(parts[0])?,
        min: parts[1].parse()?,
        max: parts[2].parse()?,
        step: parts[3].parse()?,
    })
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = args.config.load()?;
    match args.kind {
        SensitivityKind::Tornado => Ok(serde_json::to_value(tornado_analysis(
            &config, args.delta,
        )?)?),
        SensitivityKind::Elasticity => {
            let rows = elasticities(&config, args.delta)?;
            Ok(serde_json::json!({ "results": rows }))
        }
        SensitivityKind::Grid => {
            let (Some(var1), Some(var2)) = (&args.var1, &args.var2) else {
                return Err("--var1 and --var2 are required for a grid".into());
            };
            let output =
                sensitivity_grid_analysis(&config, &parse_sens_var(var1)?, &parse_sens_var(var2)?)?;
            Ok(serde_json::to_value(output)?)
        }
    }
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = args.config.load()?;
    if args.sweep_persistence {
        let presets = PresetRegistry::with_defaults()?;
        let rows = compare_persistence(&config, &presets)?;
        return Ok(serde_json::json!({ "results": rows }));
    }
    let specs: Vec<ScenarioSpec> = match &args.scenarios {
        Some(path) => input::file::read_document(path)?,
        None => ScenarioSpec::pessimistic_base_optimistic(),
    };
    Ok(serde_json::to_value(compare_scenarios_analysis(&config, &specs)?)?)
}

pub fn run_compare_meters(args: CompareMetersArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = args.config.load()?;
    let overrides: Vec<(MeterClass, f64)> = [
        (MeterClass::Ami, args.ami_cost),
        (MeterClass::Amr, args.amr_cost),
        (MeterClass::Manual, args.manual_cost),
    ]
    .into_iter()
    .filter_map(|(class, cost)| cost.map(|c| (class, c)))
    .collect();
    let rows = compare_meter_classes(&config, &overrides)?;
    Ok(serde_json::json!({ "results": rows }))
}
