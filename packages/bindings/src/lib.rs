use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use meter_cba_core::monte_carlo::MonteCarloConfig;
use meter_cba_core::optimizer::{DeploymentConstraints, Objective, SearchSpace};
use meter_cba_core::{AnalysisConfig, PresetRegistry};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

#[derive(Deserialize)]
struct MonteCarloRequest {
    #[serde(default)]
    config: AnalysisConfig,
    /// Calibrated ranges when omitted.
    #[serde(default)]
    monte_carlo: Option<MonteCarloConfig>,
}

#[derive(Deserialize)]
struct OptimizeRequest {
    #[serde(default)]
    config: AnalysisConfig,
    constraints: DeploymentConstraints,
    #[serde(default)]
    objective: Objective,
    #[serde(default)]
    search_space: SearchSpace,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[napi]
pub fn run_analysis(config_json: String) -> NapiResult<String> {
    let config: AnalysisConfig = serde_json::from_str(&config_json).map_err(to_napi_error)?;
    let output = meter_cba_core::run_analysis(&config).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn run_monte_carlo(input_json: String) -> NapiResult<String> {
    let request: MonteCarloRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let mc = request
        .monte_carlo
        .unwrap_or_else(|| MonteCarloConfig::calibrated(&request.config));
    let output = meter_cba_core::monte_carlo::run_monte_carlo_analysis(&request.config, &mc)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn optimize_deployment(input_json: String) -> NapiResult<String> {
    let request: OptimizeRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = meter_cba_core::optimizer::optimize_deployment_analysis(
        &request.config,
        &request.constraints,
        request.objective,
        &request.search_space,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Sensitivity
// ---------------------------------------------------------------------------

#[napi]
pub fn tornado(config_json: String, delta: f64) -> NapiResult<String> {
    let config: AnalysisConfig = serde_json::from_str(&config_json).map_err(to_napi_error)?;
    let output =
        meter_cba_core::scenarios::tornado_analysis(&config, delta).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

#[napi]
pub fn list_presets() -> NapiResult<String> {
    let presets = PresetRegistry::with_defaults().map_err(to_napi_error)?;
    serde_json::to_string(&presets).map_err(to_napi_error)
}
