use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::{AnalysisConfig, MeterClass, MeterParameters, Parameter};
use crate::engine::{run, ResultSet};
use crate::error::MeterCbaError;
use crate::presets::PresetRegistry;
use crate::types::*;
use crate::MeterCbaResult;

const PROBABILITY_TOLERANCE: f64 = 0.001;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A named set of multiplicative adjustments to a base configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub probability: Ratio,
    /// Factors applied to the base value of each parameter.
    #[serde(default)]
    pub factors: Vec<(Parameter, f64)>,
    /// Factor on both the social value and the variable cost of water.
    #[serde(default = "unit_factor")]
    pub water_value_factor: f64,
}

fn unit_factor() -> f64 {
    1.0
}

impl ScenarioSpec {
    pub fn new(name: impl Into<String>, probability: Ratio) -> Self {
        ScenarioSpec {
            name: name.into(),
            probability,
            factors: Vec::new(),
            water_value_factor: 1.0,
        }
    }

    pub fn factor(mut self, parameter: Parameter, factor: f64) -> Self {
        self.factors.push((parameter, factor));
        self
    }

    pub fn water_value(mut self, factor: f64) -> Self {
        self.water_value_factor = factor;
        self
    }

    /// Pessimistic, base and optimistic cases weighted 25/50/25.
    pub fn pessimistic_base_optimistic() -> Vec<ScenarioSpec> {
        vec![
            ScenarioSpec::new("Pessimistic", 0.25)
                .factor(Parameter::MeterCost, 1.30)
                .factor(Parameter::RepairRate, 0.65)
                .factor(Parameter::BehavioralReduction, 0.60)
                .water_value(0.75),
            ScenarioSpec::new("Base", 0.50),
            ScenarioSpec::new("Optimistic", 0.25)
                .factor(Parameter::MeterCost, 0.80)
                .factor(Parameter::RepairRate, 1.15)
                .factor(Parameter::BehavioralReduction, 1.40)
                .water_value(1.25),
        ]
    }

    /// Derived configuration for this scenario.
    pub fn apply(&self, config: &AnalysisConfig) -> MeterCbaResult<AnalysisConfig> {
        if !self.water_value_factor.is_finite() || self.water_value_factor < 0.0 {
            return Err(MeterCbaError::invalid(
                format!("scenario:{} water_value_factor", self.name),
                "must be a non-negative number",
            ));
        }
        let mut factors = self.factors.clone();
        if self.water_value_factor != 1.0 {
            factors.push((Parameter::SocialValue, self.water_value_factor));
            factors.push((Parameter::VariableCost, self.water_value_factor));
        }
        config.with_scaled_many(&factors)
    }
}

/// Headline metrics of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    pub name: String,
    pub npv: Money,
    pub bcr: Option<f64>,
    pub payback: PaybackPeriod,
    /// Levelized cost per m³ saved.
    pub lcsw: Option<Money>,
    pub pv_water_saved_m3: CubicMeters,
}

impl ScenarioMetrics {
    fn from_result(name: impl Into<String>, result: &ResultSet) -> Self {
        ScenarioMetrics {
            name: name.into(),
            npv: result.npv,
            bcr: result.bcr,
            payback: result.payback,
            lcsw: result.lcsw,
            pv_water_saved_m3: result.pv_water_saved_m3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    #[serde(flatten)]
    pub metrics: ScenarioMetrics,
    pub probability: Ratio,
    pub deviation_from_base: Money,
    /// `None` when the base NPV is zero.
    pub deviation_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutput {
    pub base_npv: Money,
    pub results: Vec<ScenarioResult>,
    pub probability_weighted_npv: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every scenario against `config` and weight the NPVs by probability.
pub fn compare_scenarios(
    config: &AnalysisConfig,
    scenarios: &[ScenarioSpec],
) -> MeterCbaResult<ScenarioOutput> {
    if scenarios.is_empty() {
        return Err(MeterCbaError::InsufficientData(
            "At least one scenario required".into(),
        ));
    }
    for s in scenarios {
        if !(0.0..=1.0).contains(&s.probability) {
            return Err(MeterCbaError::invalid(
                format!("scenario:{} probability", s.name),
                "Probability must be between 0 and 1",
            ));
        }
    }
    let total: f64 = scenarios.iter().map(|s| s.probability).sum();
    if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(MeterCbaError::invalid(
            "probabilities",
            format!("Probabilities must sum to 1.0 (got {total})"),
        ));
    }

    let base_npv = run(config)?.npv;
    let mut results = Vec::with_capacity(scenarios.len());
    let mut probability_weighted_npv = 0.0;

    for scenario in scenarios {
        let result = run(&scenario.apply(config)?)?;
        let deviation = result.npv - base_npv;
        let deviation_pct = if base_npv == 0.0 {
            None
        } else {
            Some(deviation / base_npv.abs())
        };
        probability_weighted_npv += scenario.probability * result.npv;
        results.push(ScenarioResult {
            metrics: ScenarioMetrics::from_result(scenario.name.clone(), &result),
            probability: scenario.probability,
            deviation_from_base: deviation,
            deviation_pct,
        });
    }

    Ok(ScenarioOutput {
        base_npv,
        results,
        probability_weighted_npv,
    })
}

/// Same programme with each meter class at its class defaults.
///
/// `hardware_costs` replaces the default meter price of the listed classes.
pub fn compare_meter_classes(
    config: &AnalysisConfig,
    hardware_costs: &[(MeterClass, Money)],
) -> MeterCbaResult<Vec<ScenarioMetrics>> {
    [MeterClass::Ami, MeterClass::Amr, MeterClass::Manual]
        .into_iter()
        .map(|class| -> MeterCbaResult<ScenarioMetrics> {
            let mut meter = MeterParameters::builder(class);
            if let Some(&(_, cost)) = hardware_costs.iter().find(|(c, _)| *c == class) {
                meter = meter.hardware_cost(cost);
            }
            let derived = config.to_builder().meter(meter.build()?).build()?;
            Ok(ScenarioMetrics::from_result(class.label(), &run(&derived)?))
        })
        .collect()
}

/// Run every persistence scenario of the registry, each rescaled to the
/// law's own initial effect.
pub fn compare_persistence(
    config: &AnalysisConfig,
    registry: &PresetRegistry,
) -> MeterCbaResult<Vec<ScenarioMetrics>> {
    let results: Vec<ScenarioMetrics> = registry
        .persistence_scenarios()
        .map(|(name, law)| -> MeterCbaResult<ScenarioMetrics> {
            let derived = config
                .to_builder()
                .persistence_scenario(law.clone())
                .build()?;
            Ok(ScenarioMetrics::from_result(name, &run(&derived)?))
        })
        .collect::<MeterCbaResult<_>>()?;
    if results.is_empty() {
        return Err(MeterCbaError::InsufficientData(
            "registry holds no persistence scenario".into(),
        ));
    }
    Ok(results)
}

/// [`compare_scenarios`] in the standard output envelope.
pub fn compare_scenarios_analysis(
    config: &AnalysisConfig,
    scenarios: &[ScenarioSpec],
) -> MeterCbaResult<ComputationOutput<ScenarioOutput>> {
    let start = Instant::now();
    let output = compare_scenarios(config, scenarios)?;

    let mut warnings: Vec<String> = Vec::new();
    let total: f64 = scenarios.iter().map(|s| s.probability).sum();
    if total != 1.0 {
        warnings.push(format!(
            "Probabilities sum to {total}; treated as approximately 1.0"
        ));
    }
    for r in &output.results {
        if r.deviation_pct.is_none() && r.deviation_from_base != 0.0 {
            warnings.push(format!(
                "Base NPV is zero; cannot compute deviation_pct for scenario '{}'",
                r.metrics.name
            ));
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Probability-weighted scenario analysis",
        &serde_json::json!({
            "base": config,
            "scenarios": scenarios,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeakParameters, PersistenceLaw};

    fn config() -> AnalysisConfig {
        AnalysisConfig::builder()
            .persistence(PersistenceLaw::ExponentialToPlateau {
                initial: 0.08,
                plateau: 0.025,
                decay_rate: 0.15,
            })
            .leaks(LeakParameters::two_stock().build().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_pessimistic_base_optimistic_ordering() {
        let out = compare_scenarios(&config(), &ScenarioSpec::pessimistic_base_optimistic())
            .unwrap();
        assert_eq!(out.results.len(), 3);
        let npv: Vec<f64> = out.results.iter().map(|r| r.metrics.npv).collect();
        assert!(npv[0] < npv[1] && npv[1] < npv[2]);
        assert!(out.results[1].deviation_from_base.abs() < 1e-6);

        let expected = 0.25 * npv[0] + 0.50 * npv[1] + 0.25 * npv[2];
        assert!((out.probability_weighted_npv - expected).abs() < 1e-6);
    }

    #[test]
    fn test_water_value_factor_scales_both_values() {
        let base = config();
        let derived = ScenarioSpec::new("x", 1.0)
            .water_value(0.5)
            .apply(&base)
            .unwrap();
        let (b, d) = (base.water_value(), derived.water_value());
        assert!((d.social_value - 0.5 * b.social_value).abs() < 1e-12);
        assert!((d.variable_cost - 0.5 * b.variable_cost).abs() < 1e-12);
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let specs = vec![ScenarioSpec::new("A", 0.3), ScenarioSpec::new("B", 0.3)];
        assert!(compare_scenarios(&config(), &specs).is_err());
        assert!(compare_scenarios(&config(), &[]).is_err());
    }

    #[test]
    fn test_negative_probability_error() {
        let specs = vec![ScenarioSpec::new("Bad", -0.5), ScenarioSpec::new("Good", 1.5)];
        assert!(compare_scenarios(&config(), &specs).is_err());
    }

    #[test]
    fn test_compare_meter_classes() {
        let rows = compare_meter_classes(&config(), &[(MeterClass::Amr, 150.0)]).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, MeterClass::Ami.label());
        assert_eq!(rows[2].name, MeterClass::Manual.label());
        // Manual reading captures less behaviour change than AMI.
        assert!(rows[2].pv_water_saved_m3 < rows[0].pv_water_saved_m3);
    }

    #[test]
    fn test_compare_persistence_covers_registry() {
        let registry = PresetRegistry::with_defaults().unwrap();
        let rows = compare_persistence(&config(), &registry).unwrap();
        assert_eq!(
            rows.len(),
            registry.names_in(crate::presets::PresetCategory::Persistence).len()
        );
        assert!(rows.iter().all(|r| r.npv.is_finite()));
    }

    #[test]
    fn test_compare_persistence_empty_registry() {
        assert!(compare_persistence(&config(), &PresetRegistry::new()).is_err());
    }
}
