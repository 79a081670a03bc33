use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;

use crate::config::{AnalysisConfig, Parameter};
use crate::engine::run;
use crate::error::MeterCbaError;
use crate::types::*;
use crate::MeterCbaResult;

/// Parameters varied by the tornado chart, in display order before sorting.
pub const TORNADO_PARAMETERS: [Parameter; 13] = [
    Parameter::Lpcd,
    Parameter::HouseholdSize,
    Parameter::Households,
    Parameter::LeakPrevalence,
    Parameter::LeakFlow,
    Parameter::RepairRate,
    Parameter::BehavioralReduction,
    Parameter::SocialValue,
    Parameter::DiscountRate,
    Parameter::MeterCost,
    Parameter::InstallHours,
    Parameter::HourlyRate,
    Parameter::NetworkCost,
];

/// Below this absolute NPV an elasticity is reported as undefined.
const NPV_EPSILON: Money = 1e-6;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One bar of a tornado chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoRow {
    pub parameter: Parameter,
    pub label: String,
    pub base_value: f64,
    pub low_value: f64,
    pub high_value: f64,
    pub npv_low: Money,
    pub npv_high: Money,
    /// Larger of the two absolute NPV deviations from the base case.
    pub swing: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoOutput {
    pub base_npv: Money,
    pub delta: f64,
    /// Sorted by decreasing swing.
    pub rows: Vec<TornadoRow>,
    /// Parameters left out because their base value is zero.
    pub skipped: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elasticity {
    pub parameter: Parameter,
    pub label: String,
    /// Percentage change in NPV per percentage change in the parameter.
    pub elasticity: Option<f64>,
}

/// Sweep definition for one axis of a two-way grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityVariable {
    pub parameter: Parameter,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Two-way NPV grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub variable_1: Parameter,
    pub variable_2: Parameter,
    pub variable_1_values: Vec<f64>,
    pub variable_2_values: Vec<f64>,
    /// matrix[i][j] = NPV at (variable_1_values[i], variable_2_values[j]);
    /// `None` where the derived configuration is invalid.
    pub matrix: Vec<Vec<Option<Money>>>,
    pub base_npv: Money,
    /// Grid cell closest to the base configuration.
    pub base_case_position: (usize, usize),
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_delta(delta: f64) -> MeterCbaResult<()> {
    if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
        return Err(MeterCbaError::invalid(
            "delta",
            format!("must be strictly between 0 and 1 (got {delta})"),
        ));
    }
    Ok(())
}

/// Sweep values from min to max by step, max appended when the step does
/// not land on it.
fn generate_sweep_values(var: &SensitivityVariable) -> MeterCbaResult<Vec<f64>> {
    let field = format!("variable:{}", var.parameter.label());
    if !var.step.is_finite() || var.step <= 0.0 {
        return Err(MeterCbaError::invalid(field, "Step must be positive"));
    }
    if !var.min.is_finite() || !var.max.is_finite() || var.min > var.max {
        return Err(MeterCbaError::invalid(field, "Min must be <= max"));
    }

    let count = ((var.max - var.min) / var.step + 1e-9).floor() as usize;
    let mut values: Vec<f64> = (0..=count).map(|i| var.min + i as f64 * var.step).collect();
    if let Some(&last) = values.last() {
        if var.max - last > var.step * 1e-9 {
            values.push(var.max);
        }
    }
    Ok(values)
}

fn closest_index(values: &[f64], target: f64) -> usize {
    values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - target)
                .abs()
                .partial_cmp(&(*b - target).abs())
                .unwrap_or(Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// One-at-a-time sensitivity: every tornado parameter is multiplied by
/// `1 - delta` and `1 + delta` while the others stay at base.
pub fn tornado(config: &AnalysisConfig, delta: f64) -> MeterCbaResult<TornadoOutput> {
    check_delta(delta)?;
    let base_npv = run(config)?.npv;

    let mut rows = Vec::with_capacity(TORNADO_PARAMETERS.len());
    let mut skipped = Vec::new();
    for parameter in TORNADO_PARAMETERS {
        let base_value = parameter.value(config);
        if base_value == 0.0 {
            skipped.push(parameter);
            continue;
        }
        let low = config.with_scaled(parameter, 1.0 - delta)?;
        let high = config.with_scaled(parameter, 1.0 + delta)?;
        let npv_low = run(&low)?.npv;
        let npv_high = run(&high)?.npv;
        rows.push(TornadoRow {
            parameter,
            label: parameter.label().to_string(),
            base_value,
            low_value: parameter.value(&low),
            high_value: parameter.value(&high),
            npv_low,
            npv_high,
            swing: (npv_low - base_npv).abs().max((npv_high - base_npv).abs()),
        });
    }
    rows.sort_by(|a, b| b.swing.partial_cmp(&a.swing).unwrap_or(Ordering::Equal));

    Ok(TornadoOutput {
        base_npv,
        delta,
        rows,
        skipped,
    })
}

/// Central-difference NPV elasticities for the tornado parameters.
pub fn elasticities(config: &AnalysisConfig, delta: f64) -> MeterCbaResult<Vec<Elasticity>> {
    check_delta(delta)?;
    let base_npv = run(config)?.npv;

    TORNADO_PARAMETERS
        .iter()
        .map(|&parameter| -> MeterCbaResult<Elasticity> {
            let base_value = parameter.value(config);
            let elasticity = if base_value == 0.0 || base_npv.abs() < NPV_EPSILON {
                None
            } else {
                let high = config.with_scaled(parameter, 1.0 + delta)?;
                let low = config.with_scaled(parameter, 1.0 - delta)?;
                let dx = (parameter.value(&high) - parameter.value(&low)) / base_value;
                if dx.abs() < f64::EPSILON {
                    None
                } else {
                    let dy = (run(&high)?.npv - run(&low)?.npv) / base_npv;
                    Some(dy / dx)
                }
            };
            Ok(Elasticity {
                parameter,
                label: parameter.label().to_string(),
                elasticity,
            })
        })
        .collect()
}

/// Two-way NPV grid over absolute parameter values.
pub fn sensitivity_grid(
    config: &AnalysisConfig,
    variable_1: &SensitivityVariable,
    variable_2: &SensitivityVariable,
) -> MeterCbaResult<SensitivityOutput> {
    if variable_1.parameter == variable_2.parameter {
        return Err(MeterCbaError::invalid(
            "variable_2",
            "must differ from variable_1",
        ));
    }
    let v1_values = generate_sweep_values(variable_1)?;
    let v2_values = generate_sweep_values(variable_2)?;
    let base_npv = run(config)?.npv;

    let matrix: Vec<Vec<Option<Money>>> = v1_values
        .iter()
        .map(|&v1| {
            v2_values
                .iter()
                .map(|&v2| {
                    config
                        .with_overrides(&[(variable_1.parameter, v1), (variable_2.parameter, v2)])
                        .and_then(|derived| run(&derived))
                        .map(|result| result.npv)
                        .ok()
                })
                .collect()
        })
        .collect();

    let base_row = closest_index(&v1_values, variable_1.parameter.value(config));
    let base_col = closest_index(&v2_values, variable_2.parameter.value(config));

    Ok(SensitivityOutput {
        variable_1: variable_1.parameter,
        variable_2: variable_2.parameter,
        variable_1_values: v1_values,
        variable_2_values: v2_values,
        matrix,
        base_npv,
        base_case_position: (base_row, base_col),
    })
}

/// [`tornado`] in the standard output envelope.
pub fn tornado_analysis(
    config: &AnalysisConfig,
    delta: f64,
) -> MeterCbaResult<ComputationOutput<TornadoOutput>> {
    let start = Instant::now();
    let output = tornado(config, delta)?;
    let warnings: Vec<String> = output
        .skipped
        .iter()
        .map(|p| format!("{} is zero in the base case and was not varied", p.label()))
        .collect();

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        &format!("One-at-a-time NPV sensitivity (±{:.0}%)", delta * 100.0),
        config,
        warnings,
        elapsed,
        output,
    ))
}

/// [`sensitivity_grid`] in the standard output envelope.
pub fn sensitivity_grid_analysis(
    config: &AnalysisConfig,
    variable_1: &SensitivityVariable,
    variable_2: &SensitivityVariable,
) -> MeterCbaResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let output = sensitivity_grid(config, variable_1, variable_2)?;

    let mut warnings: Vec<String> = Vec::new();
    for (i, row) in output.matrix.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            if cell.is_none() {
                warnings.push(format!(
                    "Invalid configuration at ({}, {})",
                    output.variable_1_values[i], output.variable_2_values[j]
                ));
            }
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "2-Way NPV Sensitivity Grid",
        &serde_json::json!({
            "variable_1": variable_1,
            "variable_2": variable_2,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersistenceLaw;

    fn config() -> AnalysisConfig {
        AnalysisConfig::builder()
            .persistence(PersistenceLaw::ExponentialToPlateau {
                initial: 0.08,
                plateau: 0.025,
                decay_rate: 0.15,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_tornado_sorted_by_swing() {
        let out = tornado(&config(), 0.10).unwrap();
        assert_eq!(out.rows.len() + out.skipped.len(), TORNADO_PARAMETERS.len());
        for pair in out.rows.windows(2) {
            assert!(pair[0].swing >= pair[1].swing);
        }
    }

    #[test]
    fn test_tornado_directions() {
        let out = tornado(&config(), 0.20).unwrap();
        let row = |p: Parameter| out.rows.iter().find(|r| r.parameter == p).unwrap();
        let social = row(Parameter::SocialValue);
        assert!(social.npv_high > out.base_npv);
        assert!(social.npv_low < out.base_npv);
        let meter = row(Parameter::MeterCost);
        assert!(meter.npv_high < out.base_npv);
    }

    #[test]
    fn test_tornado_rejects_bad_delta() {
        assert!(tornado(&config(), 0.0).is_err());
        assert!(tornado(&config(), 1.5).is_err());
    }

    #[test]
    fn test_elasticity_signs() {
        let values = elasticities(&config(), 0.05).unwrap();
        let e = |p: Parameter| {
            values
                .iter()
                .find(|e| e.parameter == p)
                .and_then(|e| e.elasticity)
        };
        let base_npv = run(&config()).unwrap().npv;
        // Elasticities are relative to a signed NPV.
        let sign = base_npv.signum();
        assert!(e(Parameter::SocialValue).unwrap() * sign > 0.0);
        assert!(e(Parameter::MeterCost).unwrap() * sign < 0.0);
    }

    #[test]
    fn test_sweep_values() {
        let var = SensitivityVariable {
            parameter: Parameter::Lpcd,
            min: 200.0,
            max: 300.0,
            step: 30.0,
        };
        let vals = generate_sweep_values(&var).unwrap();
        assert_eq!(vals, vec![200.0, 230.0, 260.0, 290.0, 300.0]);

        let bad = SensitivityVariable { step: 0.0, ..var };
        assert!(generate_sweep_values(&bad).is_err());
    }

    #[test]
    fn test_grid_monotone_in_social_value() {
        let v1 = SensitivityVariable {
            parameter: Parameter::SocialValue,
            min: 2.0,
            max: 6.0,
            step: 1.0,
        };
        let v2 = SensitivityVariable {
            parameter: Parameter::MeterCost,
            min: 100.0,
            max: 300.0,
            step: 100.0,
        };
        let out = sensitivity_grid(&config(), &v1, &v2).unwrap();
        assert_eq!(out.matrix.len(), 5);
        assert_eq!(out.matrix[0].len(), 3);
        for j in 0..3 {
            for i in 0..4 {
                assert!(out.matrix[i + 1][j].unwrap() > out.matrix[i][j].unwrap());
            }
        }
    }

    #[test]
    fn test_grid_rejects_same_parameter() {
        let v = SensitivityVariable {
            parameter: Parameter::Lpcd,
            min: 200.0,
            max: 300.0,
            step: 50.0,
        };
        assert!(sensitivity_grid(&config(), &v, &v).is_err());
    }
}
