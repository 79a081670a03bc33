use serde::{Deserialize, Serialize};

use crate::config::MeterParameters;
use crate::error::{check_non_negative, check_positive, check_ratio, MeterCbaError};
use crate::types::{Money, Ratio};
use crate::MeterCbaResult;

pub const MIN_SCALE_FACTOR: f64 = 0.70;
pub const MAX_SCALE_FACTOR: f64 = 1.0;

/// One row of a stepwise discount table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleStep {
    pub min_fleet: u64,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum ScaleLaw {
    Disabled,
    /// Factor of the highest threshold not exceeding the fleet size.
    Stepwise { table: Vec<ScaleStep> },
    /// `1 - elasticity * log2(fleet / reference_size)`, for fleets above the reference.
    Continuous { elasticity: f64, reference_size: u64 },
}

/// Share of each cost category that benefits from volume discounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub hardware: Ratio,
    pub installation: Ratio,
    pub network: Ratio,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        CategoryWeights {
            hardware: 1.0,
            installation: 0.0,
            network: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleEconomyConfig {
    pub law: ScaleLaw,
    #[serde(default)]
    pub weights: CategoryWeights,
}

impl Default for ScaleEconomyConfig {
    fn default() -> Self {
        ScaleEconomyConfig {
            law: ScaleLaw::Disabled,
            weights: CategoryWeights::default(),
        }
    }
}

/// Volume discount table calibrated on large North American rollouts.
pub fn default_steps() -> Vec<ScaleStep> {
    [
        (0, 1.00),
        (10_000, 0.95),
        (50_000, 0.90),
        (100_000, 0.85),
        (200_000, 0.80),
    ]
    .into_iter()
    .map(|(min_fleet, factor)| ScaleStep { min_fleet, factor })
    .collect()
}

/// Unit CAPEX after volume discounts, by category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledUnitCost {
    pub factor: f64,
    pub hardware: Money,
    pub installation: Money,
    pub network: Money,
    pub total: Money,
    /// Reduction per meter relative to list prices.
    pub savings: Money,
}

impl ScaleEconomyConfig {
    pub fn stepwise() -> Self {
        ScaleEconomyConfig {
            law: ScaleLaw::Stepwise {
                table: default_steps(),
            },
            weights: CategoryWeights::default(),
        }
    }

    pub fn continuous() -> Self {
        ScaleEconomyConfig {
            law: ScaleLaw::Continuous {
                elasticity: 0.05,
                reference_size: 10_000,
            },
            weights: CategoryWeights::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.law, ScaleLaw::Disabled)
    }

    pub fn validate(&self) -> MeterCbaResult<()> {
        check_ratio("scale.weights.hardware", self.weights.hardware)?;
        check_ratio("scale.weights.installation", self.weights.installation)?;
        check_ratio("scale.weights.network", self.weights.network)?;
        match &self.law {
            ScaleLaw::Disabled => {}
            ScaleLaw::Stepwise { table } => {
                if table.is_empty() {
                    return Err(MeterCbaError::invalid(
                        "scale.table",
                        "a stepwise law needs at least one threshold",
                    ));
                }
                for step in table {
                    if !(MIN_SCALE_FACTOR..=MAX_SCALE_FACTOR).contains(&step.factor) {
                        return Err(MeterCbaError::invalid(
                            "scale.table",
                            format!(
                                "factor {} at {} meters is outside [{MIN_SCALE_FACTOR}, {MAX_SCALE_FACTOR}]",
                                step.factor, step.min_fleet
                            ),
                        ));
                    }
                }
            }
            ScaleLaw::Continuous {
                elasticity,
                reference_size,
            } => {
                check_non_negative("scale.elasticity", *elasticity)?;
                check_positive("scale.reference_size", *reference_size as f64)?;
            }
        }
        Ok(())
    }

    /// Multiplicative cost factor for a fleet of `fleet_size` meters, in [0.70, 1.0].
    pub fn factor(&self, fleet_size: f64) -> f64 {
        let raw = match &self.law {
            ScaleLaw::Disabled => return 1.0,
            ScaleLaw::Stepwise { table } => {
                let mut sorted: Vec<&ScaleStep> = table.iter().collect();
                sorted.sort_by_key(|s| s.min_fleet);
                sorted
                    .iter()
                    .filter(|s| fleet_size >= s.min_fleet as f64)
                    .last()
                    .map(|s| s.factor)
                    .unwrap_or(1.0)
            }
            ScaleLaw::Continuous {
                elasticity,
                reference_size,
            } => {
                if fleet_size <= 0.0 {
                    return 1.0;
                }
                let ratio = fleet_size / *reference_size as f64;
                if ratio <= 1.0 {
                    1.0
                } else {
                    1.0 - elasticity * ratio.log2()
                }
            }
        };
        raw.clamp(MIN_SCALE_FACTOR, MAX_SCALE_FACTOR)
    }

    fn category_factor(factor: f64, weight: Ratio) -> f64 {
        1.0 - weight * (1.0 - factor)
    }

    /// Apply the fleet-size factor to each weighted cost category of a meter.
    pub fn scaled_unit_cost(&self, meter: &MeterParameters, fleet_size: f64) -> ScaledUnitCost {
        let factor = self.factor(fleet_size);
        let w = &self.weights;

        let hardware = meter.hardware_cost() * Self::category_factor(factor, w.hardware);
        let installation =
            meter.install_labor_cost() * Self::category_factor(factor, w.installation);
        let network = meter.network_cost_per_meter() * Self::category_factor(factor, w.network);
        let total = hardware + installation + network;

        ScaledUnitCost {
            factor,
            hardware,
            installation,
            network,
            total,
            savings: meter.unit_capex() - total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeterClass;

    #[test]
    fn test_disabled_is_neutral() {
        let cfg = ScaleEconomyConfig::default();
        assert_eq!(cfg.factor(1_000_000.0), 1.0);
    }

    #[test]
    fn test_stepwise_picks_highest_threshold() {
        let cfg = ScaleEconomyConfig::stepwise();
        assert_eq!(cfg.factor(9_999.0), 1.0);
        assert_eq!(cfg.factor(10_000.0), 0.95);
        assert_eq!(cfg.factor(116_258.0), 0.85);
        assert_eq!(cfg.factor(500_000.0), 0.80);
    }

    #[test]
    fn test_continuous_per_doubling() {
        let cfg = ScaleEconomyConfig::continuous();
        assert_eq!(cfg.factor(5_000.0), 1.0);
        assert!((cfg.factor(20_000.0) - 0.95).abs() < 1e-12);
        assert!((cfg.factor(40_000.0) - 0.90).abs() < 1e-12);
        // Very large fleets hit the floor
        assert_eq!(cfg.factor(1e12), MIN_SCALE_FACTOR);
    }

    #[test]
    fn test_factor_monotone_in_fleet_size() {
        for cfg in [ScaleEconomyConfig::stepwise(), ScaleEconomyConfig::continuous()] {
            let mut prev = f64::INFINITY;
            for n in (0..60).map(|i| (i * 10_000) as f64) {
                let f = cfg.factor(n);
                assert!(f <= prev + 1e-15);
                assert!((MIN_SCALE_FACTOR..=MAX_SCALE_FACTOR).contains(&f));
                prev = f;
            }
        }
    }

    #[test]
    fn test_weights_apply_per_category() {
        let meter = MeterParameters::builder(MeterClass::Ami)
            .hardware_cost(250.0)
            .install_hours(3.0)
            .hourly_rate(125.0)
            .network_cost(50.0)
            .build()
            .unwrap();
        let cfg = ScaleEconomyConfig::stepwise();
        let scaled = cfg.scaled_unit_cost(&meter, 116_258.0);

        assert_eq!(scaled.factor, 0.85);
        assert!((scaled.hardware - 212.5).abs() < 1e-9);
        // Installation labour is not discounted by default
        assert!((scaled.installation - 375.0).abs() < 1e-9);
        assert!((scaled.network - 42.5).abs() < 1e-9);
        assert!((scaled.savings - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_bounds_table_rejected() {
        let cfg = ScaleEconomyConfig {
            law: ScaleLaw::Stepwise {
                table: vec![ScaleStep {
                    min_fleet: 0,
                    factor: 0.5,
                }],
            },
            weights: CategoryWeights::default(),
        };
        assert!(cfg.validate().is_err());
    }
}
