use serde::{Deserialize, Serialize};

use crate::error::{check_non_negative, check_ratio, MeterCbaError};
use crate::types::{CubicMeters, Money, Ratio};
use crate::MeterCbaResult;

/// Ramp-up of the network loss reduction programme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NetworkProgression {
    /// Target reached linearly after `years_to_target` years.
    Linear { years_to_target: u32 },
    /// Fast start then plateau: `1 - exp(-rate * (t - 1))`.
    Exponential { rate: f64 },
}

/// Distribution-network loss reduction driven by district metering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkLossParameters {
    /// Reference loss volume on the network (m³/yr).
    pub baseline_loss_m3: CubicMeters,
    /// Largest achievable share of those losses removed.
    pub max_reduction: Ratio,
    pub progression: NetworkProgression,
    pub start_year: u32,
    /// Monitoring crews and analytics at full ramp-up ($/yr).
    #[serde(default)]
    pub annual_program_cost: Money,
    /// Variable repair cost per m³ saved.
    #[serde(default)]
    pub cost_per_m3: Money,
    /// District metering and sensors, paid once.
    #[serde(default)]
    pub capex: Money,
    #[serde(default = "default_capex_year")]
    pub capex_year: u32,
    /// Weight savings and programme costs by meter adoption.
    #[serde(default = "default_true")]
    pub weight_by_adoption: bool,
}

fn default_capex_year() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for NetworkLossParameters {
    fn default() -> Self {
        NetworkLossParameters {
            baseline_loss_m3: 0.0,
            max_reduction: 0.0,
            progression: NetworkProgression::Linear { years_to_target: 5 },
            start_year: 1,
            annual_program_cost: 0.0,
            cost_per_m3: 0.0,
            capex: 0.0,
            capex_year: 1,
            weight_by_adoption: true,
        }
    }
}

/// Network savings and costs by calendar year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSeries {
    pub reduction: Vec<Ratio>,
    pub saved_m3: Vec<CubicMeters>,
    pub program_cost: Vec<Money>,
    pub variable_cost: Vec<Money>,
    pub capex: Vec<Money>,
}

impl NetworkSeries {
    pub fn total_cost(&self, t: usize) -> Money {
        self.program_cost[t] + self.variable_cost[t] + self.capex[t]
    }
}

impl NetworkLossParameters {
    pub fn validate(&self) -> MeterCbaResult<()> {
        check_non_negative("network.baseline_loss_m3", self.baseline_loss_m3)?;
        check_ratio("network.max_reduction", self.max_reduction)?;
        check_non_negative("network.annual_program_cost", self.annual_program_cost)?;
        check_non_negative("network.cost_per_m3", self.cost_per_m3)?;
        check_non_negative("network.capex", self.capex)?;
        match &self.progression {
            NetworkProgression::Linear { years_to_target } if *years_to_target < 1 => {
                return Err(MeterCbaError::invalid(
                    "network.years_to_target",
                    "must be at least 1",
                ));
            }
            NetworkProgression::Exponential { rate } => {
                check_non_negative("network.rate", *rate)?;
            }
            NetworkProgression::Linear { .. } => {}
        }
        if self.start_year < 1 {
            return Err(MeterCbaError::invalid(
                "network.start_year",
                "must be at least 1",
            ));
        }
        if self.capex_year < 1 {
            return Err(MeterCbaError::invalid(
                "network.capex_year",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Programme ramp-up in [0, 1] for `year` (1-based).
    pub fn progression(&self, year: u32) -> f64 {
        if year < self.start_year {
            return 0.0;
        }
        let t_eff = (year - self.start_year + 1) as f64;
        match &self.progression {
            NetworkProgression::Linear { years_to_target } => {
                (t_eff / (*years_to_target).max(1) as f64).min(1.0)
            }
            NetworkProgression::Exponential { rate } => 1.0 - (-rate * (t_eff - 1.0)).exp(),
        }
    }

    /// Yearly savings and costs given the adoption trajectory.
    pub fn simulate(&self, adoption: &[Ratio]) -> NetworkSeries {
        let horizon = adoption.len();
        let mut series = NetworkSeries {
            reduction: vec![0.0; horizon],
            saved_m3: vec![0.0; horizon],
            program_cost: vec![0.0; horizon],
            variable_cost: vec![0.0; horizon],
            capex: vec![0.0; horizon],
        };
        if self.baseline_loss_m3 <= 0.0 {
            return series;
        }

        for (t, &a) in adoption.iter().enumerate() {
            let year = t as u32 + 1;
            let weight = if self.weight_by_adoption { a } else { 1.0 };
            let progression = self.progression(year);

            series.reduction[t] = self.max_reduction * progression;
            series.saved_m3[t] = self.baseline_loss_m3 * series.reduction[t] * weight;
            series.program_cost[t] = self.annual_program_cost * progression * weight;
            series.variable_cost[t] = self.cost_per_m3 * series.saved_m3[t];
            if year == self.capex_year {
                series.capex[t] = self.capex;
            }
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> NetworkLossParameters {
        NetworkLossParameters {
            baseline_loss_m3: 1_000_000.0,
            max_reduction: 0.20,
            progression: NetworkProgression::Linear { years_to_target: 4 },
            start_year: 2,
            annual_program_cost: 100_000.0,
            cost_per_m3: 0.10,
            capex: 500_000.0,
            capex_year: 2,
            weight_by_adoption: false,
        }
    }

    #[test]
    fn test_linear_progression() {
        let p = program();
        assert_eq!(p.progression(1), 0.0);
        assert_eq!(p.progression(2), 0.25);
        assert_eq!(p.progression(5), 1.0);
        assert_eq!(p.progression(12), 1.0);
    }

    #[test]
    fn test_exponential_starts_at_zero() {
        let p = NetworkLossParameters {
            progression: NetworkProgression::Exponential { rate: 0.5 },
            start_year: 1,
            ..program()
        };
        assert_eq!(p.progression(1), 0.0);
        assert!(p.progression(30) > 0.99);
    }

    #[test]
    fn test_series_costs_and_savings() {
        let s = program().simulate(&[1.0; 6]);
        assert_eq!(s.saved_m3[0], 0.0);
        assert!((s.saved_m3[4] - 200_000.0).abs() < 1e-6);
        assert!((s.variable_cost[4] - 20_000.0).abs() < 1e-6);
        assert_eq!(s.capex[1], 500_000.0);
        assert_eq!(s.capex.iter().sum::<f64>(), 500_000.0);
    }

    #[test]
    fn test_adoption_weighting() {
        let p = NetworkLossParameters {
            weight_by_adoption: true,
            ..program()
        };
        let s = p.simulate(&[0.5; 6]);
        assert!((s.saved_m3[4] - 100_000.0).abs() < 1e-6);
        assert!((s.program_cost[4] - 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_program_is_neutral() {
        let s = NetworkLossParameters::default().simulate(&[1.0; 10]);
        assert!(s.saved_m3.iter().all(|&v| v == 0.0));
        assert!(s.capex.iter().all(|&v| v == 0.0));
    }
}
