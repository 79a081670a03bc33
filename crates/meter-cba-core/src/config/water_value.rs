use serde::{Deserialize, Serialize};

use crate::error::{check_non_negative, MeterCbaError};
use crate::types::{AccountingMode, Money};
use crate::MeterCbaResult;

/// Value of a saved cubic meter under each accounting perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterValueParameters {
    /// Operating cost avoided per m³ (chemicals, energy, pumping).
    pub variable_cost: Money,
    /// Fixed operating cost component per m³.
    pub fixed_opex_cost: Money,
    /// Capital cost component per m³.
    pub capex_cost: Money,
    /// Full social cost of water, externalities included.
    pub social_value: Money,
    /// Retail price per m³ under a volumetric tariff. Informational only.
    pub indicative_tariff: Money,
    /// Marginal cost of public funds, as a multiplier (1.20 = 20 % loading).
    pub mcf: f64,
    pub apply_mcf: bool,
}

impl Default for WaterValueParameters {
    fn default() -> Self {
        WaterValueParameters {
            variable_cost: 0.50,
            fixed_opex_cost: 0.0,
            capex_cost: 0.0,
            social_value: 4.69,
            indicative_tariff: 2.50,
            mcf: 1.20,
            apply_mcf: false,
        }
    }
}

impl WaterValueParameters {
    pub fn new(social_value: Money, variable_cost: Money, indicative_tariff: Money) -> Self {
        WaterValueParameters {
            social_value,
            variable_cost,
            indicative_tariff,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> MeterCbaResult<()> {
        check_non_negative("water_value.variable_cost", self.variable_cost)?;
        check_non_negative("water_value.fixed_opex_cost", self.fixed_opex_cost)?;
        check_non_negative("water_value.capex_cost", self.capex_cost)?;
        check_non_negative("water_value.social_value", self.social_value)?;
        check_non_negative("water_value.indicative_tariff", self.indicative_tariff)?;
        if !self.mcf.is_finite() || self.mcf < 1.0 {
            return Err(MeterCbaError::invalid(
                "water_value.mcf",
                format!("must be a multiplier of at least 1.0 (got {})", self.mcf),
            ));
        }
        Ok(())
    }

    /// Value of one m³ saved.
    pub fn value_per_m3(&self, mode: AccountingMode) -> Money {
        match mode {
            AccountingMode::Economic => self.social_value,
            AccountingMode::Financial => self.variable_cost,
        }
    }

    /// Loading applied to publicly financed costs.
    pub fn public_funds_multiplier(&self, mode: AccountingMode) -> f64 {
        match mode {
            AccountingMode::Economic if self.apply_mcf => self.mcf,
            _ => 1.0,
        }
    }

    /// Value per m³ not captured by the city budget.
    pub fn externality_per_m3(&self) -> Money {
        self.social_value - self.variable_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_by_mode() {
        let wv = WaterValueParameters::default();
        assert_eq!(wv.value_per_m3(AccountingMode::Economic), 4.69);
        assert_eq!(wv.value_per_m3(AccountingMode::Financial), 0.50);
    }

    #[test]
    fn test_mcf_only_in_economic_mode() {
        let wv = WaterValueParameters {
            apply_mcf: true,
            ..Default::default()
        };
        assert_eq!(wv.public_funds_multiplier(AccountingMode::Economic), 1.20);
        assert_eq!(wv.public_funds_multiplier(AccountingMode::Financial), 1.0);

        let off = WaterValueParameters::default();
        assert_eq!(off.public_funds_multiplier(AccountingMode::Economic), 1.0);
    }

    #[test]
    fn test_mcf_below_one_rejected() {
        let wv = WaterValueParameters {
            mcf: 0.2,
            ..Default::default()
        };
        assert!(wv.validate().is_err());
    }
}
