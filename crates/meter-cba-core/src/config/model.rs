use serde::{Deserialize, Serialize};

use crate::error::{check_non_negative, check_positive, check_ratio, MeterCbaError};
use crate::types::{CubicMeters, Money, Ratio};
use crate::MeterCbaResult;

/// Days per year used to annualize daily consumption.
const DAYS_PER_YEAR: f64 = 365.0;

/// Municipality and analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    pub households: u64,
    /// Persons per household.
    pub household_size: f64,
    /// Litres per person per day.
    pub lpcd: f64,
    pub horizon_years: u32,
    pub discount_rate: Ratio,
    /// Behavioural reduction in year 1 of metering.
    pub behavioral_reduction: Ratio,
    /// Avoided or deferred infrastructure spending at full adoption ($/yr).
    pub infrastructure_deferral_annual: Money,
    /// Deferred infrastructure value per m³ saved.
    pub infrastructure_deferral_per_m3: Money,
    /// Share of meter CAPEX financed by the city.
    pub city_capex_share: Ratio,
    /// Share of meter OPEX financed by the city.
    pub city_opex_share: Ratio,
}

impl Default for ModelParameters {
    fn default() -> Self {
        ModelParameters {
            households: 10_000,
            household_size: 2.1,
            lpcd: 250.0,
            horizon_years: 20,
            discount_rate: 0.03,
            behavioral_reduction: 0.08,
            infrastructure_deferral_annual: 0.0,
            infrastructure_deferral_per_m3: 0.0,
            city_capex_share: 1.0,
            city_opex_share: 1.0,
        }
    }
}

impl ModelParameters {
    /// Municipality profile with the remaining parameters at their defaults.
    pub fn city(households: u64, household_size: f64, lpcd: f64) -> Self {
        ModelParameters {
            households,
            household_size,
            lpcd,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> MeterCbaResult<()> {
        if self.households == 0 {
            return Err(MeterCbaError::invalid(
                "model.households",
                "must be at least 1",
            ));
        }
        check_positive("model.household_size", self.household_size)?;
        check_non_negative("model.lpcd", self.lpcd)?;
        if self.horizon_years == 0 {
            return Err(MeterCbaError::invalid(
                "model.horizon_years",
                "the analysis horizon must be at least one year",
            ));
        }
        check_ratio("model.discount_rate", self.discount_rate)?;
        check_ratio("model.behavioral_reduction", self.behavioral_reduction)?;
        check_non_negative(
            "model.infrastructure_deferral_annual",
            self.infrastructure_deferral_annual,
        )?;
        check_non_negative(
            "model.infrastructure_deferral_per_m3",
            self.infrastructure_deferral_per_m3,
        )?;
        check_ratio("model.city_capex_share", self.city_capex_share)?;
        check_ratio("model.city_opex_share", self.city_opex_share)?;
        Ok(())
    }

    /// Annual consumption of one household (m³).
    pub fn base_consumption_m3(&self) -> CubicMeters {
        self.lpcd * self.household_size * DAYS_PER_YEAR / 1000.0
    }

    pub fn population(&self) -> f64 {
        self.households as f64 * self.household_size
    }
}
