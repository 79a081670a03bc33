use serde::{Deserialize, Serialize};

use super::{AnalysisConfig, AnalysisConfigBuilder};
use crate::error::MeterCbaError;
use crate::MeterCbaResult;

/// Scalar configuration field that uncertainty and sensitivity analyses
/// can read and override.
///
/// Overrides are absolute values written through the section builders, so
/// every derived configuration is validated like a hand-built one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Households,
    HouseholdSize,
    Lpcd,
    DiscountRate,
    BehavioralReduction,
    /// Plateau of an exponential-to-plateau law; ignored by other laws.
    PersistencePlateau,
    /// Total leak prevalence. A two-stock model keeps its significant share.
    LeakPrevalence,
    /// Mean leak flow. Every stock's flow is scaled in proportion.
    LeakFlow,
    DetectionRate,
    RepairRate,
    /// Mean unit repair cost. Every stock's cost is scaled in proportion.
    RepairCost,
    SocialValue,
    VariableCost,
    MeterCost,
    InstallHours,
    HourlyRate,
    NetworkCost,
}

impl Parameter {
    pub const ALL: [Parameter; 17] = [
        Parameter::Households,
        Parameter::HouseholdSize,
        Parameter::Lpcd,
        Parameter::DiscountRate,
        Parameter::BehavioralReduction,
        Parameter::PersistencePlateau,
        Parameter::LeakPrevalence,
        Parameter::LeakFlow,
        Parameter::DetectionRate,
        Parameter::RepairRate,
        Parameter::RepairCost,
        Parameter::SocialValue,
        Parameter::VariableCost,
        Parameter::MeterCost,
        Parameter::InstallHours,
        Parameter::HourlyRate,
        Parameter::NetworkCost,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Parameter::Households => "households",
            Parameter::HouseholdSize => "household size",
            Parameter::Lpcd => "consumption (L/person/day)",
            Parameter::DiscountRate => "discount rate",
            Parameter::BehavioralReduction => "behavioural reduction",
            Parameter::PersistencePlateau => "persistence plateau",
            Parameter::LeakPrevalence => "leak prevalence",
            Parameter::LeakFlow => "leak flow (m3/yr)",
            Parameter::DetectionRate => "leak detection rate",
            Parameter::RepairRate => "leak repair rate",
            Parameter::RepairCost => "repair cost ($)",
            Parameter::SocialValue => "social value of water ($/m3)",
            Parameter::VariableCost => "variable cost of water ($/m3)",
            Parameter::MeterCost => "meter hardware cost ($)",
            Parameter::InstallHours => "installation hours",
            Parameter::HourlyRate => "installation hourly rate ($/h)",
            Parameter::NetworkCost => "network cost per meter ($)",
        }
    }

    /// Whether the parameter is a share bounded by 1.
    pub fn is_ratio(&self) -> bool {
        matches!(
            self,
            Parameter::DiscountRate
                | Parameter::BehavioralReduction
                | Parameter::PersistencePlateau
                | Parameter::LeakPrevalence
                | Parameter::DetectionRate
                | Parameter::RepairRate
        )
    }

    /// Current value in `config`.
    pub fn value(&self, config: &AnalysisConfig) -> f64 {
        let model = config.model();
        let meter = config.meter();
        let leaks = config.leaks();
        match self {
            Parameter::Households => model.households as f64,
            Parameter::HouseholdSize => model.household_size,
            Parameter::Lpcd => model.lpcd,
            Parameter::DiscountRate => model.discount_rate,
            Parameter::BehavioralReduction => model.behavioral_reduction,
            Parameter::PersistencePlateau => config.persistence().plateau().unwrap_or(0.0),
            Parameter::LeakPrevalence => leaks.total_prevalence(),
            Parameter::LeakFlow => leaks.mean_flow_m3(),
            Parameter::DetectionRate => leaks.detection_rate(),
            Parameter::RepairRate => leaks.repair_rate(),
            Parameter::RepairCost => leaks.mean_repair_cost(),
            Parameter::SocialValue => config.water_value().social_value,
            Parameter::VariableCost => config.water_value().variable_cost,
            Parameter::MeterCost => meter.hardware_cost(),
            Parameter::InstallHours => meter.install_hours(),
            Parameter::HourlyRate => meter.hourly_rate(),
            Parameter::NetworkCost => meter.network_cost_per_meter(),
        }
    }

    /// Write `value` into the builder.
    pub fn apply(
        &self,
        mut builder: AnalysisConfigBuilder,
        value: f64,
    ) -> MeterCbaResult<AnalysisConfigBuilder> {
        if !value.is_finite() {
            return Err(MeterCbaError::invalid(
                self.label(),
                format!("override must be finite (got {value})"),
            ));
        }
        match self {
            Parameter::Households => {
                builder.model.households = value.round().max(0.0) as u64;
            }
            Parameter::HouseholdSize => builder.model.household_size = value,
            Parameter::Lpcd => builder.model.lpcd = value,
            Parameter::DiscountRate => builder.model.discount_rate = value,
            Parameter::BehavioralReduction => {
                builder.model.behavioral_reduction = value;
                builder.persistence = builder.persistence.rescaled(value)?;
            }
            Parameter::PersistencePlateau => {
                let capped = value.min(builder.persistence.initial());
                builder.persistence = builder.persistence.with_plateau(capped)?;
            }
            Parameter::LeakPrevalence => {
                builder.leaks = builder.leaks.to_builder().prevalence(value).build()?;
            }
            Parameter::LeakFlow => {
                let current = builder.leaks.mean_flow_m3();
                if current > 0.0 {
                    builder.leaks = builder
                        .leaks
                        .to_builder()
                        .scale_flows(value / current)
                        .build()?;
                }
            }
            Parameter::DetectionRate => {
                builder.leaks = builder.leaks.to_builder().detection_rate(value).build()?;
            }
            Parameter::RepairRate => {
                builder.leaks = builder.leaks.to_builder().repair_rate(value).build()?;
            }
            Parameter::RepairCost => {
                let current = builder.leaks.mean_repair_cost();
                if current > 0.0 {
                    builder.leaks = builder
                        .leaks
                        .to_builder()
                        .scale_repair_costs(value / current)
                        .build()?;
                }
            }
            Parameter::SocialValue => builder.water_value.social_value = value,
            Parameter::VariableCost => builder.water_value.variable_cost = value,
            Parameter::MeterCost => {
                builder.meter = builder.meter.to_builder().hardware_cost(value).build()?;
            }
            Parameter::InstallHours => {
                builder.meter = builder.meter.to_builder().install_hours(value).build()?;
            }
            Parameter::HourlyRate => {
                builder.meter = builder.meter.to_builder().hourly_rate(value).build()?;
            }
            Parameter::NetworkCost => {
                builder.meter = builder.meter.to_builder().network_cost(value).build()?;
            }
        }
        Ok(builder)
    }
}

impl AnalysisConfig {
    /// Derived configuration with absolute overrides, applied in
    /// [`Parameter`] order so a new behavioural reduction is resolved
    /// before a plateau that depends on it.
    pub fn with_overrides(
        &self,
        overrides: &[(Parameter, f64)],
    ) -> MeterCbaResult<AnalysisConfig> {
        let mut sorted = overrides.to_vec();
        sorted.sort_by_key(|(p, _)| *p);
        let mut builder = self.to_builder();
        for (parameter, value) in sorted {
            builder = parameter.apply(builder, value)?;
        }
        builder.build()
    }

    /// Derived configuration with one parameter multiplied by `factor`.
    /// Ratios are capped at 1.
    pub fn with_scaled(
        &self,
        parameter: Parameter,
        factor: f64,
    ) -> MeterCbaResult<AnalysisConfig> {
        self.with_scaled_many(&[(parameter, factor)])
    }

    /// Derived configuration with several multiplicative factors, each
    /// taken relative to this configuration.
    pub fn with_scaled_many(
        &self,
        factors: &[(Parameter, f64)],
    ) -> MeterCbaResult<AnalysisConfig> {
        let overrides: Vec<(Parameter, f64)> = factors
            .iter()
            .map(|&(parameter, factor)| {
                let mut value = parameter.value(self) * factor;
                if parameter.is_ratio() {
                    value = value.min(1.0);
                }
                (parameter, value)
            })
            .collect();
        self.with_overrides(&overrides)
    }
}
