use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::models::{PersistenceLaw, ScaleLaw};

/// Recommended range of a parameter, from published metering programmes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRange {
    pub min: f64,
    pub default: f64,
    pub max: f64,
}

impl CalibrationRange {
    const fn new(min: f64, default: f64, max: f64) -> Self {
        CalibrationRange { min, default, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibratedParameter {
    BehavioralReduction,
    PersistencePlateau,
    PersistenceDecay,
    LeakPrevalence,
    LeakFlow,
    RepairRate,
    RepairCost,
    ScaleFactorLargeFleet,
    SocialValue,
    VariableCost,
    DiscountRate,
}

impl CalibratedParameter {
    pub const ALL: [CalibratedParameter; 11] = [
        CalibratedParameter::BehavioralReduction,
        CalibratedParameter::PersistencePlateau,
        CalibratedParameter::PersistenceDecay,
        CalibratedParameter::LeakPrevalence,
        CalibratedParameter::LeakFlow,
        CalibratedParameter::RepairRate,
        CalibratedParameter::RepairCost,
        CalibratedParameter::ScaleFactorLargeFleet,
        CalibratedParameter::SocialValue,
        CalibratedParameter::VariableCost,
        CalibratedParameter::DiscountRate,
    ];

    pub fn range(&self) -> CalibrationRange {
        match self {
            CalibratedParameter::BehavioralReduction => CalibrationRange::new(0.05, 0.08, 0.15),
            CalibratedParameter::PersistencePlateau => CalibrationRange::new(0.0, 0.025, 0.05),
            CalibratedParameter::PersistenceDecay => CalibrationRange::new(0.10, 0.15, 0.35),
            CalibratedParameter::LeakPrevalence => CalibrationRange::new(0.12, 0.20, 0.25),
            CalibratedParameter::LeakFlow => CalibrationRange::new(20.0, 35.0, 75.0),
            CalibratedParameter::RepairRate => CalibrationRange::new(0.60, 0.85, 0.95),
            CalibratedParameter::RepairCost => CalibrationRange::new(100.0, 200.0, 500.0),
            CalibratedParameter::ScaleFactorLargeFleet => CalibrationRange::new(0.80, 0.85, 0.92),
            CalibratedParameter::SocialValue => CalibrationRange::new(2.50, 4.69, 8.00),
            CalibratedParameter::VariableCost => CalibrationRange::new(0.10, 0.50, 1.50),
            CalibratedParameter::DiscountRate => CalibrationRange::new(0.02, 0.03, 0.05),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CalibratedParameter::BehavioralReduction => "behavioural reduction",
            CalibratedParameter::PersistencePlateau => "persistence plateau",
            CalibratedParameter::PersistenceDecay => "persistence decay rate",
            CalibratedParameter::LeakPrevalence => "leak prevalence",
            CalibratedParameter::LeakFlow => "leak flow (m3/yr)",
            CalibratedParameter::RepairRate => "repair rate",
            CalibratedParameter::RepairCost => "repair cost ($)",
            CalibratedParameter::ScaleFactorLargeFleet => "scale factor above 100k meters",
            CalibratedParameter::SocialValue => "social value of water ($/m3)",
            CalibratedParameter::VariableCost => "variable cost of water ($/m3)",
            CalibratedParameter::DiscountRate => "discount rate",
        }
    }
}

/// A configured value compared with its recommended range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCheck {
    pub parameter: CalibratedParameter,
    pub value: f64,
    pub range: CalibrationRange,
    pub within: bool,
}

impl CalibrationCheck {
    pub fn warning(&self) -> Option<String> {
        if self.within {
            return None;
        }
        Some(format!(
            "{} = {} is outside the calibrated range [{}, {}]",
            self.parameter.label(),
            self.value,
            self.range.min,
            self.range.max
        ))
    }
}

/// Compare a configuration with the calibration table.
///
/// Parameters the configuration does not use (plateau without an
/// exponential law, scale factor without a stepwise or continuous law)
/// are skipped.
pub fn check_calibration(config: &AnalysisConfig) -> Vec<CalibrationCheck> {
    let mut values = vec![
        (
            CalibratedParameter::BehavioralReduction,
            config.model().behavioral_reduction,
        ),
        (
            CalibratedParameter::LeakPrevalence,
            config.leaks().total_prevalence(),
        ),
        (CalibratedParameter::LeakFlow, config.leaks().mean_flow_m3()),
        (CalibratedParameter::RepairRate, config.leaks().repair_rate()),
        (
            CalibratedParameter::SocialValue,
            config.water_value().social_value,
        ),
        (
            CalibratedParameter::VariableCost,
            config.water_value().variable_cost,
        ),
        (
            CalibratedParameter::DiscountRate,
            config.model().discount_rate,
        ),
    ];

    if let PersistenceLaw::ExponentialToPlateau {
        plateau,
        decay_rate,
        ..
    } = config.persistence()
    {
        values.push((CalibratedParameter::PersistencePlateau, *plateau));
        values.push((CalibratedParameter::PersistenceDecay, *decay_rate));
    }

    if config.leaks().include_repair_costs() {
        values.push((
            CalibratedParameter::RepairCost,
            config.leaks().mean_repair_cost(),
        ));
    }

    if !matches!(config.scale().law, ScaleLaw::Disabled) {
        values.push((
            CalibratedParameter::ScaleFactorLargeFleet,
            config.scale().factor(150_000.0),
        ));
    }

    values
        .into_iter()
        .map(|(parameter, value)| {
            let range = parameter.range();
            CalibrationCheck {
                parameter,
                value,
                range,
                within: range.contains(value),
            }
        })
        .collect()
}
