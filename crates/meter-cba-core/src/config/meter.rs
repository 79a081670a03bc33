use serde::{Deserialize, Serialize};

use crate::error::{check_non_negative, check_ratio, MeterCbaError};
use crate::types::{Money, Ratio};
use crate::MeterCbaResult;

/// Metering technology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterClass {
    /// Advanced metering infrastructure: fixed network, near real-time data.
    #[default]
    Ami,
    /// Automated meter reading: drive-by radio collection.
    Amr,
    /// Manually read meter.
    Manual,
}

impl MeterClass {
    /// Default (behaviour, leak) efficiency multipliers relative to AMI.
    pub fn default_efficiency(&self) -> (Ratio, Ratio) {
        match self {
            MeterClass::Ami => (1.0, 1.0),
            MeterClass::Amr => (0.875, 0.91),
            MeterClass::Manual => (0.625, 0.765),
        }
    }

    /// Upper bound of the efficiency multipliers: the next class up's defaults.
    pub fn efficiency_ceiling(&self) -> (Ratio, Ratio) {
        match self {
            MeterClass::Ami | MeterClass::Amr => MeterClass::Ami.default_efficiency(),
            MeterClass::Manual => MeterClass::Amr.default_efficiency(),
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(self, MeterClass::Ami | MeterClass::Amr)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MeterClass::Ami => "AMI",
            MeterClass::Amr => "AMR",
            MeterClass::Manual => "Manual",
        }
    }
}

/// Unit costs, service lives, and effect multipliers of one meter class.
///
/// Built with [`MeterParameters::builder`], which fills class-specific
/// maintenance, reading, and efficiency defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MeterParametersBuilder")]
pub struct MeterParameters {
    class: MeterClass,
    hardware_cost: Money,
    install_hours: f64,
    hourly_rate: Money,
    /// Network share per meter (collectors, backhaul). AMI only.
    network_cost: Money,
    /// Head-end system and software licences, paid once. AMI only.
    fixed_infrastructure_cost: Money,
    meter_life_years: u32,
    battery_life_years: u32,
    battery_replacement_cost: Money,
    maintenance_cost: Money,
    reading_cost: Money,
    non_technical_opex: Money,
    behavior_efficiency: Ratio,
    leak_efficiency: Ratio,
}

impl Default for MeterParameters {
    fn default() -> Self {
        MeterParametersBuilder::new(MeterClass::Ami).resolve()
    }
}

impl MeterParameters {
    pub fn builder(class: MeterClass) -> MeterParametersBuilder {
        MeterParametersBuilder::new(class)
    }

    pub fn to_builder(&self) -> MeterParametersBuilder {
        MeterParametersBuilder {
            class: self.class,
            hardware_cost: Some(self.hardware_cost),
            install_hours: Some(self.install_hours),
            hourly_rate: Some(self.hourly_rate),
            network_cost: Some(self.network_cost),
            fixed_infrastructure_cost: Some(self.fixed_infrastructure_cost),
            meter_life_years: Some(self.meter_life_years),
            battery_life_years: Some(self.battery_life_years),
            battery_replacement_cost: Some(self.battery_replacement_cost),
            maintenance_cost: Some(self.maintenance_cost),
            reading_cost: Some(self.reading_cost),
            non_technical_opex: Some(self.non_technical_opex),
            behavior_efficiency: Some(self.behavior_efficiency),
            leak_efficiency: Some(self.leak_efficiency),
        }
    }

    pub fn validate(&self) -> MeterCbaResult<()> {
        check_non_negative("meter.hardware_cost", self.hardware_cost)?;
        check_non_negative("meter.install_hours", self.install_hours)?;
        check_non_negative("meter.hourly_rate", self.hourly_rate)?;
        check_non_negative("meter.network_cost", self.network_cost)?;
        check_non_negative(
            "meter.fixed_infrastructure_cost",
            self.fixed_infrastructure_cost,
        )?;
        check_non_negative(
            "meter.battery_replacement_cost",
            self.battery_replacement_cost,
        )?;
        check_non_negative("meter.maintenance_cost", self.maintenance_cost)?;
        check_non_negative("meter.reading_cost", self.reading_cost)?;
        check_non_negative("meter.non_technical_opex", self.non_technical_opex)?;
        if self.meter_life_years < 1 {
            return Err(MeterCbaError::invalid(
                "meter.meter_life_years",
                "must be at least 1",
            ));
        }
        if self.battery_life_years < 1 {
            return Err(MeterCbaError::invalid(
                "meter.battery_life_years",
                "must be at least 1",
            ));
        }

        check_ratio("meter.behavior_efficiency", self.behavior_efficiency)?;
        check_ratio("meter.leak_efficiency", self.leak_efficiency)?;
        let (max_behavior, max_leak) = self.class.efficiency_ceiling();
        if self.behavior_efficiency > max_behavior {
            return Err(MeterCbaError::invalid(
                "meter.behavior_efficiency",
                format!(
                    "{} meters cannot exceed {max_behavior} (got {})",
                    self.class.label(),
                    self.behavior_efficiency
                ),
            ));
        }
        if self.leak_efficiency > max_leak {
            return Err(MeterCbaError::invalid(
                "meter.leak_efficiency",
                format!(
                    "{} meters cannot exceed {max_leak} (got {})",
                    self.class.label(),
                    self.leak_efficiency
                ),
            ));
        }
        Ok(())
    }

    pub fn class(&self) -> MeterClass {
        self.class
    }

    pub fn hardware_cost(&self) -> Money {
        self.hardware_cost
    }

    pub fn install_hours(&self) -> f64 {
        self.install_hours
    }

    pub fn hourly_rate(&self) -> Money {
        self.hourly_rate
    }

    pub fn install_labor_cost(&self) -> Money {
        self.install_hours * self.hourly_rate
    }

    /// Network cost counted per meter; zero for classes without a fixed network.
    pub fn network_cost_per_meter(&self) -> Money {
        match self.class {
            MeterClass::Ami => self.network_cost,
            MeterClass::Amr | MeterClass::Manual => 0.0,
        }
    }

    pub fn fixed_infrastructure_cost(&self) -> Money {
        match self.class {
            MeterClass::Ami => self.fixed_infrastructure_cost,
            MeterClass::Amr | MeterClass::Manual => 0.0,
        }
    }

    /// Installed cost of one meter before volume discounts.
    pub fn unit_capex(&self) -> Money {
        self.hardware_cost + self.install_labor_cost() + self.network_cost_per_meter()
    }

    /// Recurring cost per equipped household and year.
    pub fn annual_opex(&self) -> Money {
        self.maintenance_cost + self.reading_cost + self.non_technical_opex
    }

    pub fn meter_life_years(&self) -> u32 {
        self.meter_life_years
    }

    pub fn battery_life_years(&self) -> u32 {
        self.battery_life_years
    }

    pub fn battery_replacement_cost(&self) -> Money {
        self.battery_replacement_cost
    }

    pub fn has_battery(&self) -> bool {
        self.class.has_battery()
    }

    pub fn behavior_efficiency(&self) -> Ratio {
        self.behavior_efficiency
    }

    pub fn leak_efficiency(&self) -> Ratio {
        self.leak_efficiency
    }
}

/// Unset fields take the class defaults. Also the wire shape of
/// [`MeterParameters`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MeterParametersBuilder {
    class: MeterClass,
    hardware_cost: Option<Money>,
    install_hours: Option<f64>,
    hourly_rate: Option<Money>,
    network_cost: Option<Money>,
    fixed_infrastructure_cost: Option<Money>,
    meter_life_years: Option<u32>,
    battery_life_years: Option<u32>,
    battery_replacement_cost: Option<Money>,
    maintenance_cost: Option<Money>,
    reading_cost: Option<Money>,
    non_technical_opex: Option<Money>,
    behavior_efficiency: Option<Ratio>,
    leak_efficiency: Option<Ratio>,
}

impl TryFrom<MeterParametersBuilder> for MeterParameters {
    type Error = MeterCbaError;

    fn try_from(builder: MeterParametersBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl MeterParametersBuilder {
    fn new(class: MeterClass) -> Self {
        MeterParametersBuilder {
            class,
            hardware_cost: None,
            install_hours: None,
            hourly_rate: None,
            network_cost: None,
            fixed_infrastructure_cost: None,
            meter_life_years: None,
            battery_life_years: None,
            battery_replacement_cost: None,
            maintenance_cost: None,
            reading_cost: None,
            non_technical_opex: None,
            behavior_efficiency: None,
            leak_efficiency: None,
        }
    }

    /// Switch meter class, dropping class-dependent values so they are re-derived.
    pub fn class(mut self, class: MeterClass) -> Self {
        if class != self.class {
            self.class = class;
            self.maintenance_cost = None;
            self.reading_cost = None;
            self.non_technical_opex = None;
            self.behavior_efficiency = None;
            self.leak_efficiency = None;
        }
        self
    }

    pub fn hardware_cost(mut self, v: Money) -> Self {
        self.hardware_cost = Some(v);
        self
    }

    pub fn install_hours(mut self, v: f64) -> Self {
        self.install_hours = Some(v);
        self
    }

    pub fn hourly_rate(mut self, v: Money) -> Self {
        self.hourly_rate = Some(v);
        self
    }

    pub fn network_cost(mut self, v: Money) -> Self {
        self.network_cost = Some(v);
        self
    }

    pub fn fixed_infrastructure_cost(mut self, v: Money) -> Self {
        self.fixed_infrastructure_cost = Some(v);
        self
    }

    pub fn meter_life_years(mut self, v: u32) -> Self {
        self.meter_life_years = Some(v);
        self
    }

    pub fn battery_life_years(mut self, v: u32) -> Self {
        self.battery_life_years = Some(v);
        self
    }

    pub fn battery_replacement_cost(mut self, v: Money) -> Self {
        self.battery_replacement_cost = Some(v);
        self
    }

    pub fn maintenance_cost(mut self, v: Money) -> Self {
        self.maintenance_cost = Some(v);
        self
    }

    pub fn reading_cost(mut self, v: Money) -> Self {
        self.reading_cost = Some(v);
        self
    }

    pub fn non_technical_opex(mut self, v: Money) -> Self {
        self.non_technical_opex = Some(v);
        self
    }

    pub fn behavior_efficiency(mut self, v: Ratio) -> Self {
        self.behavior_efficiency = Some(v);
        self
    }

    pub fn leak_efficiency(mut self, v: Ratio) -> Self {
        self.leak_efficiency = Some(v);
        self
    }

    fn resolve(self) -> MeterParameters {
        let class = self.class;
        let (default_behavior, default_leak) = class.default_efficiency();
        let (maintenance, reading, non_technical) = match class {
            MeterClass::Ami => (5.0, 0.0, 15.0),
            MeterClass::Amr => (8.0, 8.0, 0.0),
            MeterClass::Manual => (3.0, 25.0, 0.0),
        };

        MeterParameters {
            class,
            hardware_cost: self.hardware_cost.unwrap_or(250.0),
            install_hours: self.install_hours.unwrap_or(1.5),
            hourly_rate: self.hourly_rate.unwrap_or(125.0),
            network_cost: self.network_cost.unwrap_or(50.0),
            fixed_infrastructure_cost: self.fixed_infrastructure_cost.unwrap_or(0.0),
            meter_life_years: self.meter_life_years.unwrap_or(20),
            battery_life_years: self.battery_life_years.unwrap_or(15),
            battery_replacement_cost: self.battery_replacement_cost.unwrap_or(30.0),
            maintenance_cost: self.maintenance_cost.unwrap_or(maintenance),
            reading_cost: self.reading_cost.unwrap_or(reading),
            non_technical_opex: self.non_technical_opex.unwrap_or(non_technical),
            behavior_efficiency: self.behavior_efficiency.unwrap_or(default_behavior),
            leak_efficiency: self.leak_efficiency.unwrap_or(default_leak),
        }
    }

    pub fn build(self) -> MeterCbaResult<MeterParameters> {
        let meter = self.resolve();
        meter.validate()?;
        Ok(meter)
    }
}
