pub mod meter;
pub mod model;
pub mod parameter;
pub mod water_value;

use serde::{Deserialize, Serialize};

use crate::error::MeterCbaError;
use crate::models::{
    AdoptionParameters, LeakParameters, NetworkLossParameters, PersistenceLaw, ScaleEconomyConfig,
};
use crate::types::AccountingMode;
use crate::MeterCbaResult;

pub use meter::{MeterClass, MeterParameters, MeterParametersBuilder};
pub use model::ModelParameters;
pub use parameter::Parameter;
pub use water_value::WaterValueParameters;

/// Complete, validated input of one deterministic run.
///
/// Immutable once built. The behavioural persistence law always starts
/// at `model.behavioral_reduction`; derived configurations go through
/// [`AnalysisConfig::to_builder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AnalysisConfigSpec")]
pub struct AnalysisConfig {
    model: ModelParameters,
    meter: MeterParameters,
    persistence: PersistenceLaw,
    leaks: LeakParameters,
    adoption: AdoptionParameters,
    scale: ScaleEconomyConfig,
    water_value: WaterValueParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    network: Option<NetworkLossParameters>,
    mode: AccountingMode,
}

/// Wire shape of [`AnalysisConfig`]; every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AnalysisConfigSpec {
    model: ModelParameters,
    meter: MeterParameters,
    persistence: PersistenceLaw,
    leaks: LeakParameters,
    adoption: AdoptionParameters,
    scale: ScaleEconomyConfig,
    water_value: WaterValueParameters,
    network: Option<NetworkLossParameters>,
    mode: AccountingMode,
}

impl TryFrom<AnalysisConfigSpec> for AnalysisConfig {
    type Error = MeterCbaError;

    fn try_from(spec: AnalysisConfigSpec) -> Result<Self, Self::Error> {
        AnalysisConfig::builder()
            .model(spec.model)
            .meter(spec.meter)
            .persistence(spec.persistence)
            .leaks(spec.leaks)
            .adoption(spec.adoption)
            .scale(spec.scale)
            .water_value(spec.water_value)
            .network(spec.network)
            .mode(spec.mode)
            .build()
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfigBuilder::default().resolve_unchecked()
    }
}

impl AnalysisConfig {
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    pub fn to_builder(&self) -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            model: self.model.clone(),
            meter: self.meter.clone(),
            persistence: self.persistence.clone(),
            leaks: self.leaks.clone(),
            adoption: self.adoption.clone(),
            scale: self.scale.clone(),
            water_value: self.water_value.clone(),
            network: self.network.clone(),
            mode: self.mode,
        }
    }

    /// Re-check every section. Built configurations always pass.
    pub fn validate(&self) -> MeterCbaResult<()> {
        self.model.validate()?;
        self.meter.validate()?;
        self.persistence.validate()?;
        self.leaks.validate()?;
        self.adoption.validate()?;
        self.scale.validate()?;
        self.water_value.validate()?;
        if let Some(network) = &self.network {
            network.validate()?;
        }
        Ok(())
    }

    pub fn model(&self) -> &ModelParameters {
        &self.model
    }

    pub fn meter(&self) -> &MeterParameters {
        &self.meter
    }

    pub fn persistence(&self) -> &PersistenceLaw {
        &self.persistence
    }

    pub fn leaks(&self) -> &LeakParameters {
        &self.leaks
    }

    pub fn adoption(&self) -> &AdoptionParameters {
        &self.adoption
    }

    pub fn scale(&self) -> &ScaleEconomyConfig {
        &self.scale
    }

    pub fn water_value(&self) -> &WaterValueParameters {
        &self.water_value
    }

    pub fn network(&self) -> Option<&NetworkLossParameters> {
        self.network.as_ref()
    }

    pub fn mode(&self) -> AccountingMode {
        self.mode
    }

    pub fn horizon(&self) -> u32 {
        self.model.horizon_years
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisConfigBuilder {
    model: ModelParameters,
    meter: MeterParameters,
    persistence: PersistenceLaw,
    leaks: LeakParameters,
    adoption: AdoptionParameters,
    scale: ScaleEconomyConfig,
    water_value: WaterValueParameters,
    network: Option<NetworkLossParameters>,
    mode: AccountingMode,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: ModelParameters) -> Self {
        self.model = model;
        self
    }

    /// Edit the municipality parameters in place.
    pub fn with_model(mut self, f: impl FnOnce(&mut ModelParameters)) -> Self {
        f(&mut self.model);
        self
    }

    pub fn meter(mut self, meter: MeterParameters) -> Self {
        self.meter = meter;
        self
    }

    /// Decay law of the behavioural effect. Its shape is kept, its
    /// starting level follows `model.behavioral_reduction`.
    pub fn persistence(mut self, law: PersistenceLaw) -> Self {
        self.persistence = law;
        self
    }

    /// Use a persistence scenario as given, aligning the behavioural
    /// reduction on the scenario's initial coefficient.
    pub fn persistence_scenario(mut self, law: PersistenceLaw) -> Self {
        self.model.behavioral_reduction = law.initial();
        self.persistence = law;
        self
    }

    pub fn leaks(mut self, leaks: LeakParameters) -> Self {
        self.leaks = leaks;
        self
    }

    pub fn adoption(mut self, adoption: AdoptionParameters) -> Self {
        self.adoption = adoption;
        self
    }

    pub fn scale(mut self, scale: ScaleEconomyConfig) -> Self {
        self.scale = scale;
        self
    }

    pub fn water_value(mut self, water_value: WaterValueParameters) -> Self {
        self.water_value = water_value;
        self
    }

    pub fn with_water_value(mut self, f: impl FnOnce(&mut WaterValueParameters)) -> Self {
        f(&mut self.water_value);
        self
    }

    pub fn network(mut self, network: Option<NetworkLossParameters>) -> Self {
        self.network = network;
        self
    }

    pub fn mode(mut self, mode: AccountingMode) -> Self {
        self.mode = mode;
        self
    }

    fn resolve_unchecked(self) -> AnalysisConfig {
        let persistence = self
            .persistence
            .rescaled(self.model.behavioral_reduction)
            .unwrap_or(self.persistence);
        AnalysisConfig {
            model: self.model,
            meter: self.meter,
            persistence,
            leaks: self.leaks,
            adoption: self.adoption,
            scale: self.scale,
            water_value: self.water_value,
            network: self.network,
            mode: self.mode,
        }
    }

    /// Validate every section and resolve the coherent persistence law.
    pub fn build(self) -> MeterCbaResult<AnalysisConfig> {
        self.model.validate()?;
        self.persistence.validate()?;
        let persistence = self.persistence.rescaled(self.model.behavioral_reduction)?;
        let config = AnalysisConfig {
            persistence,
            ..self.resolve_unchecked()
        };
        config.validate()?;
        Ok(config)
    }
}
