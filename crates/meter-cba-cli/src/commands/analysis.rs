use clap::{Args, ValueEnum};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use meter_cba_core::{run_analysis, AccountingMode, AnalysisConfig, PresetRegistry};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Economic,
    Financial,
}

impl From<ModeArg> for AccountingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Economic => AccountingMode::Economic,
            ModeArg::Financial => AccountingMode::Financial,
        }
    }
}

/// Configuration source shared by every analysis command.
///
/// Preset flags are applied over the file (or piped JSON, or defaults).
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Path to a JSON or YAML configuration file
    #[arg(long)]
    pub config: Option<String>,

    /// City profile preset (households, household size, consumption)
    #[arg(long)]
    pub city: Option<String>,

    /// Meter preset
    #[arg(long)]
    pub meter: Option<String>,

    /// Behavioural persistence preset
    #[arg(long)]
    pub persistence: Option<String>,

    /// Leak scenario preset
    #[arg(long)]
    pub leaks: Option<String>,

    /// Adoption strategy preset
    #[arg(long)]
    pub adoption: Option<String>,

    /// Water valuation preset
    #[arg(long)]
    pub water_value: Option<String>,

    /// Accounting perspective
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
        let base: AnalysisConfig =
            input::read_optional(self.config.as_deref())?.unwrap_or_default();

        let has_presets = self.city.is_some()
            || self.meter.is_some()
            || self.persistence.is_some()
            || self.leaks.is_some()
            || self.adoption.is_some()
            || self.water_value.is_some();
        if !has_presets && self.mode.is_none() {
            return Ok(base);
        }

        let presets = PresetRegistry::with_defaults()?;
        let mut builder = base.to_builder();
        if let Some(name) = &self.city {
            debug!(name = %name, "city preset");
            builder = builder.model(presets.city(name)?);
        }
        if let Some(name) = &self.meter {
            debug!(name = %name, "meter preset");
            builder = builder.meter(presets.meter(name)?);
        }
        if let Some(name) = &self.persistence {
            debug!(name = %name, "persistence preset");
            builder = builder.persistence(presets.persistence(name)?);
        }
        if let Some(name) = &self.leaks {
            debug!(name = %name, "leak preset");
            builder = builder.leaks(presets.leaks(name)?);
        }
        if let Some(name) = &self.adoption {
            debug!(name = %name, "adoption preset");
            builder = builder.adoption(presets.adoption(name)?);
        }
        if let Some(name) = &self.water_value {
            debug!(name = %name, "water value preset");
            builder = builder.water_value(presets.water_value(name)?);
        }
        if let Some(mode) = self.mode {
            builder = builder.mode(mode.into());
        }
        let config = builder.build()?;
        info!(
            households = config.model().households,
            horizon = config.horizon(),
            "configuration resolved"
        );
        Ok(config)
    }
}

/// Arguments for a deterministic run
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

pub fn run(args: RunArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = args.config.load()?;
    let start = Instant::now();
    let output = run_analysis(&config)?;
    debug!(elapsed_ms = start.elapsed().as_millis() as u64, "run finished");
    Ok(serde_json::to_value(output)?)
}
