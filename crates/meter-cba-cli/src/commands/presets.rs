use clap::{Args, ValueEnum};
use serde_json::Value;

use meter_cba_core::presets::PresetCategory;
use meter_cba_core::PresetRegistry;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CategoryArg {
    City,
    Meter,
    Persistence,
    Leaks,
    Adoption,
    WaterValue,
}

impl From<CategoryArg> for PresetCategory {
    fn from(category: CategoryArg) -> Self {
        match category {
            CategoryArg::City => PresetCategory::City,
            CategoryArg::Meter => PresetCategory::Meter,
            CategoryArg::Persistence => PresetCategory::Persistence,
            CategoryArg::Leaks => PresetCategory::Leaks,
            CategoryArg::Adoption => PresetCategory::Adoption,
            CategoryArg::WaterValue => PresetCategory::WaterValue,
        }
    }
}

/// Arguments for listing presets
#[derive(Args, Debug)]
pub struct PresetsArgs {
    /// Category to list; every category when omitted
    #[arg(value_enum)]
    pub category: Option<CategoryArg>,

    /// Preset to show in full
    pub name: Option<String>,
}

pub fn run_presets(args: PresetsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let presets = PresetRegistry::with_defaults()?;
    match (args.category, args.name) {
        (Some(category), Some(name)) => Ok(presets.describe(category.into(), &name)?),
        (Some(category), None) => {
            let category: PresetCategory = category.into();
            let mut map = serde_json::Map::new();
            map.insert(
                category.label().to_string(),
                serde_json::to_value(presets.names_in(category))?,
            );
            Ok(Value::Object(map))
        }
        (None, Some(_)) => Err("a category is required to show a preset".into()),
        (None, None) => Ok(serde_json::to_value(presets.names())?),
    }
}
