use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{MeterClass, MeterParameters, ModelParameters, WaterValueParameters};
use crate::error::MeterCbaError;
use crate::models::{AdoptionMode, AdoptionParameters, Incentive, LeakParameters, PersistenceLaw};
use crate::MeterCbaResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Name-keyed parameter sets, one map per configuration section.
///
/// The registry is a plain value: callers build it with
/// [`PresetRegistry::with_defaults`] (Québec calibration) and add their own
/// entries with the `insert_*` methods.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetRegistry {
    cities: BTreeMap<String, ModelParameters>,
    meters: BTreeMap<String, MeterParameters>,
    persistence: BTreeMap<String, PersistenceLaw>,
    leaks: BTreeMap<String, LeakParameters>,
    adoption: BTreeMap<String, AdoptionParameters>,
    water_values: BTreeMap<String, WaterValueParameters>,
}

/// Registered names per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetNames {
    pub cities: Vec<String>,
    pub meters: Vec<String>,
    pub persistence: Vec<String>,
    pub leaks: Vec<String>,
    pub adoption: Vec<String>,
    pub water_values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetCategory {
    City,
    Meter,
    Persistence,
    Leaks,
    Adoption,
    WaterValue,
}

impl PresetCategory {
    pub const ALL: [PresetCategory; 6] = [
        PresetCategory::City,
        PresetCategory::Meter,
        PresetCategory::Persistence,
        PresetCategory::Leaks,
        PresetCategory::Adoption,
        PresetCategory::WaterValue,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PresetCategory::City => "city",
            PresetCategory::Meter => "meter",
            PresetCategory::Persistence => "persistence",
            PresetCategory::Leaks => "leaks",
            PresetCategory::Adoption => "adoption",
            PresetCategory::WaterValue => "water_value",
        }
    }
}

fn lookup<T: Clone>(
    map: &BTreeMap<String, T>,
    category: PresetCategory,
    name: &str,
) -> MeterCbaResult<T> {
    map.get(name).cloned().ok_or_else(|| {
        let known: Vec<&str> = map.keys().map(String::as_str).collect();
        MeterCbaError::invalid(
            format!("presets.{}", category.label()),
            format!("unknown preset '{name}' (known: {})", known.join(", ")),
        )
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

impl PresetRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the Québec calibration sets.
    pub fn with_defaults() -> MeterCbaResult<Self> {
        let mut registry = PresetRegistry::new();
        registry.insert_default_cities();
        registry.insert_default_meters()?;
        registry.insert_default_persistence()?;
        registry.insert_default_leaks()?;
        registry.insert_default_adoption()?;
        registry.insert_default_water_values()?;
        Ok(registry)
    }

    fn insert_default_cities(&mut self) {
        self.insert_city("default", ModelParameters::default());
        self.insert_city("longueuil", ModelParameters::city(116_258, 2.18, 236.0));
        self.insert_city("montreal", ModelParameters::city(750_000, 2.1, 332.0));
        self.insert_city("quebec", ModelParameters::city(180_000, 2.15, 280.0));
        self.insert_city("winnipeg", ModelParameters::city(221_000, 2.3, 250.0));
    }

    fn insert_default_meters(&mut self) -> MeterCbaResult<()> {
        self.insert_meter("ami", MeterParameters::builder(MeterClass::Ami).build()?);
        self.insert_meter("amr", MeterParameters::builder(MeterClass::Amr).build()?);
        self.insert_meter(
            "manual",
            MeterParameters::builder(MeterClass::Manual).build()?,
        );
        self.insert_meter(
            "longueuil_ami",
            MeterParameters::builder(MeterClass::Ami)
                .hardware_cost(250.0)
                .install_hours(3.0)
                .hourly_rate(125.0)
                .network_cost(50.0)
                .build()?,
        );
        self.insert_meter(
            "winnipeg_ami",
            MeterParameters::builder(MeterClass::Ami)
                .hardware_cost(350.0)
                .install_hours(1.0)
                .hourly_rate(100.0)
                .network_cost(161.0)
                .build()?,
        );
        Ok(())
    }

    fn insert_default_persistence(&mut self) -> MeterCbaResult<()> {
        self.insert_persistence(
            "optimistic",
            PersistenceLaw::new(PersistenceLaw::Constant { initial: 0.08 })?,
        );
        self.insert_persistence(
            "realistic",
            PersistenceLaw::new(PersistenceLaw::ExponentialToPlateau {
                initial: 0.08,
                plateau: 0.025,
                decay_rate: 0.15,
            })?,
        );
        self.insert_persistence(
            "pessimistic",
            PersistenceLaw::new(PersistenceLaw::LinearFadeout {
                initial: 0.08,
                fadeout_years: 10,
            })?,
        );
        self.insert_persistence(
            "ultra_pessimistic",
            PersistenceLaw::new(PersistenceLaw::Constant { initial: 0.0 })?,
        );
        Ok(())
    }

    fn insert_default_leaks(&mut self) -> MeterCbaResult<()> {
        self.insert_leaks("standard", LeakParameters::single_stock().build()?);
        self.insert_leaks(
            "no_repair_cost",
            LeakParameters::single_stock()
                .include_repair_costs(false)
                .natural_duration_years(4.0)
                .build()?,
        );
        self.insert_leaks(
            "household_pays",
            LeakParameters::single_stock()
                .city_share(0.0)
                .repair_cost(200.0)
                .natural_duration_years(4.0)
                .build()?,
        );
        self.insert_leaks(
            "subsidy_50",
            LeakParameters::single_stock()
                .city_share(0.5)
                .natural_duration_years(4.0)
                .build()?,
        );
        self.insert_leaks(
            "city_pays",
            LeakParameters::single_stock()
                .city_share(1.0)
                .natural_duration_years(4.0)
                .build()?,
        );
        self.insert_leaks(
            "quebec",
            LeakParameters::single_stock()
                .prevalence(0.35)
                .flow_m3(35.0)
                .persistent_fraction(0.05)
                .natural_duration_years(7.0)
                .build()?,
        );
        self.insert_leaks("two_stock", LeakParameters::two_stock().build()?);
        self.insert_leaks(
            "quebec_two_stock",
            LeakParameters::two_stock()
                .prevalence(0.30)
                .flow_m3(10.0)
                .repair_cost(150.0)
                .significant(0.06, 50.0, 600.0)
                .persistent_fraction(0.05)
                .long_tail_factor(5.0)
                .natural_duration_years(6.0)
                .detection_rate(0.90)
                .repair_rate(0.85)
                .city_share(0.0)
                .build()?,
        );
        Ok(())
    }

    fn insert_default_adoption(&mut self) -> MeterCbaResult<()> {
        let rebate = |total| {
            Some(Incentive {
                total_per_household: total,
                duration_years: 3,
            })
        };
        self.insert_adoption("mandatory", AdoptionParameters::mandatory());
        self.insert_adoption(
            "fast",
            AdoptionParameters::new(
                AdoptionMode::Logistic {
                    speed: 1.5,
                    midpoint: 2.0,
                },
                0.95,
                1,
                rebate(540.0),
                true,
            )?,
        );
        self.insert_adoption(
            "progressive",
            AdoptionParameters::new(
                AdoptionMode::Logistic {
                    speed: 0.6,
                    midpoint: 5.0,
                },
                0.85,
                1,
                rebate(180.0),
                true,
            )?,
        );
        self.insert_adoption(
            "new_builds",
            AdoptionParameters::new(
                AdoptionMode::LinearNewBuilds { annual_rate: 0.03 },
                0.60,
                1,
                None,
                true,
            )?,
        );
        self.insert_adoption(
            "by_sector",
            AdoptionParameters::new(
                AdoptionMode::Staged {
                    sectors: 5,
                    years_per_sector: 2,
                },
                1.0,
                1,
                None,
                true,
            )?,
        );
        self.insert_adoption(
            "slow",
            AdoptionParameters::new(
                AdoptionMode::Logistic {
                    speed: 0.3,
                    midpoint: 10.0,
                },
                0.70,
                1,
                rebate(90.0),
                true,
            )?,
        );
        Ok(())
    }

    fn insert_default_water_values(&mut self) -> MeterCbaResult<()> {
        let quebec = WaterValueParameters::new(4.69, 0.50, 2.50);
        let quebec_mcf = WaterValueParameters {
            mcf: 1.20,
            apply_mcf: true,
            ..quebec.clone()
        };
        for (name, value) in [
            ("quebec", quebec),
            ("conservative", WaterValueParameters::new(2.50, 0.25, 2.00)),
            ("scarcity", WaterValueParameters::new(8.00, 2.50, 4.00)),
            ("quebec_mcf", quebec_mcf),
        ] {
            value.validate()?;
            self.insert_water_value(name, value);
        }
        Ok(())
    }

    // -- insertion ----------------------------------------------------------

    pub fn insert_city(&mut self, name: impl Into<String>, model: ModelParameters) {
        self.cities.insert(name.into(), model);
    }

    pub fn insert_meter(&mut self, name: impl Into<String>, meter: MeterParameters) {
        self.meters.insert(name.into(), meter);
    }

    pub fn insert_persistence(&mut self, name: impl Into<String>, law: PersistenceLaw) {
        self.persistence.insert(name.into(), law);
    }

    pub fn insert_leaks(&mut self, name: impl Into<String>, leaks: LeakParameters) {
        self.leaks.insert(name.into(), leaks);
    }

    pub fn insert_adoption(&mut self, name: impl Into<String>, adoption: AdoptionParameters) {
        self.adoption.insert(name.into(), adoption);
    }

    pub fn insert_water_value(&mut self, name: impl Into<String>, value: WaterValueParameters) {
        self.water_values.insert(name.into(), value);
    }

    // -- lookup -------------------------------------------------------------

    pub fn city(&self, name: &str) -> MeterCbaResult<ModelParameters> {
        lookup(&self.cities, PresetCategory::City, name)
    }

    pub fn meter(&self, name: &str) -> MeterCbaResult<MeterParameters> {
        lookup(&self.meters, PresetCategory::Meter, name)
    }

    pub fn persistence(&self, name: &str) -> MeterCbaResult<PersistenceLaw> {
        lookup(&self.persistence, PresetCategory::Persistence, name)
    }

    pub fn leaks(&self, name: &str) -> MeterCbaResult<LeakParameters> {
        lookup(&self.leaks, PresetCategory::Leaks, name)
    }

    pub fn adoption(&self, name: &str) -> MeterCbaResult<AdoptionParameters> {
        lookup(&self.adoption, PresetCategory::Adoption, name)
    }

    pub fn water_value(&self, name: &str) -> MeterCbaResult<WaterValueParameters> {
        lookup(&self.water_values, PresetCategory::WaterValue, name)
    }

    /// Persistence scenarios in name order.
    pub fn persistence_scenarios(&self) -> impl Iterator<Item = (&str, &PersistenceLaw)> {
        self.persistence.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names registered under one category, sorted.
    pub fn names_in(&self, category: PresetCategory) -> Vec<String> {
        fn keys<T>(map: &BTreeMap<String, T>) -> Vec<String> {
            map.keys().cloned().collect()
        }
        match category {
            PresetCategory::City => keys(&self.cities),
            PresetCategory::Meter => keys(&self.meters),
            PresetCategory::Persistence => keys(&self.persistence),
            PresetCategory::Leaks => keys(&self.leaks),
            PresetCategory::Adoption => keys(&self.adoption),
            PresetCategory::WaterValue => keys(&self.water_values),
        }
    }

    pub fn names(&self) -> PresetNames {
        PresetNames {
            cities: self.names_in(PresetCategory::City),
            meters: self.names_in(PresetCategory::Meter),
            persistence: self.names_in(PresetCategory::Persistence),
            leaks: self.names_in(PresetCategory::Leaks),
            adoption: self.names_in(PresetCategory::Adoption),
            water_values: self.names_in(PresetCategory::WaterValue),
        }
    }

    /// One preset rendered as JSON, for display.
    pub fn describe(
        &self,
        category: PresetCategory,
        name: &str,
    ) -> MeterCbaResult<serde_json::Value> {
        let value = match category {
            PresetCategory::City => serde_json::to_value(self.city(name)?)?,
            PresetCategory::Meter => serde_json::to_value(self.meter(name)?)?,
            PresetCategory::Persistence => serde_json::to_value(self.persistence(name)?)?,
            PresetCategory::Leaks => serde_json::to_value(self.leaks(name)?)?,
            PresetCategory::Adoption => serde_json::to_value(self.adoption(name)?)?,
            PresetCategory::WaterValue => serde_json::to_value(self.water_value(name)?)?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PresetRegistry {
        PresetRegistry::with_defaults().unwrap()
    }

    #[test]
    fn test_default_names() {
        let names = registry().names();
        assert_eq!(
            names.cities,
            vec!["default", "longueuil", "montreal", "quebec", "winnipeg"]
        );
        assert_eq!(names.meters.len(), 5);
        assert_eq!(
            names.persistence,
            vec!["optimistic", "pessimistic", "realistic", "ultra_pessimistic"]
        );
        assert_eq!(names.leaks.len(), 8);
        assert_eq!(names.adoption.len(), 6);
        assert_eq!(
            names.water_values,
            vec!["conservative", "quebec", "quebec_mcf", "scarcity"]
        );
    }

    #[test]
    fn test_longueuil_profile() {
        let r = registry();
        let city = r.city("longueuil").unwrap();
        assert_eq!(city.households, 116_258);
        assert_eq!(city.lpcd, 236.0);

        let meter = r.meter("longueuil_ami").unwrap();
        assert_eq!(meter.install_labor_cost(), 375.0);
        assert_eq!(meter.unit_capex(), 675.0);
    }

    #[test]
    fn test_quebec_two_stock_volume() {
        let leaks = registry().leaks("quebec_two_stock").unwrap();
        assert!(leaks.is_two_stock());
        assert!((leaks.total_prevalence() - 0.30).abs() < 1e-12);
        assert!((leaks.pre_correction_volume_m3() - 5.4).abs() < 1e-9);
        assert_eq!(leaks.city_repair_share(), 0.0);
    }

    #[test]
    fn test_no_repair_cost_has_no_city_share() {
        let r = registry();
        assert!(!r.leaks("no_repair_cost").unwrap().include_repair_costs());
        assert_eq!(r.leaks("city_pays").unwrap().city_repair_share(), 1.0);
        assert_eq!(r.leaks("subsidy_50").unwrap().city_repair_share(), 0.5);
    }

    #[test]
    fn test_voluntary_adoption_spreads_capex() {
        let r = registry();
        for name in r.names_in(PresetCategory::Adoption) {
            let adoption = r.adoption(&name).unwrap();
            assert_eq!(adoption.spread_capex, name != "mandatory", "{name}");
        }
        let fast = r.adoption("fast").unwrap();
        assert_eq!(fast.incentive_per_year(), 180.0);
    }

    #[test]
    fn test_quebec_mcf_applies_loading() {
        let value = registry().water_value("quebec_mcf").unwrap();
        assert!(value.apply_mcf);
        assert_eq!(value.mcf, 1.20);
        assert_eq!(value.social_value, 4.69);
    }

    #[test]
    fn test_unknown_name_is_invalid_input() {
        let err = registry().meter("smart_9000").unwrap_err();
        match err {
            MeterCbaError::InvalidInput { field, reason } => {
                assert_eq!(field, "presets.meter");
                assert!(reason.contains("longueuil_ami"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_registry_is_injectable() {
        let mut r = PresetRegistry::new();
        assert!(r.city("default").is_err());
        r.insert_city("tiny", ModelParameters::city(500, 2.0, 200.0));
        assert_eq!(r.city("tiny").unwrap().households, 500);
        let described = r.describe(PresetCategory::City, "tiny").unwrap();
        assert_eq!(described["households"], 500);
    }
}
