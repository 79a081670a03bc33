use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::models::adoption::increments;
use crate::models::{LeakSeries, NetworkSeries, ScaledUnitCost};
use crate::types::{CubicMeters, Money, Ratio};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One year of the deployment, city-wide and in nominal dollars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualLedgerEntry {
    pub year: u32,
    /// Cumulative share of households equipped.
    pub adoption: Ratio,
    /// Share of households equipped this year.
    pub new_adoption: Ratio,
    /// Fleet-average behavioural coefficient of equipped households.
    pub behavioral_coefficient: Ratio,
    pub capex: Money,
    pub opex: Money,
    pub battery_cost: Money,
    pub meter_replacement_cost: Money,
    pub behavioral_m3: CubicMeters,
    pub leak_m3: CubicMeters,
    pub network_m3: CubicMeters,
    pub repair_cost_total: Money,
    pub repair_cost_city: Money,
    pub repair_cost_household: Money,
    pub incentive_cost: Money,
    pub network_cost: Money,
    pub infrastructure_benefit: Money,
}

impl AnnualLedgerEntry {
    pub fn water_saved_m3(&self) -> CubicMeters {
        self.behavioral_m3 + self.leak_m3 + self.network_m3
    }
}

/// Effects on one equipped household, indexed by year of meter age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdProfile {
    pub base_consumption_m3: CubicMeters,
    /// Consumption open to behavioural change (base minus leak volume).
    pub reducible_m3: CubicMeters,
    pub behavioral_coefficient: Vec<Ratio>,
    pub behavioral_m3: Vec<CubicMeters>,
    pub leaks: LeakSeries,
    pub battery_cost: Vec<Money>,
    pub meter_replacement_cost: Vec<Money>,
    pub incentive: Vec<Money>,
}

impl HouseholdProfile {
    pub fn water_saved_m3(&self, age_index: usize) -> CubicMeters {
        self.behavioral_m3[age_index] + self.leaks.avoided_m3[age_index]
    }
}

/// Ledger of a full run plus the quantities derived while building it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// CAPEX recognised upfront (undiscounted), zero when spread.
    pub year_zero_capex: Money,
    pub entries: Vec<AnnualLedgerEntry>,
    pub per_household: HouseholdProfile,
    /// Meters installed by the end of the horizon.
    pub fleet_size: f64,
    pub unit_capex: Money,
    pub scaled_unit_cost: ScaledUnitCost,
    pub fixed_infrastructure: Money,
}

impl Trajectory {
    pub fn horizon(&self) -> usize {
        self.entries.len()
    }

    pub fn final_adoption(&self) -> Ratio {
        self.entries.last().map(|e| e.adoption).unwrap_or(0.0)
    }

    /// Undiscounted CAPEX over the horizon, upfront part included.
    pub fn total_capex(&self) -> Money {
        self.year_zero_capex + self.entries.iter().map(|e| e.capex).sum::<Money>()
    }

    pub fn scale_savings(&self) -> Money {
        self.scaled_unit_cost.savings * self.fleet_size
    }

    pub fn column(&self, f: impl Fn(&AnnualLedgerEntry) -> f64) -> Vec<f64> {
        self.entries.iter().map(f).collect()
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// `true` when a component with this service life is replaced at `age`
/// (1-based) within a horizon of `horizon` years.
fn is_replacement_age(age: u32, life: u32, horizon: u32) -> bool {
    life > 0 && age % life == 0 && age < horizon
}

fn household_profile(config: &AnalysisConfig, scaled: &ScaledUnitCost) -> HouseholdProfile {
    let horizon = config.horizon();
    let model = config.model();
    let meter = config.meter();
    let adoption = config.adoption();

    let base = model.base_consumption_m3();
    let reducible = (base - config.leaks().pre_correction_volume_m3()).max(0.0);

    let coefficients = config.persistence().series(horizon);
    let behavioral_m3 = coefficients
        .iter()
        .map(|alpha| reducible * alpha * meter.behavior_efficiency())
        .collect();

    let leaks = config.leaks().simulate(horizon, meter.leak_efficiency());

    let replacement_unit = scaled.hardware + scaled.installation;
    let incentive_per_year = adoption.incentive_per_year();
    let incentive_years = adoption.incentive_duration();

    let mut battery_cost = Vec::with_capacity(horizon as usize);
    let mut meter_replacement_cost = Vec::with_capacity(horizon as usize);
    let mut incentive = Vec::with_capacity(horizon as usize);
    for age in 1..=horizon {
        let battery = meter.has_battery()
            && is_replacement_age(age, meter.battery_life_years(), horizon);
        battery_cost.push(if battery {
            meter.battery_replacement_cost()
        } else {
            0.0
        });
        let replaced = is_replacement_age(age, meter.meter_life_years(), horizon);
        meter_replacement_cost.push(if replaced { replacement_unit } else { 0.0 });
        incentive.push(if age <= incentive_years {
            incentive_per_year
        } else {
            0.0
        });
    }

    HouseholdProfile {
        base_consumption_m3: base,
        reducible_m3: reducible,
        behavioral_coefficient: coefficients,
        behavioral_m3,
        leaks,
        battery_cost,
        meter_replacement_cost,
        incentive,
    }
}

/// City-wide value in year `t` of a per-household profile applied to
/// every installation cohort: `H * sum_c delta(c) * profile(t - c)`.
fn convolve(households: f64, deltas: &[Ratio], profile: &[f64], t: usize) -> f64 {
    let mut total = 0.0;
    for (c, delta) in deltas.iter().enumerate().take(t + 1) {
        if *delta > 0.0 {
            total += delta * profile[t - c];
        }
    }
    households * total
}

/// Build the annual ledger of a configuration.
pub fn generate_trajectory(config: &AnalysisConfig) -> Trajectory {
    let horizon = config.horizon();
    let t_len = horizon as usize;
    let model = config.model();
    let meter = config.meter();
    let adoption = config.adoption();
    let households = model.households as f64;

    let adoption_series = adoption.series(horizon);
    let deltas = increments(&adoption_series);
    let final_adoption = adoption.final_fraction(horizon);

    let fleet_size = households * final_adoption;
    let scaled = config.scale().scaled_unit_cost(meter, fleet_size);
    let fixed_infrastructure = meter.fixed_infrastructure_cost();

    let profile = household_profile(config, &scaled);

    let network = match config.network() {
        Some(params) => params.simulate(&adoption_series),
        None => NetworkSeries {
            reduction: vec![0.0; t_len],
            saved_m3: vec![0.0; t_len],
            program_cost: vec![0.0; t_len],
            variable_cost: vec![0.0; t_len],
            capex: vec![0.0; t_len],
        },
    };

    let (year_zero_capex, capex_series) = if adoption.spread_capex {
        let first_year = deltas.iter().position(|&d| d > 0.0);
        let series = deltas
            .iter()
            .enumerate()
            .map(|(t, delta)| {
                let infra = if Some(t) == first_year {
                    fixed_infrastructure
                } else {
                    0.0
                };
                scaled.total * households * delta + infra
            })
            .collect();
        (0.0, series)
    } else {
        let upfront = scaled.total * fleet_size + fixed_infrastructure;
        (upfront, vec![0.0; t_len])
    };

    let annual_opex = meter.annual_opex();
    let mut entries = Vec::with_capacity(t_len);
    for t in 0..t_len {
        let a = adoption_series[t];

        let weighted_alpha = convolve(1.0, &deltas, &profile.behavioral_coefficient, t);
        let behavioral_coefficient = if a > 0.0 { weighted_alpha / a } else { 0.0 };

        let behavioral_m3 = convolve(households, &deltas, &profile.behavioral_m3, t);
        let leak_m3 = convolve(households, &deltas, &profile.leaks.avoided_m3, t);
        let network_m3 = network.saved_m3[t];
        let total_m3 = behavioral_m3 + leak_m3 + network_m3;

        entries.push(AnnualLedgerEntry {
            year: t as u32 + 1,
            adoption: a,
            new_adoption: deltas[t],
            behavioral_coefficient,
            capex: capex_series[t],
            opex: annual_opex * households * a,
            battery_cost: convolve(households, &deltas, &profile.battery_cost, t),
            meter_replacement_cost: convolve(
                households,
                &deltas,
                &profile.meter_replacement_cost,
                t,
            ),
            behavioral_m3,
            leak_m3,
            network_m3,
            repair_cost_total: convolve(households, &deltas, &profile.leaks.repair_cost_total, t),
            repair_cost_city: convolve(households, &deltas, &profile.leaks.repair_cost_city, t),
            repair_cost_household: convolve(
                households,
                &deltas,
                &profile.leaks.repair_cost_household,
                t,
            ),
            incentive_cost: convolve(households, &deltas, &profile.incentive, t),
            network_cost: network.total_cost(t),
            infrastructure_benefit: model.infrastructure_deferral_annual * a
                + model.infrastructure_deferral_per_m3 * total_m3,
        });
    }

    Trajectory {
        year_zero_capex,
        entries,
        per_household: profile,
        fleet_size,
        unit_capex: meter.unit_capex(),
        scaled_unit_cost: scaled,
        fixed_infrastructure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MeterClass, MeterParameters, ModelParameters};
    use crate::models::{AdoptionMode, AdoptionParameters, Incentive, PersistenceLaw};

    fn base_config() -> AnalysisConfig {
        AnalysisConfig::builder()
            .model(ModelParameters::city(10_000, 2.0, 250.0))
            .build()
            .unwrap()
    }

    fn staged(spread: bool) -> AdoptionParameters {
        AdoptionParameters::new(
            AdoptionMode::Staged {
                sectors: 4,
                years_per_sector: 2,
            },
            1.0,
            1,
            None,
            spread,
        )
        .unwrap()
    }

    #[test]
    fn test_mandatory_upfront_capex() {
        let config = base_config();
        let traj = generate_trajectory(&config);
        let expected = config.meter().unit_capex() * 10_000.0;
        assert!((traj.year_zero_capex - expected).abs() < 1e-6);
        assert!(traj.entries.iter().all(|e| e.capex == 0.0));
        assert_eq!(traj.horizon(), 20);
    }

    #[test]
    fn test_spread_capex_matches_upfront_total() {
        let upfront = generate_trajectory(
            &base_config().to_builder().adoption(staged(false)).build().unwrap(),
        );
        let spread = generate_trajectory(
            &base_config().to_builder().adoption(staged(true)).build().unwrap(),
        );
        assert_eq!(spread.year_zero_capex, 0.0);
        assert!((spread.total_capex() - upfront.total_capex()).abs() < 1e-6);
        assert!(spread.entries[0].capex > 0.0);
    }

    #[test]
    fn test_fixed_infrastructure_in_first_adoption_year() {
        let meter = MeterParameters::builder(MeterClass::Ami)
            .fixed_infrastructure_cost(2_000_000.0)
            .build()
            .unwrap();
        let adoption = AdoptionParameters::new(
            AdoptionMode::Staged {
                sectors: 4,
                years_per_sector: 2,
            },
            1.0,
            3,
            None,
            true,
        )
        .unwrap();
        let config = base_config()
            .to_builder()
            .meter(meter.clone())
            .adoption(adoption)
            .build()
            .unwrap();
        let traj = generate_trajectory(&config);
        assert_eq!(traj.entries[0].capex, 0.0);
        assert_eq!(traj.entries[1].capex, 0.0);
        let cohort = meter.unit_capex() * 10_000.0 * traj.entries[2].new_adoption;
        assert!((traj.entries[2].capex - cohort - 2_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_battery_replaced_once_in_twenty_years() {
        let traj = generate_trajectory(&base_config());
        let years: Vec<u32> = traj
            .entries
            .iter()
            .filter(|e| e.battery_cost > 0.0)
            .map(|e| e.year)
            .collect();
        assert_eq!(years, vec![15]);
        assert!((traj.entries[14].battery_cost - 30.0 * 10_000.0).abs() < 1e-6);
        // A 20-year meter is not replaced inside a 20-year horizon
        assert!(traj.entries.iter().all(|e| e.meter_replacement_cost == 0.0));
    }

    #[test]
    fn test_manual_meters_have_no_battery() {
        let config = base_config()
            .to_builder()
            .meter(MeterParameters::builder(MeterClass::Manual).build().unwrap())
            .build()
            .unwrap();
        let traj = generate_trajectory(&config);
        assert!(traj.entries.iter().all(|e| e.battery_cost == 0.0));
    }

    #[test]
    fn test_cohorts_age_independently() {
        let config = base_config()
            .to_builder()
            .persistence(PersistenceLaw::LinearFadeout {
                initial: 0.08,
                fadeout_years: 3,
            })
            .adoption(staged(true))
            .build()
            .unwrap();
        let traj = generate_trajectory(&config);
        // First cohort (12.5 % in year 1) alone in year 1 at full effect
        let reducible = traj.per_household.reducible_m3;
        let expected = 10_000.0 * 0.125 * reducible * 0.08;
        assert!((traj.entries[0].behavioral_m3 - expected).abs() < 1e-6);
        assert!((traj.entries[0].behavioral_coefficient - 0.08).abs() < 1e-12);
        // Once every cohort has faded the behavioural volume is gone
        assert_eq!(traj.entries[19].behavioral_m3, 0.0);
    }

    #[test]
    fn test_reducible_excludes_leak_volume() {
        let traj = generate_trajectory(&base_config());
        let p = &traj.per_household;
        // Default leaks: 20 % of households at 35 m³
        assert!((p.base_consumption_m3 - p.reducible_m3 - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_incentive_paid_per_cohort() {
        let adoption = AdoptionParameters::new(
            AdoptionMode::Mandatory,
            1.0,
            1,
            Some(Incentive {
                total_per_household: 300.0,
                duration_years: 3,
            }),
            true,
        )
        .unwrap();
        let config = base_config().to_builder().adoption(adoption).build().unwrap();
        let traj = generate_trajectory(&config);
        let paid: f64 = traj.entries.iter().map(|e| e.incentive_cost).sum();
        assert!((paid - 300.0 * 10_000.0).abs() < 1e-6);
        assert_eq!(traj.entries[3].incentive_cost, 0.0);
    }

    #[test]
    fn test_opex_scales_with_adoption() {
        let config = base_config().to_builder().adoption(staged(true)).build().unwrap();
        let traj = generate_trajectory(&config);
        let annual = config.meter().annual_opex();
        for e in &traj.entries {
            assert!((e.opex - annual * 10_000.0 * e.adoption).abs() < 1e-6);
        }
    }

    #[test]
    fn test_deferral_benefit() {
        let config = base_config()
            .to_builder()
            .with_model(|m| {
                m.infrastructure_deferral_annual = 100_000.0;
                m.infrastructure_deferral_per_m3 = 0.5;
            })
            .build()
            .unwrap();
        let traj = generate_trajectory(&config);
        let e = &traj.entries[0];
        let expected = 100_000.0 + 0.5 * e.water_saved_m3();
        assert!((e.infrastructure_benefit - expected).abs() < 1e-6);
    }
}
