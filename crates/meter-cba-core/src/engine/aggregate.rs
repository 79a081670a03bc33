use serde::{Deserialize, Serialize};

use super::trajectory::{AnnualLedgerEntry, Trajectory};
use crate::config::AnalysisConfig;
use crate::time_value::{
    benefit_cost_ratio, capital_recovery_factor, cumulative, discounted_series, payback_period,
    present_value,
};
use crate::types::{AccountingMode, CubicMeters, Money, PaybackPeriod, Ratio};
use crate::MeterCbaResult;

/// Below this many discounted m³ the levelized cost is undefined.
const MIN_PV_VOLUME: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Present value of each benefit and cost line as counted in the run's
/// accounting mode. Cost lines exclude the public-funds loading, reported
/// separately in `mcf_loading`; together they sum to `ResultSet::pv_costs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentValueBreakdown {
    pub behavioral_benefits: Money,
    pub leak_benefits: Money,
    pub network_benefits: Money,
    pub infrastructure_benefits: Money,
    pub capex: Money,
    pub opex: Money,
    pub battery: Money,
    pub meter_replacement: Money,
    pub repairs: Money,
    pub network_costs: Money,
    pub incentives: Money,
    pub mcf_loading: Money,
}

impl PresentValueBreakdown {
    pub fn total_benefits(&self) -> Money {
        self.behavioral_benefits
            + self.leak_benefits
            + self.network_benefits
            + self.infrastructure_benefits
    }

    pub fn total_costs(&self) -> Money {
        self.capex
            + self.opex
            + self.battery
            + self.meter_replacement
            + self.repairs
            + self.network_costs
            + self.incentives
            + self.mcf_loading
    }
}

/// Who gains and who pays, whatever the run's accounting mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerDecomposition {
    pub economic_npv: Money,
    pub financial_npv: Money,
    /// Avoided variable costs and deferred infrastructure, minus city
    /// spending and incentives paid.
    pub city_npv: Money,
    /// Incentives received minus costs borne by households.
    pub household_npv: Money,
    pub pv_city_costs: Money,
    pub pv_city_benefits: Money,
    pub pv_household_costs: Money,
    pub pv_incentives: Money,
    /// Value of saved water beyond the city's variable cost.
    pub pv_externalities: Money,
    pub pv_infrastructure_benefits: Money,
}

/// Water savings of one equipped household.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdSavings {
    pub base_consumption_m3: CubicMeters,
    pub reducible_m3: CubicMeters,
    pub year_one_behavioral_m3: CubicMeters,
    pub year_one_leak_m3: CubicMeters,
    pub year_one_total_m3: CubicMeters,
    /// Year-one savings as a share of base consumption.
    pub year_one_share: Ratio,
    pub lifetime_average_m3: CubicMeters,
}

/// Year-indexed series of a run (index 0 is year 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualSeries {
    pub years: Vec<u32>,
    pub adoption: Vec<Ratio>,
    pub behavioral_coefficient: Vec<Ratio>,
    pub water_saved_m3: Vec<CubicMeters>,
    pub benefits: Vec<Money>,
    pub costs: Vec<Money>,
    pub net: Vec<Money>,
    pub discounted_net: Vec<Money>,
    pub cumulative_npv: Vec<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSummary {
    pub fleet_size: f64,
    pub factor: f64,
    pub unit_capex: Money,
    pub scaled_unit_capex: Money,
    pub total_savings: Money,
}

/// Output of one deterministic run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub mode: AccountingMode,
    pub npv: Money,
    /// `None` when the present value of costs is zero.
    pub bcr: Option<f64>,
    pub payback: PaybackPeriod,
    /// Levelized cost of saved water ($/m³).
    pub lcsw: Option<Money>,
    pub pv_benefits: Money,
    pub pv_costs: Money,
    pub pv_water_saved_m3: CubicMeters,
    /// Undiscounted meter CAPEX, upfront and spread.
    pub total_investment: Money,
    pub year_zero_outlay: Money,
    pub equivalent_annual_cost_per_household: Money,
    /// m³ per household and year needed for the programme to break even.
    pub break_even_m3_per_household: Option<CubicMeters>,
    pub value_per_m3: Money,
    pub final_adoption: Ratio,
    pub scale: ScaleSummary,
    pub household_savings: HouseholdSavings,
    pub present_values: PresentValueBreakdown,
    pub payers: PayerDecomposition,
    pub series: AnnualSeries,
}

// ---------------------------------------------------------------------------
// Payer split
// ---------------------------------------------------------------------------

/// A nominal cost line split between the city and households.
struct CostLine {
    public: Vec<Money>,
    private: Vec<Money>,
}

impl CostLine {
    fn split(values: Vec<Money>, city_share: Ratio) -> Self {
        let public = values.iter().map(|v| v * city_share).collect();
        let private = values.iter().map(|v| v * (1.0 - city_share)).collect();
        CostLine { public, private }
    }

    fn public_only(values: Vec<Money>) -> Self {
        let private = vec![0.0; values.len()];
        CostLine {
            public: values,
            private,
        }
    }

    fn from_parts(public: Vec<Money>, private: Vec<Money>) -> Self {
        CostLine { public, private }
    }

    /// Amount counted in `mode`, before any public-funds loading.
    fn counted(&self, mode: AccountingMode) -> Vec<Money> {
        match mode {
            AccountingMode::Economic => self
                .public
                .iter()
                .zip(&self.private)
                .map(|(p, q)| p + q)
                .collect(),
            AccountingMode::Financial => self.public.clone(),
        }
    }
}

struct CostLines {
    capex: CostLine,
    opex: CostLine,
    battery: CostLine,
    meter_replacement: CostLine,
    repairs: CostLine,
    network: CostLine,
    /// Paid by the city to households.
    incentives: Vec<Money>,
    year_zero_public: Money,
    year_zero_private: Money,
}

impl CostLines {
    fn from_trajectory(config: &AnalysisConfig, trajectory: &Trajectory) -> Self {
        let model = config.model();
        let capex_share = model.city_capex_share;
        let opex_share = model.city_opex_share;

        CostLines {
            capex: CostLine::split(trajectory.column(|e| e.capex), capex_share),
            opex: CostLine::split(trajectory.column(|e| e.opex), opex_share),
            battery: CostLine::split(trajectory.column(|e| e.battery_cost), opex_share),
            meter_replacement: CostLine::split(
                trajectory.column(|e| e.meter_replacement_cost),
                capex_share,
            ),
            repairs: CostLine::from_parts(
                trajectory.column(|e| e.repair_cost_city),
                trajectory.column(|e| e.repair_cost_household),
            ),
            network: CostLine::public_only(trajectory.column(|e| e.network_cost)),
            incentives: trajectory.column(|e| e.incentive_cost),
            year_zero_public: trajectory.year_zero_capex * capex_share,
            year_zero_private: trajectory.year_zero_capex * (1.0 - capex_share),
        }
    }

    fn lines(&self) -> [&CostLine; 6] {
        [
            &self.capex,
            &self.opex,
            &self.battery,
            &self.meter_replacement,
            &self.repairs,
            &self.network,
        ]
    }

    fn public_total(&self, t: usize) -> Money {
        self.lines().iter().map(|l| l.public[t]).sum()
    }

    fn private_total(&self, t: usize) -> Money {
        self.lines().iter().map(|l| l.private[t]).sum()
    }
}

/// Nominal benefits, costs and year-zero outlay as seen in one accounting mode.
struct ModeAccounts {
    benefits: Vec<Money>,
    costs: Vec<Money>,
    year_zero: Money,
}

fn accounts(
    config: &AnalysisConfig,
    trajectory: &Trajectory,
    lines: &CostLines,
    mode: AccountingMode,
) -> ModeAccounts {
    let value = config.water_value().value_per_m3(mode);
    let mcf = config.water_value().public_funds_multiplier(mode);

    let benefits = trajectory
        .entries
        .iter()
        .map(|e| e.water_saved_m3() * value + e.infrastructure_benefit)
        .collect();

    let costs = (0..trajectory.horizon())
        .map(|t| match mode {
            AccountingMode::Economic => lines.private_total(t) + lines.public_total(t) * mcf,
            AccountingMode::Financial => lines.public_total(t) + lines.incentives[t],
        })
        .collect();

    let year_zero = match mode {
        AccountingMode::Economic => lines.year_zero_private + lines.year_zero_public * mcf,
        AccountingMode::Financial => lines.year_zero_public,
    };

    ModeAccounts {
        benefits,
        costs,
        year_zero,
    }
}

fn npv_of(rate: Ratio, accounts: &ModeAccounts) -> MeterCbaResult<Money> {
    Ok(present_value(rate, &accounts.benefits)?
        - present_value(rate, &accounts.costs)?
        - accounts.year_zero)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn breakdown(
    config: &AnalysisConfig,
    trajectory: &Trajectory,
    lines: &CostLines,
    mode: AccountingMode,
) -> MeterCbaResult<PresentValueBreakdown> {
    let rate = config.model().discount_rate;
    let value = config.water_value().value_per_m3(mode);
    let mcf = config.water_value().public_funds_multiplier(mode);
    let pv = |series: Vec<Money>| present_value(rate, &series);
    let valued = |f: fn(&AnnualLedgerEntry) -> CubicMeters| {
        trajectory.column(|e| f(e) * value)
    };

    let capex = pv(lines.capex.counted(mode))?
        + match mode {
            AccountingMode::Economic => lines.year_zero_public + lines.year_zero_private,
            AccountingMode::Financial => lines.year_zero_public,
        };

    let public_pv: Money = lines
        .lines()
        .iter()
        .map(|l| present_value(rate, &l.public))
        .sum::<MeterCbaResult<Money>>()?
        + lines.year_zero_public;

    Ok(PresentValueBreakdown {
        behavioral_benefits: pv(valued(|e| e.behavioral_m3))?,
        leak_benefits: pv(valued(|e| e.leak_m3))?,
        network_benefits: pv(valued(|e| e.network_m3))?,
        infrastructure_benefits: pv(trajectory.column(|e| e.infrastructure_benefit))?,
        capex,
        opex: pv(lines.opex.counted(mode))?,
        battery: pv(lines.battery.counted(mode))?,
        meter_replacement: pv(lines.meter_replacement.counted(mode))?,
        repairs: pv(lines.repairs.counted(mode))?,
        network_costs: pv(lines.network.counted(mode))?,
        incentives: match mode {
            AccountingMode::Economic => 0.0,
            AccountingMode::Financial => pv(lines.incentives.clone())?,
        },
        mcf_loading: public_pv * (mcf - 1.0),
    })
}

fn payer_decomposition(
    config: &AnalysisConfig,
    trajectory: &Trajectory,
    lines: &CostLines,
    pv_m3: CubicMeters,
) -> MeterCbaResult<PayerDecomposition> {
    let rate = config.model().discount_rate;
    let wv = config.water_value();

    let economic = accounts(config, trajectory, lines, AccountingMode::Economic);
    let financial = accounts(config, trajectory, lines, AccountingMode::Financial);

    let horizon = trajectory.horizon();
    let public: Vec<Money> = (0..horizon).map(|t| lines.public_total(t)).collect();
    let private: Vec<Money> = (0..horizon).map(|t| lines.private_total(t)).collect();

    let pv_city_costs = present_value(rate, &public)? + lines.year_zero_public;
    let pv_household_costs = present_value(rate, &private)? + lines.year_zero_private;
    let pv_incentives = present_value(rate, &lines.incentives)?;
    let pv_infrastructure = present_value(rate, &trajectory.column(|e| e.infrastructure_benefit))?;
    let pv_city_benefits = pv_m3 * wv.variable_cost + pv_infrastructure;

    Ok(PayerDecomposition {
        economic_npv: npv_of(rate, &economic)?,
        financial_npv: npv_of(rate, &financial)?,
        city_npv: pv_city_benefits - pv_city_costs - pv_incentives,
        household_npv: pv_incentives - pv_household_costs,
        pv_city_costs,
        pv_city_benefits,
        pv_household_costs,
        pv_incentives,
        pv_externalities: pv_m3 * wv.externality_per_m3(),
        pv_infrastructure_benefits: pv_infrastructure,
    })
}

fn household_savings(trajectory: &Trajectory) -> HouseholdSavings {
    let p = &trajectory.per_household;
    let horizon = trajectory.horizon();
    let (behavioral, leak) = if horizon > 0 {
        (p.behavioral_m3[0], p.leaks.avoided_m3[0])
    } else {
        (0.0, 0.0)
    };
    let total = behavioral + leak;
    let lifetime_average = if horizon > 0 {
        (0..horizon).map(|a| p.water_saved_m3(a)).sum::<f64>() / horizon as f64
    } else {
        0.0
    };

    HouseholdSavings {
        base_consumption_m3: p.base_consumption_m3,
        reducible_m3: p.reducible_m3,
        year_one_behavioral_m3: behavioral,
        year_one_leak_m3: leak,
        year_one_total_m3: total,
        year_one_share: if p.base_consumption_m3 > 0.0 {
            total / p.base_consumption_m3
        } else {
            0.0
        },
        lifetime_average_m3: lifetime_average,
    }
}

/// Discount and decompose a trajectory into the headline metrics.
pub fn aggregate(config: &AnalysisConfig, trajectory: &Trajectory) -> MeterCbaResult<ResultSet> {
    let model = config.model();
    let rate = model.discount_rate;
    let mode = config.mode();
    let households = model.households as f64;

    let lines = CostLines::from_trajectory(config, trajectory);
    let accounts = accounts(config, trajectory, &lines, mode);

    let pv_benefits = present_value(rate, &accounts.benefits)?;
    let pv_costs = present_value(rate, &accounts.costs)? + accounts.year_zero;
    let npv = pv_benefits - pv_costs;

    let net: Vec<Money> = accounts
        .benefits
        .iter()
        .zip(&accounts.costs)
        .map(|(b, c)| b - c)
        .collect();
    let discounted_net = discounted_series(rate, &net)?;
    let cumulative_npv = cumulative(-accounts.year_zero, &discounted_net);
    let payback = payback_period(-accounts.year_zero, &cumulative_npv);

    let water_saved = trajectory.column(AnnualLedgerEntry::water_saved_m3);
    let pv_water_saved_m3 = present_value(rate, &water_saved)?;
    let lcsw = if pv_water_saved_m3 > MIN_PV_VOLUME {
        Some(pv_costs / pv_water_saved_m3)
    } else {
        None
    };

    let value_per_m3 = config.water_value().value_per_m3(mode);
    let eac = pv_costs / households * capital_recovery_factor(rate, model.horizon_years);
    let break_even = if value_per_m3 > 0.0 {
        Some(eac / value_per_m3)
    } else {
        None
    };

    let scaled = &trajectory.scaled_unit_cost;
    let scale = ScaleSummary {
        fleet_size: trajectory.fleet_size,
        factor: scaled.factor,
        unit_capex: trajectory.unit_capex,
        scaled_unit_capex: scaled.total,
        total_savings: trajectory.scale_savings(),
    };

    let series = AnnualSeries {
        years: trajectory.entries.iter().map(|e| e.year).collect(),
        adoption: trajectory.column(|e| e.adoption),
        behavioral_coefficient: trajectory.column(|e| e.behavioral_coefficient),
        water_saved_m3: water_saved,
        benefits: accounts.benefits.clone(),
        costs: accounts.costs.clone(),
        net,
        discounted_net,
        cumulative_npv,
    };

    Ok(ResultSet {
        mode,
        npv,
        bcr: benefit_cost_ratio(pv_benefits, pv_costs),
        payback,
        lcsw,
        pv_benefits,
        pv_costs,
        pv_water_saved_m3,
        total_investment: trajectory.total_capex(),
        year_zero_outlay: accounts.year_zero,
        equivalent_annual_cost_per_household: eac,
        break_even_m3_per_household: break_even,
        value_per_m3,
        final_adoption: trajectory.final_adoption(),
        scale,
        household_savings: household_savings(trajectory),
        present_values: breakdown(config, trajectory, &lines, mode)?,
        payers: payer_decomposition(config, trajectory, &lines, pv_water_saved_m3)?,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MeterClass, MeterParameters, ModelParameters};
    use crate::engine::generate_trajectory;
    use crate::models::{AdoptionMode, AdoptionParameters, Incentive, LeakParameters};

    fn config() -> AnalysisConfig {
        AnalysisConfig::builder()
            .model(ModelParameters {
                city_capex_share: 0.7,
                city_opex_share: 0.9,
                ..ModelParameters::city(20_000, 2.2, 240.0)
            })
            .leaks(
                LeakParameters::single_stock()
                    .city_share(0.5)
                    .build()
                    .unwrap(),
            )
            .adoption(
                AdoptionParameters::new(
                    AdoptionMode::Logistic {
                        speed: 0.8,
                        midpoint: 4.0,
                    },
                    0.9,
                    1,
                    Some(Incentive {
                        total_per_household: 150.0,
                        duration_years: 3,
                    }),
                    true,
                )
                .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn result(config: &AnalysisConfig) -> ResultSet {
        aggregate(config, &generate_trajectory(config)).unwrap()
    }

    #[test]
    fn test_cumulative_npv_ends_at_npv() {
        let res = result(&config());
        let last = *res.series.cumulative_npv.last().unwrap();
        assert!((last - res.npv).abs() < 1e-6 * res.npv.abs().max(1.0));
    }

    #[test]
    fn test_breakdown_sums_to_totals() {
        for mode in [AccountingMode::Economic, AccountingMode::Financial] {
            let cfg = config()
                .to_builder()
                .mode(mode)
                .with_water_value(|w| w.apply_mcf = true)
                .build()
                .unwrap();
            let res = result(&cfg);
            let pv = &res.present_values;
            assert!((pv.total_benefits() - res.pv_benefits).abs() < 1e-3, "{mode:?}");
            assert!((pv.total_costs() - res.pv_costs).abs() < 1e-3, "{mode:?}");
        }
    }

    #[test]
    fn test_payer_identity_without_mcf() {
        let res = result(&config());
        let p = &res.payers;
        let sum = p.city_npv + p.household_npv + p.pv_externalities;
        assert!(
            (sum - p.economic_npv).abs() < 1e-3,
            "{sum} vs {}",
            p.economic_npv
        );
        assert!((p.economic_npv - res.npv).abs() < 1e-6);
    }

    #[test]
    fn test_mcf_lowers_economic_npv_only() {
        let base = config();
        let loaded = base
            .to_builder()
            .with_water_value(|w| w.apply_mcf = true)
            .build()
            .unwrap();
        assert!(result(&loaded).npv < result(&base).npv);

        let fin = base.to_builder().mode(AccountingMode::Financial).build().unwrap();
        let fin_loaded = loaded
            .to_builder()
            .mode(AccountingMode::Financial)
            .build()
            .unwrap();
        assert_eq!(result(&fin).npv, result(&fin_loaded).npv);
    }

    #[test]
    fn test_incentives_count_only_in_financial_mode() {
        let with = config();
        let without = with
            .to_builder()
            .adoption(AdoptionParameters {
                incentive: None,
                ..with.adoption().clone()
            })
            .build()
            .unwrap();
        assert!((result(&with).npv - result(&without).npv).abs() < 1e-6);

        let fin_with = with.to_builder().mode(AccountingMode::Financial).build().unwrap();
        let fin_without = without
            .to_builder()
            .mode(AccountingMode::Financial)
            .build()
            .unwrap();
        let gap = result(&fin_without).npv - result(&fin_with).npv;
        assert!((gap - result(&fin_with).present_values.incentives).abs() < 1e-3);
        assert!(gap > 0.0);
    }

    #[test]
    fn test_financial_mode_values_variable_cost() {
        let fin = config().to_builder().mode(AccountingMode::Financial).build().unwrap();
        let res = result(&fin);
        assert_eq!(res.value_per_m3, 0.50);
        assert!(res.npv < result(&config()).npv);
    }

    #[test]
    fn test_zero_cost_gives_undefined_bcr() {
        let free_meter = MeterParameters::builder(MeterClass::Ami)
            .hardware_cost(0.0)
            .install_hours(0.0)
            .network_cost(0.0)
            .maintenance_cost(0.0)
            .non_technical_opex(0.0)
            .battery_replacement_cost(0.0)
            .build()
            .unwrap();
        let cfg = AnalysisConfig::builder()
            .meter(free_meter)
            .leaks(
                LeakParameters::single_stock()
                    .include_repair_costs(false)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let res = result(&cfg);
        assert_eq!(res.pv_costs, 0.0);
        assert_eq!(res.bcr, None);
        assert!(res.npv > 0.0);
        assert_eq!(res.payback, PaybackPeriod::Within { years: 0.0 });
    }

    #[test]
    fn test_lcsw_and_break_even() {
        let res = result(&config());
        let lcsw = res.lcsw.unwrap();
        assert!((lcsw - res.pv_costs / res.pv_water_saved_m3).abs() < 1e-12);
        let eac = res.equivalent_annual_cost_per_household;
        assert!((res.break_even_m3_per_household.unwrap() - eac / 4.69).abs() < 1e-12);
    }
}
