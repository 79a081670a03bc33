use serde::{Deserialize, Serialize};

use crate::error::{check_non_negative, check_positive, check_ratio, MeterCbaError};
use crate::types::{CubicMeters, Money, Ratio};
use crate::MeterCbaResult;

/// Natural resolution rate used when neither a duration nor an arrival
/// rate is available to derive it.
const FALLBACK_RESOLUTION_RATE: f64 = 0.25;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Household leak population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeakModel {
    /// One aggregate leak population.
    SingleStock {
        prevalence: Ratio,
        flow_m3: CubicMeters,
        repair_cost: Money,
    },
    /// Any-leak population with a significant subset that is easier to
    /// detect and harder to repair.
    TwoStock {
        any_prevalence: Ratio,
        any_flow_m3: CubicMeters,
        any_repair_cost: Money,
        significant_prevalence: Ratio,
        significant_flow_m3: CubicMeters,
        significant_repair_cost: Money,
        detection_multiplier: f64,
        repair_multiplier: f64,
    },
}

/// Leak configuration. Build with [`LeakParameters::single_stock`] or
/// [`LeakParameters::two_stock`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakParameters {
    model: LeakModel,
    /// Share of leaks the meter flags.
    detection_rate: Ratio,
    /// Share of flagged leaks the household repairs.
    repair_rate: Ratio,
    /// Share of leaks that are never repaired, whatever the signal.
    persistent_fraction: Ratio,
    /// Slow-down applied to the persistent part (>= 1).
    long_tail_factor: f64,
    /// New leaks per household and year.
    new_leak_rate: Ratio,
    /// Mean leak duration without a meter (years). `None` derives it from
    /// the arrival rate and prevalence on every use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    natural_duration_years: Option<f64>,
    city_share: Ratio,
    include_repair_costs: bool,
}

impl Default for LeakParameters {
    fn default() -> Self {
        LeakParameters::single_stock().resolve()
    }
}

/// Per-household leak results by year of meter age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakSeries {
    pub avoided_m3: Vec<CubicMeters>,
    /// Expected repairs per household.
    pub repairs: Vec<f64>,
    pub repair_cost_total: Vec<Money>,
    pub repair_cost_city: Vec<Money>,
    pub repair_cost_household: Vec<Money>,
}

impl LeakSeries {
    fn zeros(horizon: usize) -> Self {
        LeakSeries {
            avoided_m3: vec![0.0; horizon],
            repairs: vec![0.0; horizon],
            repair_cost_total: vec![0.0; horizon],
            repair_cost_city: vec![0.0; horizon],
            repair_cost_household: vec![0.0; horizon],
        }
    }

    pub fn total_avoided_m3(&self) -> CubicMeters {
        self.avoided_m3.iter().sum()
    }

    pub fn total_repair_cost(&self) -> Money {
        self.repair_cost_total.iter().sum()
    }

    /// Repair spending per m³ avoided; zero when nothing is avoided.
    pub fn cost_per_m3(&self) -> Money {
        let m3 = self.total_avoided_m3();
        if m3 > 0.0 {
            self.total_repair_cost() / m3
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Stock dynamics
// ---------------------------------------------------------------------------

/// Closed-form evolution of a leak stock over one year with constant
/// arrivals and removal rate. Returns (end-of-year stock, average stock).
pub fn evolve_stock(initial: f64, removal_rate: f64, arrivals: f64) -> (f64, f64) {
    if removal_rate <= 0.0 {
        return (initial + arrivals, initial + 0.5 * arrivals);
    }
    let equilibrium = arrivals / removal_rate;
    let decay = (-removal_rate).exp();
    let end = equilibrium + (initial - equilibrium) * decay;
    let average = equilibrium + (initial - equilibrium) * (1.0 - decay) / removal_rate;
    (end, average)
}

/// One leak population tracked with and without meters.
struct SubStock {
    initial: f64,
    arrivals: f64,
    flow: CubicMeters,
    unit_cost: Money,
    natural_rate: f64,
    correction_rate: f64,
    /// Persistent stocks avoid water but generate no repair bills.
    billed: bool,
}

impl SubStock {
    fn accumulate(&self, horizon: usize, out: &mut LeakSeries) {
        let mut baseline = self.initial;
        let mut metered = self.initial;
        for t in 0..horizon {
            let (b_end, b_avg) = evolve_stock(baseline, self.natural_rate, self.arrivals);
            let (m_end, m_avg) = evolve_stock(
                metered,
                self.natural_rate + self.correction_rate,
                self.arrivals,
            );
            baseline = b_end;
            metered = m_end;

            out.avoided_m3[t] += ((b_avg - m_avg) * self.flow).max(0.0);
            if self.billed {
                let repairs = self.correction_rate * m_avg;
                out.repairs[t] += repairs;
                out.repair_cost_total[t] += repairs * self.unit_cost;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

impl LeakParameters {
    /// Builder seeded with the single-stock defaults (20 % of households,
    /// 35 m³/yr, 200 $ per repair).
    pub fn single_stock() -> LeakParametersBuilder {
        LeakParametersBuilder::new(LeakModel::SingleStock {
            prevalence: 0.20,
            flow_m3: 35.0,
            repair_cost: 200.0,
        })
    }

    /// Builder seeded with the two-stock defaults (20 % any-leak at 10 m³,
    /// 5 % significant at 50 m³).
    pub fn two_stock() -> LeakParametersBuilder {
        LeakParametersBuilder::new(LeakModel::TwoStock {
            any_prevalence: 0.20,
            any_flow_m3: 10.0,
            any_repair_cost: 100.0,
            significant_prevalence: 0.05,
            significant_flow_m3: 50.0,
            significant_repair_cost: 400.0,
            detection_multiplier: 1.2,
            repair_multiplier: 0.7,
        })
        .persistent_fraction(0.05)
    }

    pub fn to_builder(&self) -> LeakParametersBuilder {
        LeakParametersBuilder {
            params: self.clone(),
        }
    }

    pub fn validate(&self) -> MeterCbaResult<()> {
        match &self.model {
            LeakModel::SingleStock {
                prevalence,
                flow_m3,
                repair_cost,
            } => {
                check_ratio("leaks.prevalence", *prevalence)?;
                check_non_negative("leaks.flow_m3", *flow_m3)?;
                check_non_negative("leaks.repair_cost", *repair_cost)?;
            }
            LeakModel::TwoStock {
                any_prevalence,
                any_flow_m3,
                any_repair_cost,
                significant_prevalence,
                significant_flow_m3,
                significant_repair_cost,
                detection_multiplier,
                repair_multiplier,
            } => {
                check_ratio("leaks.any_prevalence", *any_prevalence)?;
                check_ratio("leaks.significant_prevalence", *significant_prevalence)?;
                if significant_prevalence > any_prevalence {
                    return Err(MeterCbaError::invalid(
                        "leaks.significant_prevalence",
                        format!(
                            "significant leaks ({significant_prevalence}) are a subset of all leaks and cannot exceed any_prevalence ({any_prevalence})"
                        ),
                    ));
                }
                check_non_negative("leaks.any_flow_m3", *any_flow_m3)?;
                check_non_negative("leaks.significant_flow_m3", *significant_flow_m3)?;
                check_non_negative("leaks.any_repair_cost", *any_repair_cost)?;
                check_non_negative("leaks.significant_repair_cost", *significant_repair_cost)?;
                check_non_negative("leaks.detection_multiplier", *detection_multiplier)?;
                check_non_negative("leaks.repair_multiplier", *repair_multiplier)?;
            }
        }
        check_ratio("leaks.detection_rate", self.detection_rate)?;
        check_ratio("leaks.repair_rate", self.repair_rate)?;
        check_ratio("leaks.persistent_fraction", self.persistent_fraction)?;
        check_ratio("leaks.new_leak_rate", self.new_leak_rate)?;
        check_ratio("leaks.city_share", self.city_share)?;
        if !self.long_tail_factor.is_finite() || self.long_tail_factor < 1.0 {
            return Err(MeterCbaError::invalid(
                "leaks.long_tail_factor",
                format!("must be at least 1 (got {})", self.long_tail_factor),
            ));
        }
        if let Some(duration) = self.natural_duration_years {
            check_positive("leaks.natural_duration_years", duration)?;
        }
        Ok(())
    }

    pub fn model(&self) -> &LeakModel {
        &self.model
    }

    pub fn is_two_stock(&self) -> bool {
        matches!(self.model, LeakModel::TwoStock { .. })
    }

    pub fn detection_rate(&self) -> Ratio {
        self.detection_rate
    }

    pub fn repair_rate(&self) -> Ratio {
        self.repair_rate
    }

    pub fn persistent_fraction(&self) -> Ratio {
        self.persistent_fraction
    }

    pub fn new_leak_rate(&self) -> Ratio {
        self.new_leak_rate
    }

    pub fn include_repair_costs(&self) -> bool {
        self.include_repair_costs
    }

    /// Share of repair costs paid by the city. Always zero when repair
    /// costs are not accounted for.
    pub fn city_repair_share(&self) -> Ratio {
        if self.include_repair_costs {
            self.city_share
        } else {
            0.0
        }
    }

    /// Share of households with any leak at the outset.
    pub fn total_prevalence(&self) -> Ratio {
        match &self.model {
            LeakModel::SingleStock { prevalence, .. } => *prevalence,
            LeakModel::TwoStock { any_prevalence, .. } => *any_prevalence,
        }
    }

    /// Leak volume per household before any correction (m³/yr).
    pub fn pre_correction_volume_m3(&self) -> CubicMeters {
        match &self.model {
            LeakModel::SingleStock {
                prevalence,
                flow_m3,
                ..
            } => prevalence * flow_m3,
            LeakModel::TwoStock {
                any_prevalence,
                any_flow_m3,
                significant_prevalence,
                significant_flow_m3,
                ..
            } => {
                (any_prevalence - significant_prevalence).max(0.0) * any_flow_m3
                    + significant_prevalence * significant_flow_m3
            }
        }
    }

    /// Prevalence-weighted flow of a leaking household.
    pub fn mean_flow_m3(&self) -> CubicMeters {
        let p = self.total_prevalence();
        match &self.model {
            LeakModel::SingleStock { flow_m3, .. } => *flow_m3,
            LeakModel::TwoStock { any_flow_m3, .. } if p <= 0.0 => *any_flow_m3,
            LeakModel::TwoStock { .. } => self.pre_correction_volume_m3() / p,
        }
    }

    /// Prevalence-weighted cost of one repair.
    pub fn mean_repair_cost(&self) -> Money {
        match &self.model {
            LeakModel::SingleStock { repair_cost, .. } => *repair_cost,
            LeakModel::TwoStock {
                any_prevalence,
                any_repair_cost,
                significant_prevalence,
                significant_repair_cost,
                ..
            } => {
                if *any_prevalence <= 0.0 {
                    return *any_repair_cost;
                }
                let excluded = (any_prevalence - significant_prevalence).max(0.0);
                (excluded * any_repair_cost + significant_prevalence * significant_repair_cost)
                    / any_prevalence
            }
        }
    }

    /// Natural resolution rate μ of leaks without meters.
    pub fn natural_resolution_rate(&self) -> f64 {
        if let Some(duration) = self.natural_duration_years {
            return 1.0 / duration;
        }
        let p = self.total_prevalence();
        if p > 0.0 && self.new_leak_rate > 0.0 {
            self.new_leak_rate / p
        } else {
            FALLBACK_RESOLUTION_RATE
        }
    }

    pub fn natural_duration_years(&self) -> f64 {
        let mu = self.natural_resolution_rate();
        if mu > 0.0 {
            1.0 / mu
        } else {
            f64::INFINITY
        }
    }

    fn sub_stocks(&self, leak_efficiency: Ratio) -> Vec<SubStock> {
        let detection = self.detection_rate * leak_efficiency.clamp(0.0, 1.0);
        let mu = self.natural_resolution_rate();
        let q = self.new_leak_rate;
        let repairable = 1.0 - self.persistent_fraction;
        let persistent = self.persistent_fraction;
        let slowdown = 1.0 / self.long_tail_factor.max(1.0);
        let cost_scale = if self.include_repair_costs { 1.0 } else { 0.0 };

        // (prevalence, arrivals, flow, unit cost, correction rate)
        let populations: Vec<(Ratio, f64, CubicMeters, Money, f64)> = match &self.model {
            LeakModel::SingleStock {
                prevalence,
                flow_m3,
                repair_cost,
            } => vec![(
                *prevalence,
                q,
                *flow_m3,
                *repair_cost,
                detection * self.repair_rate,
            )],
            LeakModel::TwoStock {
                any_prevalence,
                any_flow_m3,
                any_repair_cost,
                significant_prevalence,
                significant_flow_m3,
                significant_repair_cost,
                detection_multiplier,
                repair_multiplier,
            } => {
                let excluded = (any_prevalence - significant_prevalence).max(0.0);
                let arrivals = |p: Ratio| {
                    if *any_prevalence > 0.0 {
                        q * p / any_prevalence
                    } else {
                        0.0
                    }
                };
                let significant_detection = (detection * detection_multiplier).min(1.0);
                let significant_repair = self.repair_rate * repair_multiplier;
                vec![
                    (
                        excluded,
                        arrivals(excluded),
                        *any_flow_m3,
                        *any_repair_cost,
                        detection * self.repair_rate,
                    ),
                    (
                        *significant_prevalence,
                        arrivals(*significant_prevalence),
                        *significant_flow_m3,
                        *significant_repair_cost,
                        significant_detection * significant_repair,
                    ),
                ]
            }
        };

        let mut stocks = Vec::with_capacity(populations.len() * 2);
        for (prevalence, arrivals, flow, unit_cost, k) in populations {
            stocks.push(SubStock {
                initial: prevalence * repairable,
                arrivals: arrivals * repairable,
                flow,
                unit_cost: unit_cost * cost_scale,
                natural_rate: mu,
                correction_rate: k,
                billed: true,
            });
            if persistent > 0.0 {
                stocks.push(SubStock {
                    initial: prevalence * persistent,
                    arrivals: arrivals * persistent,
                    flow,
                    unit_cost: 0.0,
                    natural_rate: mu * slowdown,
                    correction_rate: k * slowdown,
                    billed: false,
                });
            }
        }
        stocks
    }

    /// Leak savings and repair costs per metered household, by year of meter age.
    ///
    /// `leak_efficiency` scales the detection rate for the meter class.
    pub fn simulate(&self, horizon: u32, leak_efficiency: Ratio) -> LeakSeries {
        let horizon = horizon as usize;
        let mut series = LeakSeries::zeros(horizon);
        for stock in self.sub_stocks(leak_efficiency) {
            stock.accumulate(horizon, &mut series);
        }

        let city_share = self.city_repair_share();
        for t in 0..horizon {
            let total = series.repair_cost_total[t];
            series.repair_cost_city[t] = total * city_share;
            series.repair_cost_household[t] = total * (1.0 - city_share);
        }
        series
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LeakParametersBuilder {
    params: LeakParameters,
}

impl LeakParametersBuilder {
    fn new(model: LeakModel) -> Self {
        LeakParametersBuilder {
            params: LeakParameters {
                model,
                detection_rate: 0.90,
                repair_rate: 0.85,
                persistent_fraction: 0.0,
                long_tail_factor: 5.0,
                new_leak_rate: 0.05,
                natural_duration_years: None,
                city_share: 0.0,
                include_repair_costs: true,
            },
        }
    }

    /// Total share of leaking households. On a two-stock model the
    /// significant subset is rescaled in the same proportion.
    pub fn prevalence(mut self, value: Ratio) -> Self {
        match &mut self.params.model {
            LeakModel::SingleStock { prevalence, .. } => *prevalence = value,
            LeakModel::TwoStock {
                any_prevalence,
                significant_prevalence,
                ..
            } => {
                if *any_prevalence > 0.0 {
                    *significant_prevalence *= value / *any_prevalence;
                }
                *any_prevalence = value;
            }
        }
        self
    }

    pub fn flow_m3(mut self, value: CubicMeters) -> Self {
        match &mut self.params.model {
            LeakModel::SingleStock { flow_m3, .. } => *flow_m3 = value,
            LeakModel::TwoStock { any_flow_m3, .. } => *any_flow_m3 = value,
        }
        self
    }

    pub fn repair_cost(mut self, value: Money) -> Self {
        match &mut self.params.model {
            LeakModel::SingleStock { repair_cost, .. } => *repair_cost = value,
            LeakModel::TwoStock {
                any_repair_cost, ..
            } => *any_repair_cost = value,
        }
        self
    }

    /// Significant-leak share and flow. Ignored by single-stock models.
    pub fn significant(mut self, prevalence: Ratio, flow: CubicMeters, cost: Money) -> Self {
        if let LeakModel::TwoStock {
            significant_prevalence,
            significant_flow_m3,
            significant_repair_cost,
            ..
        } = &mut self.params.model
        {
            *significant_prevalence = prevalence;
            *significant_flow_m3 = flow;
            *significant_repair_cost = cost;
        }
        self
    }

    /// Detection and repair multipliers of significant leaks. Ignored by
    /// single-stock models.
    pub fn significant_multipliers(mut self, detection: f64, repair: f64) -> Self {
        if let LeakModel::TwoStock {
            detection_multiplier,
            repair_multiplier,
            ..
        } = &mut self.params.model
        {
            *detection_multiplier = detection;
            *repair_multiplier = repair;
        }
        self
    }

    /// Multiply every leak flow by `factor`.
    pub fn scale_flows(mut self, factor: f64) -> Self {
        match &mut self.params.model {
            LeakModel::SingleStock { flow_m3, .. } => *flow_m3 *= factor,
            LeakModel::TwoStock {
                any_flow_m3,
                significant_flow_m3,
                ..
            } => {
                *any_flow_m3 *= factor;
                *significant_flow_m3 *= factor;
            }
        }
        self
    }

    /// Multiply every unit repair cost by `factor`.
    pub fn scale_repair_costs(mut self, factor: f64) -> Self {
        match &mut self.params.model {
            LeakModel::SingleStock { repair_cost, .. } => *repair_cost *= factor,
            LeakModel::TwoStock {
                any_repair_cost,
                significant_repair_cost,
                ..
            } => {
                *any_repair_cost *= factor;
                *significant_repair_cost *= factor;
            }
        }
        self
    }

    pub fn detection_rate(mut self, value: Ratio) -> Self {
        self.params.detection_rate = value;
        self
    }

    pub fn repair_rate(mut self, value: Ratio) -> Self {
        self.params.repair_rate = value;
        self
    }

    pub fn persistent_fraction(mut self, value: Ratio) -> Self {
        self.params.persistent_fraction = value;
        self
    }

    pub fn long_tail_factor(mut self, value: f64) -> Self {
        self.params.long_tail_factor = value;
        self
    }

    pub fn new_leak_rate(mut self, value: Ratio) -> Self {
        self.params.new_leak_rate = value;
        self
    }

    pub fn natural_duration_years(mut self, value: f64) -> Self {
        self.params.natural_duration_years = Some(value);
        self
    }

    pub fn city_share(mut self, value: Ratio) -> Self {
        self.params.city_share = value;
        self
    }

    pub fn include_repair_costs(mut self, value: bool) -> Self {
        self.params.include_repair_costs = value;
        self
    }

    fn resolve(mut self) -> LeakParameters {
        if !self.params.include_repair_costs {
            self.params.city_share = 0.0;
        }
        self.params
    }

    pub fn build(self) -> MeterCbaResult<LeakParameters> {
        self.params.validate()?;
        Ok(self.resolve())
    }
}
