#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;

use crate::config::AnalysisConfig;
use crate::engine::{aggregate, generate_trajectory, Trajectory};
use crate::error::MeterCbaError;
use crate::models::{AdoptionMode, AdoptionParameters};
use crate::types::{with_metadata, ComputationOutput, Money, PaybackPeriod, Ratio};
use crate::MeterCbaResult;

/// Relative slack on capacity and budget checks.
const TOLERANCE: f64 = 1e-9;

const RUNNERS_UP: usize = 4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Yearly limits a deployment schedule must respect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConstraints {
    /// Total meter CAPEX that can be spent in one year, household-borne
    /// share included.
    #[serde(default)]
    pub max_budget_per_year: Option<Money>,
    /// Meters the installers can fit in one year.
    #[serde(default)]
    pub max_installs_per_year: Option<u64>,
}

impl DeploymentConstraints {
    pub fn validate(&self) -> MeterCbaResult<()> {
        if self.max_budget_per_year.is_none() && self.max_installs_per_year.is_none() {
            return Err(MeterCbaError::invalid(
                "constraints",
                "at least one of max_budget_per_year or max_installs_per_year is required",
            ));
        }
        if let Some(budget) = self.max_budget_per_year {
            if !budget.is_finite() || budget <= 0.0 {
                return Err(MeterCbaError::invalid(
                    "constraints.max_budget_per_year",
                    format!("must be positive (got {budget})"),
                ));
            }
        }
        if self.max_installs_per_year == Some(0) {
            return Err(MeterCbaError::invalid(
                "constraints.max_installs_per_year",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    MaximizeNpv,
    /// Earliest payback; `Never` ranks last and ties go to the higher NPV.
    MinimizePayback,
}

/// Grid of adoption schedules to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpace {
    pub include_mandatory: bool,
    /// Staged roll-out: number of sectors.
    pub sectors: Vec<u32>,
    /// Staged roll-out: years spent in each sector.
    pub years_per_sector: Vec<u32>,
    /// Logistic uptake: speed parameter `k`.
    pub logistic_speeds: Vec<f64>,
    /// Logistic uptake: midpoint year `t0`.
    pub logistic_midpoints: Vec<f64>,
    /// Ceilings tried for staged and logistic schedules.
    pub ceilings: Vec<Ratio>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        SearchSpace {
            include_mandatory: true,
            sectors: vec![2, 3, 4, 5, 6, 8, 10],
            years_per_sector: vec![1, 2, 3],
            logistic_speeds: vec![0.3, 0.6, 1.0, 1.5],
            logistic_midpoints: vec![2.0, 3.0, 5.0, 7.0, 10.0],
            ceilings: vec![0.70, 0.85, 0.95, 1.0],
        }
    }
}

impl SearchSpace {
    /// Candidate adoption modes with their ceiling, in grid order.
    pub fn candidates(&self) -> Vec<(AdoptionMode, Ratio)> {
        let mut out = Vec::new();
        if self.include_mandatory {
            out.push((AdoptionMode::Mandatory, 1.0));
        }
        for &ceiling in &self.ceilings {
            for &sectors in &self.sectors {
                for &years_per_sector in &self.years_per_sector {
                    out.push((
                        AdoptionMode::Staged {
                            sectors,
                            years_per_sector,
                        },
                        ceiling,
                    ));
                }
            }
            for &speed in &self.logistic_speeds {
                for &midpoint in &self.logistic_midpoints {
                    out.push((AdoptionMode::Logistic { speed, midpoint }, ceiling));
                }
            }
        }
        out
    }
}

/// One evaluated schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleCandidate {
    pub adoption: AdoptionParameters,
    pub npv: Money,
    pub bcr: Option<f64>,
    pub payback: PaybackPeriod,
    pub final_adoption: Ratio,
    /// Largest number of meters installed in one year.
    pub peak_installs: f64,
    /// Largest meter CAPEX of one year.
    pub peak_capex: Money,
    pub feasible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleResult {
    Optimal {
        best: ScheduleCandidate,
        runners_up: Vec<ScheduleCandidate>,
        evaluated: usize,
        feasible: usize,
    },
    /// No schedule of the search space fits the constraints.
    Infeasible {
        evaluated: usize,
        /// Smallest yearly installation peak among the candidates.
        tightest_installs: f64,
        /// Smallest yearly total CAPEX peak among the candidates.
        tightest_budget: Money,
    },
}

impl ScheduleResult {
    pub fn best(&self) -> Option<&ScheduleCandidate> {
        match self {
            ScheduleResult::Optimal { best, .. } => Some(best),
            ScheduleResult::Infeasible { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn within(value: f64, limit: f64) -> bool {
    value <= limit * (1.0 + TOLERANCE) + TOLERANCE
}

fn peaks(trajectory: &Trajectory, households: f64) -> (f64, Money) {
    trajectory
        .entries
        .iter()
        .fold((0.0_f64, 0.0_f64), |(installs, capex), e| {
            (
                installs.max(households * e.new_adoption),
                capex.max(e.capex),
            )
        })
}

fn evaluate_candidate(
    config: &AnalysisConfig,
    constraints: &DeploymentConstraints,
    mode: AdoptionMode,
    ceiling: Ratio,
) -> MeterCbaResult<ScheduleCandidate> {
    let base = config.adoption();
    let adoption = AdoptionParameters::new(
        mode,
        ceiling,
        base.start_year,
        base.incentive.clone(),
        true,
    )?;
    let candidate_config = config.to_builder().adoption(adoption.clone()).build()?;
    let trajectory = generate_trajectory(&candidate_config);
    let result = aggregate(&candidate_config, &trajectory)?;

    let (peak_installs, peak_capex) = peaks(&trajectory, config.model().households as f64);
    let fits_installs = constraints
        .max_installs_per_year
        .map_or(true, |cap| within(peak_installs, cap as f64));
    let fits_budget = constraints
        .max_budget_per_year
        .map_or(true, |budget| within(peak_capex, budget));

    Ok(ScheduleCandidate {
        adoption,
        npv: result.npv,
        bcr: result.bcr,
        payback: result.payback,
        final_adoption: result.final_adoption,
        peak_installs,
        peak_capex,
        feasible: fits_installs && fits_budget,
    })
}

fn rank(objective: Objective, a: &ScheduleCandidate, b: &ScheduleCandidate) -> Ordering {
    let by_npv = b.npv.partial_cmp(&a.npv).unwrap_or(Ordering::Equal);
    match objective {
        Objective::MaximizeNpv => by_npv,
        Objective::MinimizePayback => {
            let years = |c: &ScheduleCandidate| c.payback.years().unwrap_or(f64::INFINITY);
            years(a)
                .partial_cmp(&years(b))
                .unwrap_or(Ordering::Equal)
                .then(by_npv)
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Grid search over adoption schedules under yearly capacity and budget
/// limits.
///
/// Every candidate spreads its CAPEX over installation years, so the
/// budget applies to each year's outlay (fixed AMI infrastructure included
/// in the first installation year). Candidates whose configuration fails
/// validation are skipped.
pub fn optimize_deployment(
    config: &AnalysisConfig,
    constraints: &DeploymentConstraints,
    objective: Objective,
    space: &SearchSpace,
) -> MeterCbaResult<ScheduleResult> {
    constraints.validate()?;
    config.validate()?;

    let grid = space.candidates();
    if grid.is_empty() {
        return Err(MeterCbaError::invalid(
            "search_space",
            "contains no adoption schedule",
        ));
    }

    #[cfg(feature = "parallel")]
    let outcomes: Vec<MeterCbaResult<ScheduleCandidate>> = grid
        .par_iter()
        .map(|(mode, ceiling)| evaluate_candidate(config, constraints, mode.clone(), *ceiling))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<MeterCbaResult<ScheduleCandidate>> = grid
        .iter()
        .map(|(mode, ceiling)| evaluate_candidate(config, constraints, mode.clone(), *ceiling))
        .collect();

    let candidates: Vec<ScheduleCandidate> = outcomes.into_iter().filter_map(Result::ok).collect();
    if candidates.is_empty() {
        return Err(MeterCbaError::InsufficientData(
            "no candidate schedule produced a valid configuration".into(),
        ));
    }

    let evaluated = candidates.len();
    let mut feasible: Vec<ScheduleCandidate> =
        candidates.iter().filter(|c| c.feasible).cloned().collect();

    if feasible.is_empty() {
        let tightest_installs = candidates
            .iter()
            .map(|c| c.peak_installs)
            .fold(f64::INFINITY, f64::min);
        let tightest_budget = candidates
            .iter()
            .map(|c| c.peak_capex)
            .fold(f64::INFINITY, f64::min);
        return Ok(ScheduleResult::Infeasible {
            evaluated,
            tightest_installs,
            tightest_budget,
        });
    }

    // Stable sort keeps grid order among equal candidates.
    feasible.sort_by(|a, b| rank(objective, a, b));
    let feasible_count = feasible.len();
    let mut ranked = feasible.into_iter();
    let best = match ranked.next() {
        Some(best) => best,
        None => {
            return Err(MeterCbaError::InsufficientData(
                "no feasible schedule".into(),
            ))
        }
    };

    Ok(ScheduleResult::Optimal {
        best,
        runners_up: ranked.take(RUNNERS_UP).collect(),
        evaluated,
        feasible: feasible_count,
    })
}

/// [`optimize_deployment`] wrapped in the standard output envelope.
pub fn optimize_deployment_analysis(
    config: &AnalysisConfig,
    constraints: &DeploymentConstraints,
    objective: Objective,
    space: &SearchSpace,
) -> MeterCbaResult<ComputationOutput<ScheduleResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let result = optimize_deployment(config, constraints, objective, space)?;
    match &result {
        ScheduleResult::Infeasible {
            tightest_installs,
            tightest_budget,
            ..
        } => warnings.push(format!(
            "No schedule fits the constraints; the gentlest candidate needs {tightest_installs:.0} installs and {tightest_budget:.0} $ in its peak year"
        )),
        ScheduleResult::Optimal { best, .. } if best.payback == PaybackPeriod::Never => {
            warnings.push("Best schedule does not pay back within the horizon".into())
        }
        ScheduleResult::Optimal { .. } => {}
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Grid search over adoption schedules under yearly capacity and budget limits",
        &serde_json::json!({
            "constraints": constraints,
            "objective": objective,
            "search_space": space,
            "households": config.model().households,
            "horizon_years": config.horizon(),
        }),
        warnings,
        elapsed,
        result,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelParameters;
    use crate::models::PersistenceLaw;

    fn base_config() -> AnalysisConfig {
        AnalysisConfig::builder()
            .model(ModelParameters::city(10_000, 2.1, 250.0))
            .persistence(PersistenceLaw::Constant { initial: 0.08 })
            .build()
            .unwrap()
    }

    fn installs(cap: u64) -> DeploymentConstraints {
        DeploymentConstraints {
            max_budget_per_year: None,
            max_installs_per_year: Some(cap),
        }
    }

    #[test]
    fn test_constraints_required() {
        let result = optimize_deployment(
            &base_config(),
            &DeploymentConstraints::default(),
            Objective::MaximizeNpv,
            &SearchSpace::default(),
        );
        assert!(matches!(result, Err(MeterCbaError::InvalidInput { .. })));
    }

    #[test]
    fn test_empty_search_space_rejected() {
        let space = SearchSpace {
            include_mandatory: false,
            ceilings: vec![],
            ..Default::default()
        };
        let result =
            optimize_deployment(&base_config(), &installs(1000), Objective::MaximizeNpv, &space);
        assert!(matches!(result, Err(MeterCbaError::InvalidInput { .. })));
    }

    #[test]
    fn test_infeasible_when_capacity_below_every_peak() {
        let result = optimize_deployment(
            &base_config(),
            &installs(100),
            Objective::MaximizeNpv,
            &SearchSpace::default(),
        )
        .unwrap();
        match result {
            ScheduleResult::Infeasible {
                evaluated,
                tightest_installs,
                ..
            } => {
                assert_eq!(evaluated, SearchSpace::default().candidates().len());
                assert!(tightest_installs > 100.0);
            }
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn test_capacity_excludes_mandatory() {
        let result = optimize_deployment(
            &base_config(),
            &installs(2_500),
            Objective::MaximizeNpv,
            &SearchSpace::default(),
        )
        .unwrap();
        let best = result.best().unwrap();
        assert!(best.feasible);
        assert!(best.peak_installs <= 2_500.0 + 1e-6);
        assert_ne!(best.adoption.mode, AdoptionMode::Mandatory);
        assert!(best.adoption.spread_capex);
    }

    #[test]
    fn test_budget_limits_yearly_capex() {
        let config = base_config();
        let gentle = AdoptionMode::Staged {
            sectors: 10,
            years_per_sector: 3,
        };
        let budget = evaluate_candidate(&config, &installs(u64::MAX), gentle, 0.70)
            .unwrap()
            .peak_capex;
        let constraints = DeploymentConstraints {
            max_budget_per_year: Some(budget),
            max_installs_per_year: None,
        };
        let result = optimize_deployment(
            &config,
            &constraints,
            Objective::MaximizeNpv,
            &SearchSpace::default(),
        )
        .unwrap();
        let best = result.best().unwrap();
        assert!(best.peak_capex <= budget * (1.0 + 1e-9));
        assert_ne!(best.adoption.mode, AdoptionMode::Mandatory);
    }

    #[test]
    fn test_budget_counts_household_capex_share() {
        let gentle = AdoptionMode::Staged {
            sectors: 10,
            years_per_sector: 3,
        };
        let full_city = base_config();
        let shared = full_city
            .to_builder()
            .with_model(|m| m.city_capex_share = 0.5)
            .build()
            .unwrap();
        let peak_full = evaluate_candidate(&full_city, &installs(u64::MAX), gentle.clone(), 0.70)
            .unwrap()
            .peak_capex;
        let peak_shared = evaluate_candidate(&shared, &installs(u64::MAX), gentle, 0.70)
            .unwrap()
            .peak_capex;
        assert!((peak_full - peak_shared).abs() < 1e-6 * peak_full);

        // Half the peak fits the city's share but not the total outlay.
        let constraints = DeploymentConstraints {
            max_budget_per_year: Some(0.5 * peak_shared),
            max_installs_per_year: None,
        };
        let result = optimize_deployment(
            &shared,
            &constraints,
            Objective::MaximizeNpv,
            &SearchSpace::default(),
        )
        .unwrap();
        if let Some(best) = result.best() {
            assert!(best.peak_capex <= 0.5 * peak_shared * (1.0 + 1e-9));
        }
    }

    #[test]
    fn test_unconstrained_best_is_top_npv() {
        let space = SearchSpace::default();
        let result = optimize_deployment(
            &base_config(),
            &installs(1_000_000),
            Objective::MaximizeNpv,
            &space,
        )
        .unwrap();
        match result {
            ScheduleResult::Optimal {
                best,
                runners_up,
                evaluated,
                feasible,
            } => {
                assert_eq!(evaluated, feasible);
                assert_eq!(runners_up.len(), RUNNERS_UP);
                assert!(runners_up.iter().all(|c| c.npv <= best.npv));
            }
            other => panic!("expected optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_minimize_payback_ranks_never_last() {
        let never = ScheduleCandidate {
            adoption: AdoptionParameters::mandatory(),
            npv: 10.0,
            bcr: Some(1.1),
            payback: PaybackPeriod::Never,
            final_adoption: 1.0,
            peak_installs: 0.0,
            peak_capex: 0.0,
            feasible: true,
        };
        let slow = ScheduleCandidate {
            payback: PaybackPeriod::Within { years: 12.0 },
            npv: -5.0,
            ..never.clone()
        };
        let fast = ScheduleCandidate {
            payback: PaybackPeriod::Within { years: 12.0 },
            npv: 3.0,
            ..never.clone()
        };
        let mut list = vec![never.clone(), slow.clone(), fast.clone()];
        list.sort_by(|a, b| rank(Objective::MinimizePayback, a, b));
        assert_eq!(list, vec![fast, slow, never]);
    }

    #[test]
    fn test_envelope_warns_when_infeasible() {
        let output = optimize_deployment_analysis(
            &base_config(),
            &installs(10),
            Objective::MinimizePayback,
            &SearchSpace::default(),
        )
        .unwrap();
        assert!(output.warnings[0].contains("No schedule fits"));
    }
}
