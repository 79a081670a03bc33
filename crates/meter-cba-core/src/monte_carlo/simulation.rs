use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{LogNormal, Normal, Triangular, Uniform};
use std::time::Instant;

use crate::calibration::CalibratedParameter;
use crate::config::{AnalysisConfig, Parameter};
use crate::engine::{run, ResultSet};
use crate::error::MeterCbaError;
use crate::types::{with_metadata, ComputationOutput};
use crate::MeterCbaResult;

/// Sampled configuration fields share the sensitivity vocabulary.
pub type UncertainParameter = Parameter;

const HISTOGRAM_BINS: usize = 30;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Probability distribution of one uncertain parameter.
///
/// A range collapsed to a single point (`min == max`, zero spread) returns
/// that point without touching the random stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McDistribution {
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
}

impl McDistribution {
    pub fn triangular(min: f64, mode: f64, max: f64) -> Self {
        McDistribution::Triangular { min, mode, max }
    }

    /// Point distribution at `value`.
    pub fn point(value: f64) -> Self {
        McDistribution::Triangular {
            min: value,
            mode: value,
            max: value,
        }
    }

    fn degenerate_value(&self) -> Option<f64> {
        match self {
            McDistribution::Triangular { min, mode, max } if min == max => Some(*mode),
            McDistribution::Uniform { min, max } if min == max => Some(*min),
            McDistribution::Normal { mean, std_dev } if *std_dev == 0.0 => Some(*mean),
            McDistribution::LogNormal { mu, sigma } if *sigma == 0.0 => Some(mu.exp()),
            _ => None,
        }
    }
}

/// A configuration field and the distribution it is drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertainVariable {
    pub parameter: UncertainParameter,
    pub distribution: McDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of draws (minimum 100).
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Optional seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub distributions: Vec<UncertainVariable>,
}

fn default_num_simulations() -> u32 {
    1_000
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            num_simulations: default_num_simulations(),
            seed: None,
            distributions: Vec::new(),
        }
    }
}

impl MonteCarloConfig {
    /// Triangular distributions spanning the calibrated range of each
    /// parameter, with the configured value as mode.
    ///
    /// Meter hardware cost varies from -20 % to +30 % around its value.
    pub fn calibrated(config: &AnalysisConfig) -> Self {
        let mut calibrated = vec![
            (
                Parameter::BehavioralReduction,
                CalibratedParameter::BehavioralReduction,
            ),
            (Parameter::LeakPrevalence, CalibratedParameter::LeakPrevalence),
            (Parameter::LeakFlow, CalibratedParameter::LeakFlow),
            (Parameter::RepairRate, CalibratedParameter::RepairRate),
            (Parameter::SocialValue, CalibratedParameter::SocialValue),
            (Parameter::VariableCost, CalibratedParameter::VariableCost),
            (Parameter::DiscountRate, CalibratedParameter::DiscountRate),
        ];
        if config.persistence().plateau().is_some() {
            calibrated.push((
                Parameter::PersistencePlateau,
                CalibratedParameter::PersistencePlateau,
            ));
        }
        if config.leaks().include_repair_costs() {
            calibrated.push((Parameter::RepairCost, CalibratedParameter::RepairCost));
        }

        let mut distributions: Vec<UncertainVariable> = calibrated
            .into_iter()
            .map(|(parameter, calibration)| {
                let base = parameter.value(config);
                let range = calibration.range();
                UncertainVariable {
                    parameter,
                    distribution: McDistribution::triangular(
                        range.min.min(base),
                        base,
                        range.max.max(base),
                    ),
                }
            })
            .collect();

        let meter_cost = Parameter::MeterCost.value(config);
        distributions.push(UncertainVariable {
            parameter: Parameter::MeterCost,
            distribution: McDistribution::triangular(
                meter_cost * 0.80,
                meter_cost,
                meter_cost * 1.30,
            ),
        });
        distributions.sort_by_key(|v| v.parameter);

        MonteCarloConfig {
            distributions,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_simulations(mut self, num_simulations: u32) -> Self {
        self.num_simulations = num_simulations;
        self
    }

    pub fn validate(&self) -> MeterCbaResult<()> {
        if self.num_simulations < 100 {
            return Err(MeterCbaError::invalid(
                "num_simulations",
                format!("must be at least 100 (got {})", self.num_simulations),
            ));
        }
        if self.distributions.is_empty() {
            return Err(MeterCbaError::InsufficientData(
                "at least one parameter distribution is required".into(),
            ));
        }
        let mut probe = StdRng::seed_from_u64(0);
        for variable in &self.distributions {
            sample(&mut probe, &variable.distribution)?;
        }
        Ok(())
    }
}

/// Percentile summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McStatistics {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
    pub histogram: Vec<HistogramBin>,
}

/// Pearson correlation of one sampled parameter with NPV. `None` when
/// either series has no variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCorrelation {
    pub parameter: UncertainParameter,
    pub correlation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub simulations_requested: u32,
    pub simulations_valid: u32,
    /// Draws whose configuration failed validation.
    pub simulations_skipped: u32,
    pub deterministic_npv: f64,
    pub npv: McStatistics,
    /// Over draws with a defined BCR; `None` when there are none.
    pub bcr: Option<McStatistics>,
    pub probability_positive_npv: f64,
    pub probability_payback: f64,
    /// Sorted by decreasing absolute correlation.
    pub correlations: Vec<ParameterCorrelation>,
    /// NPV of each valid draw, in draw order.
    pub npv_draws: Vec<f64>,
}

struct DrawOutcome {
    npv: f64,
    bcr: Option<f64>,
    payback_reached: bool,
}

impl From<&ResultSet> for DrawOutcome {
    fn from(result: &ResultSet) -> Self {
        DrawOutcome {
            npv: result.npv,
            bcr: result.bcr,
            payback_reached: result.payback.is_reached(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

fn invalid_distribution(kind: &str, e: impl std::fmt::Display) -> MeterCbaError {
    MeterCbaError::invalid("distribution", format!("Invalid {kind} parameters: {e}"))
}

/// Sample a single value from the given distribution using the provided RNG.
fn sample(rng: &mut StdRng, dist: &McDistribution) -> MeterCbaResult<f64> {
    if let Some(value) = dist.degenerate_value() {
        return Ok(value);
    }
    match dist {
        McDistribution::Normal { mean, std_dev } => {
            let n = Normal::new(*mean, *std_dev).map_err(|e| invalid_distribution("Normal", e))?;
            Ok(rng.sample(n))
        }
        McDistribution::LogNormal { mu, sigma } => {
            let ln = LogNormal::new(*mu, *sigma).map_err(|e| invalid_distribution("LogNormal", e))?;
            Ok(rng.sample(ln))
        }
        McDistribution::Triangular { min, mode, max } => {
            let t = Triangular::new(*min, *max, *mode)
                .map_err(|e| invalid_distribution("Triangular", e))?;
            Ok(rng.sample(t))
        }
        McDistribution::Uniform { min, max } => {
            let u = Uniform::new(*min, *max).map_err(|e| invalid_distribution("Uniform", e))?;
            Ok(rng.sample(u))
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Percentile of a **sorted**, non-empty slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Build a histogram with `num_bins` equal-width bins.
fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];

    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let n = sorted.len() as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| {
            let lower = min_val + i as f64 * bin_width;
            let upper = if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            };
            HistogramBin {
                lower,
                upper,
                count: 0,
                frequency: 0.0,
            }
        })
        .collect();

    for &val in sorted {
        let idx = (((val - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        bins[idx].count += 1;
    }

    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }

    bins
}

/// Descriptive statistics of a non-empty sample.
fn compute_statistics(values: &[f64]) -> McStatistics {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;

    let mean = sorted.iter().sum::<f64>() / n;
    let median = if sorted.len() % 2 == 0 {
        let mid = sorted.len() / 2;
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[sorted.len() / 2]
    };
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    McStatistics {
        mean,
        median,
        std_dev: variance.sqrt(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        percentiles: McPercentiles {
            p5: percentile_sorted(&sorted, 5.0),
            p10: percentile_sorted(&sorted, 10.0),
            p25: percentile_sorted(&sorted, 25.0),
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
        },
        histogram: build_histogram(&sorted, HISTOGRAM_BINS),
    }
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len() as f64;
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx <= f64::EPSILON || syy <= f64::EPSILON {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}

fn evaluate(configs: &[AnalysisConfig]) -> Vec<Option<DrawOutcome>> {
    let outcome = |config: &AnalysisConfig| run(config).ok().map(|r| DrawOutcome::from(&r));
    #[cfg(feature = "parallel")]
    {
        configs.par_iter().map(outcome).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        configs.iter().map(outcome).collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the deterministic pipeline over `num_simulations` sampled
/// configurations.
///
/// All draws are taken from one random stream before any evaluation, so a
/// seeded run gives the same result with or without the `parallel`
/// feature.
pub fn run_monte_carlo(
    config: &AnalysisConfig,
    mc: &MonteCarloConfig,
) -> MeterCbaResult<DistributionResult> {
    mc.validate()?;
    let deterministic_npv = run(config)?.npv;

    let mut rng = match mc.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let n = mc.num_simulations as usize;
    let mut samples: Vec<Vec<(Parameter, f64)>> = Vec::with_capacity(n);
    for _ in 0..n {
        let mut draw = Vec::with_capacity(mc.distributions.len());
        for variable in &mc.distributions {
            draw.push((variable.parameter, sample(&mut rng, &variable.distribution)?));
        }
        samples.push(draw);
    }

    let mut drawn: Vec<&[(Parameter, f64)]> = Vec::with_capacity(n);
    let mut configs: Vec<AnalysisConfig> = Vec::with_capacity(n);
    for draw in &samples {
        if let Ok(derived) = config.with_overrides(draw) {
            drawn.push(draw.as_slice());
            configs.push(derived);
        }
    }
    let outcomes = evaluate(&configs);

    let mut valid_draws: Vec<&[(Parameter, f64)]> = Vec::with_capacity(n);
    let mut valid: Vec<DrawOutcome> = Vec::with_capacity(n);
    for (draw, outcome) in drawn.into_iter().zip(outcomes) {
        if let Some(outcome) = outcome {
            valid_draws.push(draw);
            valid.push(outcome);
        }
    }

    if valid.is_empty() {
        return Err(MeterCbaError::InsufficientData(
            "every Monte Carlo draw produced an invalid configuration".into(),
        ));
    }

    let npv_draws: Vec<f64> = valid.iter().map(|o| o.npv).collect();
    let bcr_draws: Vec<f64> = valid.iter().filter_map(|o| o.bcr).collect();
    let count = valid.len() as f64;

    let mut correlations: Vec<ParameterCorrelation> = mc
        .distributions
        .iter()
        .enumerate()
        .map(|(i, variable)| {
            let xs: Vec<f64> = valid_draws.iter().map(|draw| draw[i].1).collect();
            ParameterCorrelation {
                parameter: variable.parameter,
                correlation: pearson(&xs, &npv_draws),
            }
        })
        .collect();
    correlations.sort_by(|a, b| {
        let key = |c: &ParameterCorrelation| c.correlation.map(f64::abs).unwrap_or(-1.0);
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(DistributionResult {
        simulations_requested: mc.num_simulations,
        simulations_valid: valid.len() as u32,
        simulations_skipped: mc.num_simulations - valid.len() as u32,
        deterministic_npv,
        npv: compute_statistics(&npv_draws),
        bcr: (!bcr_draws.is_empty()).then(|| compute_statistics(&bcr_draws)),
        probability_positive_npv: npv_draws.iter().filter(|v| **v > 0.0).count() as f64 / count,
        probability_payback: valid.iter().filter(|o| o.payback_reached).count() as f64 / count,
        correlations,
        npv_draws,
    })
}

/// [`run_monte_carlo`] wrapped in the standard output envelope.
pub fn run_monte_carlo_analysis(
    config: &AnalysisConfig,
    mc: &MonteCarloConfig,
) -> MeterCbaResult<ComputationOutput<DistributionResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let result = run_monte_carlo(config, mc)?;

    if result.simulations_skipped > 0 {
        warnings.push(format!(
            "{} of {} draws skipped (configuration out of bounds)",
            result.simulations_skipped, result.simulations_requested
        ));
    }
    if mc.seed.is_none() {
        warnings.push("No seed given: draws are not reproducible".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo simulation of the cost-benefit pipeline",
        &serde_json::json!({
            "num_simulations": mc.num_simulations,
            "seed": mc.seed,
            "distributions": mc.distributions,
            "mode": config.mode(),
            "horizon_years": config.horizon(),
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersistenceLaw;

    const SEED: u64 = 42;

    fn base_config() -> AnalysisConfig {
        AnalysisConfig::builder()
            .persistence(PersistenceLaw::ExponentialToPlateau {
                initial: 0.08,
                plateau: 0.025,
                decay_rate: 0.15,
            })
            .build()
            .unwrap()
    }

    fn seeded(config: &AnalysisConfig, n: u32) -> MonteCarloConfig {
        MonteCarloConfig::calibrated(config)
            .with_seed(SEED)
            .with_simulations(n)
    }

    #[test]
    fn test_seeded_reproducibility() {
        let config = base_config();
        let mc = seeded(&config, 200);
        let r1 = run_monte_carlo(&config, &mc).unwrap();
        let r2 = run_monte_carlo(&config, &mc).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r1.npv_draws.len(), r1.simulations_valid as usize);
    }

    #[test]
    fn test_degenerate_distributions_reproduce_deterministic_npv() {
        let config = base_config();
        let distributions = Parameter::ALL
            .iter()
            .map(|p| UncertainVariable {
                parameter: *p,
                distribution: McDistribution::point(p.value(&config)),
            })
            .collect();
        let mc = MonteCarloConfig {
            num_simulations: 100,
            seed: Some(SEED),
            distributions,
        };
        let result = run_monte_carlo(&config, &mc).unwrap();
        assert_eq!(result.simulations_valid, 100);
        assert!(result.npv_draws.iter().all(|v| *v == result.deterministic_npv));
        assert!(result.npv.std_dev < 1e-6 * result.deterministic_npv.abs().max(1.0));
        assert_eq!(result.npv.histogram.len(), 1);
        assert!(result.correlations.iter().all(|c| c.correlation.is_none()));
    }

    #[test]
    fn test_min_simulations_validation() {
        let config = base_config();
        let mc = seeded(&config, 99);
        assert!(matches!(
            run_monte_carlo(&config, &mc),
            Err(MeterCbaError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_empty_distributions_validation() {
        let mc = MonteCarloConfig {
            seed: Some(SEED),
            ..Default::default()
        };
        assert!(matches!(
            run_monte_carlo(&base_config(), &mc),
            Err(MeterCbaError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_invalid_draws_are_skipped() {
        let config = base_config();
        let mc = MonteCarloConfig {
            num_simulations: 500,
            seed: Some(SEED),
            distributions: vec![UncertainVariable {
                parameter: Parameter::RepairRate,
                distribution: McDistribution::Uniform { min: 0.5, max: 1.5 },
            }],
        };
        let result = run_monte_carlo(&config, &mc).unwrap();
        assert!(result.simulations_skipped > 100);
        assert!(result.simulations_valid > 100);
        assert_eq!(
            result.simulations_skipped + result.simulations_valid,
            result.simulations_requested
        );
    }

    #[test]
    fn test_social_value_dominates_correlation() {
        let config = base_config();
        let mc = MonteCarloConfig {
            num_simulations: 300,
            seed: Some(SEED),
            distributions: vec![
                UncertainVariable {
                    parameter: Parameter::SocialValue,
                    distribution: McDistribution::triangular(2.5, 4.69, 8.0),
                },
                UncertainVariable {
                    parameter: Parameter::VariableCost,
                    distribution: McDistribution::triangular(0.4, 0.5, 0.6),
                },
            ],
        };
        let result = run_monte_carlo(&config, &mc).unwrap();
        let top = &result.correlations[0];
        assert_eq!(top.parameter, Parameter::SocialValue);
        assert!(top.correlation.unwrap() > 0.99);
    }

    #[test]
    fn test_statistics_are_ordered() {
        let config = base_config();
        let result = run_monte_carlo(&config, &seeded(&config, 300)).unwrap();
        let p = &result.npv.percentiles;
        assert!(p.p5 <= p.p10 && p.p10 <= p.p25 && p.p25 <= p.p50);
        assert!(p.p50 <= p.p75 && p.p75 <= p.p90 && p.p90 <= p.p95);
        assert_eq!(result.npv.histogram.len(), HISTOGRAM_BINS);
        let total: u32 = result.npv.histogram.iter().map(|b| b.count).sum();
        assert_eq!(total, result.simulations_valid);
        assert!((0.0..=1.0).contains(&result.probability_positive_npv));
        assert!((0.0..=1.0).contains(&result.probability_payback));
    }

    #[test]
    fn test_calibrated_distributions_bracket_base_values() {
        let config = base_config();
        let mc = MonteCarloConfig::calibrated(&config);
        assert_eq!(mc.num_simulations, 1_000);
        assert!(mc
            .distributions
            .iter()
            .any(|v| v.parameter == Parameter::PersistencePlateau));
        for v in &mc.distributions {
            let base = v.parameter.value(&config);
            match v.distribution {
                McDistribution::Triangular { min, mode, max } => {
                    assert!(min <= mode && mode <= max, "{:?}", v.parameter);
                    assert_eq!(mode, base);
                }
                _ => panic!("expected triangular"),
            }
        }
    }

    #[test]
    fn test_envelope_reports_skipped_and_seed() {
        let config = base_config();
        let mc = MonteCarloConfig {
            num_simulations: 100,
            seed: None,
            distributions: vec![UncertainVariable {
                parameter: Parameter::SocialValue,
                distribution: McDistribution::Uniform { min: 3.0, max: 6.0 },
            }],
        };
        let output = run_monte_carlo_analysis(&config, &mc).unwrap();
        assert!(output.warnings.iter().any(|w| w.contains("not reproducible")));
        assert_eq!(output.metadata.precision, "ieee754_f64");
    }
}
