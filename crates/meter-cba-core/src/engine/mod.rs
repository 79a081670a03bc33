pub mod aggregate;
pub mod trajectory;

use std::time::Instant;

use crate::calibration::check_calibration;
use crate::config::AnalysisConfig;
use crate::types::{with_metadata, ComputationOutput, PaybackPeriod};
use crate::MeterCbaResult;

pub use aggregate::{
    aggregate, AnnualSeries, HouseholdSavings, PayerDecomposition, PresentValueBreakdown,
    ResultSet, ScaleSummary,
};
pub use trajectory::{generate_trajectory, AnnualLedgerEntry, HouseholdProfile, Trajectory};

/// Deterministic run: trajectory then aggregation.
pub fn run(config: &AnalysisConfig) -> MeterCbaResult<ResultSet> {
    config.validate()?;
    let trajectory = generate_trajectory(config);
    aggregate(config, &trajectory)
}

/// Deterministic run wrapped in the standard output envelope.
///
/// Warnings flag an undefined BCR, a programme that never pays back within
/// the horizon and every parameter outside its calibrated range.
pub fn run_analysis(config: &AnalysisConfig) -> MeterCbaResult<ComputationOutput<ResultSet>> {
    let start = Instant::now();
    let result = run(config)?;

    let mut warnings: Vec<String> = Vec::new();
    if result.bcr.is_none() {
        warnings.push("Benefit-cost ratio undefined: present value of costs is zero".into());
    }
    if result.payback == PaybackPeriod::Never {
        warnings.push(format!(
            "Programme does not pay back within the {}-year horizon",
            config.horizon()
        ));
    }
    if result.lcsw.is_none() {
        warnings.push("No water saved: levelized cost undefined".into());
    }
    warnings.extend(
        check_calibration(config)
            .iter()
            .filter_map(|check| check.warning()),
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        &format!(
            "Smart meter cost-benefit analysis ({} accounting, cohort trajectory, {}-year horizon)",
            config.mode().label(),
            config.horizon()
        ),
        config,
        warnings,
        elapsed,
        result,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersistenceLaw;

    #[test]
    fn test_run_matches_manual_pipeline() {
        let config = AnalysisConfig::default();
        let direct = aggregate(&config, &generate_trajectory(&config)).unwrap();
        let result = run(&config).unwrap();
        assert_eq!(result, direct);
    }

    #[test]
    fn test_run_analysis_envelope() {
        let config = AnalysisConfig::default();
        let output = run_analysis(&config).unwrap();
        assert!(output.methodology.contains("economic"));
        assert_eq!(output.metadata.precision, "ieee754_f64");
        assert_eq!(output.assumptions["model"]["households"], 10_000);
        let cumulative = output.result.series.cumulative_npv.last().copied().unwrap();
        assert!((cumulative - output.result.npv).abs() < 1e-6 * output.result.npv.abs().max(1.0));
    }

    #[test]
    fn test_warnings_for_never_payback_and_calibration() {
        let config = AnalysisConfig::builder()
            .persistence_scenario(PersistenceLaw::Constant { initial: 0.0 })
            .build()
            .unwrap();
        let output = run_analysis(&config).unwrap();
        assert_eq!(output.result.payback, PaybackPeriod::Never);
        assert!(output.warnings.iter().any(|w| w.contains("does not pay back")));
        assert!(output
            .warnings
            .iter()
            .any(|w| w.contains("behavioural reduction")));
    }
}
