#![cfg(feature = "optimizer")]

use meter_cba_core::config::AnalysisConfig;
use meter_cba_core::models::AdoptionMode;
use meter_cba_core::optimizer::{
    optimize_deployment, DeploymentConstraints, Objective, ScheduleResult, SearchSpace,
};
use meter_cba_core::PresetRegistry;

fn longueuil() -> AnalysisConfig {
    let presets = PresetRegistry::with_defaults().unwrap();
    AnalysisConfig::builder()
        .model(presets.city("longueuil").unwrap())
        .meter(presets.meter("longueuil_ami").unwrap())
        .persistence(presets.persistence("realistic").unwrap())
        .leaks(presets.leaks("quebec_two_stock").unwrap())
        .build()
        .unwrap()
}

#[test]
fn test_crew_capacity_forces_staged_rollout() {
    let constraints = DeploymentConstraints {
        max_budget_per_year: None,
        max_installs_per_year: Some(30_000),
    };
    let result = optimize_deployment(
        &longueuil(),
        &constraints,
        Objective::MaximizeNpv,
        &SearchSpace::default(),
    )
    .unwrap();
    let best = result.best().unwrap();
    assert_ne!(best.adoption.mode, AdoptionMode::Mandatory);
    assert!(best.peak_installs <= 30_000.0 + 1e-6);
}

#[test]
fn test_impossible_capacity_reports_tightest_schedule() {
    let constraints = DeploymentConstraints {
        max_budget_per_year: None,
        max_installs_per_year: Some(500),
    };
    let result = optimize_deployment(
        &longueuil(),
        &constraints,
        Objective::MinimizePayback,
        &SearchSpace::default(),
    )
    .unwrap();
    match result {
        ScheduleResult::Infeasible {
            tightest_installs, ..
        } => assert!(tightest_installs > 500.0),
        other => panic!("expected infeasible, got {other:?}"),
    }
}
