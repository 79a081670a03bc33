use meter_cba_core::config::AnalysisConfig;
use meter_cba_core::engine::{generate_trajectory, run, run_analysis};
use meter_cba_core::models::{AdoptionMode, AdoptionParameters, LeakParameters, PersistenceLaw};
use meter_cba_core::MeterCbaError;

const HORIZON: u32 = 20;

fn config() -> AnalysisConfig {
    AnalysisConfig::builder()
        .persistence(PersistenceLaw::ExponentialToPlateau {
            initial: 0.08,
            plateau: 0.025,
            decay_rate: 0.15,
        })
        .leaks(LeakParameters::two_stock().build().unwrap())
        .build()
        .unwrap()
}

// ===========================================================================
// Adoption
// ===========================================================================

#[test]
fn test_mandatory_adoption_is_full_from_year_one() {
    let config = config();
    let trajectory = generate_trajectory(&config);
    assert_eq!(trajectory.entries.len(), HORIZON as usize);
    for entry in &trajectory.entries {
        assert_eq!(entry.adoption, 1.0, "year {}", entry.year);
    }
}

#[test]
fn test_logistic_adoption_monotone_and_bounded() {
    let adoption = AdoptionParameters::new(
        AdoptionMode::Logistic {
            speed: 0.6,
            midpoint: 5.0,
        },
        0.85,
        1,
        None,
        true,
    )
    .unwrap();
    let config = config().to_builder().adoption(adoption).build().unwrap();
    let trajectory = generate_trajectory(&config);
    for pair in trajectory.entries.windows(2) {
        assert!(pair[1].adoption >= pair[0].adoption);
    }
    assert!(trajectory.entries.iter().all(|e| e.adoption <= 0.85 + 1e-12));
}

#[test]
fn test_spread_capex_defers_investment() {
    let upfront = run(&config()).unwrap();
    let staged = AdoptionParameters::new(
        AdoptionMode::Staged {
            sectors: 4,
            years_per_sector: 2,
        },
        1.0,
        1,
        None,
        true,
    )
    .unwrap();
    let spread = run(&config().to_builder().adoption(staged).build().unwrap()).unwrap();
    assert!(spread.year_zero_outlay < upfront.year_zero_outlay);
}

// ===========================================================================
// Monotonicity and invariants
// ===========================================================================

#[test]
fn test_npv_increases_with_water_value() {
    let mut previous = f64::NEG_INFINITY;
    for social in [2.0, 3.0, 4.69, 6.0, 8.0] {
        let config = config()
            .to_builder()
            .with_water_value(|w| w.social_value = social)
            .build()
            .unwrap();
        let npv = run(&config).unwrap().npv;
        assert!(npv > previous, "NPV not increasing at {social}");
        previous = npv;
    }
}

#[test]
fn test_disabled_repair_costs_zero_city_share() {
    let leaks = LeakParameters::two_stock()
        .city_share(0.5)
        .include_repair_costs(false)
        .build()
        .unwrap();
    assert_eq!(leaks.city_repair_share(), 0.0);

    let config = config().to_builder().leaks(leaks).build().unwrap();
    let trajectory = generate_trajectory(&config);
    assert!(trajectory.entries.iter().all(|e| e.repair_cost_city == 0.0));
}

#[test]
fn test_persistence_first_year_equals_initial() {
    let laws = [
        PersistenceLaw::Constant { initial: 0.08 },
        PersistenceLaw::ExponentialToPlateau {
            initial: 0.08,
            plateau: 0.025,
            decay_rate: 0.15,
        },
    ];
    for law in laws {
        assert!((law.coefficient(1).unwrap() - 0.08).abs() < 1e-12);
    }
}

#[test]
fn test_invalid_config_rejected() {
    let result = config()
        .to_builder()
        .with_model(|m| m.discount_rate = -0.5)
        .build();
    assert!(matches!(result, Err(MeterCbaError::InvalidInput { .. })));
}

#[test]
fn test_envelope_carries_assumptions() {
    let output = run_analysis(&config()).unwrap();
    assert!(output.methodology.contains("economic"));
    assert_eq!(output.assumptions["model"]["households"], config().model().households);
    assert!(output.result.series.cumulative_npv.len() == HORIZON as usize);
}

#[test]
fn test_config_json_roundtrip_preserves_result() {
    let config = config();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: AnalysisConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(run(&parsed).unwrap(), run(&config).unwrap());
}
