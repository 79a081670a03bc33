use meter_cba_core::config::{AnalysisConfig, AnalysisConfigBuilder};
use meter_cba_core::engine::run;
use meter_cba_core::{AccountingMode, PaybackPeriod, PresetRegistry};

// ===========================================================================
// Longueuil reference case
// ===========================================================================

fn longueuil() -> AnalysisConfigBuilder {
    let presets = PresetRegistry::with_defaults().unwrap();
    AnalysisConfig::builder()
        .model(presets.city("longueuil").unwrap())
        .meter(presets.meter("longueuil_ami").unwrap())
        .persistence(presets.persistence("realistic").unwrap())
        .leaks(presets.leaks("quebec_two_stock").unwrap())
        .water_value(presets.water_value("quebec").unwrap())
        .mode(AccountingMode::Economic)
}

#[test]
fn test_longueuil_baseline() {
    let config = longueuil().build().unwrap();
    assert_eq!(config.horizon(), 20);
    assert_eq!(config.model().households, 116_258);

    let result = run(&config).unwrap();
    assert!(
        result.npv > -38_000_000.0 && result.npv < -33_000_000.0,
        "NPV {}",
        result.npv
    );
    let bcr = result.bcr.unwrap();
    assert!(bcr > 0.72 && bcr < 0.77, "BCR {bcr}");
    assert_eq!(result.payback, PaybackPeriod::Never);
}

#[test]
fn test_stronger_behaviour_change_pays_back() {
    let base = run(&longueuil().build().unwrap()).unwrap();
    let config = longueuil()
        .with_model(|m| m.behavioral_reduction = 0.14)
        .build()
        .unwrap();
    assert!((config.persistence().initial() - 0.14).abs() < 1e-12);

    let result = run(&config).unwrap();
    assert!(result.npv - base.npv > 15_000_000.0);
    assert!(result.npv > 0.0, "NPV {}", result.npv);
    match result.payback {
        PaybackPeriod::Within { years } => {
            assert!(years > 11.5 && years < 14.0, "payback {years}")
        }
        PaybackPeriod::Never => panic!("expected a finite payback"),
    }
}

#[test]
fn test_faster_installation() {
    let base_config = longueuil().build().unwrap();
    let base = run(&base_config).unwrap();
    let meter = base_config
        .meter()
        .to_builder()
        .install_hours(1.5)
        .build()
        .unwrap();
    let result = run(&longueuil().meter(meter).build().unwrap()).unwrap();

    let delta = result.npv - base.npv;
    assert!((delta - 21_800_000.0).abs() < 1_500_000.0, "delta {delta}");
}

#[test]
fn test_financial_mode_excludes_externalities() {
    let economic = run(&longueuil().build().unwrap()).unwrap();
    let financial = run(&longueuil().mode(AccountingMode::Financial).build().unwrap()).unwrap();
    assert_eq!(financial.mode, AccountingMode::Financial);
    assert!(financial.npv < economic.npv);
    assert!((economic.payers.economic_npv - economic.npv).abs() < 1e-6);
    assert!((financial.payers.financial_npv - financial.npv).abs() < 1e-6);
}

#[test]
fn test_mcf_loading_lowers_npv() {
    let presets = PresetRegistry::with_defaults().unwrap();
    let plain = run(&longueuil().build().unwrap()).unwrap();
    let loaded = run(&longueuil()
        .water_value(presets.water_value("quebec_mcf").unwrap())
        .build()
        .unwrap())
    .unwrap();
    assert!(loaded.npv < plain.npv);
    assert!(loaded.present_values.mcf_loading > 0.0);
}
