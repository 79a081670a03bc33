pub mod scenario;
pub mod sensitivity;

pub use scenario::{
    compare_meter_classes, compare_persistence, compare_scenarios, compare_scenarios_analysis,
    ScenarioMetrics, ScenarioOutput, ScenarioResult, ScenarioSpec,
};
pub use sensitivity::{
    elasticities, sensitivity_grid, sensitivity_grid_analysis, tornado, tornado_analysis,
    Elasticity, SensitivityOutput, SensitivityVariable, TornadoOutput, TornadoRow,
    TORNADO_PARAMETERS,
};
