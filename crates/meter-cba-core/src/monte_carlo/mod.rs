pub mod simulation;

pub use simulation::{
    run_monte_carlo, run_monte_carlo_analysis, DistributionResult, HistogramBin, McDistribution,
    McPercentiles, McStatistics, MonteCarloConfig, ParameterCorrelation, UncertainParameter,
    UncertainVariable,
};
