pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod presets;
pub mod time_value;
pub mod types;

#[cfg(feature = "scenarios")]
pub mod scenarios;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "optimizer")]
pub mod optimizer;

pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use engine::{generate_trajectory, run, run_analysis, ResultSet, Trajectory};
pub use error::MeterCbaError;
pub use presets::PresetRegistry;
pub use types::*;

/// Standard result type for all meter cost-benefit operations
pub type MeterCbaResult<T> = Result<T, MeterCbaError>;
