pub mod analysis;
pub mod monte_carlo;
pub mod optimizer;
pub mod presets;
pub mod scenarios;
