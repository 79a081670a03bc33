pub mod adoption;
pub mod leaks;
pub mod network;
pub mod persistence;
pub mod scale;

pub use adoption::{AdoptionMode, AdoptionParameters, Incentive};
pub use leaks::{LeakModel, LeakParameters, LeakParametersBuilder, LeakSeries};
pub use network::{NetworkLossParameters, NetworkProgression, NetworkSeries};
pub use persistence::PersistenceLaw;
pub use scale::{CategoryWeights, ScaleEconomyConfig, ScaleLaw, ScaleStep, ScaledUnitCost};
