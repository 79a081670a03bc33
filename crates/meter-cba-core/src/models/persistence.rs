use serde::{Deserialize, Serialize};

use crate::error::{check_non_negative, check_ratio, MeterCbaError};
use crate::types::Ratio;
use crate::MeterCbaResult;

/// Decay law for the behavioural reduction coefficient.
///
/// Each variant carries only the fields its formula reads. Coefficients
/// are ratios of household consumption saved in a given year of meter age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PersistenceLaw {
    /// The initial effect persists unchanged.
    Constant { initial: Ratio },
    /// `plateau + (initial - plateau) * exp(-decay_rate * (t - 1))`
    ExponentialToPlateau {
        initial: Ratio,
        plateau: Ratio,
        decay_rate: f64,
    },
    /// Straight line from `initial` at year 1 to zero at `fadeout_years`.
    LinearFadeout { initial: Ratio, fadeout_years: u32 },
    /// `initial * exp(-decay_rate * (t - 1))`, decaying to zero.
    ExponentialFadeout { initial: Ratio, decay_rate: f64 },
}

impl Default for PersistenceLaw {
    fn default() -> Self {
        PersistenceLaw::Constant { initial: 0.08 }
    }
}

impl PersistenceLaw {
    /// Build and validate a law.
    pub fn new(law: PersistenceLaw) -> MeterCbaResult<Self> {
        law.validate()?;
        Ok(law)
    }

    pub fn validate(&self) -> MeterCbaResult<()> {
        check_ratio("persistence.initial", self.initial())?;
        match self {
            PersistenceLaw::Constant { .. } => {}
            PersistenceLaw::ExponentialToPlateau {
                initial,
                plateau,
                decay_rate,
            } => {
                check_ratio("persistence.plateau", *plateau)?;
                if plateau > initial {
                    return Err(MeterCbaError::invalid(
                        "persistence.plateau",
                        format!("plateau ({plateau}) must not exceed the initial coefficient ({initial})"),
                    ));
                }
                check_non_negative("persistence.decay_rate", *decay_rate)?;
            }
            PersistenceLaw::LinearFadeout { fadeout_years, .. } => {
                if *fadeout_years < 1 {
                    return Err(MeterCbaError::invalid(
                        "persistence.fadeout_years",
                        "must be at least 1",
                    ));
                }
            }
            PersistenceLaw::ExponentialFadeout { decay_rate, .. } => {
                check_non_negative("persistence.decay_rate", *decay_rate)?;
            }
        }
        Ok(())
    }

    pub fn initial(&self) -> Ratio {
        match self {
            PersistenceLaw::Constant { initial }
            | PersistenceLaw::ExponentialToPlateau { initial, .. }
            | PersistenceLaw::LinearFadeout { initial, .. }
            | PersistenceLaw::ExponentialFadeout { initial, .. } => *initial,
        }
    }

    /// Long-run coefficient the law converges to.
    pub fn long_run(&self) -> Ratio {
        match self {
            PersistenceLaw::Constant { initial } => *initial,
            PersistenceLaw::ExponentialToPlateau {
                plateau,
                decay_rate,
                initial,
            } => {
                if *decay_rate > 0.0 {
                    *plateau
                } else {
                    *initial
                }
            }
            PersistenceLaw::LinearFadeout { .. } => 0.0,
            PersistenceLaw::ExponentialFadeout {
                initial,
                decay_rate,
            } => {
                if *decay_rate > 0.0 {
                    0.0
                } else {
                    *initial
                }
            }
        }
    }

    /// Behavioural coefficient in year `year` of meter age (1-based).
    pub fn coefficient(&self, year: u32) -> MeterCbaResult<Ratio> {
        if year < 1 {
            return Err(MeterCbaError::invalid(
                "year",
                "persistence is defined from year 1 onwards",
            ));
        }
        Ok(self.coefficient_unchecked(year))
    }

    fn coefficient_unchecked(&self, year: u32) -> Ratio {
        let elapsed = (year - 1) as f64;
        match self {
            PersistenceLaw::Constant { initial } => *initial,
            PersistenceLaw::ExponentialToPlateau {
                initial,
                plateau,
                decay_rate,
            } => plateau + (initial - plateau) * (-decay_rate * elapsed).exp(),
            PersistenceLaw::LinearFadeout {
                initial,
                fadeout_years,
            } => {
                if *fadeout_years <= 1 {
                    return if year == 1 { *initial } else { 0.0 };
                }
                let span = (*fadeout_years - 1) as f64;
                initial * (1.0 - elapsed / span).max(0.0)
            }
            PersistenceLaw::ExponentialFadeout {
                initial,
                decay_rate,
            } => initial * (-decay_rate * elapsed).exp(),
        }
    }

    /// Coefficients for meter ages 1..=horizon.
    pub fn series(&self, horizon: u32) -> Vec<Ratio> {
        (1..=horizon).map(|t| self.coefficient_unchecked(t)).collect()
    }

    /// The same law rescaled to a new initial coefficient.
    ///
    /// The plateau keeps its proportion to the initial effect; time
    /// constants are unchanged.
    pub fn rescaled(&self, initial: Ratio) -> MeterCbaResult<Self> {
        check_ratio("persistence.initial", initial)?;
        let law = match self {
            PersistenceLaw::Constant { .. } => PersistenceLaw::Constant { initial },
            PersistenceLaw::ExponentialToPlateau {
                initial: old,
                plateau,
                decay_rate,
            } => {
                let plateau = if *old > 0.0 {
                    plateau * (initial / old)
                } else {
                    0.0
                };
                PersistenceLaw::ExponentialToPlateau {
                    initial,
                    plateau: plateau.min(initial),
                    decay_rate: *decay_rate,
                }
            }
            PersistenceLaw::LinearFadeout { fadeout_years, .. } => {
                PersistenceLaw::LinearFadeout {
                    initial,
                    fadeout_years: *fadeout_years,
                }
            }
            PersistenceLaw::ExponentialFadeout { decay_rate, .. } => {
                PersistenceLaw::ExponentialFadeout {
                    initial,
                    decay_rate: *decay_rate,
                }
            }
        };
        Ok(law)
    }

    /// The same law with a different plateau (exponential-to-plateau only).
    pub fn with_plateau(&self, plateau: Ratio) -> MeterCbaResult<Self> {
        match self {
            PersistenceLaw::ExponentialToPlateau {
                initial,
                decay_rate,
                ..
            } => PersistenceLaw::new(PersistenceLaw::ExponentialToPlateau {
                initial: *initial,
                plateau,
                decay_rate: *decay_rate,
            }),
            other => Ok(other.clone()),
        }
    }

    /// Plateau coefficient when the law has one.
    pub fn plateau(&self) -> Option<Ratio> {
        match self {
            PersistenceLaw::ExponentialToPlateau { plateau, .. } => Some(*plateau),
            _ => None,
        }
    }
}
