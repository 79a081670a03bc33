use serde::{Deserialize, Serialize};

use crate::error::{check_non_negative, check_ratio, MeterCbaError};
use crate::types::{Money, Ratio};
use crate::MeterCbaResult;

/// Deployment law for the cumulative share of equipped households.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdoptionMode {
    /// Every household is equipped from the start year.
    Mandatory,
    /// Voluntary uptake following an S-curve.
    Logistic { speed: f64, midpoint: f64 },
    /// Only new connections are equipped, at a fixed annual rate.
    LinearNewBuilds { annual_rate: Ratio },
    /// Sectors are equipped one after another.
    Staged { sectors: u32, years_per_sector: u32 },
}

/// Per-household incentive paid by the city over a number of years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incentive {
    pub total_per_household: Money,
    pub duration_years: u32,
}

impl Incentive {
    pub fn per_year(&self) -> Money {
        if self.duration_years == 0 {
            0.0
        } else {
            self.total_per_household / self.duration_years as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdoptionParameters {
    pub mode: AdoptionMode,
    /// Maximum share of households that will ever be equipped.
    pub ceiling: Ratio,
    /// First year (1-based) in which meters are installed.
    pub start_year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incentive: Option<Incentive>,
    /// Recognize CAPEX as cohorts are installed instead of upfront.
    #[serde(default)]
    pub spread_capex: bool,
}

impl Default for AdoptionParameters {
    fn default() -> Self {
        Self::mandatory()
    }
}

impl AdoptionParameters {
    pub fn mandatory() -> Self {
        AdoptionParameters {
            mode: AdoptionMode::Mandatory,
            ceiling: 1.0,
            start_year: 1,
            incentive: None,
            spread_capex: false,
        }
    }

    /// Build and validate a parameter set. A mandatory mode always
    /// resolves its ceiling to 1.0, once the given ceiling is a valid ratio.
    pub fn new(
        mode: AdoptionMode,
        ceiling: Ratio,
        start_year: u32,
        incentive: Option<Incentive>,
        spread_capex: bool,
    ) -> MeterCbaResult<Self> {
        check_ratio("adoption.ceiling", ceiling)?;
        let ceiling = if mode == AdoptionMode::Mandatory {
            1.0
        } else {
            ceiling
        };
        let params = AdoptionParameters {
            mode,
            ceiling,
            start_year,
            incentive,
            spread_capex,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> MeterCbaResult<()> {
        check_ratio("adoption.ceiling", self.ceiling)?;
        if self.start_year < 1 {
            return Err(MeterCbaError::invalid(
                "adoption.start_year",
                "must be at least 1",
            ));
        }
        match &self.mode {
            AdoptionMode::Mandatory => {}
            AdoptionMode::Logistic { speed, midpoint } => {
                check_non_negative("adoption.speed", *speed)?;
                if !midpoint.is_finite() {
                    return Err(MeterCbaError::invalid(
                        "adoption.midpoint",
                        "must be finite",
                    ));
                }
            }
            AdoptionMode::LinearNewBuilds { annual_rate } => {
                check_ratio("adoption.annual_rate", *annual_rate)?;
            }
            AdoptionMode::Staged {
                sectors,
                years_per_sector,
            } => {
                if *sectors < 1 {
                    return Err(MeterCbaError::invalid(
                        "adoption.sectors",
                        "must be at least 1",
                    ));
                }
                if *years_per_sector < 1 {
                    return Err(MeterCbaError::invalid(
                        "adoption.years_per_sector",
                        "must be at least 1",
                    ));
                }
            }
        }
        if let Some(incentive) = &self.incentive {
            check_non_negative(
                "adoption.incentive.total_per_household",
                incentive.total_per_household,
            )?;
            if incentive.duration_years < 1 && incentive.total_per_household > 0.0 {
                return Err(MeterCbaError::invalid(
                    "adoption.incentive.duration_years",
                    "must be at least 1 when an incentive is paid",
                ));
            }
        }
        Ok(())
    }

    /// Cumulative adoption fraction in `year` (1-based); 0 before the start year.
    pub fn fraction(&self, year: u32) -> Ratio {
        if year < self.start_year {
            return 0.0;
        }
        let t_eff = (year - self.start_year + 1) as f64;

        let value = match &self.mode {
            AdoptionMode::Mandatory => 1.0,
            AdoptionMode::Logistic { speed, midpoint } => {
                self.ceiling / (1.0 + (-speed * (t_eff - midpoint)).exp())
            }
            AdoptionMode::LinearNewBuilds { annual_rate } => (t_eff * annual_rate).min(self.ceiling),
            AdoptionMode::Staged {
                sectors,
                years_per_sector,
            } => {
                let n = *sectors as f64;
                let d = *years_per_sector as f64;
                if t_eff >= n * d {
                    self.ceiling
                } else {
                    let completed = (t_eff / d).floor();
                    let partial = (t_eff % d) / d;
                    (completed + partial) / n * self.ceiling
                }
            }
        };
        value.clamp(0.0, 1.0)
    }

    /// Adoption fractions for years 1..=horizon.
    pub fn series(&self, horizon: u32) -> Vec<Ratio> {
        (1..=horizon).map(|t| self.fraction(t)).collect()
    }

    /// Adoption reached at the end of the horizon.
    pub fn final_fraction(&self, horizon: u32) -> Ratio {
        if horizon == 0 {
            0.0
        } else {
            self.fraction(horizon)
        }
    }

    pub fn incentive_per_year(&self) -> Money {
        self.incentive.as_ref().map(Incentive::per_year).unwrap_or(0.0)
    }

    pub fn incentive_duration(&self) -> u32 {
        self.incentive
            .as_ref()
            .map(|i| i.duration_years)
            .unwrap_or(0)
    }
}

/// Newly equipped share per year: the first value, then the non-negative
/// year-over-year differences.
pub fn increments(series: &[Ratio]) -> Vec<Ratio> {
    let mut prev = 0.0;
    series
        .iter()
        .map(|&a| {
            let delta = (a - prev).max(0.0);
            prev = a;
            delta
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logistic() -> AdoptionParameters {
        AdoptionParameters::new(
            AdoptionMode::Logistic {
                speed: 0.5,
                midpoint: 5.0,
            },
            0.9,
            1,
            None,
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_mandatory_full_from_year_one() {
        let params = AdoptionParameters::mandatory();
        assert!(params.series(20).iter().all(|&a| a == 1.0));
    }

    #[test]
    fn test_mandatory_ignores_ceiling() {
        let params = AdoptionParameters::new(AdoptionMode::Mandatory, 0.6, 1, None, false).unwrap();
        assert_eq!(params.ceiling, 1.0);
        assert_eq!(params.fraction(1), 1.0);
    }

    #[test]
    fn test_logistic_midpoint_is_half_ceiling() {
        let params = logistic();
        assert!((params.fraction(5) - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_monotone_and_bounded_for_every_mode() {
        let modes = [
            AdoptionMode::Mandatory,
            AdoptionMode::Logistic {
                speed: 1.5,
                midpoint: 2.0,
            },
            AdoptionMode::LinearNewBuilds { annual_rate: 0.03 },
            AdoptionMode::Staged {
                sectors: 5,
                years_per_sector: 2,
            },
        ];
        for mode in modes {
            let params = AdoptionParameters::new(mode, 0.85, 2, None, true).unwrap();
            let series = params.series(25);
            for pair in series.windows(2) {
                assert!(pair[1] >= pair[0], "{:?} not monotone", params.mode);
            }
            assert!(series.iter().all(|&a| a <= params.ceiling + 1e-12));
            assert_eq!(series[0], 0.0, "nothing before the start year");
        }
    }

    #[test]
    fn test_new_builds_capped() {
        let params = AdoptionParameters::new(
            AdoptionMode::LinearNewBuilds { annual_rate: 0.03 },
            0.6,
            1,
            None,
            true,
        )
        .unwrap();
        assert!((params.fraction(10) - 0.3).abs() < 1e-12);
        assert_eq!(params.fraction(30), 0.6);
    }

    #[test]
    fn test_staged_steps() {
        let params = AdoptionParameters::new(
            AdoptionMode::Staged {
                sectors: 5,
                years_per_sector: 2,
            },
            1.0,
            1,
            None,
            true,
        )
        .unwrap();
        // Year 1: half of the first sector
        assert!((params.fraction(1) - 0.1).abs() < 1e-12);
        assert!((params.fraction(2) - 0.2).abs() < 1e-12);
        assert!((params.fraction(9) - 0.9).abs() < 1e-12);
        assert_eq!(params.fraction(10), 1.0);
    }

    #[test]
    fn test_increments_sum_to_final() {
        let series = logistic().series(20);
        let deltas = increments(&series);
        let total: f64 = deltas.iter().sum();
        assert!((total - series[19]).abs() < 1e-12);
        assert_eq!(deltas[0], series[0]);
    }

    #[test]
    fn test_incentive_spread() {
        let params = AdoptionParameters::new(
            AdoptionMode::Mandatory,
            1.0,
            1,
            Some(Incentive {
                total_per_household: 540.0,
                duration_years: 3,
            }),
            true,
        )
        .unwrap();
        assert_eq!(params.incentive_per_year(), 180.0);
    }

    #[test]
    fn test_invalid_ceiling_rejected() {
        assert!(AdoptionParameters::new(AdoptionMode::Mandatory, 90.0, 1, None, false).is_err());
        assert!(AdoptionParameters::new(AdoptionMode::Mandatory, -3.0, 1, None, false).is_err());
        let logistic = AdoptionMode::Logistic {
            speed: 0.6,
            midpoint: 5.0,
        };
        assert!(AdoptionParameters::new(logistic, 1.5, 1, None, false).is_err());
    }

    #[test]
    fn test_mandatory_valid_ceiling_resolves_to_full() {
        let params =
            AdoptionParameters::new(AdoptionMode::Mandatory, 0.6, 1, None, false).unwrap();
        assert_eq!(params.ceiling, 1.0);
    }
}
