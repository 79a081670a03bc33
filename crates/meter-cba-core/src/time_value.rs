use crate::error::MeterCbaError;
use crate::types::{Money, PaybackPeriod, Ratio};
use crate::MeterCbaResult;

/// Below this magnitude a present-value cost total is treated as zero.
const ZERO_COST_THRESHOLD: f64 = 1e-9;

/// Rates closer to zero than this use the undiscounted annuity limit.
const ZERO_RATE_THRESHOLD: f64 = 1e-12;

fn check_rate(rate: Ratio) -> MeterCbaResult<()> {
    if !rate.is_finite() || rate <= -1.0 {
        return Err(MeterCbaError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    Ok(())
}

/// Discount factor `(1 + r)^-t` for a flow at the end of `year`.
pub fn discount_factor(rate: Ratio, year: u32) -> f64 {
    (1.0 + rate).powi(-(year as i32))
}

/// Present value of an annual series whose first element falls in year 1.
pub fn present_value(rate: Ratio, series: &[Money]) -> MeterCbaResult<Money> {
    check_rate(rate)?;

    let one_plus_r = 1.0 + rate;
    let mut discount = 1.0;
    let mut result = 0.0;

    for flow in series {
        discount *= one_plus_r;
        result += flow / discount;
    }

    Ok(result)
}

/// Element-wise discounted values of an annual series (year 1 first).
pub fn discounted_series(rate: Ratio, series: &[Money]) -> MeterCbaResult<Vec<Money>> {
    check_rate(rate)?;

    let one_plus_r = 1.0 + rate;
    let mut discount = 1.0;
    Ok(series
        .iter()
        .map(|flow| {
            discount *= one_plus_r;
            flow / discount
        })
        .collect())
}

/// Benefit-cost ratio. `None` when the cost denominator is (numerically) zero.
pub fn benefit_cost_ratio(pv_benefits: Money, pv_costs: Money) -> Option<f64> {
    if pv_costs.abs() < ZERO_COST_THRESHOLD {
        None
    } else {
        Some(pv_benefits / pv_costs)
    }
}

/// Capital recovery factor turning a present value into an equivalent annuity.
pub fn capital_recovery_factor(rate: Ratio, years: u32) -> f64 {
    if years == 0 {
        return 0.0;
    }
    let n = years as f64;
    if rate.abs() < ZERO_RATE_THRESHOLD {
        return 1.0 / n;
    }
    let growth = (1.0 + rate).powf(n);
    rate * growth / (growth - 1.0)
}

/// Running sum of `initial` followed by each element of `flows`.
pub fn cumulative(initial: Money, flows: &[Money]) -> Vec<Money> {
    let mut running = initial;
    flows
        .iter()
        .map(|f| {
            running += f;
            running
        })
        .collect()
}

/// Payback period from a cumulative discounted net position.
///
/// `year_zero` is the position before year 1 (the negated undiscounted
/// year-0 outlay). The crossing year is located by linear interpolation
/// between the last negative and the first non-negative position.
pub fn payback_period(year_zero: Money, cumulative: &[Money]) -> PaybackPeriod {
    if year_zero >= 0.0 {
        return PaybackPeriod::Within { years: 0.0 };
    }

    let mut prev = year_zero;
    for (i, &current) in cumulative.iter().enumerate() {
        if current >= 0.0 {
            let span = current - prev;
            let fraction = if span > 0.0 { -prev / span } else { 1.0 };
            return PaybackPeriod::Within {
                years: i as f64 + fraction,
            };
        }
        prev = current;
    }

    PaybackPeriod::Never
}
