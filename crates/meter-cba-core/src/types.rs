use serde::{Deserialize, Serialize};

/// Dollar amounts.
pub type Money = f64;

/// Fractions expressed as decimals (0.05 = 5%). Never as percentages.
pub type Ratio = f64;

/// Water volumes.
pub type CubicMeters = f64;

/// Year counts and 1-based year indices.
pub type Years = u32;

/// Accounting perspective of a run.
///
/// Economic accounting values saved water at its full social cost and may
/// load public spending with the marginal cost of public funds. Financial
/// accounting only counts what the city budget sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountingMode {
    #[default]
    Economic,
    Financial,
}

impl AccountingMode {
    pub fn label(&self) -> &'static str {
        match self {
            AccountingMode::Economic => "economic",
            AccountingMode::Financial => "financial",
        }
    }
}

/// Payback outcome of a run. `Never` is a regular result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaybackPeriod {
    Within { years: f64 },
    Never,
}

impl PaybackPeriod {
    pub fn years(&self) -> Option<f64> {
        match self {
            PaybackPeriod::Within { years } => Some(*years),
            PaybackPeriod::Never => None,
        }
    }

    pub fn is_reached(&self) -> bool {
        matches!(self, PaybackPeriod::Within { .. })
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
