use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeterCbaError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl MeterCbaError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        MeterCbaError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for MeterCbaError {
    fn from(e: serde_json::Error) -> Self {
        MeterCbaError::SerializationError(e.to_string())
    }
}

/// Reject values outside the closed unit interval.
pub(crate) fn check_ratio(field: &str, value: f64) -> Result<(), MeterCbaError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(MeterCbaError::invalid(
            field,
            format!("must be a ratio between 0 and 1 (got {value})"),
        ));
    }
    Ok(())
}

pub(crate) fn check_non_negative(field: &str, value: f64) -> Result<(), MeterCbaError> {
    if !value.is_finite() || value < 0.0 {
        return Err(MeterCbaError::invalid(
            field,
            format!("must be non-negative (got {value})"),
        ));
    }
    Ok(())
}

pub(crate) fn check_positive(field: &str, value: f64) -> Result<(), MeterCbaError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MeterCbaError::invalid(
            field,
            format!("must be strictly positive (got {value})"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_bounds() {
        assert!(check_ratio("x", 0.0).is_ok());
        assert!(check_ratio("x", 1.0).is_ok());
        assert!(check_ratio("x", 1.2).is_err());
        assert!(check_ratio("x", -0.01).is_err());
        assert!(check_ratio("x", f64::NAN).is_err());
    }

    #[test]
    fn test_error_names_field() {
        let err = check_positive("model.households", 0.0).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("model.households"), "got {msg}");
    }
}
