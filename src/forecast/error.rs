//! Error types for the forecast pipeline.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that reach the caller of the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Duplicate date in series: {0}")]
    DuplicateDate(NaiveDate),

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Forecast produced non-finite values")]
    NonFiniteForecast,
}

impl ForecastError {
    pub(crate) fn invalid(param: &str, value: impl ToString, reason: &str) -> Self {
        ForecastError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Primary-model failures. These never leave `forecast()`: they demote the
/// run to the linear trend fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Series too short: need at least {needed} observations, got {got}")]
    TooShort { needed: usize, got: usize },

    #[error("Series has zero variance")]
    DegenerateVariance,

    #[error("Non-finite value during fit: {0}")]
    NonFinite(String),

    #[error("No candidate order could be fitted")]
    NoCandidate,

    #[error("Optimizer failed: {0}")]
    Optimizer(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForecastError::InsufficientData { needed: 1, got: 0 };
        assert_eq!(
            err.to_string(),
            "Insufficient data: need at least 1 observations, got 0"
        );

        let err = ForecastError::invalid("window", 0, "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'window' = '0': must be at least 1"
        );

        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            ForecastError::DuplicateDate(date).to_string(),
            "Duplicate date in series: 2024-03-01"
        );
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::TooShort { needed: 6, got: 3 };
        assert_eq!(
            err.to_string(),
            "Series too short: need at least 6 observations, got 3"
        );
        assert_eq!(ModelError::NoCandidate.to_string(), "No candidate order could be fitted");
    }
}
