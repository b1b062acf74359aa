//! Condition evaluation error types.

use chrono::{DateTime, FixedOffset};
use nimbus_nws::ForecastError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConditionError {
    #[error("invalid argument {argument:?}: expected {expected}")]
    InvalidArgument { argument: String, expected: String },

    #[error("no forecast available for time: {when}")]
    NoForecastForTime { when: DateTime<FixedOffset> },

    #[error("unknown cloud cover in forecast: {short_forecast:?}")]
    UnknownCategoryInForecast { short_forecast: String },

    #[error("unknown condition: {0}")]
    UnknownCondition(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("{0:?} is already registered")]
    DuplicateName(String),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error("failed to write output: {0}")]
    Output(String),
}

impl From<std::io::Error> for ConditionError {
    fn from(err: std::io::Error) -> Self {
        Self::Output(err.to_string())
    }
}

impl From<serde_json::Error> for ConditionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(err.to_string())
    }
}

impl ConditionError {
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidArgument { argument, expected } => {
                format!("{:?} is not a cloud cover; expected {}.", argument, expected)
            }
            Self::NoForecastForTime { when } => {
                format!("The forecast does not cover {}.", when.to_rfc3339())
            }
            Self::UnknownCategoryInForecast { short_forecast } => format!(
                "The forecast ({:?}) does not describe cloud cover.",
                short_forecast
            ),
            Self::UnknownCondition(name) => format!("There is no condition named {:?}.", name),
            Self::UnknownOperation(name) => format!("There is no operation named {:?}.", name),
            Self::DuplicateName(name) => format!("{:?} is registered twice.", name),
            Self::Forecast(e) => e.user_message().to_string(),
            Self::Output(_) => "Unable to write the result.".to_string(),
        }
    }

    /// True when the caller supplied a bad condition, operation or argument.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::UnknownCondition(_) | Self::UnknownOperation(_)
        )
    }
}
