//! Forecast retrieval error types.

use thiserror::Error;

/// Errors raised while resolving a grid cell or fetching its forecast.
///
/// The type is `Clone` so that a single failed fetch can be handed to every
/// caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForecastError {
    #[error("{url}: upstream request failed ({}): {message}", status_label(.status))]
    Upstream {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{url}: failed to decode response: {message}")]
    Parse { url: String, message: String },

    #[error("{url}: invalid URL: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("forecast request for {coordinate} was cancelled")]
    Cancelled { coordinate: String },
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no response".to_string(),
    }
}

impl ForecastError {
    pub(crate) fn transport(url: &str, err: &reqwest::Error) -> Self {
        Self::Upstream {
            url: url.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    pub(crate) fn status(url: &str, status: reqwest::StatusCode, body: &str) -> Self {
        Self::Upstream {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: body.chars().take(500).collect(),
        }
    }

    /// Whether a transport layer could reasonably retry the request.
    ///
    /// Nothing in this crate retries; the classification is exposed for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status: None, .. } => true,
            Self::Upstream {
                status: Some(code), ..
            } => *code >= 500 || *code == 408 || *code == 429,
            _ => false,
        }
    }

    /// User-friendly error message.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Upstream { status: Some(code), .. } if *code >= 500 => {
                "The weather service is experiencing issues. Please try again later."
            }
            Self::Upstream { .. } => "Unable to reach the weather service.",
            Self::Parse { .. } => "Received an unexpected response from the weather service.",
            Self::InvalidUrl { .. } => "The weather service address is invalid. Check settings.",
            Self::Cancelled { .. } => "The forecast request was cancelled.",
        }
    }
}
