pub mod config;
pub mod error;

pub use config::{
    Config, ConfigValidationError, ForecastConfig, LocationConfig, LoggingConfig, NwsConfig,
    ValidationResult,
};
pub use error::{AppError, ConfigError};

use tracing_subscriber::EnvFilter;

/// Initialize tracing with `level` as the default filter.
///
/// `RUST_LOG` overrides `level` when set. Logs go to stderr so command output
/// on stdout stays parseable.
pub fn init_logging(level: &str) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Other(anyhow::anyhow!(e)))?;

    tracing::debug!("Logging initialized at {}", level);
    Ok(())
}
