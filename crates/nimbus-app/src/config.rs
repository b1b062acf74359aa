use chrono_tz::Tz;
use nimbus_conditions::ServiceConfig;
use nimbus_nws::{Coordinate, ForecastKind, DEFAULT_USER_AGENT, NWS_API_HOST};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

const ENV_PREFIX: &str = "NIMBUS";
const ENV_SEPARATOR: &str = "__";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// All errors joined into one line.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Where forecasts are fetched for
    pub location: LocationConfig,

    /// weather.gov client settings
    pub nws: NwsConfig,

    pub forecast: ForecastConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// IANA time zone name, e.g. `America/Chicago`
    pub time_zone: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 39.7456,
            longitude: -97.0892,
            time_zone: "America/Chicago".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NwsConfig {
    pub host: String,

    /// weather.gov asks clients to identify themselves
    pub user_agent: String,

    pub timeout_seconds: u64,

    /// Use hourly periods instead of day/night periods
    pub hourly: bool,
}

impl Default for NwsConfig {
    fn default() -> Self {
        Self {
            host: NWS_API_HOST.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_seconds: 10,
            hourly: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Minutes a fetched forecast is reused before refreshing
    pub refresh_minutes: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            refresh_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating it if it doesn't exist.
    ///
    /// Environment variables such as `NIMBUS__NWS__HOST` override file values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Writing default configuration to {}", config_path.display());
            Self::default().save_to(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::build(Some(path), Self::environment())
    }

    /// Load and validate, failing on any validation error.
    ///
    /// Warnings are returned alongside the config for the caller to report.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult), ConfigError> {
        let config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        Ok((config, validation))
    }

    fn environment() -> ::config::Environment {
        ::config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    /// Layer defaults, then the file, then the environment.
    fn build(path: Option<&Path>, env: ::config::Environment) -> Result<Self, ConfigError> {
        let defaults = ::config::Config::try_from(&Self::default())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let mut builder = ::config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder
            .add_source(env)
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.nws.host, "nws.host", &mut result);

        let LocationConfig {
            latitude,
            longitude,
            ..
        } = self.location;
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            result.add_error(
                "location.latitude",
                format!("Latitude must be between -90 and 90, got: {}", latitude),
            );
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            result.add_error(
                "location.longitude",
                format!("Longitude must be between -180 and 180, got: {}", longitude),
            );
        }

        if let Err(e) = self.time_zone() {
            result.add_error("location.time_zone", e.to_string());
        }

        if self.nws.user_agent.trim().is_empty() {
            result.add_error("nws.user_agent", "User agent must not be empty");
        }

        if self.nws.timeout_seconds == 0 {
            result.add_error("nws.timeout_seconds", "Timeout must be greater than 0");
        }

        if self.forecast.refresh_minutes == 0 {
            result.add_warning(
                "forecast.refresh_minutes",
                "Forecast caching disabled (0 minutes)",
            );
        } else if self.forecast.refresh_minutes > 1440 {
            result.add_warning(
                "forecast.refresh_minutes",
                "Forecast refresh interval is more than 24 hours",
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.location.latitude, self.location.longitude)
    }

    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        self.location.time_zone.parse::<Tz>().map_err(|_| {
            ConfigError::Invalid(format!(
                "Unknown time zone: {:?}",
                self.location.time_zone
            ))
        })
    }

    /// Settings for the forecast service at the configured location.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            coordinate: self.coordinate(),
            host: self.nws.host.clone(),
            user_agent: self.nws.user_agent.clone(),
            timeout: Duration::from_secs(self.nws.timeout_seconds),
            kind: if self.nws.hourly {
                ForecastKind::Hourly
            } else {
                ForecastKind::Periods
            },
            refresh: Duration::from_secs(u64::from(self.forecast.refresh_minutes) * 60),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Write(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Write(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| {
            ConfigError::Write(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("user config directory".to_string()))?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}
