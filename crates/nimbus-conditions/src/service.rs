use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use nimbus_nws::{
    ClassifiedForecast, Coordinate, ForecastCache, ForecastError, ForecastKind, NwsClient,
    DEFAULT_USER_AGENT, NWS_API_HOST,
};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::error::ConditionError;
use crate::registry::OperationKind;
use crate::source::ForecastSource;

/// Settings for a [`WeatherService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub coordinate: Coordinate,
    pub host: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub kind: ForecastKind,
    /// How long a fetched forecast is served before it is refreshed.
    pub refresh: Duration,
}

impl ServiceConfig {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            host: NWS_API_HOST.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            kind: ForecastKind::Periods,
            refresh: Duration::from_secs(60 * 60),
        }
    }
}

/// Forecast provider for one configured location.
///
/// The HTTP client and cache are built on first use and reused afterwards.
pub struct WeatherService {
    config: ServiceConfig,
    cache: OnceCell<ForecastCache>,
}

impl WeatherService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            cache: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn cache(&self) -> Result<&ForecastCache, ForecastError> {
        self.cache
            .get_or_try_init(|| async {
                tracing::debug!("Creating forecast client for {}", self.config.host);
                let client = NwsClient::with_options(
                    &self.config.host,
                    &self.config.user_agent,
                    self.config.timeout,
                )?;
                Ok::<_, ForecastError>(ForecastCache::new(client, self.config.kind))
            })
            .await
    }

    /// Current forecast for the configured location, cached for `refresh`.
    pub async fn forecast(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ClassifiedForecast>, ForecastError> {
        self.cache()
            .await?
            .get_or_fetch(self.config.coordinate, self.config.refresh, cancel)
            .await
    }

    /// Run a service operation, writing its output to `out`.
    pub async fn run(
        &self,
        operation: OperationKind,
        out: &mut dyn Write,
        cancel: &CancellationToken,
    ) -> Result<(), ConditionError> {
        match operation {
            OperationKind::Forecast => {
                let forecast = self.forecast(cancel).await?;
                serde_json::to_writer_pretty(&mut *out, forecast.as_ref())?;
                writeln!(out)?;
                out.flush()?;
            }
        }
        Ok(())
    }
}

impl ForecastSource for WeatherService {
    async fn forecasts(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ClassifiedForecast>, ForecastError> {
        self.forecast(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServiceConfig::new(Coordinate::new(1.0, 2.0));
        assert_eq!(config.host, NWS_API_HOST);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.refresh, Duration::from_secs(3600));
        assert_eq!(config.kind, ForecastKind::Periods);
    }

    #[tokio::test]
    async fn test_invalid_host_reported_on_use() {
        let mut config = ServiceConfig::new(Coordinate::new(1.0, 2.0));
        config.host = "not a url".into();
        let service = WeatherService::new(config);

        let err = service
            .forecast(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidUrl { .. }));
    }
}
