//! weather.gov API client.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use crate::error::ForecastError;
use crate::types::{ClassifiedForecast, Coordinate, ForecastKind, ForecastPeriod, GridCell};

pub const NWS_API_HOST: &str = "https://api.weather.gov";
pub const DEFAULT_USER_AGENT: &str = "nimbus/0.1.0 (cloud cover conditions)";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct PointsResponse {
    properties: PointsProperties,
}

#[derive(Debug, Deserialize)]
struct PointsProperties {
    #[serde(rename = "gridX")]
    grid_x: i32,
    #[serde(rename = "gridY")]
    grid_y: i32,
    forecast: String,
    #[serde(rename = "forecastHourly", default)]
    forecast_hourly: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    periods: Vec<ApiPeriod>,
}

#[derive(Debug, Deserialize)]
struct ApiPeriod {
    #[serde(rename = "startTime")]
    start_time: chrono::DateTime<chrono::FixedOffset>,
    #[serde(rename = "endTime")]
    end_time: chrono::DateTime<chrono::FixedOffset>,
    #[serde(default)]
    name: String,
    #[serde(rename = "shortForecast")]
    short_forecast: String,
}

impl From<ApiPeriod> for ForecastPeriod {
    fn from(p: ApiPeriod) -> Self {
        ForecastPeriod::new(p.start_time, p.end_time, p.name, p.short_forecast)
    }
}

/// Client for the points and gridpoint forecast endpoints.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct NwsClient {
    client: reqwest::Client,
    host: String,
}

impl NwsClient {
    pub fn new() -> Result<Self, ForecastError> {
        Self::with_options(
            NWS_API_HOST,
            DEFAULT_USER_AGENT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Point the client at an alternate API host, e.g. a mock server.
    pub fn with_host(host: &str) -> Result<Self, ForecastError> {
        Self::with_options(
            host,
            DEFAULT_USER_AGENT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn with_options(
        host: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, ForecastError> {
        let host = host.trim_end_matches('/').to_string();
        Url::parse(&host).map_err(|e| ForecastError::InvalidUrl {
            url: host.clone(),
            message: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ForecastError::transport(&host, &e))?;

        Ok(Self { client, host })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Resolve a coordinate to its grid cell and forecast URLs.
    #[instrument(skip(self), level = "info")]
    pub async fn resolve(&self, coordinate: Coordinate) -> Result<GridCell, ForecastError> {
        let url = format!("{}/points/{}", self.host, coordinate.points_segment());
        let resp: PointsResponse = self.get_json(&url).await?;
        let props = resp.properties;

        tracing::debug!(
            "Resolved {} to grid ({}, {})",
            coordinate,
            props.grid_x,
            props.grid_y
        );

        Ok(GridCell {
            x: props.grid_x,
            y: props.grid_y,
            forecast_url: props.forecast,
            hourly_forecast_url: props.forecast_hourly,
        })
    }

    /// Fetch the periods of a forecast resource, in document order.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch(&self, forecast_url: &str) -> Result<Vec<ForecastPeriod>, ForecastError> {
        let url = Url::parse(forecast_url).map_err(|e| ForecastError::InvalidUrl {
            url: forecast_url.to_string(),
            message: e.to_string(),
        })?;

        let resp: ForecastResponse = self.get_json(url.as_str()).await?;
        let periods: Vec<ForecastPeriod> = resp
            .properties
            .periods
            .into_iter()
            .map(ForecastPeriod::from)
            .collect();

        tracing::debug!("Got {} forecast periods from {}", periods.len(), forecast_url);
        Ok(periods)
    }

    /// Resolve, fetch and classify the forecast for a coordinate.
    pub async fn forecast(
        &self,
        coordinate: Coordinate,
        kind: ForecastKind,
    ) -> Result<ClassifiedForecast, ForecastError> {
        let grid = self.resolve(coordinate).await?;
        let periods = self.fetch(grid.url_for(kind)).await?;
        Ok(ClassifiedForecast {
            coordinate,
            grid,
            periods,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ForecastError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/geo+json")
            .send()
            .await
            .map_err(|e| ForecastError::transport(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForecastError::status(url, status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ForecastError::transport(url, &e))?;

        serde_json::from_slice(&bytes).map_err(|e| ForecastError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
