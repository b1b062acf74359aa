use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classify::{classify, CloudCoverage};

/// Geographic location in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Hashable identity used to key cached forecasts.
    pub fn key(&self) -> CoordinateKey {
        CoordinateKey(self.latitude.to_bits(), self.longitude.to_bits())
    }

    /// Path segment expected by the points endpoint, e.g. `39.7456,-97.0892`.
    pub fn points_segment(&self) -> String {
        format!("{:.4},{:.4}", self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey(u64, u64);

/// Provider grid cell a coordinate resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
    pub forecast_url: String,
    pub hourly_forecast_url: String,
}

/// Which of the grid cell's forecast resources to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ForecastKind {
    /// Day/night periods, typically 12 hours each.
    #[default]
    Periods,
    Hourly,
}

impl GridCell {
    pub fn url_for(&self, kind: ForecastKind) -> &str {
        match kind {
            ForecastKind::Periods => &self.forecast_url,
            ForecastKind::Hourly => &self.hourly_forecast_url,
        }
    }
}

/// A single forecast interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPeriod {
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub name: String,
    pub short_forecast: String,
    pub cloud_coverage: CloudCoverage,
}

impl ForecastPeriod {
    /// Build a period, deriving its cloud coverage from `short_forecast`.
    pub fn new(
        start_time: DateTime<FixedOffset>,
        end_time: DateTime<FixedOffset>,
        name: impl Into<String>,
        short_forecast: impl Into<String>,
    ) -> Self {
        let short_forecast = short_forecast.into();
        Self {
            start_time,
            end_time,
            name: name.into(),
            cloud_coverage: classify(&short_forecast),
            short_forecast,
        }
    }

    /// True when `when` lies strictly inside the period; both boundary
    /// instants are excluded.
    pub fn covers<Tz: TimeZone>(&self, when: &DateTime<Tz>) -> bool {
        let when = when.with_timezone(&Utc);
        self.start_time.with_timezone(&Utc) < when && self.end_time.with_timezone(&Utc) > when
    }
}

/// Forecast for a coordinate with every period classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedForecast {
    pub coordinate: Coordinate,
    pub grid: GridCell,
    /// In provider document order.
    pub periods: Vec<ForecastPeriod>,
}

impl ClassifiedForecast {
    /// First period that strictly contains `when`.
    pub fn period_for<Tz: TimeZone>(&self, when: &DateTime<Tz>) -> Option<&ForecastPeriod> {
        self.periods.iter().find(|p| p.covers(when))
    }

    /// Whether each period starts exactly where the previous one ended.
    ///
    /// The provider promises this but nothing here relies on it.
    pub fn is_contiguous(&self) -> bool {
        self.periods
            .windows(2)
            .all(|w| w[1].start_time == w[0].end_time)
    }
}
