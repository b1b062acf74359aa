//! Cloud coverage taxonomy and the short-forecast classifier.
//!
//! Categories follow the opaque sky cover terms at
//! <https://www.weather.gov/bgm/forecast_terms>.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque cloud coverage, ordered from clear to cloudy.
///
/// `Rain` and `Snow` sort after `Cloudy`, so an "at least cloudy" comparison
/// also matches a rain or snow forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CloudCoverage {
    #[default]
    Unknown,
    /// 0 to 1/8 opaque cloud coverage
    ClearOrSunny,
    /// 1/8 to 3/8
    MostlyClearOrSunny,
    /// 3/8 to 5/8
    PartlyCloudyOrSunny,
    /// 5/8 to 7/8
    MostlyCloudy,
    /// 8/8
    Cloudy,
    Rain,
    Snow,
}

/// Phrases accepted verbatim as condition arguments.
pub const CANONICAL_PHRASES: &[&str] = &[
    "Clear",
    "Sunny",
    "Mostly Clear",
    "Mostly Sunny",
    "Partly Cloudy",
    "Partly Sunny",
    "Mostly Cloudy",
    "Cloudy",
];

impl CloudCoverage {
    /// Canonical label; `classify(c.label()) == c` for every category.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::ClearOrSunny => "Clear",
            Self::MostlyClearOrSunny => "Mostly Clear",
            Self::PartlyCloudyOrSunny => "Partly Cloudy",
            Self::MostlyCloudy => "Mostly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }
}

impl fmt::Display for CloudCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a provider short forecast.
///
/// Exact, case-sensitive phrases are matched first. Anything else falls back
/// to a case-insensitive substring check for "rain" and then "snow", so
/// "Rain And Snow" is `Rain`.
pub fn classify(short_forecast: &str) -> CloudCoverage {
    match short_forecast {
        "Clear" | "Sunny" => CloudCoverage::ClearOrSunny,
        "Mostly Clear" | "Mostly Sunny" => CloudCoverage::MostlyClearOrSunny,
        "Partly Cloudy" | "Partly Sunny" => CloudCoverage::PartlyCloudyOrSunny,
        "Mostly Cloudy" => CloudCoverage::MostlyCloudy,
        "Cloudy" => CloudCoverage::Cloudy,
        other => estimate(other),
    }
}

fn estimate(short_forecast: &str) -> CloudCoverage {
    let lower = short_forecast.to_lowercase();
    if lower.contains("rain") {
        CloudCoverage::Rain
    } else if lower.contains("snow") {
        CloudCoverage::Snow
    } else {
        CloudCoverage::Unknown
    }
}
