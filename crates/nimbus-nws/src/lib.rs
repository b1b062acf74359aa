//! weather.gov forecast retrieval for cloud cover conditions.
//!
//! Resolves a coordinate to its forecast grid cell, fetches the forecast
//! periods, classifies each period's cloud coverage and caches the result.

pub mod cache;
pub mod classify;
pub mod client;
pub mod error;
pub mod types;

pub use cache::{CacheEntry, ForecastCache};
pub use classify::{classify, CloudCoverage, CANONICAL_PHRASES};
pub use client::{NwsClient, DEFAULT_USER_AGENT, NWS_API_HOST};
pub use error::ForecastError;
pub use types::*;
