//! Cloud cover conditions over a weather.gov forecast.
//!
//! [`WeatherService`] owns the forecast cache for one location and implements
//! [`ForecastSource`]; [`ConditionEvaluator`] answers comparisons against any
//! source. Conditions and operations are looked up by name through
//! [`Registry`].

pub mod error;
pub mod evaluator;
pub mod registry;
pub mod service;
pub mod source;

pub use error::ConditionError;
pub use evaluator::{Comparison, ConditionArgs, ConditionEvaluator, Verdict};
pub use registry::{conditions, operations, ConditionKind, OperationKind, Registry};
pub use service::{ServiceConfig, WeatherService};
pub use source::ForecastSource;
