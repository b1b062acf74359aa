//! Cloud cover comparisons at a point in time.

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use nimbus_nws::{classify, CloudCoverage, CANONICAL_PHRASES};
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::ConditionError;
use crate::registry::ConditionKind;
use crate::source::ForecastSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Equal,
    AtMost,
    AtLeast,
}

impl Comparison {
    pub fn holds(self, forecast: CloudCoverage, wanted: CloudCoverage) -> bool {
        match self {
            Self::Equal => forecast == wanted,
            Self::AtMost => forecast <= wanted,
            Self::AtLeast => forecast >= wanted,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::AtMost => "<=",
            Self::AtLeast => ">=",
        }
    }
}

/// Caller input to a condition.
#[derive(Debug, Clone, Default)]
pub struct ConditionArgs {
    /// Instant to evaluate at; `None` means now.
    pub due: Option<DateTime<FixedOffset>>,
    pub args: Vec<String>,
}

impl ConditionArgs {
    pub fn new<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            due: None,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn at(mut self, due: DateTime<FixedOffset>) -> Self {
        self.due = Some(due);
        self
    }
}

/// Outcome of one comparison, with the categories that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub comparison: Comparison,
    pub forecast: CloudCoverage,
    pub wanted: CloudCoverage,
    pub holds: bool,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "forecast {} {} wanted {}",
            self.forecast,
            self.comparison.symbol(),
            self.wanted
        )
    }
}

/// Answers cloud cover questions against a [`ForecastSource`].
///
/// Instants without an explicit time are taken as now in `tz`, the time zone
/// of the forecast location.
pub struct ConditionEvaluator<S> {
    source: S,
    tz: Tz,
}

impl<S: ForecastSource> ConditionEvaluator<S> {
    pub fn new(source: S, tz: Tz) -> Self {
        Self { source, tz }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    /// Evaluate a registered condition.
    pub async fn evaluate(
        &self,
        kind: ConditionKind,
        args: &ConditionArgs,
        cancel: &CancellationToken,
    ) -> Result<Verdict, ConditionError> {
        match kind {
            ConditionKind::Compare(comparison) => self.compare(comparison, args, cancel).await,
            ConditionKind::Preset { comparison, phrase } => {
                let args = ConditionArgs {
                    due: args.due,
                    args: vec![phrase.to_string()],
                };
                self.compare(comparison, &args, cancel).await
            }
        }
    }

    /// Cloud cover at `args.due` is exactly the category of the argument.
    pub async fn equal(
        &self,
        args: &ConditionArgs,
        cancel: &CancellationToken,
    ) -> Result<bool, ConditionError> {
        Ok(self.compare(Comparison::Equal, args, cancel).await?.holds)
    }

    pub async fn at_most(
        &self,
        args: &ConditionArgs,
        cancel: &CancellationToken,
    ) -> Result<bool, ConditionError> {
        Ok(self.compare(Comparison::AtMost, args, cancel).await?.holds)
    }

    pub async fn at_least(
        &self,
        args: &ConditionArgs,
        cancel: &CancellationToken,
    ) -> Result<bool, ConditionError> {
        Ok(self.compare(Comparison::AtLeast, args, cancel).await?.holds)
    }

    pub async fn mostly_sunny_or_clearer(
        &self,
        due: Option<DateTime<FixedOffset>>,
        cancel: &CancellationToken,
    ) -> Result<bool, ConditionError> {
        self.at_most(&preset(due, "Mostly Sunny"), cancel).await
    }

    pub async fn mostly_cloudy_or_more(
        &self,
        due: Option<DateTime<FixedOffset>>,
        cancel: &CancellationToken,
    ) -> Result<bool, ConditionError> {
        self.at_least(&preset(due, "Mostly Cloudy"), cancel).await
    }

    pub async fn exactly_partly_cloudy(
        &self,
        due: Option<DateTime<FixedOffset>>,
        cancel: &CancellationToken,
    ) -> Result<bool, ConditionError> {
        self.equal(&preset(due, "Partly Sunny"), cancel).await
    }

    async fn compare(
        &self,
        comparison: Comparison,
        args: &ConditionArgs,
        cancel: &CancellationToken,
    ) -> Result<Verdict, ConditionError> {
        // Validated before the forecast is requested.
        let wanted = wanted_coverage(&args.args)?;

        let forecast = self.source.forecasts(cancel).await?;
        let when = match args.due {
            Some(due) => due,
            None => Utc::now().with_timezone(&self.tz).fixed_offset(),
        };

        let period = forecast
            .period_for(&when)
            .ok_or(ConditionError::NoForecastForTime { when })?;
        if !period.cloud_coverage.is_known() {
            return Err(ConditionError::UnknownCategoryInForecast {
                short_forecast: period.short_forecast.clone(),
            });
        }

        let verdict = Verdict {
            comparison,
            forecast: period.cloud_coverage,
            wanted,
            holds: comparison.holds(period.cloud_coverage, wanted),
        };
        tracing::debug!("{:?} at {} ({}): {}", comparison, when, period.name, verdict);
        Ok(verdict)
    }
}

fn preset(due: Option<DateTime<FixedOffset>>, phrase: &str) -> ConditionArgs {
    ConditionArgs {
        due,
        args: vec![phrase.to_string()],
    }
}

fn wanted_coverage(args: &[String]) -> Result<CloudCoverage, ConditionError> {
    let expected = || format!("one of {}", CANONICAL_PHRASES.join(", "));

    let [arg] = args else {
        return Err(ConditionError::InvalidArgument {
            argument: args.join(" "),
            expected: format!("exactly one argument, {}", expected()),
        });
    };

    match classify(arg) {
        CloudCoverage::Unknown => Err(ConditionError::InvalidArgument {
            argument: arg.clone(),
            expected: expected(),
        }),
        wanted => Ok(wanted),
    }
}
