use std::future::Future;
use std::sync::Arc;

use nimbus_nws::{ClassifiedForecast, ForecastError};
use tokio_util::sync::CancellationToken;

/// Anything that can hand out the current classified forecast for a fixed
/// location.
pub trait ForecastSource: Send + Sync {
    fn forecasts(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Arc<ClassifiedForecast>, ForecastError>> + Send;
}

impl<S: ForecastSource> ForecastSource for Arc<S> {
    fn forecasts(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Arc<ClassifiedForecast>, ForecastError>> + Send {
        (**self).forecasts(cancel)
    }
}
