//! In-memory forecast cache with per-coordinate single-flight refresh.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::NwsClient;
use crate::error::ForecastError;
use crate::types::{ClassifiedForecast, Coordinate, CoordinateKey, ForecastKind};

type Outcome = Result<Arc<ClassifiedForecast>, ForecastError>;

/// A fetched forecast and when it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub forecast: Arc<ClassifiedForecast>,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Stale once strictly more than `ttl` has elapsed since the fetch.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.fetched_at).to_std() {
            Ok(age) => age > self.ttl,
            // Clock moved backwards.
            Err(_) => false,
        }
    }
}

enum Slot {
    Ready(CacheEntry),
    InFlight {
        id: u64,
        rx: watch::Receiver<Option<Outcome>>,
    },
}

enum Action<'a> {
    Hit(Arc<ClassifiedForecast>),
    Wait(watch::Receiver<Option<Outcome>>),
    Lead(Leader<'a>),
}

/// Memoizes classified forecasts per coordinate.
///
/// Concurrent requests for a missing or stale coordinate share one upstream
/// round trip and all receive its outcome. The slot map lock is never held
/// across an await.
pub struct ForecastCache {
    client: NwsClient,
    kind: ForecastKind,
    slots: Mutex<HashMap<CoordinateKey, Slot>>,
    next_id: AtomicU64,
}

impl ForecastCache {
    pub fn new(client: NwsClient, kind: ForecastKind) -> Self {
        Self {
            client,
            kind,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Return the cached forecast for `coordinate`, fetching it if missing or
    /// older than `ttl`.
    ///
    /// A cancelled fetch stores nothing and every caller waiting on it gets
    /// [`ForecastError::Cancelled`].
    pub async fn get_or_fetch(
        &self,
        coordinate: Coordinate,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Outcome {
        match self.begin(coordinate) {
            Action::Hit(forecast) => {
                tracing::debug!("Forecast cache hit for {}", coordinate);
                Ok(forecast)
            }
            Action::Wait(rx) => {
                tracing::debug!("Joining in-flight forecast fetch for {}", coordinate);
                wait_for_outcome(rx, coordinate, cancel).await
            }
            Action::Lead(leader) => {
                tracing::info!("Fetching forecast for {}", coordinate);
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(cancelled(coordinate)),
                    res = self.client.forecast(coordinate, self.kind) => res.map(Arc::new),
                };
                if let Err(e) = &outcome {
                    tracing::warn!("Forecast fetch for {} failed: {}", coordinate, e);
                }
                leader.finish(outcome.clone(), ttl);
                outcome
            }
        }
    }

    fn begin(&self, coordinate: Coordinate) -> Action<'_> {
        let key = coordinate.key();
        let mut slots = self.slots.lock();

        match slots.get(&key) {
            Some(Slot::Ready(entry)) if !entry.is_stale_at(Utc::now()) => {
                return Action::Hit(entry.forecast.clone());
            }
            Some(Slot::InFlight { rx, .. }) => return Action::Wait(rx.clone()),
            Some(Slot::Ready(_)) => {
                tracing::debug!("Discarding stale forecast for {}", coordinate);
            }
            None => {}
        }

        let (tx, rx) = watch::channel(None);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        slots.insert(key, Slot::InFlight { id, rx });

        Action::Lead(Leader {
            cache: self,
            key,
            id,
            tx: Some(tx),
        })
    }

    /// Current entry for `coordinate`, stale or not, without fetching.
    pub fn peek(&self, coordinate: Coordinate) -> Option<CacheEntry> {
        match self.slots.lock().get(&coordinate.key()) {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Drop whatever is held for `coordinate`. An in-flight fetch still
    /// completes for its waiters but its result is not stored.
    pub fn invalidate(&self, coordinate: Coordinate) {
        self.slots.lock().remove(&coordinate.key());
    }

    /// Number of coordinates with a stored or in-flight forecast.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns the in-flight slot for one fetch. Dropping it before `finish`
/// clears the slot and closes the channel, which releases waiters.
struct Leader<'a> {
    cache: &'a ForecastCache,
    key: CoordinateKey,
    id: u64,
    tx: Option<watch::Sender<Option<Outcome>>>,
}

impl Leader<'_> {
    fn finish(mut self, outcome: Outcome, ttl: Duration) {
        {
            let mut slots = self.cache.slots.lock();
            if self.owns_slot(&slots) {
                match &outcome {
                    Ok(forecast) => {
                        slots.insert(
                            self.key,
                            Slot::Ready(CacheEntry {
                                forecast: forecast.clone(),
                                fetched_at: Utc::now(),
                                ttl,
                            }),
                        );
                    }
                    Err(_) => {
                        slots.remove(&self.key);
                    }
                }
            }
        }
        // Publish after the map is updated so that woken waiters and new
        // callers agree on the stored value.
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome));
        }
    }

    fn owns_slot(&self, slots: &HashMap<CoordinateKey, Slot>) -> bool {
        matches!(slots.get(&self.key), Some(Slot::InFlight { id, .. }) if *id == self.id)
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let mut slots = self.cache.slots.lock();
            if self.owns_slot(&slots) {
                slots.remove(&self.key);
            }
            tracing::debug!("Forecast fetch abandoned before completion");
        }
    }
}

async fn wait_for_outcome(
    mut rx: watch::Receiver<Option<Outcome>>,
    coordinate: Coordinate,
    cancel: &CancellationToken,
) -> Outcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(coordinate)),
        res = rx.wait_for(Option::is_some) => match res {
            Ok(value) => match &*value {
                Some(outcome) => outcome.clone(),
                None => Err(cancelled(coordinate)),
            },
            // Leader went away without publishing.
            Err(_) => Err(cancelled(coordinate)),
        },
    }
}

fn cancelled(coordinate: Coordinate) -> ForecastError {
    ForecastError::Cancelled {
        coordinate: coordinate.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COORD: Coordinate = Coordinate {
        latitude: 39.7456,
        longitude: -97.0892,
    };

    async fn mount_forecast(server: &MockServer, delay: Duration, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/points/39.7456,-97.0892"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(delay)
                    .set_body_json(serde_json::json!({
                        "properties": {
                            "gridX": 32,
                            "gridY": 81,
                            "forecast": format!("{}/gridpoints/TOP/32,81/forecast", server.uri()),
                            "forecastHourly": format!("{}/gridpoints/TOP/32,81/forecast/hourly", server.uri())
                        }
                    })),
            )
            .expect(expected_calls)
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/gridpoints/TOP/32,81/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "properties": {
                    "periods": [
                        {"name": "Today", "startTime": "2024-06-01T06:00:00-05:00",
                         "endTime": "2024-06-01T18:00:00-05:00", "shortForecast": "Sunny"}
                    ]
                }
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn cache_for(server: &MockServer) -> ForecastCache {
        ForecastCache::new(
            NwsClient::with_host(&server.uri()).unwrap(),
            ForecastKind::Periods,
        )
    }

    #[test]
    fn test_entry_staleness() {
        let fetched_at = Utc::now();
        let entry = CacheEntry {
            forecast: Arc::new(ClassifiedForecast {
                coordinate: COORD,
                grid: crate::types::GridCell {
                    x: 0,
                    y: 0,
                    forecast_url: String::new(),
                    hourly_forecast_url: String::new(),
                },
                periods: vec![],
            }),
            fetched_at,
            ttl: Duration::from_secs(60),
        };

        assert!(!entry.is_stale_at(fetched_at));
        assert!(!entry.is_stale_at(fetched_at + chrono::Duration::seconds(60)));
        assert!(entry.is_stale_at(fetched_at + chrono::Duration::seconds(61)));
        assert!(!entry.is_stale_at(fetched_at - chrono::Duration::seconds(5)));
    }

    #[tokio::test]
    async fn test_hit_avoids_network() {
        let mock_server = MockServer::start().await;
        mount_forecast(&mock_server, Duration::ZERO, 1).await;

        let cache = cache_for(&mock_server);
        let token = CancellationToken::new();
        let ttl = Duration::from_secs(3600);

        let first = cache.get_or_fetch(COORD, ttl, &token).await.unwrap();
        let second = cache.get_or_fetch(COORD, ttl, &token).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.grid.x, 32);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_is_replaced() {
        let mock_server = MockServer::start().await;
        mount_forecast(&mock_server, Duration::ZERO, 2).await;

        let cache = cache_for(&mock_server);
        let token = CancellationToken::new();

        let first = cache.get_or_fetch(COORD, Duration::ZERO, &token).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.get_or_fetch(COORD, Duration::ZERO, &token).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let mock_server = MockServer::start().await;
        mount_forecast(&mock_server, Duration::from_millis(200), 1).await;

        let cache = Arc::new(cache_for(&mock_server));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let token = CancellationToken::new();
                cache
                    .get_or_fetch(COORD, Duration::from_secs(3600), &token)
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        for r in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], r));
        }
    }

    #[tokio::test]
    async fn test_concurrent_refresh_of_expired_entry() {
        let mock_server = MockServer::start().await;
        // One fill plus exactly one refresh.
        mount_forecast(&mock_server, Duration::from_millis(200), 2).await;

        let cache = Arc::new(cache_for(&mock_server));
        let token = CancellationToken::new();
        let expired = cache
            .get_or_fetch(COORD, Duration::from_millis(50), &token)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.peek(COORD).unwrap().is_stale_at(Utc::now()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let token = CancellationToken::new();
                cache
                    .get_or_fetch(COORD, Duration::from_secs(3600), &token)
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        for r in &results {
            assert!(Arc::ptr_eq(&results[0], r));
            assert!(!Arc::ptr_eq(&expired, r));
        }
        let entry = cache.peek(COORD).unwrap();
        assert!(Arc::ptr_eq(&entry.forecast, &results[0]));
        assert_eq!(entry.ttl, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/points/39.7456,-97.0892"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let cache = Arc::new(cache_for(&mock_server));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let token = CancellationToken::new();
                cache
                    .get_or_fetch(COORD, Duration::from_secs(3600), &token)
                    .await
            }));
        }

        let mut errors = Vec::new();
        for handle in handles {
            errors.push(handle.await.unwrap().unwrap_err());
        }

        assert!(matches!(errors[0], ForecastError::Upstream { status: Some(500), .. }));
        assert!(errors.iter().all(|e| *e == errors[0]));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stores_nothing_and_releases_waiters() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/points/39.7456,-97.0892"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let cache = Arc::new(cache_for(&mock_server));
        let leader_token = CancellationToken::new();

        let leader = {
            let cache = cache.clone();
            let token = leader_token.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch(COORD, Duration::from_secs(3600), &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let token = CancellationToken::new();
                cache
                    .get_or_fetch(COORD, Duration::from_secs(3600), &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        leader_token.cancel();

        let leader_err = leader.await.unwrap().unwrap_err();
        let waiter_err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(leader_err, ForecastError::Cancelled { .. }));
        assert!(matches!(waiter_err, ForecastError::Cancelled { .. }));
        assert!(cache.peek(COORD).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/points/39.7456,-97.0892"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let cache = Arc::new(cache_for(&mock_server));

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let token = CancellationToken::new();
                tokio::time::timeout(
                    Duration::from_millis(100),
                    cache.get_or_fetch(COORD, Duration::from_secs(3600), &token),
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let token = CancellationToken::new();
        let waited = cache
            .get_or_fetch(COORD, Duration::from_secs(3600), &token)
            .await;

        assert!(leader.await.unwrap().is_err(), "leader should time out");
        assert!(matches!(waited, Err(ForecastError::Cancelled { .. })));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_cancel_leaves_fetch_running() {
        let mock_server = MockServer::start().await;
        mount_forecast(&mock_server, Duration::from_millis(200), 1).await;

        let cache = Arc::new(cache_for(&mock_server));
        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let token = CancellationToken::new();
                cache
                    .get_or_fetch(COORD, Duration::from_secs(3600), &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter_token = CancellationToken::new();
        waiter_token.cancel();
        let waited = cache
            .get_or_fetch(COORD, Duration::from_secs(3600), &waiter_token)
            .await;
        assert!(matches!(waited, Err(ForecastError::Cancelled { .. })));

        assert!(leader.await.unwrap().is_ok());
        assert!(cache.peek(COORD).is_some());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let mock_server = MockServer::start().await;
        mount_forecast(&mock_server, Duration::ZERO, 2).await;

        let cache = cache_for(&mock_server);
        let token = CancellationToken::new();
        let ttl = Duration::from_secs(3600);

        cache.get_or_fetch(COORD, ttl, &token).await.unwrap();
        cache.invalidate(COORD);
        assert!(cache.peek(COORD).is_none());
        cache.get_or_fetch(COORD, ttl, &token).await.unwrap();
        assert!(cache.peek(COORD).is_some());
    }
}
