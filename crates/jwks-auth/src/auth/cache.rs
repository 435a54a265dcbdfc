//! TTL key cache with single-flight refresh.
//!
//! The cache holds at most one [`CachedSnapshot`]. A snapshot younger than
//! its TTL is served from memory; otherwise the caller triggers a refresh.
//! Concurrent callers share one in-flight refresh, held as a
//! [`futures::future::Shared`] future: every waiter polls the same fetch,
//! so a waiter that gives up never cancels it for the others.
//!
//! Nothing runs in the background. Refresh is driven entirely by callers.

use crate::auth::jwks::KeyFetcher;
use crate::auth::keys::KeySet;
use crate::errors::KeyFetchError;
use crate::observability::metrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default bound on how long one caller waits for a refresh.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do with an expired snapshot when a refresh fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleKeyPolicy {
    /// Return the fetch error. Expired keys are never used.
    #[default]
    FailClosed,

    /// Keep serving the expired key set and log a warning.
    ServeStale,
}

/// Key set from one successful fetch.
#[derive(Debug)]
pub struct CachedSnapshot {
    key_set: Arc<KeySet>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedSnapshot {
    pub fn key_set(&self) -> Arc<KeySet> {
        Arc::clone(&self.key_set)
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }
}

type RefreshOutcome = Result<Arc<KeySet>, KeyFetchError>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Cache of the JWKS key set.
///
/// Thread-safe; share it behind an `Arc`. TTL, fetch timeout and stale
/// policy are fixed at construction.
pub struct KeyCache {
    fetcher: Arc<dyn KeyFetcher>,

    /// Current snapshot, `None` until the first successful fetch.
    snapshot: Arc<RwLock<Option<Arc<CachedSnapshot>>>>,

    /// Refresh shared by concurrent callers. A completed future left here
    /// is replaced by the next refresh.
    in_flight: Mutex<Option<RefreshFuture>>,

    cache_ttl: Duration,
    fetch_timeout: Duration,
    stale_policy: StaleKeyPolicy,
}

impl KeyCache {
    /// Create an empty cache. No fetch happens until the first [`get`](Self::get).
    pub fn new(fetcher: Arc<dyn KeyFetcher>, cache_ttl: Duration) -> Self {
        Self {
            fetcher,
            snapshot: Arc::new(RwLock::new(None)),
            in_flight: Mutex::new(None),
            cache_ttl,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            stale_policy: StaleKeyPolicy::default(),
        }
    }

    /// Bound how long each caller waits for a refresh.
    #[must_use]
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    #[must_use]
    pub fn with_stale_policy(mut self, stale_policy: StaleKeyPolicy) -> Self {
        self.stale_policy = stale_policy;
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn stale_policy(&self) -> StaleKeyPolicy {
        self.stale_policy
    }

    /// Get the current key set, refreshing it if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns the refresh error (shared by every caller waiting on the same
    /// refresh), or `KeyFetchError::Timeout` if this caller's wait exceeded
    /// the fetch timeout. With [`StaleKeyPolicy::ServeStale`] an expired
    /// snapshot is returned instead of the error.
    #[instrument(skip_all, name = "jwks_auth.cache.get")]
    pub async fn get(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        if let Some(snapshot) = self.snapshot().await {
            if snapshot.is_fresh() {
                tracing::trace!(target: "jwks_auth.cache", "Key set cache hit");
                return Ok(snapshot.key_set());
            }
        }

        self.refresh(false).await
    }

    /// Refresh regardless of freshness, joining a refresh already in flight.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    #[instrument(skip_all, name = "jwks_auth.cache.force_refresh")]
    pub async fn force_refresh(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        self.refresh(true).await
    }

    /// Age of the current snapshot, `None` if nothing was fetched yet.
    pub async fn snapshot_age(&self) -> Option<Duration> {
        self.snapshot().await.map(|snapshot| snapshot.age())
    }

    /// The current snapshot, fresh or not.
    pub async fn snapshot(&self) -> Option<Arc<CachedSnapshot>> {
        self.snapshot.read().await.clone()
    }

    async fn refresh(&self, force: bool) -> Result<Arc<KeySet>, KeyFetchError> {
        let refresh = {
            let mut in_flight = self.in_flight.lock().await;

            // Another caller may have finished a refresh while we waited
            if !force {
                if let Some(snapshot) = self.snapshot().await {
                    if snapshot.is_fresh() {
                        return Ok(snapshot.key_set());
                    }
                }
            }

            match in_flight.as_ref() {
                Some(pending) if pending.peek().is_none() => {
                    tracing::debug!(target: "jwks_auth.cache", "Joining in-flight JWKS refresh");
                    pending.clone()
                }
                _ => {
                    let refresh = self.start_refresh();
                    *in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        let outcome = match tokio::time::timeout(self.fetch_timeout, refresh).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    target: "jwks_auth.cache",
                    timeout_ms = self.fetch_timeout.as_millis(),
                    "Gave up waiting for JWKS refresh"
                );
                Err(KeyFetchError::Timeout)
            }
        };

        match outcome {
            Ok(key_set) => Ok(key_set),
            Err(e) => self.fallback(e).await,
        }
    }

    /// Build the shared refresh future. It owns everything it touches so it
    /// can outlive the caller that started it.
    fn start_refresh(&self) -> RefreshFuture {
        let fetcher = Arc::clone(&self.fetcher);
        let snapshot = Arc::clone(&self.snapshot);
        let ttl = self.cache_ttl;

        async move {
            tracing::debug!(target: "jwks_auth.cache", "Refreshing JWKS");
            let start = Instant::now();
            let result = fetcher.fetch().await;
            let duration = start.elapsed();

            match result {
                Ok(key_set) => {
                    let key_count = key_set.len();
                    let key_set = Arc::new(key_set);
                    *snapshot.write().await = Some(Arc::new(CachedSnapshot {
                        key_set: Arc::clone(&key_set),
                        fetched_at: Instant::now(),
                        ttl,
                    }));

                    metrics::record_jwks_refresh("success", duration);
                    metrics::set_jwks_keys(key_count);
                    tracing::info!(
                        target: "jwks_auth.cache",
                        key_count,
                        duration_ms = duration.as_millis(),
                        "JWKS cache refreshed"
                    );
                    Ok(key_set)
                }
                Err(e) => {
                    metrics::record_jwks_refresh("error", duration);
                    tracing::warn!(
                        target: "jwks_auth.cache",
                        error = %e,
                        error_type = e.error_type(),
                        "JWKS refresh failed"
                    );
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn fallback(&self, error: KeyFetchError) -> Result<Arc<KeySet>, KeyFetchError> {
        if self.stale_policy == StaleKeyPolicy::ServeStale {
            if let Some(snapshot) = self.snapshot().await {
                metrics::record_stale_serve();
                tracing::warn!(
                    target: "jwks_auth.cache",
                    error = %error,
                    age_secs = snapshot.age().as_secs(),
                    "Serving stale JWKS after failed refresh"
                );
                return Ok(snapshot.key_set());
            }
        }
        Err(error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::keys::{KeyMaterial, VerificationKey};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fetcher that counts calls and can be told to fail or stall.
    struct MockFetcher {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl MockFetcher {
        fn new() -> Arc<Self> {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyFetcher for MockFetcher {
        async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(KeyFetchError::Status(503));
            }
            // kid encodes which fetch produced the set
            Ok(KeySet::from_keys([VerificationKey::new(
                format!("fetch-{call}"),
                None,
                KeyMaterial::Ed25519 { x: vec![7; 32] },
            )]))
        }
    }

    fn cache(fetcher: &Arc<MockFetcher>, ttl: Duration) -> KeyCache {
        KeyCache::new(Arc::clone(fetcher) as Arc<dyn KeyFetcher>, ttl)
    }

    #[tokio::test]
    async fn test_first_fetch_is_lazy() {
        let fetcher = MockFetcher::new();
        let cache = cache(&fetcher, Duration::from_secs(60));

        assert_eq!(fetcher.calls(), 0);
        assert!(cache.snapshot_age().await.is_none());

        cache.get().await.unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert!(cache.snapshot_age().await.unwrap() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_fresh_snapshot_served_from_memory() {
        let fetcher = MockFetcher::new();
        let cache = cache(&fetcher, Duration::from_secs(3600));

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_expired_snapshot_triggers_refresh() {
        let fetcher = MockFetcher::new();
        let cache = cache(&fetcher, Duration::from_millis(50));

        let first = cache.get().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let second = cache.get().await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(first.get("fetch-1").is_some());
        assert!(second.get("fetch-2").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_fetch() {
        let fetcher = MockFetcher::with_delay(Duration::from_millis(50));
        let cache = cache(&fetcher, Duration::from_secs(60));

        let results = futures::future::join_all((0..16).map(|_| cache.get())).await;

        assert_eq!(fetcher.calls(), 1);
        for result in results {
            assert!(result.unwrap().get("fetch-1").is_some());
        }
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_retried() {
        let fetcher = MockFetcher::with_delay(Duration::from_millis(20));
        fetcher.set_failing(true);
        let cache = cache(&fetcher, Duration::from_secs(60));

        let (a, b) = tokio::join!(cache.get(), cache.get());
        assert_eq!(a.unwrap_err(), KeyFetchError::Status(503));
        assert_eq!(b.unwrap_err(), KeyFetchError::Status(503));
        assert_eq!(fetcher.calls(), 1);
        assert!(cache.snapshot_age().await.is_none());

        // No backoff: the next caller fetches again
        fetcher.set_failing(false);
        assert!(cache.get().await.is_ok());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_fail_closed_does_not_serve_expired_keys() {
        let fetcher = MockFetcher::new();
        let cache = cache(&fetcher, Duration::from_millis(30));
        assert_eq!(cache.stale_policy(), StaleKeyPolicy::FailClosed);

        cache.get().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        fetcher.set_failing(true);

        assert_eq!(cache.get().await.unwrap_err(), KeyFetchError::Status(503));
    }

    #[tokio::test]
    async fn test_serve_stale_returns_expired_keys_on_failure() {
        let fetcher = MockFetcher::new();
        let cache = cache(&fetcher, Duration::from_millis(30))
            .with_stale_policy(StaleKeyPolicy::ServeStale);

        cache.get().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        fetcher.set_failing(true);

        let stale = cache.get().await.unwrap();
        assert!(stale.get("fetch-1").is_some());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_serve_stale_without_snapshot_still_errors() {
        let fetcher = MockFetcher::new();
        fetcher.set_failing(true);
        let cache = cache(&fetcher, Duration::from_secs(60))
            .with_stale_policy(StaleKeyPolicy::ServeStale);

        assert!(cache.get().await.is_err());
    }

    #[tokio::test]
    async fn test_timed_out_waiter_does_not_cancel_shared_fetch() {
        let fetcher = MockFetcher::with_delay(Duration::from_millis(300));
        let cache = Arc::new(
            cache(&fetcher, Duration::from_secs(60)).with_fetch_timeout(Duration::from_millis(200)),
        );

        let early = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get().await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        let late = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get().await })
        };

        assert_eq!(early.await.unwrap().unwrap_err(), KeyFetchError::Timeout);
        assert!(late.await.unwrap().unwrap().get("fetch-1").is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_shared_fetch() {
        let fetcher = MockFetcher::with_delay(Duration::from_millis(100));
        let cache = Arc::new(cache(&fetcher, Duration::from_secs(60)));

        let abandoned = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let joined = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        abandoned.abort();

        assert!(joined.await.unwrap().unwrap().get("fetch-1").is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_freshness() {
        let fetcher = MockFetcher::new();
        let cache = cache(&fetcher, Duration::from_secs(3600));

        cache.get().await.unwrap();
        let refreshed = cache.force_refresh().await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(refreshed.get("fetch-2").is_some());
        // Snapshot was swapped
        assert!(cache.get().await.unwrap().get("fetch-2").is_some());
    }
}
