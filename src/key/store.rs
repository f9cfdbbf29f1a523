use super::cache::KeySetCache;
use super::errors::{FetchError, KeyStoreError};
use super::fetcher::KeyFetcher;
use super::limits::{self, KeySetLimits};
use super::metrics::MetricsRecorder;
use super::{Key, KeySet};
use crate::constants::{DEFAULT_REFRESH_TIMEOUT, JWKS_URL_ENV};
use crate::error::ConfigError;
use crate::prelude::{debug, info, warn};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

type RefreshFuture = Shared<BoxFuture<'static, Result<usize, KeyStoreError>>>;

/// Lookup-with-refresh access to the keys published at a key set address.
///
/// Lookups are served from an in-memory [`KeySetCache`]. A miss triggers a refresh from the
/// configured [`KeyFetcher`]; concurrent misses share a single in-flight refresh and all
/// observe its outcome. A failed refresh leaves the cached keys untouched.
///
/// `KeyStore` is cheap to clone; clones share the cache and the in-flight refresh.
///
/// Refreshes run on a task spawned onto the current Tokio runtime, so lookups that miss
/// must be made from within one. A refresh keeps running, bounded by the refresh timeout,
/// even if every caller waiting on it is cancelled.
///
/// # Examples
///
/// ```no_run
/// use bearer_auth::key::KeyStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = KeyStore::new("https://issuer.example/.well-known/jwks.json")?;
///
/// let key = store.get_key("2024-rotation").await?;
/// println!("verifying with a {} key", key.key_type());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct KeyStore {
    inner: Arc<Inner>,
}

struct Inner {
    url: Url,
    // Atomically replaced, last-known-good key set.
    cache: KeySetCache,
    fetcher: Arc<dyn KeyFetcher>,
    refresh_timeout: Duration,
    limits: KeySetLimits,
    metrics: Option<Arc<dyn MetricsRecorder>>,

    // Refresh currently being awaited by one or more callers, if any.
    in_flight: Mutex<Option<RefreshFuture>>,
    // Incremented after every successful publish.
    generation: AtomicU64,
}

impl Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("url", &self.url.as_str())
            .field("cache", &self.cache)
            .field("fetcher", &"<KeyFetcher>")
            .field("refresh_timeout", &self.refresh_timeout)
            .field("limits", &self.limits)
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl Inner {
    // Detached, so a cancelled waiter cannot stall it. The slot only holds the join handle.
    fn start_refresh(inner: Arc<Self>) -> RefreshFuture {
        let url = inner.url.clone();
        let task = tokio::spawn(async move {
            let result = inner.fetch_and_publish().await;
            inner.in_flight.lock().await.take();
            result
        });

        task.map(move |joined| {
            joined.unwrap_or_else(|err| {
                warn!("Key set refresh task from {} failed: {}", url, err);
                Err(KeyStoreError::fetch(&url, FetchError::Other(Box::new(err))))
            })
        })
        .boxed()
        .shared()
    }

    async fn fetch_and_publish(&self) -> Result<usize, KeyStoreError> {
        debug!("Refreshing key set from {}", self.url);

        let fetched = tokio::time::timeout(self.refresh_timeout, self.fetcher.fetch(&self.url))
            .await
            .unwrap_or_else(|_elapsed| Err(KeyStoreError::fetch(&self.url, FetchError::Timeout)));

        let key_set = fetched
            .and_then(|key_set| {
                limits::check_key_count(key_set.len(), self.limits)
                    .map_err(KeyStoreError::parse)?;
                Ok(key_set)
            })
            .map_err(|err| {
                warn!("Key set refresh from {} failed: {}", self.url, err);
                self.record_error(&err);
                err
            })?;

        let key_count = key_set.len();
        self.cache.replace(key_set.with_source(self.url.clone()));
        self.generation.fetch_add(1, Ordering::AcqRel);

        info!("Key set refreshed from {}: {} keys", self.url, key_count);
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_refresh(key_count);
        }

        Ok(key_count)
    }

    fn record_error(&self, err: &KeyStoreError) {
        if let Some(metrics) = self.metrics.as_deref() {
            metrics.record_error(err.metrics_kind());
        }
    }
}

impl KeyStore {
    /// Creates a store for the key set published at `url`, fetched over HTTP with default
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `url` is invalid or the HTTP client cannot be created.
    pub fn new(url: &str) -> Result<Self, ConfigError> {
        KeyStoreBuilder::new().url(url).build()
    }

    /// Creates a builder for configuring a [`KeyStore`].
    pub fn builder() -> KeyStoreBuilder {
        KeyStoreBuilder::new()
    }

    /// Returns the address the key set is fetched from.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Returns the key with `key_id`, refreshing the key set once if it is not cached.
    ///
    /// A cached key is returned without any I/O. On a miss the caller joins the refresh
    /// already in flight, or starts one; afterwards the cache is checked again and the
    /// lookup is not retried.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::Fetch`] / [`KeyStoreError::Parse`] if the refresh failed (the same
    ///   error is returned to every caller that waited on it);
    /// - [`KeyStoreError::KeyNotFound`] if the refreshed key set has no such key.
    pub async fn get_key(&self, key_id: &str) -> Result<Arc<Key>, KeyStoreError> {
        let observed = self.inner.generation.load(Ordering::Acquire);
        if let Some(key) = self.inner.cache.lookup(key_id) {
            return Ok(key);
        }

        debug!("Key '{}' not cached, refreshing key set", key_id);
        self.refresh_after(observed).await?;

        self.inner.cache.lookup(key_id).ok_or_else(|| {
            warn!("Key '{}' not found in key set from {}", key_id, self.inner.url);
            let err = KeyStoreError::KeyNotFound(key_id.to_owned());
            self.inner.record_error(&err);
            err
        })
    }

    /// Refreshes the key set now, joining a refresh already in flight if there is one.
    ///
    /// Returns the number of keys trusted after the refresh.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Fetch`] or [`KeyStoreError::Parse`] if the refresh failed.
    pub async fn refresh(&self) -> Result<usize, KeyStoreError> {
        let observed = self.inner.generation.load(Ordering::Acquire);
        self.refresh_after(observed).await
    }

    async fn refresh_after(&self, observed: u64) -> Result<usize, KeyStoreError> {
        let refresh = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.as_ref() {
                // A finished refresh left in the slot means its task panicked.
                Some(refresh) if refresh.peek().is_none() => refresh.clone(),
                // A refresh completed after the caller's cache miss; its keys are visible.
                _ if self.inner.generation.load(Ordering::Acquire) != observed => {
                    return Ok(self.inner.cache.len());
                }
                _ => {
                    let refresh = Inner::start_refresh(Arc::clone(&self.inner));
                    *in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    /// Adds or overwrites a trusted key without fetching.
    ///
    /// Seeded keys last until the next refresh replaces the whole set.
    pub fn insert(&self, key: Key) {
        self.inner.cache.insert(key);
    }

    /// Returns the cached key with `key_id` without refreshing.
    pub fn lookup(&self, key_id: &str) -> Option<Arc<Key>> {
        self.inner.cache.lookup(key_id)
    }

    /// Returns the currently trusted key set.
    pub fn key_set(&self) -> Arc<KeySet> {
        self.inner.cache.snapshot()
    }
}

/// Builder for [`KeyStore`].
///
/// # Example
///
/// ```no_run
/// use bearer_auth::key::{KeySetLimits, KeyStore};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = KeyStore::builder()
///     .url("https://issuer.example/.well-known/jwks.json")
///     .refresh_timeout(Duration::from_secs(3))
///     .limits(KeySetLimits {
///         max_keys: Some(32),
///         max_document_bytes: Some(256 * 1024),
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct KeyStoreBuilder {
    url: Option<String>,
    fetcher: Option<Arc<dyn KeyFetcher>>,
    refresh_timeout: Duration,
    limits: KeySetLimits,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    seed: Vec<Key>,
}

impl Debug for KeyStoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStoreBuilder")
            .field("url", &self.url)
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<KeyFetcher>"))
            .field("refresh_timeout", &self.refresh_timeout)
            .field("limits", &self.limits)
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .field("seed", &self.seed.len())
            .finish()
    }
}

impl Default for KeyStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStoreBuilder {
    /// Creates a builder with default settings and no key set address.
    pub fn new() -> Self {
        Self {
            url: None,
            fetcher: None,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            limits: KeySetLimits::default(),
            metrics: None,
            seed: Vec::new(),
        }
    }

    /// Creates a builder whose key set address is read from
    /// [`JWKS_URL_ENV`](crate::constants::JWKS_URL_ENV).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingJwksUrlEnv`] if the variable is unset or not unicode.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(JWKS_URL_ENV).map_err(|_| ConfigError::MissingJwksUrlEnv)?;
        Ok(Self::new().url(url))
    }

    /// Sets the address of the key set document.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the fetcher used to retrieve the key set. Defaults to an [`HttpKeyFetcher`]
    /// when the `http` feature is enabled.
    ///
    /// [`HttpKeyFetcher`]: super::HttpKeyFetcher
    #[must_use]
    pub fn fetcher<F: KeyFetcher + 'static>(self, fetcher: F) -> Self {
        self.shared_fetcher(Arc::new(fetcher))
    }

    /// Sets a fetcher shared with other owners.
    #[must_use]
    pub fn shared_fetcher(mut self, fetcher: Arc<dyn KeyFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the upper bound on a single refresh.
    #[must_use]
    pub const fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Sets the limits enforced on fetched key sets.
    #[must_use]
    pub const fn limits(mut self, limits: KeySetLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets a metrics recorder.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Adds a key trusted from the start, before any refresh.
    #[must_use]
    pub fn seed(mut self, key: Key) -> Self {
        self.seed.push(key);
        self
    }

    /// Builds the [`KeyStore`]. No network access happens until the first cache miss.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no address was set, the address does not parse, or no
    /// fetcher is available.
    pub fn build(self) -> Result<KeyStore, ConfigError> {
        let raw = self.url.ok_or(ConfigError::MissingUrl)?;
        let url = Url::parse(&raw)?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => default_fetcher(self.refresh_timeout, self.limits)?,
        };

        let cache = KeySetCache::with_key_set(self.seed.into_iter().collect());

        Ok(KeyStore {
            inner: Arc::new(Inner {
                url,
                cache,
                fetcher,
                refresh_timeout: self.refresh_timeout,
                limits: self.limits,
                metrics: self.metrics,
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }
}

#[cfg(feature = "http")]
fn default_fetcher(
    timeout: Duration,
    limits: KeySetLimits,
) -> Result<Arc<dyn KeyFetcher>, ConfigError> {
    let fetcher = super::HttpKeyFetcher::with_timeout(timeout)?.limits(limits);
    Ok(Arc::new(fetcher))
}

#[cfg(not(feature = "http"))]
fn default_fetcher(
    _timeout: Duration,
    _limits: KeySetLimits,
) -> Result<Arc<dyn KeyFetcher>, ConfigError> {
    Err(ConfigError::MissingFetcher)
}
