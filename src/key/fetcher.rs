use super::errors::KeyStoreError;
use super::KeySet;
use std::future::Future;
use std::pin::Pin;
use url::Url;

#[cfg(feature = "http")]
use super::errors::FetchError;
#[cfg(feature = "http")]
use super::limits::{self, KeySetLimits};
#[cfg(feature = "http")]
use crate::error::ConfigError;
#[cfg(feature = "http")]
use std::time::Duration;

/// Future returned by [`KeyFetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<KeySet, KeyStoreError>> + Send + 'a>>;

/// Retrieves and parses the key set published at an address.
///
/// Implementations report transport problems as [`KeyStoreError::Fetch`] and malformed
/// documents as [`KeyStoreError::Parse`]. The [`KeyStore`](super::KeyStore) bounds every
/// call with its refresh timeout, so implementations need not enforce one themselves.
pub trait KeyFetcher: Send + Sync {
    /// Fetches the key set published at `url`.
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFuture<'a>;
}

/// [`KeyFetcher`] that downloads the key set document with an HTTP `GET`.
///
/// # Examples
///
/// ```no_run
/// use bearer_auth::key::{HttpKeyFetcher, KeyFetcher};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = HttpKeyFetcher::with_timeout(Duration::from_secs(5))?;
/// let url = "https://issuer.example/.well-known/jwks.json".parse()?;
/// let key_set = fetcher.fetch(&url).await?;
/// println!("fetched {} keys", key_set.len());
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    limits: KeySetLimits,
}

#[cfg(feature = "http")]
impl HttpKeyFetcher {
    /// Creates a fetcher whose requests time out after
    /// [`DEFAULT_REFRESH_TIMEOUT`](crate::constants::DEFAULT_REFRESH_TIMEOUT).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be initialized.
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_timeout(crate::constants::DEFAULT_REFRESH_TIMEOUT)
    }

    /// Creates a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Self::with_client(client))
    }

    /// Creates a fetcher that sends requests through `client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            limits: KeySetLimits::default(),
        }
    }

    /// Sets the limits enforced on downloaded documents.
    #[must_use]
    pub fn limits(mut self, limits: KeySetLimits) -> Self {
        self.limits = limits;
        self
    }

    // The size limit is enforced while reading, so an oversized body is never buffered.
    async fn fetch_document(&self, url: &Url) -> Result<Vec<u8>, KeyStoreError> {
        let transport = |err: reqwest::Error| KeyStoreError::fetch(url, err.into());
        let within_limit = |read: usize| {
            limits::check_document_size(read, self.limits).map_err(KeyStoreError::parse)
        };

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyStoreError::fetch(
                url,
                FetchError::Status {
                    status: status.as_u16(),
                },
            ));
        }

        if let Some(declared) = response.content_length() {
            within_limit(usize::try_from(declared).unwrap_or(usize::MAX))?;
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            body.extend_from_slice(&chunk);
            within_limit(body.len())?;
        }
        Ok(body)
    }
}

#[cfg(feature = "http")]
impl KeyFetcher for HttpKeyFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        Box::pin(async move {
            let document = self.fetch_document(url).await?;

            let key_set = KeySet::from_jwks_with_limits(&document, self.limits)
                .map_err(KeyStoreError::parse)?;

            Ok(key_set.with_source(url.clone()))
        })
    }
}
