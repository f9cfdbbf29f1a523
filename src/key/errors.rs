use super::limits::metric_kind_for_limit;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors returned by the [`KeyStore`](super::KeyStore) and [`KeyFetcher`](super::KeyFetcher)s.
///
/// The type is `Clone` so that every caller waiting on the same refresh observes the same
/// failure. Non-cloneable causes are shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum KeyStoreError {
    /// The remote key set could not be retrieved.
    #[error("failed to fetch key set from {url}")]
    Fetch {
        /// Address the key set was requested from.
        url: Url,
        /// Transport level cause.
        #[source]
        source: Arc<FetchError>,
    },

    /// The fetched document is not a usable key set.
    #[error("cannot parse key set document")]
    Parse(#[source] Arc<KeySetError>),

    /// The key ID is not present in the freshly refreshed key set.
    #[error("no trusted key with id '{0}'")]
    KeyNotFound(String),
}

impl KeyStoreError {
    pub(crate) fn fetch(url: &Url, source: FetchError) -> Self {
        Self::Fetch {
            url: url.clone(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn parse(source: KeySetError) -> Self {
        Self::Parse(Arc::new(source))
    }

    /// Maps the error to a stable metrics label.
    pub fn metrics_kind(&self) -> MetricsErrorKind {
        match self {
            Self::Fetch { source, .. } if matches!(**source, FetchError::Timeout) => {
                MetricsErrorKind::RefreshTimeout
            }
            Self::Fetch { .. } => MetricsErrorKind::FetchFailed,
            Self::Parse(source) => match **source {
                KeySetError::LimitExceeded { kind, .. } => metric_kind_for_limit(kind),
                _ => MetricsErrorKind::ParseFailed,
            },
            Self::KeyNotFound(_) => MetricsErrorKind::KeyNotFound,
        }
    }
}

/// Transport failures while retrieving a key set document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The endpoint answered with a non-success HTTP status.
    #[error("key set endpoint returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The request did not complete in time.
    #[error("key set request timed out")]
    Timeout,

    /// Connection or protocol error from the HTTP client.
    #[cfg(feature = "http")]
    #[error("http transport error")]
    Transport(#[source] reqwest::Error),

    /// Failure reported by a custom fetcher.
    #[error("key set fetch failed")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

/// Errors parsing a key set document or a single key.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeySetError {
    /// The document or key is not valid JSON.
    #[error("cannot deserialize json key set")]
    Deserialize(#[from] serde_json::Error),

    /// The document is not an object with a `keys` array.
    #[error("key set must be an object containing a 'keys' array")]
    MissingKeys,

    /// The key has no `kid`.
    #[error("missing key ID")]
    MissingKeyId,

    /// The key has no `kty`.
    #[error("key '{0}' has no key type")]
    MissingKeyType(String),

    /// The key type cannot hold a public verification key.
    #[error("key '{kid}' has unsupported key type '{kty}'")]
    UnsupportedKeyType {
        /// Key ID.
        kid: String,
        /// The declared `kty`.
        kty: String,
    },

    /// Parameters required by the key type are absent.
    #[error("key '{kid}' is missing parameter '{param}'")]
    MissingMaterial {
        /// Key ID.
        kid: String,
        /// Name of the first missing JWK parameter.
        param: &'static str,
    },

    /// The key declares an `alg` that is unsupported or incompatible with its type.
    #[error("key '{kid}' declares unsupported algorithm '{alg}'")]
    UnsupportedAlgorithm {
        /// Key ID.
        kid: String,
        /// The declared `alg`.
        alg: String,
    },

    /// The document exceeds a configured resource limit.
    #[error("key set limit exceeded: {kind} (limit={limit}, actual={actual})")]
    LimitExceeded {
        /// The kind of limit that was exceeded.
        kind: LimitKind,
        /// The configured limit value.
        limit: usize,
        /// The actual value that exceeded it.
        actual: usize,
    },
}

/// The kind of resource limit that was exceeded.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LimitKind {
    /// Maximum number of entries in the `keys` array.
    MaxKeys,
    /// Maximum size of the key set document in bytes.
    MaxDocumentBytes,
}

impl LimitKind {
    /// Returns a stable string representation of the limit kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxKeys => "max_keys",
            Self::MaxDocumentBytes => "max_document_bytes",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error kinds for structured metrics reporting.
///
/// Use these stable, low-cardinality labels when recording metrics.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MetricsErrorKind {
    /// The key set endpoint could not be reached or answered with an error status.
    FetchFailed,
    /// The refresh did not complete within the configured timeout.
    RefreshTimeout,
    /// The key set document was malformed.
    ParseFailed,
    /// A token referenced a key ID absent from the refreshed key set.
    KeyNotFound,
    /// Resource limit exceeded: number of keys.
    LimitMaxKeys,
    /// Resource limit exceeded: document size.
    LimitMaxDocumentBytes,
}

impl MetricsErrorKind {
    /// Returns a string representation of the error kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchFailed => "fetch_failed",
            Self::RefreshTimeout => "refresh_timeout",
            Self::ParseFailed => "parse_failed",
            Self::KeyNotFound => "key_not_found",
            Self::LimitMaxKeys => "limit_max_keys",
            Self::LimitMaxDocumentBytes => "limit_max_document_bytes",
        }
    }
}

impl fmt::Display for MetricsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
