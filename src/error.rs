//! Top-level error types.

use crate::claims::ClaimsError;
use crate::token::DecodeError;
use thiserror::Error;

/// Errors returned while authenticating a bearer token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The `Authorization` header is absent, not valid text, not a `Bearer` credential, or
    /// carries an empty token.
    #[error("missing or malformed authorization header")]
    InvalidAuthorizationHeader,

    /// The token could not be decoded or its signature did not verify.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The token verified but its claims do not satisfy the expectations.
    #[error(transparent)]
    Claims(#[from] ClaimsError),
}

impl AuthError {
    /// Returns `true` if the failure originates from the key store (the key set could not be
    /// refreshed, or the token's key ID is unknown) rather than from the token itself.
    ///
    /// Callers typically map these to a 5xx/503 response or retry, and the rest to 401.
    pub fn is_key_store_failure(&self) -> bool {
        matches!(self, Self::Decode(DecodeError::Key(_)))
    }
}

/// Errors building a [`KeyStore`](crate::key::KeyStore) or its fetcher.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// No key set address was configured.
    #[error("no key set url configured")]
    MissingUrl,

    /// The key set address is not a valid URL.
    #[error("invalid key set url")]
    InvalidUrl(#[from] url::ParseError),

    /// The key set address environment variable is not set.
    #[error("missing key set url environment variable: {}", crate::constants::JWKS_URL_ENV)]
    MissingJwksUrlEnv,

    /// No fetcher was configured and the `http` feature is disabled.
    #[error("no key fetcher configured")]
    MissingFetcher,

    /// The HTTP client could not be initialized.
    #[cfg(feature = "http")]
    #[error("cannot initialize http client")]
    HttpClient(#[source] reqwest::Error),
}
