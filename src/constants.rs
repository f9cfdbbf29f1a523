//! Constants shared across the crate.

use std::time::Duration;

/// Name of the environment variable read by [`KeyStoreBuilder::from_env`] to locate the
/// JSON Web Key Set document.
///
/// [`KeyStoreBuilder::from_env`]: crate::key::KeyStoreBuilder::from_env
pub const JWKS_URL_ENV: &str = "BEARER_AUTH_JWKS_URL";

/// Upper bound on a single key set refresh, including connection setup and body transfer.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Authorization scheme prefix expected in the `Authorization` header.
///
/// Matching is case-sensitive and includes the separating space.
pub const BEARER_PREFIX: &str = "Bearer ";
