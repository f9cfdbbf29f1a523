#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Authentication of bearer tokens against a remotely published key set.
//!
//! A request is authenticated in two independent stages:
//!
//! 1. **Decoding** ([`TokenDecoder`]) proves the token is authentic. The signing key is
//!    resolved by its `kid` from a [`KeyStore`], which caches the JSON Web Key Set
//!    published by the issuer and refreshes it on demand. Concurrent lookups of unknown
//!    keys share a single refresh.
//! 2. **Validation** ([`Expected`]) checks the decoded claims (issuer, expiration,
//!    audience, purpose) in a fixed order and reports the first failure.
//!
//! [`Authenticator`] composes both behind the `Authorization: Bearer <token>` header.
//!
//! ```no_run
//! use bearer_auth::{Authenticator, Expected, KeyStore};
//! use std::time::Duration;
//!
//! # async fn example(request: http::Request<()>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = KeyStore::builder()
//!     .url("https://issuer.example/.well-known/jwks.json")
//!     .refresh_timeout(Duration::from_secs(5))
//!     .build()?;
//! let authenticator = Authenticator::new(store);
//!
//! let expected = Expected::new(["https://issuer.example"])
//!     .audience("svc-a")
//!     .purpose("access");
//!
//! let claims = authenticator.validate_request(&request, &expected).await?;
//! println!("token expires at {:?}", claims.expiration());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `http` (default): [`HttpKeyFetcher`](key::HttpKeyFetcher) backed by `reqwest`.
//! - `logging` (default): diagnostics through the `log` facade.
//! - `tracing`: diagnostics through `tracing` instead of `log`.

mod observability;
mod prelude;

pub mod alg;
pub mod claims;
pub mod constants;
pub mod error;
pub mod key;
pub mod request;
pub mod token;

// -----------------------
// Re-exports
// -----------------------

pub use crate::{
    alg::Algorithm,
    claims::{Claims, ClaimsError, Expected},
    error::{AuthError, ConfigError},
    key::{Key, KeySet, KeyStore, KeyStoreBuilder, KeyStoreError},
    request::{bearer_token, Authenticator},
    token::{DecodeError, SignatureVerifier, TokenDecoder},
};
