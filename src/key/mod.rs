//! Public keys, key sets and the key store that resolves them.
//!
//! A [`KeySet`] is parsed from a standard RFC 7517 JWKS document. Entries that cannot be
//! used for signature verification (no `kid`, no key material, symmetric keys, unknown
//! algorithms) are dropped individually; only document-level problems fail the parse.
//!
//! The [`KeyStore`] keeps the current set in a [`KeySetCache`] and refreshes it from a
//! [`KeyFetcher`] when a lookup misses.

mod cache;
mod errors;
mod fetcher;
mod limits;
mod metrics;
mod store;

pub use cache::KeySetCache;
pub use errors::{FetchError, KeySetError, KeyStoreError, LimitKind, MetricsErrorKind};
#[cfg(feature = "http")]
pub use fetcher::HttpKeyFetcher;
pub use fetcher::{FetchFuture, KeyFetcher};
pub use limits::KeySetLimits;
pub use metrics::MetricsRecorder;
pub use store::{KeyStore, KeyStoreBuilder};

use crate::alg::Algorithm;
use crate::prelude::warn;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// JWK key types that can carry a public verification key.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum KeyType {
    /// RSA public key (`n`, `e`).
    Rsa,
    /// Elliptic curve public key (`crv`, `x`, `y`).
    Ec,
    /// Octet key pair, e.g. Ed25519 (`crv`, `x`).
    Okp,
}

impl KeyType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "RSA" => Some(Self::Rsa),
            "EC" => Some(Self::Ec),
            "OKP" => Some(Self::Okp),
            _ => None,
        }
    }

    /// Returns the JWK `kty` value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Ec => "EC",
            Self::Okp => "OKP",
        }
    }

    const fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Rsa => &["n", "e"],
            Self::Ec => &["crv", "x", "y"],
            Self::Okp => &["crv", "x"],
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trusted public key, stored as its JWK JSON object.
///
/// The key material is opaque to this crate: it is handed verbatim to the configured
/// [`SignatureVerifier`](crate::token::SignatureVerifier).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Key {
    kid: Arc<str>,
    kty: KeyType,
    alg: Option<Algorithm>,
    crv: Option<Arc<str>>,
    jwk_json: Arc<[u8]>,
}

impl Key {
    /// Constructs a [`Key`] from a single JWK object in JSON format.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError`] if the JSON is invalid, or the JWK lacks a `kid`, a supported
    /// `kty`, the parameters that key type requires, or declares an unsupported `alg`.
    pub fn from_jwk_json(jwk_json: &[u8]) -> Result<Self, KeySetError> {
        let value: Value = serde_json::from_slice(jwk_json)?;
        Self::from_jwk_value(&value)
    }

    fn from_jwk_value(value: &Value) -> Result<Self, KeySetError> {
        let kid = value
            .get("kid")
            .and_then(Value::as_str)
            .filter(|kid| !kid.is_empty())
            .ok_or(KeySetError::MissingKeyId)?;

        let kty_str = value
            .get("kty")
            .and_then(Value::as_str)
            .ok_or_else(|| KeySetError::MissingKeyType(kid.to_owned()))?;
        let kty = KeyType::parse(kty_str).ok_or_else(|| KeySetError::UnsupportedKeyType {
            kid: kid.to_owned(),
            kty: kty_str.to_owned(),
        })?;

        if let Some(param) = kty
            .required_params()
            .iter()
            .copied()
            .find(|param| value.get(*param).and_then(Value::as_str).is_none())
        {
            return Err(KeySetError::MissingMaterial {
                kid: kid.to_owned(),
                param,
            });
        }

        let crv = value.get("crv").and_then(Value::as_str).map(Arc::<str>::from);

        let alg = match value.get("alg").and_then(Value::as_str) {
            None => None,
            Some(name) => {
                let alg = Algorithm::parse(name)
                    .filter(|alg| alg.key_type() == kty)
                    .ok_or_else(|| KeySetError::UnsupportedAlgorithm {
                        kid: kid.to_owned(),
                        alg: name.to_owned(),
                    })?;
                Some(alg)
            }
        };

        let jwk_json = serde_json::to_vec(value)?;

        Ok(Self {
            kid: Arc::<str>::from(kid),
            kty,
            alg,
            crv,
            jwk_json: Arc::<[u8]>::from(jwk_json),
        })
    }

    /// Returns the key ID (`kid`).
    pub fn key_id(&self) -> &str {
        &self.kid
    }

    /// Returns the key type (`kty`).
    pub const fn key_type(&self) -> KeyType {
        self.kty
    }

    /// Returns the algorithm the key is pinned to, if the JWK declares one.
    pub const fn algorithm(&self) -> Option<Algorithm> {
        self.alg
    }

    /// Returns the curve (`crv`) for EC and OKP keys.
    pub fn curve(&self) -> Option<&str> {
        self.crv.as_deref()
    }

    /// Returns the JWK JSON bytes representing this key.
    pub fn jwk_json(&self) -> &[u8] {
        &self.jwk_json
    }

    /// Returns `true` if a token signed with `alg` may be verified with this key.
    ///
    /// The algorithm must belong to the key's type and curve, and must equal the key's
    /// declared `alg` when there is one.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        if alg.key_type() != self.kty {
            return false;
        }
        if self.alg.is_some_and(|pinned| pinned != alg) {
            return false;
        }
        match alg.curve() {
            Some(curve) => self.curve() == Some(curve),
            None => true,
        }
    }
}

/// A complete set of trusted keys indexed by key ID.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct KeySet {
    source: Option<Url>,
    keys: HashMap<String, Arc<Key>>,
}

impl KeySet {
    /// Creates an empty key set not associated with any source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a key set from an RFC 7517 JWKS document without resource limits.
    ///
    /// # Errors
    ///
    /// See [`KeySet::from_jwks_with_limits`].
    pub fn from_jwks(jwks: &[u8]) -> Result<Self, KeySetError> {
        Self::from_jwks_with_limits(jwks, KeySetLimits::unlimited())
    }

    /// Parses a key set from an RFC 7517 JWKS document.
    ///
    /// Unknown fields are ignored. Individual entries that are not usable public keys are
    /// skipped with a warning, so a document with no usable keys yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError`] if the document exceeds `limits`, is not valid JSON, or is
    /// not an object holding a `keys` array.
    ///
    /// # Examples
    ///
    /// ```
    /// use bearer_auth::key::KeySet;
    ///
    /// let jwks = br#"{
    ///     "keys": [
    ///         {
    ///             "kty": "EC",
    ///             "kid": "C6vs25welZOx6WksNYfbMfiw9l96pMnD",
    ///             "crv": "P-256",
    ///             "x": "ngLYQnlfF6GsojUwqtcEE3WgTNG2RUlsGhK73RNEl5k",
    ///             "y": "tKbiDSUSsQ3F1P7wteeHNXIcU-cx6CgSbroeQrQHTLM"
    ///         },
    ///         { "kty": "EC", "crv": "P-256", "x": "", "y": "" }
    ///     ]
    /// }"#;
    /// let key_set = KeySet::from_jwks(jwks).unwrap();
    ///
    /// assert_eq!(key_set.len(), 1);
    /// assert!(key_set.get("C6vs25welZOx6WksNYfbMfiw9l96pMnD").is_some());
    /// ```
    pub fn from_jwks_with_limits(jwks: &[u8], limits: KeySetLimits) -> Result<Self, KeySetError> {
        limits::check_document_size(jwks.len(), limits)?;

        let value: Value = serde_json::from_slice(jwks)?;
        let entries = value
            .get("keys")
            .and_then(Value::as_array)
            .ok_or(KeySetError::MissingKeys)?;

        limits::check_key_count(entries.len(), limits)?;

        let mut key_set = Self::new();
        for entry in entries {
            match Key::from_jwk_value(entry) {
                Ok(key) => key_set.insert(key),
                Err(err) => warn!("Skipping unusable key set entry: {}", err),
            }
        }

        Ok(key_set)
    }

    /// Associates the key set with the address it was fetched from.
    #[must_use]
    pub fn with_source(mut self, source: Url) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns the address the key set was fetched from, if any.
    pub fn source(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    /// Returns the key with the given key ID.
    pub fn get(&self, key_id: &str) -> Option<&Arc<Key>> {
        self.keys.get(key_id)
    }

    /// Adds a key, replacing any key with the same ID.
    pub fn insert(&mut self, key: Key) {
        self.insert_shared(Arc::new(key));
    }

    pub(crate) fn insert_shared(&mut self, key: Arc<Key>) {
        self.keys.insert(key.key_id().to_owned(), key);
    }

    /// Returns an iterator over all keys in the set.
    pub fn keys(&self) -> impl Iterator<Item = &Arc<Key>> {
        self.keys.values()
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Extend<Key> for KeySet {
    fn extend<T: IntoIterator<Item = Key>>(&mut self, iter: T) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl FromIterator<Key> for KeySet {
    fn from_iter<T: IntoIterator<Item = Key>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
