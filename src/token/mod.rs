//! Decoding and signature verification of compact-serialized tokens.
//!
//! [`TokenDecoder::decode`] proves a token is authentic: it parses the header, resolves the
//! signing key from a [`KeyStore`] and verifies the signature. It performs no semantic claim
//! checks; see [`claims`](crate::claims) for those.

mod verify;

pub use verify::{JsonWebTokenVerifier, SignatureVerifier, VerifyError};

use crate::alg::{self, Algorithm};
use crate::claims::Claims;
use crate::key::{KeyStore, KeyStoreError};
use crate::prelude::debug;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Maximum size of a token segment after base64url decoding.
const MAX_SEGMENT_SIZE: usize = 64 * 1024;

/// Errors returned by [`TokenDecoder::decode`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The token is not three `.`-separated segments.
    #[error("malformed token: expected 3 dot-separated parts")]
    Malformed,

    /// A segment is not valid base64url, or is too large.
    #[error("malformed token: invalid base64url encoding")]
    InvalidBase64,

    /// The header or payload is not a JSON object.
    #[error("malformed token: invalid json")]
    InvalidJson(#[source] serde_json::Error),

    /// The header has no `alg`.
    #[error("token header 'alg' not found")]
    MissingAlgorithm,

    /// The header declares the unsigned `none` algorithm.
    #[error("unsigned tokens are not accepted")]
    UnsignedToken,

    /// The header declares an algorithm that is not supported.
    #[error("algorithm in 'alg' header is not supported: {0}")]
    UnsupportedAlgorithm(String),

    /// The header has no `kid`.
    #[error("token header 'kid' not found")]
    MissingKeyId,

    /// The signing key could not be resolved.
    #[error("cannot resolve signing key")]
    Key(#[from] KeyStoreError),

    /// The declared algorithm cannot be used with the resolved key.
    #[error("algorithm {alg} is not allowed for key '{key_id}'")]
    AlgorithmMismatch {
        /// Algorithm declared in the token header.
        alg: Algorithm,
        /// ID of the resolved key.
        key_id: String,
    },

    /// The signature does not verify.
    #[error("signature verification failed")]
    InvalidSignature,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: Option<String>,
    kid: Option<String>,
}

/// Header fields the decoder relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    alg: Algorithm,
    kid: String,
}

impl Header {
    /// Algorithm the token was signed with.
    pub const fn algorithm(&self) -> Algorithm {
        self.alg
    }

    /// ID of the signing key.
    pub fn key_id(&self) -> &str {
        &self.kid
    }
}

/// A token split into its parts, before any verification.
struct UnverifiedToken<'a> {
    header: Header,
    signing_input: &'a [u8],
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl<'a> UnverifiedToken<'a> {
    fn parse(token: &'a str) -> Result<Self, DecodeError> {
        let mut it = token.split('.');
        let header_b64 = it.next().ok_or(DecodeError::Malformed)?;
        let payload_b64 = it.next().ok_or(DecodeError::Malformed)?;
        let signature_b64 = it.next().ok_or(DecodeError::Malformed)?;
        if it.next().is_some() {
            return Err(DecodeError::Malformed);
        }

        let header_json = decode_segment(header_b64)?;
        let payload = decode_segment(payload_b64)?;
        let signature = decode_segment(signature_b64)?;

        let header: RawHeader =
            serde_json::from_slice(&header_json).map_err(DecodeError::InvalidJson)?;
        let header = validate_header(header)?;

        let signing_input = &token.as_bytes()[..header_b64.len() + 1 + payload_b64.len()];

        Ok(Self {
            header,
            signing_input,
            payload,
            signature,
        })
    }
}

fn validate_header(header: RawHeader) -> Result<Header, DecodeError> {
    let alg = header.alg.ok_or(DecodeError::MissingAlgorithm)?;
    if alg::is_unsigned(&alg) {
        return Err(DecodeError::UnsignedToken);
    }
    let alg = Algorithm::parse(&alg).ok_or(DecodeError::UnsupportedAlgorithm(alg))?;

    let kid = header.kid.ok_or(DecodeError::MissingKeyId)?;

    Ok(Header { alg, kid })
}

/// Reads the header of `token` without verifying anything.
///
/// Useful for routing or logging by key ID. The result must not be trusted.
///
/// # Errors
///
/// Returns the same structural and header errors as [`TokenDecoder::decode`].
pub fn decode_header(token: &str) -> Result<Header, DecodeError> {
    UnverifiedToken::parse(token).map(|token| token.header)
}

/// Verifies tokens against the keys of a [`KeyStore`].
///
/// # Examples
///
/// ```no_run
/// use bearer_auth::key::KeyStore;
/// use bearer_auth::token::TokenDecoder;
///
/// # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let store = KeyStore::new("https://issuer.example/.well-known/jwks.json")?;
/// let decoder = TokenDecoder::new(store);
///
/// let claims = decoder.decode(token).await?;
/// println!("issuer: {:?}", claims.issuer());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokenDecoder {
    key_store: KeyStore,
    verifier: Arc<dyn SignatureVerifier>,
}

impl fmt::Debug for TokenDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenDecoder")
            .field("key_store", &self.key_store)
            .field("verifier", &"<SignatureVerifier>")
            .finish()
    }
}

impl TokenDecoder {
    /// Creates a decoder verifying signatures with [`JsonWebTokenVerifier`].
    pub fn new(key_store: KeyStore) -> Self {
        Self::with_verifier(key_store, Arc::new(JsonWebTokenVerifier))
    }

    /// Creates a decoder verifying signatures with a custom verifier.
    pub fn with_verifier(key_store: KeyStore, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            key_store,
            verifier,
        }
    }

    /// Returns the key store signing keys are resolved from.
    pub const fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    /// Verifies `token` and returns its claims.
    ///
    /// No claim is inspected: an expired token with a valid signature decodes successfully.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if:
    /// - the token is malformed, or a segment is not base64url or JSON,
    /// - the header declares `none`, an unsupported algorithm, or lacks `alg`/`kid`,
    /// - the key cannot be resolved ([`DecodeError::Key`]),
    /// - the algorithm does not match the key, or the signature does not verify.
    pub async fn decode(&self, token: &str) -> Result<Claims, DecodeError> {
        let token = UnverifiedToken::parse(token)?;
        let Header { alg, kid } = &token.header;

        let key = self.key_store.get_key(kid).await?;
        if !key.accepts(*alg) {
            return Err(DecodeError::AlgorithmMismatch {
                alg: *alg,
                key_id: kid.clone(),
            });
        }

        let verified = self
            .verifier
            .verify(&key, *alg, token.signing_input, &token.signature)
            .unwrap_or_else(|err| {
                debug!("Signature verification with key '{}' errored: {}", kid, err);
                false
            });
        if !verified {
            return Err(DecodeError::InvalidSignature);
        }

        serde_json::from_slice(&token.payload).map_err(DecodeError::InvalidJson)
    }
}

/// Decodes base64url (no padding), rejecting segments over [`MAX_SEGMENT_SIZE`].
fn decode_segment(input: &str) -> Result<Vec<u8>, DecodeError> {
    use base64ct::{Base64UrlUnpadded, Encoding as _};

    // The encoded length bounds the decoded length; reject before allocating.
    if input.len() > MAX_SEGMENT_SIZE * 4 / 3 + 3 {
        return Err(DecodeError::InvalidBase64);
    }

    let decoded =
        Base64UrlUnpadded::decode_vec(input).map_err(|_| DecodeError::InvalidBase64)?;
    if decoded.len() > MAX_SEGMENT_SIZE {
        return Err(DecodeError::InvalidBase64);
    }

    Ok(decoded)
}
