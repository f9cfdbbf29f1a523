use crate::alg::Algorithm;
use crate::key::Key;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::DecodingKey;
use thiserror::Error;

/// Verifies a signature over the signing input of a token.
///
/// The decoder resolves the key and checks that it accepts `alg` before calling the
/// verifier, so implementations only perform the cryptographic check.
pub trait SignatureVerifier: Send + Sync {
    /// Returns `Ok(true)` if `signature` is a valid signature of `message` by `key` under
    /// `alg`, `Ok(false)` if it is not.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] if the key material cannot be used for verification.
    fn verify(
        &self,
        key: &Key,
        alg: Algorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, VerifyError>;
}

/// Errors raised by a [`SignatureVerifier`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// The key's JWK cannot be turned into a verification key.
    #[error("cannot parse key JWK JSON")]
    InvalidKey(#[from] serde_json::Error),

    /// The cryptographic backend rejected the key or the input.
    #[error("signature backend error")]
    Backend(#[from] jsonwebtoken::errors::Error),
}

/// [`SignatureVerifier`] backed by the `jsonwebtoken` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWebTokenVerifier;

impl SignatureVerifier for JsonWebTokenVerifier {
    fn verify(
        &self,
        key: &Key,
        alg: Algorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, VerifyError> {
        use base64ct::{Base64UrlUnpadded, Encoding as _};

        let jwk: Jwk = serde_json::from_slice(key.jwk_json())?;
        let decoding_key = DecodingKey::from_jwk(&jwk)?;

        // jsonwebtoken takes the signature in its base64url form.
        let signature = Base64UrlUnpadded::encode_string(signature);

        let valid = jsonwebtoken::crypto::verify(
            &signature,
            message,
            &decoding_key,
            alg.to_jsonwebtoken(),
        )?;
        Ok(valid)
    }
}
