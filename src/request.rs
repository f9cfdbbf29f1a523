//! Authentication of HTTP requests carrying `Authorization: Bearer <token>`.

use crate::claims::{Claims, Expected};
use crate::constants::BEARER_PREFIX;
use crate::error::AuthError;
use crate::key::KeyStore;
use crate::prelude::debug;
use crate::token::TokenDecoder;
use http::header::AUTHORIZATION;
use http::HeaderMap;

/// Extracts the bearer token from the `Authorization` header.
///
/// The scheme must be exactly `Bearer` followed by a single space.
///
/// # Errors
///
/// Returns [`AuthError::InvalidAuthorizationHeader`] if the header is absent, not visible
/// ASCII, uses another scheme, or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidAuthorizationHeader)
}

/// Decodes and validates bearer tokens: the entry point for request authentication.
///
/// # Examples
///
/// ```no_run
/// use bearer_auth::claims::Expected;
/// use bearer_auth::key::KeyStore;
/// use bearer_auth::Authenticator;
///
/// # async fn example(request: http::Request<()>) -> Result<(), Box<dyn std::error::Error>> {
/// let store = KeyStore::new("https://issuer.example/.well-known/jwks.json")?;
/// let authenticator = Authenticator::new(store);
/// let expected = Expected::new(["https://issuer.example"]).audience("svc-a");
///
/// match authenticator.validate_request(&request, &expected).await {
///     Ok(claims) => println!("authenticated: {:?}", claims.get("sub")),
///     Err(err) if err.is_key_store_failure() => eprintln!("cannot verify tokens: {err}"),
///     Err(err) => eprintln!("rejected: {err}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticator {
    decoder: TokenDecoder,
}

impl Authenticator {
    /// Creates an authenticator verifying tokens against `key_store`.
    pub fn new(key_store: KeyStore) -> Self {
        Self::with_decoder(TokenDecoder::new(key_store))
    }

    /// Creates an authenticator from a configured decoder.
    pub const fn with_decoder(decoder: TokenDecoder) -> Self {
        Self { decoder }
    }

    /// Returns the token decoder.
    pub const fn decoder(&self) -> &TokenDecoder {
        &self.decoder
    }

    /// Verifies `token` without checking its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Decode`] if the token is not authentic.
    pub async fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(self.decoder.decode(token).await?)
    }

    /// Verifies `token` and validates its claims against `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Decode`] if the token is not authentic, else
    /// [`AuthError::Claims`] if its claims are rejected.
    pub async fn validate_token(
        &self,
        token: &str,
        expected: &Expected,
    ) -> Result<Claims, AuthError> {
        let claims = self.decoder.decode(token).await.map_err(|err| {
            debug!("Token rejected: {}", err);
            err
        })?;

        expected.validate(&claims).map_err(|err| {
            debug!("Token claims rejected: {}", err);
            err
        })?;

        Ok(claims)
    }

    /// Authenticates the bearer token in `headers`.
    ///
    /// # Errors
    ///
    /// See [`bearer_token`] and [`Authenticator::validate_token`].
    pub async fn validate_headers(
        &self,
        headers: &HeaderMap,
        expected: &Expected,
    ) -> Result<Claims, AuthError> {
        let token = bearer_token(headers)?;
        self.validate_token(token, expected).await
    }

    /// Authenticates the bearer token of `request`.
    ///
    /// # Errors
    ///
    /// See [`bearer_token`] and [`Authenticator::validate_token`].
    pub async fn validate_request<B>(
        &self,
        request: &http::Request<B>,
        expected: &Expected,
    ) -> Result<Claims, AuthError> {
        self.validate_headers(request.headers(), expected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(authorization: &'static [u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_bytes(authorization).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_strips_scheme() {
        assert_eq!(bearer_token(&headers(b"Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_rejects_invalid_headers() {
        let cases: [&'static [u8]; 6] = [
            b"bearer abc",
            b"BEARER abc",
            b"Basic dXNlcjpwYXNz",
            b"Bearer",
            b"Bearer ",
            b"Bearer \xffabc",
        ];

        for case in cases {
            let err = bearer_token(&headers(case)).unwrap_err();
            assert!(matches!(err, AuthError::InvalidAuthorizationHeader), "{case:?}");
        }
    }

    #[test]
    fn test_bearer_token_rejects_missing_header() {
        let err = bearer_token(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthorizationHeader));
    }
}
