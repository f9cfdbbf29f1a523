#![allow(dead_code)]

use base64ct::{Base64UrlUnpadded, Encoding as _};
use bearer_auth::key::{FetchFuture, KeyFetcher, KeySet};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::pkcs8::EncodePrivateKey as _;
use p256::elliptic_curve::rand_core::OsRng;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

pub const ISSUER: &str = "https://issuer.example";
pub const JWKS_URL: &str = "https://issuer.example/.well-known/jwks.json";

fn b64u(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

pub fn now() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX_EPOCH")
        .as_secs();
    i64::try_from(secs).expect("timestamp fits in i64")
}

/// An ES256 signing key and its public JWK.
pub struct TestIssuer {
    kid: String,
    signing_key: SigningKey,
    encoding_key: EncodingKey,
}

impl TestIssuer {
    pub fn new(kid: &str) -> Self {
        let signing_key = SigningKey::random(&mut OsRng);

        // jsonwebtoken expects a DER-encoded EC private key for signing.
        let pkcs8_der = signing_key
            .to_pkcs8_der()
            .expect("pkcs8 der should serialize");
        let encoding_key = EncodingKey::from_ec_der(pkcs8_der.as_bytes());

        Self {
            kid: kid.to_owned(),
            signing_key,
            encoding_key,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public JWK of the signing key.
    pub fn jwk(&self) -> Value {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let x = point.x().expect("x coordinate missing");
        let y = point.y().expect("y coordinate missing");

        json!({
            "kty": "EC",
            "crv": "P-256",
            "x": b64u(x),
            "y": b64u(y),
            "alg": "ES256",
            "use": "sig",
            "kid": self.kid,
        })
    }

    pub fn key_set(&self) -> KeySet {
        key_set(&[self])
    }

    /// Signs `claims` with an ES256 header carrying this issuer's `kid`.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        encode(header, claims, &self.encoding_key).expect("token should encode")
    }
}

/// A JWKS document listing the public keys of `issuers`.
pub fn jwks(issuers: &[&TestIssuer]) -> Value {
    json!({ "keys": issuers.iter().map(|issuer| issuer.jwk()).collect::<Vec<_>>() })
}

pub fn key_set(issuers: &[&TestIssuer]) -> KeySet {
    let document = serde_json::to_vec(&jwks(issuers)).expect("JWKS should serialize");
    KeySet::from_jwks(&document).expect("key set should parse")
}

/// Claims accepted by [`expected`].
pub fn valid_claims() -> Value {
    json!({
        "iss": ISSUER,
        "sub": "user-1",
        "aud": ["svc-a", "svc-b"],
        "exp": now() + 300,
        "pur": "access",
    })
}

pub fn expected() -> bearer_auth::Expected {
    bearer_auth::Expected::new([ISSUER])
        .audience("svc-a")
        .purpose("access")
}

/// Builds a compact token from raw parts, without signing.
pub fn unsigned_token(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.",
        b64u(header.to_string().as_bytes()),
        b64u(claims.to_string().as_bytes())
    )
}

/// Serves a replaceable key set and counts fetches.
pub struct RotatingFetcher {
    calls: AtomicUsize,
    delay: Duration,
    current: Mutex<KeySet>,
}

impl RotatingFetcher {
    pub fn new(key_set: KeySet) -> Arc<Self> {
        Self::with_delay(key_set, Duration::ZERO)
    }

    pub fn with_delay(key_set: KeySet, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            current: Mutex::new(key_set),
        })
    }

    pub fn publish(&self, key_set: KeySet) {
        *self.current.lock().unwrap() = key_set;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeyFetcher for RotatingFetcher {
    fn fetch<'a>(&'a self, _url: &'a Url) -> FetchFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let key_set = self.current.lock().unwrap().clone();
            Ok(key_set)
        })
    }
}
