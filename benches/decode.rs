//! Criterion benchmarks for token decoding and claims validation.
//!
//! Keys are seeded into the store, so the numbers cover parsing, signature verification
//! and claim checks without any key set refresh.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use bearer_auth::{Authenticator, Key, KeyStore, TokenDecoder};

#[path = "../tests/common/mod.rs"]
mod common;

use common::{expected, valid_claims, RotatingFetcher, TestIssuer, JWKS_URL};

fn authenticator(issuer: &TestIssuer) -> Authenticator {
    let key = Key::from_jwk_json(issuer.jwk().to_string().as_bytes()).expect("valid JWK");
    let store = KeyStore::builder()
        .url(JWKS_URL)
        .shared_fetcher(RotatingFetcher::new(Default::default()))
        .seed(key)
        .build()
        .expect("store should build");
    Authenticator::with_decoder(TokenDecoder::new(store))
}

/// A valid token whose payload is padded to roughly `size` bytes.
fn token_of_size(issuer: &TestIssuer, size: usize) -> String {
    let mut claims = valid_claims();
    claims["padding"] = json!("x".repeat(size));
    issuer.sign(&claims)
}

fn bench_decode(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime should build");
    let issuer = TestIssuer::new("bench");
    let authenticator = authenticator(&issuer);
    let expected = expected();

    let mut group = c.benchmark_group("decode");
    for size in (9..=15).map(|exp| 1usize << exp) {
        let token = token_of_size(&issuer, size);
        group.throughput(Throughput::Bytes(token.len() as u64));

        group.bench_with_input(BenchmarkId::new("decode", size), &token, |b, token| {
            b.iter(|| {
                runtime
                    .block_on(authenticator.decode(black_box(token)))
                    .expect("token should decode")
            });
        });

        group.bench_with_input(BenchmarkId::new("validate", size), &token, |b, token| {
            b.iter(|| {
                runtime
                    .block_on(authenticator.validate_token(black_box(token), &expected))
                    .expect("token should validate")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
