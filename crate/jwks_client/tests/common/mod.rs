#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cosmian_jwks_client::{
    FetchFuture, FnFetcher, JwksClientError, JwksDocument, KeySetFetcher,
};
use futures::FutureExt;
use openssl::{pkey::PKey, rsa::Rsa};
use serde_json::{Value, json};

pub(crate) const JWKS_URI: &str = "https://tenant.example.com/.well-known/jwks.json";

/// An RSA signing key as published in a JWKS, with its expected PEM
pub(crate) struct RsaFixture {
    pub jwk: Value,
    pub pem: String,
}

pub(crate) fn rsa_fixture(kid: &str) -> RsaFixture {
    let rsa = Rsa::generate(2048).unwrap();
    let jwk = json!({
        "kty": "RSA",
        "use": "sig",
        "kid": kid,
        "n": URL_SAFE_NO_PAD.encode(rsa.n().to_vec()),
        "e": URL_SAFE_NO_PAD.encode(rsa.e().to_vec()),
    });
    let public = Rsa::from_public_components(
        rsa.n().to_owned().unwrap(),
        rsa.e().to_owned().unwrap(),
    )
    .unwrap();
    let pem = String::from_utf8(PKey::from_rsa(public).unwrap().public_key_to_pem().unwrap())
        .unwrap();
    RsaFixture { jwk, pem }
}

pub(crate) fn jwks(keys: &[&Value]) -> Value {
    json!({ "keys": keys })
}

/// A fetcher serving `document` and counting its calls
pub(crate) fn counting_fetcher(document: Value) -> (Arc<dyn KeySetFetcher>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fetcher = FnFetcher::shared(move |uri: String| -> FetchFuture {
        assert_eq!(uri, JWKS_URI);
        counter.fetch_add(1, Ordering::SeqCst);
        let document = document.clone();
        async move {
            serde_json::from_value::<JwksDocument>(document).map_err(JwksClientError::from)
        }
        .boxed()
    });
    (fetcher, calls)
}

pub(crate) fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
