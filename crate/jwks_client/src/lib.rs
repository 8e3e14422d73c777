//! Resolution of JWT signing keys from a JSON Web Key Set endpoint.
//!
//! A [`JwksClient`] fetches the JWKS, converts the usable JWKs to SPKI PEM
//! [`SigningKey`]s and picks the one matching a token `kid`. Resolution can be
//! cached, rate limited and short-circuited by a local key source.

pub use callback::with_callback;
pub use client::JwksClient;
pub use config::{
    DEFAULT_CACHE_MAX_AGE_MS, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_JWKS_REQUESTS_PER_MINUTE,
    DEFAULT_TIMEOUT_MS, JwksClientConfig, ProxyParams,
};
pub use converter::{convert, retrieve_signing_keys};
pub use error::{
    JwksClientError,
    result::{JwksClientResult, JwksClientResultHelper},
};
pub use fetcher::{FetchFuture, FnFetcher, HttpFetcher, JwksDocument, KeySetFetcher};
pub use jwk::{EcCurve, Jwk, KeyMaterial, OkpCurve};
pub use rate_limiter::{NO_TOKEN, RateLimiter, TokenBucket};
pub use resolver::{JwksResolver, SigningKeyResolver, select_signing_key};
pub use signing_key::SigningKey;
pub use wrappers::{
    CachedResolver, FnKeysInterceptor, InterceptedResolver, KeysInterceptor, RateLimitedResolver,
    compose,
};

mod callback;
mod client;
mod config;
mod converter;
mod error;
mod fetcher;
mod jwk;
mod rate_limiter;
mod resolver;
mod signing_key;
pub mod wrappers;
