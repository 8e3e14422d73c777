//! Decorators around a [`SigningKeyResolver`](crate::SigningKeyResolver).
//!
//! Each decorator owns the resolver it wraps. [`compose`] installs them in a
//! fixed order: rate limiter over the base resolver, cache over the rate
//! limiter, interceptor over the cache. Cache hits therefore never consume a
//! rate limit token, and the interceptor is consulted before anything else.

use std::sync::Arc;

use crate::{config::JwksClientConfig, rate_limiter::RateLimiter, resolver::SigningKeyResolver};

mod cache;
mod interceptor;
mod rate_limit;

pub use cache::CachedResolver;
pub use interceptor::{FnKeysInterceptor, InterceptedResolver, KeysInterceptor};
pub use rate_limit::RateLimitedResolver;

/// A decorator: takes the resolver built so far and wraps it, or returns it
/// untouched when its option is off
pub type Decorator =
    fn(Arc<dyn SigningKeyResolver>, &JwksClientConfig) -> Arc<dyn SigningKeyResolver>;

/// Application order, innermost first
pub const DECORATORS: [(&str, Decorator); 3] = [
    ("rate_limit", rate_limit_decorator),
    ("cache", cache_decorator),
    ("interceptor", interceptor_decorator),
];

fn rate_limit_decorator(
    inner: Arc<dyn SigningKeyResolver>,
    config: &JwksClientConfig,
) -> Arc<dyn SigningKeyResolver> {
    if !config.rate_limit {
        return inner;
    }
    Arc::new(RateLimitedResolver::new(
        inner,
        RateLimiter::per_minute(config.jwks_requests_per_minute),
    ))
}

fn cache_decorator(
    inner: Arc<dyn SigningKeyResolver>,
    config: &JwksClientConfig,
) -> Arc<dyn SigningKeyResolver> {
    match (config.cache, std::num::NonZeroUsize::new(config.cache_max_entries)) {
        (true, Some(max_entries)) => Arc::new(CachedResolver::new(
            inner,
            max_entries,
            config.cache_max_age(),
        )),
        _ => inner,
    }
}

fn interceptor_decorator(
    inner: Arc<dyn SigningKeyResolver>,
    config: &JwksClientConfig,
) -> Arc<dyn SigningKeyResolver> {
    match &config.get_keys_interceptor {
        Some(source) => Arc::new(InterceptedResolver::new(inner, Arc::clone(source))),
        None => inner,
    }
}

/// Wrap `base` with every decorator enabled in `config`.
///
/// Returns the composed resolver and the names of the installed decorators,
/// innermost first.
pub fn compose(
    base: Arc<dyn SigningKeyResolver>,
    config: &JwksClientConfig,
) -> (Arc<dyn SigningKeyResolver>, Vec<&'static str>) {
    let mut resolver = base;
    let mut installed = Vec::with_capacity(DECORATORS.len());
    for (name, decorator) in DECORATORS {
        let wrapped = decorator(Arc::clone(&resolver), config);
        if !Arc::ptr_eq(&wrapped, &resolver) {
            installed.push(name);
        }
        resolver = wrapped;
    }
    (resolver, installed)
}
