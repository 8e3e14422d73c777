use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    converter::retrieve_signing_keys,
    error::result::JwksClientResult,
    jwk::Jwk,
    resolver::{SigningKeyResolver, select_signing_key},
    signing_key::SigningKey,
};

/// Alternate source of JWKs consulted before the JWKS endpoint
#[async_trait]
pub trait KeysInterceptor: Send + Sync {
    async fn get_keys(&self) -> JwksClientResult<Vec<Jwk>>;
}

/// Adapts a closure returning a future of JWKs
pub struct FnKeysInterceptor<F>(F);

impl<F, Fut> FnKeysInterceptor<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JwksClientResult<Vec<Jwk>>> + Send + 'static,
{
    pub const fn new(get_keys: F) -> Self {
        Self(get_keys)
    }

    /// Convenience to plug the closure straight into a configuration
    pub fn shared(get_keys: F) -> Arc<dyn KeysInterceptor> {
        Arc::new(Self(get_keys))
    }
}

#[async_trait]
impl<F, Fut> KeysInterceptor for FnKeysInterceptor<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JwksClientResult<Vec<Jwk>>> + Send + 'static,
{
    async fn get_keys(&self) -> JwksClientResult<Vec<Jwk>> {
        (self.0)().await
    }
}

/// Serves the signing key from the interceptor when it has a match,
/// otherwise falls through to the wrapped resolver
pub struct InterceptedResolver {
    inner: Arc<dyn SigningKeyResolver>,
    source: Arc<dyn KeysInterceptor>,
}

impl InterceptedResolver {
    pub fn new(inner: Arc<dyn SigningKeyResolver>, source: Arc<dyn KeysInterceptor>) -> Self {
        Self { inner, source }
    }

    async fn intercept(&self, kid: Option<&str>) -> Option<SigningKey> {
        let keys = match self.source.get_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Keys interceptor failed, falling back to the JWKS endpoint: {e}");
                return None;
            }
        };
        if keys.is_empty() {
            return None;
        }
        let signing_keys = retrieve_signing_keys(&keys);
        if signing_keys.is_empty() {
            return None;
        }
        match select_signing_key(signing_keys, kid) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!("Keys interceptor has no match: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl SigningKeyResolver for InterceptedResolver {
    async fn get_signing_key(&self, kid: Option<&str>) -> JwksClientResult<SigningKey> {
        if let Some(key) = self.intercept(kid).await {
            debug!("Signing key {kid:?} served by the keys interceptor");
            return Ok(key);
        }
        self.inner.get_signing_key(kid).await
    }
}

#[expect(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use openssl::rsa::Rsa;
    use serde_json::json;

    use super::{FnKeysInterceptor, InterceptedResolver};
    use crate::{
        JwksClientError,
        error::result::JwksClientResult,
        jwk::{Jwk, base64url_encode},
        resolver::SigningKeyResolver,
        signing_key::SigningKey,
    };

    #[derive(Default)]
    struct Network(AtomicUsize);

    #[async_trait]
    impl SigningKeyResolver for Network {
        async fn get_signing_key(&self, kid: Option<&str>) -> JwksClientResult<SigningKey> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SigningKey::new(kid.map(ToOwned::to_owned), None, "network".to_owned()))
        }
    }

    fn local_key(kid: &str) -> Jwk {
        let rsa = Rsa::generate(2048).unwrap();
        serde_json::from_value(json!({
            "kty": "RSA",
            "kid": kid,
            "n": base64url_encode(&rsa.n().to_vec()),
            "e": base64url_encode(&rsa.e().to_vec()),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_match_skips_the_network() {
        let network = Arc::new(Network::default());
        let keys = vec![local_key("local")];
        let resolver = InterceptedResolver::new(
            network.clone(),
            FnKeysInterceptor::shared(move || {
                let keys = keys.clone();
                async move { Ok(keys) }
            }),
        );

        let key = resolver.get_signing_key(Some("local")).await.unwrap();
        assert_ne!(key.public_key, "network");
        assert_eq!(network.0.load(Ordering::SeqCst), 0);

        let key = resolver.get_signing_key(Some("remote")).await.unwrap();
        assert_eq!(key.public_key, "network");
        assert_eq!(network.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falls_through_on_empty_or_failing_source() {
        let network = Arc::new(Network::default());

        let empty = InterceptedResolver::new(
            network.clone(),
            FnKeysInterceptor::shared(|| async { Ok(vec![]) }),
        );
        assert_eq!(empty.get_signing_key(Some("a")).await.unwrap().public_key, "network");

        let failing = InterceptedResolver::new(
            network.clone(),
            FnKeysInterceptor::shared(|| async {
                Err(JwksClientError::Default("local store unavailable".to_owned()))
            }),
        );
        assert_eq!(failing.get_signing_key(Some("a")).await.unwrap().public_key, "network");
        assert_eq!(network.0.load(Ordering::SeqCst), 2);
    }
}
