use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    callback::with_callback,
    config::JwksClientConfig,
    error::result::JwksClientResult,
    fetcher::{HttpFetcher, KeySetFetcher},
    jwk::Jwk,
    resolver::{JwksResolver, SigningKeyResolver},
    signing_key::SigningKey,
    wrappers::compose,
};

/// Resolves the public keys of a JWKS endpoint.
///
/// `get_keys` and `get_signing_keys` always go to the endpoint.
/// `get_signing_key` runs through the decorators enabled in the configuration:
/// interceptor, then cache, then rate limiter, then the endpoint.
///
/// Cloning is cheap and clones share the cache and the rate limiter.
#[derive(Clone)]
pub struct JwksClient {
    config: Arc<JwksClientConfig>,
    base: Arc<JwksResolver>,
    resolver: Arc<dyn SigningKeyResolver>,
}

impl JwksClient {
    /// Validate the configuration and assemble the resolution pipeline.
    ///
    /// # Errors
    ///
    /// [`JwksClientError::Argument`](crate::JwksClientError::Argument) on an
    /// invalid configuration or when the HTTP client cannot be built
    pub fn new(config: JwksClientConfig) -> JwksClientResult<Self> {
        config.validate()?;
        debug!("JWKS client configuration: {config}");

        let fetcher: Arc<dyn KeySetFetcher> = match &config.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(HttpFetcher::instantiate(&config)?),
        };
        let base = Arc::new(JwksResolver::new(config.jwks_uri.clone(), fetcher));
        let (resolver, installed) = compose(base.clone(), &config);
        info!(
            "JWKS client ready for '{}', decorators: [{}]",
            config.jwks_uri,
            installed.join(", ")
        );

        Ok(Self {
            config: Arc::new(config),
            base,
            resolver,
        })
    }

    #[must_use]
    pub fn config(&self) -> &JwksClientConfig {
        &self.config
    }

    /// All the JWKs published by the endpoint
    pub async fn get_keys(&self) -> JwksClientResult<Vec<Jwk>> {
        self.base.get_keys().await
    }

    /// The published keys usable to verify signatures, as PEM
    pub async fn get_signing_keys(&self) -> JwksClientResult<Vec<SigningKey>> {
        self.base.get_signing_keys().await
    }

    /// The signing key for `kid`; without `kid` the endpoint must publish a
    /// single signing key
    pub async fn get_signing_key(&self, kid: Option<&str>) -> JwksClientResult<SigningKey> {
        self.resolver.get_signing_key(kid).await
    }

    pub fn get_keys_with_callback<Cb>(&self, callback: Cb) -> Option<JoinHandle<()>>
    where
        Cb: FnOnce(JwksClientResult<Vec<Jwk>>) + Send + 'static,
    {
        let client = self.clone();
        with_callback(async move { client.get_keys().await }, callback)
    }

    pub fn get_signing_keys_with_callback<Cb>(&self, callback: Cb) -> Option<JoinHandle<()>>
    where
        Cb: FnOnce(JwksClientResult<Vec<SigningKey>>) + Send + 'static,
    {
        let client = self.clone();
        with_callback(async move { client.get_signing_keys().await }, callback)
    }

    /// Callback form of [`JwksClient::get_signing_key`].
    ///
    /// Spawns the resolution on the current tokio runtime; the returned handle
    /// completes once the callback has run. Outside of a runtime the callback
    /// receives an error right away and no handle is returned.
    pub fn get_signing_key_with_callback<Cb>(
        &self,
        kid: Option<&str>,
        callback: Cb,
    ) -> Option<JoinHandle<()>>
    where
        Cb: FnOnce(JwksClientResult<SigningKey>) + Send + 'static,
    {
        let client = self.clone();
        let kid = kid.map(ToOwned::to_owned);
        with_callback(
            async move { client.get_signing_key(kid.as_deref()).await },
            callback,
        )
    }
}

impl std::fmt::Debug for JwksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
