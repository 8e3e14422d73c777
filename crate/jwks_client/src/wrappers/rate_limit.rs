use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::{
    error::{JwksClientError, result::JwksClientResult},
    rate_limiter::RateLimiter,
    resolver::SigningKeyResolver,
    signing_key::SigningKey,
};

/// Spends one token per call; refuses the call when none is left
pub struct RateLimitedResolver {
    inner: Arc<dyn SigningKeyResolver>,
    limiter: RateLimiter,
}

impl RateLimitedResolver {
    pub fn new(inner: Arc<dyn SigningKeyResolver>, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl SigningKeyResolver for RateLimitedResolver {
    async fn get_signing_key(&self, kid: Option<&str>) -> JwksClientResult<SigningKey> {
        let remaining = self.limiter.remove_tokens(1.0).await?;
        if remaining < 0.0 {
            warn!("Too many requests to the JWKS endpoint, kid: {kid:?}");
            return Err(JwksClientError::RateLimit(
                "Too many requests to the JWKS endpoint".to_owned(),
            ));
        }
        self.inner.get_signing_key(kid).await
    }
}
