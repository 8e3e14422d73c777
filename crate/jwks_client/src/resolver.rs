//! Base signing key resolution: fetch the JWKS, convert it, pick by `kid`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    converter::retrieve_signing_keys,
    error::{JwksClientError, result::JwksClientResult},
    fetcher::KeySetFetcher,
    jwk::Jwk,
    signing_key::SigningKey,
};

/// Anything that can produce the signing key for a `kid`.
///
/// The base [`JwksResolver`] and every decorator of the pipeline implement it,
/// so decorators compose as `Arc<dyn SigningKeyResolver>`.
#[async_trait]
pub trait SigningKeyResolver: Send + Sync {
    async fn get_signing_key(&self, kid: Option<&str>) -> JwksClientResult<SigningKey>;
}

/// Resolves signing keys straight from the JWKS endpoint, without memoization
pub struct JwksResolver {
    jwks_uri: String,
    fetcher: Arc<dyn KeySetFetcher>,
}

impl JwksResolver {
    pub fn new(jwks_uri: impl Into<String>, fetcher: Arc<dyn KeySetFetcher>) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            fetcher,
        }
    }

    /// Fetch the JWKS and return its keys.
    ///
    /// Entries that are not JWK objects are ignored.
    ///
    /// # Errors
    ///
    /// Fetch errors are propagated; [`JwksClientError::Jwks`] when the
    /// document has no non-empty `keys` array.
    pub async fn get_keys(&self) -> JwksClientResult<Vec<Jwk>> {
        debug!("Fetching keys from '{}'", self.jwks_uri);
        let document = self.fetcher.fetch(&self.jwks_uri).await?;

        let entries = match document.keys {
            Some(Value::Array(entries)) if !entries.is_empty() => entries,
            _ => {
                return Err(JwksClientError::Jwks(
                    "The JWKS endpoint did not contain any keys".to_owned(),
                ));
            }
        };

        let keys: Vec<Jwk> = entries
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<Jwk>(v) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    debug!("Ignoring invalid JWK in JWKS at `{}`: {e}", self.jwks_uri);
                    None
                }
            })
            .collect();
        info!("JWKS fetched from '{}': {} keys", self.jwks_uri, keys.len());
        Ok(keys)
    }

    /// Fetch the JWKS and keep the keys able to verify signatures.
    ///
    /// # Errors
    ///
    /// Errors of [`JwksResolver::get_keys`], and [`JwksClientError::Jwks`]
    /// when none of the keys is a usable signing key.
    pub async fn get_signing_keys(&self) -> JwksClientResult<Vec<SigningKey>> {
        let keys = self.get_keys().await?;
        let signing_keys = retrieve_signing_keys(&keys);
        if signing_keys.is_empty() {
            return Err(JwksClientError::Jwks(
                "The JWKS endpoint did not contain any signing keys".to_owned(),
            ));
        }
        debug!("Signing keys: {:?}", signing_keys.iter().map(|k| &k.kid).collect::<Vec<_>>());
        Ok(signing_keys)
    }
}

#[async_trait]
impl SigningKeyResolver for JwksResolver {
    async fn get_signing_key(&self, kid: Option<&str>) -> JwksClientResult<SigningKey> {
        let signing_keys = self.get_signing_keys().await?;
        select_signing_key(signing_keys, kid)
    }
}

/// Pick the signing key answering to `kid`.
///
/// Without `kid` the set must hold exactly one key. With a `kid` the first
/// key carrying it wins; there is no fallback to a sole key with another `kid`.
///
/// # Errors
///
/// [`JwksClientError::SigningKeyNotFound`] when the choice is ambiguous or no
/// key matches.
pub fn select_signing_key(
    signing_keys: Vec<SigningKey>,
    kid: Option<&str>,
) -> JwksClientResult<SigningKey> {
    match kid {
        None => {
            let count = signing_keys.len();
            let mut keys = signing_keys.into_iter();
            match (keys.next(), count) {
                (Some(key), 1) => Ok(key),
                (Some(_), _) => Err(JwksClientError::SigningKeyNotFound(
                    "No KID specified and JWKS endpoint returned more than 1 key".to_owned(),
                )),
                (None, _) => Err(JwksClientError::SigningKeyNotFound(
                    "No KID specified and JWKS endpoint returned no key".to_owned(),
                )),
            }
        }
        Some(kid) => signing_keys
            .into_iter()
            .find(|key| key.matches(kid))
            .ok_or_else(|| {
                JwksClientError::SigningKeyNotFound(format!(
                    "Unable to find a signing key that matches '{kid}'"
                ))
            }),
    }
}

#[expect(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::select_signing_key;
    use crate::{JwksClientError, signing_key::SigningKey};

    fn key(kid: Option<&str>) -> SigningKey {
        SigningKey::new(kid.map(ToOwned::to_owned), Some("RS256".to_owned()), "pem".to_owned())
    }

    #[test]
    fn test_no_kid_with_a_single_key() {
        let selected = select_signing_key(vec![key(Some("a"))], None).unwrap();
        assert_eq!(selected.kid.as_deref(), Some("a"));

        // a key without kid can only be picked without kid
        let selected = select_signing_key(vec![key(None)], None).unwrap();
        assert_eq!(selected.kid, None);
    }

    #[test]
    fn test_no_kid_is_ambiguous_with_several_keys() {
        let err = select_signing_key(vec![key(Some("a")), key(Some("b"))], None).unwrap_err();
        assert_eq!(
            err,
            JwksClientError::SigningKeyNotFound(
                "No KID specified and JWKS endpoint returned more than 1 key".to_owned()
            )
        );
    }

    #[test]
    fn test_kid_must_match_exactly() {
        let keys = vec![key(Some("a")), key(Some("b")), key(Some("b"))];
        assert_eq!(
            select_signing_key(keys, Some("b")).unwrap().kid.as_deref(),
            Some("b")
        );

        // no fallback on the only key
        let err = select_signing_key(vec![key(Some("a"))], Some("abc")).unwrap_err();
        assert!(matches!(err, JwksClientError::SigningKeyNotFound(_)));
        assert!(err.to_string().contains("abc"));
        assert_eq!(
            err.to_string(),
            "Unable to find a signing key that matches 'abc'"
        );
    }
}
