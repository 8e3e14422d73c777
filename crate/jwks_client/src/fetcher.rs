//! Retrieval of the raw JWKS document.
//!
//! [`HttpFetcher`] performs the GET against the endpoint. Callers may replace
//! it with any [`KeySetFetcher`], for instance an [`FnFetcher`] wrapping a
//! closure, to serve keys from another transport or from test fixtures.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use reqwest::{Client, Response, StatusCode, header::HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    config::{JwksClientConfig, ProxyParams},
    error::{JwksClientError, result::JwksClientResult},
};

/// The JWKS document as returned by the endpoint.
///
/// `keys` stays untyped here: the resolver decides which entries are JWKs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct JwksDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Value>,
}

/// Source of the JWKS document for a URI
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> JwksClientResult<JwksDocument>;
}

/// Adapts a closure `Fn(String) -> Future<Output = JwksClientResult<JwksDocument>>`
pub struct FnFetcher<F>(F);

impl<F, Fut> FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JwksClientResult<JwksDocument>> + Send + 'static,
{
    pub const fn new(fetch: F) -> Self {
        Self(fetch)
    }

    /// Convenience to plug the closure straight into a configuration
    pub fn shared(fetch: F) -> Arc<dyn KeySetFetcher> {
        Arc::new(Self(fetch))
    }
}

#[async_trait]
impl<F, Fut> KeySetFetcher for FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JwksClientResult<JwksDocument>> + Send + 'static,
{
    async fn fetch(&self, uri: &str) -> JwksClientResult<JwksDocument> {
        (self.0)(uri.to_owned()).await
    }
}

/// Boxed future type accepted by [`FnFetcher`] when the closure is not `async`
pub type FetchFuture = BoxFuture<'static, JwksClientResult<JwksDocument>>;

/// Fetches the JWKS with `reqwest`, honoring headers, timeout and proxy
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build the HTTP client once for the lifetime of the JWKS client
    pub fn instantiate(config: &JwksClientConfig) -> JwksClientResult<Self> {
        let mut builder = Client::builder()
            .default_headers(config.header_map()?)
            .timeout(config.timeout());
        if let Some(proxy_params) = &config.proxy {
            builder = builder.proxy(build_proxy(proxy_params)?);
        }
        Ok(Self {
            client: builder.build().map_err(|e| {
                JwksClientError::Argument(format!("Failed to build the HTTP client: {e}"))
            })?,
        })
    }
}

#[async_trait]
impl KeySetFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> JwksClientResult<JwksDocument> {
        debug!("fetching {uri}");
        let response = self.client.get(uri).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error(uri, response).await);
        }

        let body = response.text().await?;
        let document = serde_json::from_str::<JwksDocument>(&body)?;
        trace!("JWKS document fetched from {uri}: {document:?}");
        Ok(document)
    }
}

/// Configure the outgoing proxy
fn build_proxy(proxy_params: &ProxyParams) -> JwksClientResult<reqwest::Proxy> {
    let mut proxy = reqwest::Proxy::all(proxy_params.url.clone()).map_err(|e| {
        JwksClientError::Argument(format!(
            "Failed to configure the HTTPS proxy for JWKS fetch: {e}"
        ))
    })?;
    if let Some(username) = &proxy_params.basic_auth_username {
        proxy = proxy.basic_auth(
            username,
            &proxy_params.basic_auth_password.clone().unwrap_or_default(),
        );
    } else if let Some(custom_auth_header) = &proxy_params.custom_auth_header {
        proxy = proxy.custom_http_auth(HeaderValue::from_str(custom_auth_header)?);
    }
    if !proxy_params.exclusion_list.is_empty() {
        proxy = proxy.no_proxy(reqwest::NoProxy::from_string(
            &proxy_params.exclusion_list.join(","),
        ));
    }
    Ok(proxy)
}

/// Turn a non-2xx response into [`JwksClientError::Http`].
///
/// The message is the `message` member of a JSON body (or the body itself
/// when it is a JSON string), else the raw body,
/// else the canonical reason of the status line.
async fn handle_error(uri: &str, response: Response) -> JwksClientError {
    trace!("Error response received on {uri}: Response: {response:?}");
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    JwksClientError::Http {
        status_code: status.as_u16(),
        message: error_message(status, &text),
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            if let Some(Value::String(message)) = map.get("message") {
                return message.clone();
            }
        }
        Ok(Value::String(message)) if !message.is_empty() => return message,
        _ => {}
    }
    if !body.trim().is_empty() {
        return body.to_owned();
    }
    status.canonical_reason().map_or_else(
        || format!("Http Error {}", status.as_u16()),
        ToOwned::to_owned,
    )
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::error_message;

    #[test]
    fn test_error_message_precedence() {
        assert_eq!(
            error_message(
                StatusCode::BAD_REQUEST,
                r#"{"message": "tenant is disabled", "code": 12}"#
            ),
            "tenant is disabled"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Unknown Server Error"),
            "Unknown Server Error"
        );
        // a JSON string body is unquoted
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, r#""Unknown Server Error""#),
            "Unknown Server Error"
        );
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
        assert_eq!(
            error_message(StatusCode::from_u16(599).unwrap_or(StatusCode::IM_A_TEAPOT), ""),
            "Http Error 599"
        );
    }
}
