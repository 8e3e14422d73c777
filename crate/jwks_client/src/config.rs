use std::{collections::BTreeMap, fmt::Display, path::Path, sync::Arc, time::Duration};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::{
    error::{
        JwksClientError,
        result::{JwksClientResult, JwksClientResultHelper},
    },
    fetcher::KeySetFetcher,
    wrappers::KeysInterceptor,
};

pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 5;
/// 10 minutes
pub const DEFAULT_CACHE_MAX_AGE_MS: u64 = 600_000;
pub const DEFAULT_JWKS_REQUESTS_PER_MINUTE: u32 = 10;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// used for serialization
const fn not(b: &bool) -> bool {
    !*b
}

/// Outgoing proxy used to reach the JWKS endpoint
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ProxyParams {
    /// The proxy URL, e.g. `https://proxy.example.com:8080`
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_password: Option<String>,
    /// A raw `Proxy-Authorization` header value, used when no basic auth is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_auth_header: Option<String>,
    /// Hosts that must not go through the proxy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusion_list: Vec<String>,
}

impl Display for ProxyParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)?;
        if let Some(username) = &self.basic_auth_username {
            write!(f, ", basic auth user: {username}, password: ****")?;
        } else if self.custom_auth_header.is_some() {
            write!(f, ", custom auth header: ****")?;
        }
        if !self.exclusion_list.is_empty() {
            write!(f, ", no proxy for: {}", self.exclusion_list.join(","))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProxyParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", &self))
    }
}

/// Configuration of a [`JwksClient`](crate::JwksClient).
///
/// Captured once at construction and read-only afterwards. Durations are
/// expressed in milliseconds so that the configuration file stays flat:
///
/// ```toml
/// jwks_uri = "https://tenant.auth0.com/.well-known/jwks.json"
/// cache_max_entries = 5
/// cache_max_age = 600000
/// rate_limit = true
/// jwks_requests_per_minute = 10
/// timeout = 30000
///
/// [request_headers]
/// User-Agent = "my-service"
/// ```
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct JwksClientConfig {
    /// The JWKS endpoint
    pub jwks_uri: String,

    /// Memoize resolved signing keys per `kid`
    pub cache: bool,

    /// Maximum number of cached signing keys
    pub cache_max_entries: usize,

    /// Maximum age of a cached signing key, in milliseconds
    pub cache_max_age: u64,

    /// Put a token bucket in front of the JWKS endpoint
    #[serde(skip_serializing_if = "not")]
    pub rate_limit: bool,

    /// Token bucket size and refill per minute
    pub jwks_requests_per_minute: u32,

    /// HTTP request timeout, in milliseconds
    pub timeout: u64,

    /// Extra headers sent with every JWKS request
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyParams>,

    /// Replaces the HTTP call to `jwks_uri`
    #[serde(skip)]
    pub fetcher: Option<Arc<dyn KeySetFetcher>>,

    /// Alternate key source consulted before the endpoint
    #[serde(skip)]
    pub get_keys_interceptor: Option<Arc<dyn KeysInterceptor>>,
}

impl Default for JwksClientConfig {
    fn default() -> Self {
        Self {
            jwks_uri: String::new(),
            cache: true,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_max_age: DEFAULT_CACHE_MAX_AGE_MS,
            rate_limit: false,
            jwks_requests_per_minute: DEFAULT_JWKS_REQUESTS_PER_MINUTE,
            timeout: DEFAULT_TIMEOUT_MS,
            request_headers: BTreeMap::new(),
            proxy: None,
            fetcher: None,
            get_keys_interceptor: None,
        }
    }
}

impl JwksClientConfig {
    /// A default configuration pointing at `jwks_uri`
    #[must_use]
    pub fn new(jwks_uri: impl Into<String>) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> JwksClientResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> JwksClientResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read the configuration file {path:?}"))?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub const fn cache_max_age(&self) -> Duration {
        Duration::from_millis(self.cache_max_age)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Check the settings that cannot be fixed later on
    ///
    /// # Errors
    ///
    /// Returns [`JwksClientError::Argument`] on the first invalid setting
    pub fn validate(&self) -> JwksClientResult<()> {
        if self.jwks_uri.trim().is_empty() {
            return Err(JwksClientError::Argument("jwksUri is required".to_owned()));
        }
        // a custom fetcher may use any addressing scheme
        if self.fetcher.is_none() {
            url::Url::parse(&self.jwks_uri)?;
        }
        if self.cache && self.cache_max_entries == 0 {
            return Err(JwksClientError::Argument(
                "cacheMaxEntries must be greater than 0 when the cache is enabled".to_owned(),
            ));
        }
        if self.rate_limit && self.jwks_requests_per_minute == 0 {
            return Err(JwksClientError::Argument(
                "jwksRequestsPerMinute must be greater than 0 when rate limiting is enabled"
                    .to_owned(),
            ));
        }
        self.header_map()?;
        if let Some(proxy) = &self.proxy {
            url::Url::parse(&proxy.url)?;
        }
        Ok(())
    }

    /// The `request_headers` as a reqwest header map
    pub(crate) fn header_map(&self) -> JwksClientResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.request_headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        Ok(headers)
    }
}

impl Display for JwksClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "jwks uri: {}, ", self.jwks_uri)?;
        if self.cache {
            write!(
                f,
                "cache: {} entries for {} ms, ",
                self.cache_max_entries, self.cache_max_age
            )?;
        } else {
            write!(f, "cache: off, ")?;
        }
        if self.rate_limit {
            write!(f, "rate limit: {}/min, ", self.jwks_requests_per_minute)?;
        } else {
            write!(f, "rate limit: off, ")?;
        }
        write!(f, "timeout: {} ms", self.timeout)?;
        if !self.request_headers.is_empty() {
            let names: Vec<&str> = self.request_headers.keys().map(String::as_str).collect();
            write!(f, ", headers: {}", names.join(","))?;
        }
        if let Some(proxy) = &self.proxy {
            write!(f, ", proxy: {proxy}")?;
        }
        if self.fetcher.is_some() {
            write!(f, ", custom fetcher")?;
        }
        if self.get_keys_interceptor.is_some() {
            write!(f, ", keys interceptor")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for JwksClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", &self))
    }
}
