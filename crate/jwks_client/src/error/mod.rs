use thiserror::Error;

pub(crate) mod result;

/// Errors surfaced by the JWKS client.
///
/// The variants are `Clone` because a single in-flight resolution is shared
/// by every caller waiting on the same `kid`.
/// The messages of the caller-facing variants are the bare text so that
/// adapters can forward them as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwksClientError {
    // Invalid or missing configuration detected at construction time
    #[error("{0}")]
    Argument(String),

    // The JWKS endpoint answered with a non-2xx status
    #[error("{message}")]
    Http { status_code: u16, message: String },

    // Connection or transport failure before any status was received
    #[error("Failed to fetch JWKS: {0}")]
    Fetch(String),

    // The request did not complete within the configured timeout
    #[error("{0}")]
    Timeout(String),

    // The JWKS body is not valid JSON
    #[error("Failed to parse JWKS: {0}")]
    Parse(String),

    // The JWKS document is well formed but holds no (signing) keys
    #[error("{0}")]
    Jwks(String),

    // No key matches the requested `kid` or the request is ambiguous
    #[error("{0}")]
    SigningKeyNotFound(String),

    // The token bucket in front of the endpoint is exhausted
    #[error("{0}")]
    RateLimit(String),

    // A JWK that cannot be used to verify signatures; never leaves the converter
    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("OpenSSL Error: {0}")]
    OpenSSL(String),

    #[error("{0}")]
    Default(String),
}

impl JwksClientError {
    /// The HTTP status code when the error originates from a non-2xx response
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl From<openssl::error::ErrorStack> for JwksClientError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSL(format!("Error: {e}. Details: {e:?}"))
    }
}

impl From<reqwest::Error> for JwksClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(format!("Timeout while fetching the JWKS: {e}"))
        } else {
            Self::Fetch(format!("{e}: Details: {e:?}"))
        }
    }
}

impl From<reqwest::header::InvalidHeaderValue> for JwksClientError {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Self::Argument(format!("Invalid request header value: {e}"))
    }
}

impl From<reqwest::header::InvalidHeaderName> for JwksClientError {
    fn from(e: reqwest::header::InvalidHeaderName) -> Self {
        Self::Argument(format!("Invalid request header name: {e}"))
    }
}

impl From<serde_json::Error> for JwksClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<base64::DecodeError> for JwksClientError {
    fn from(e: base64::DecodeError) -> Self {
        Self::UnsupportedKey(format!("invalid base64url field: {e}"))
    }
}

impl From<url::ParseError> for JwksClientError {
    fn from(e: url::ParseError) -> Self {
        Self::Argument(format!("Invalid URL: {e}"))
    }
}

impl From<toml::de::Error> for JwksClientError {
    fn from(e: toml::de::Error) -> Self {
        Self::Argument(format!("Invalid configuration: {e}"))
    }
}
