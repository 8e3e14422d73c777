use serde::Serialize;

/// A public key usable to verify a JWT signature, exported as SPKI PEM.
///
/// Built once by the key converter and never mutated afterwards.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

impl SigningKey {
    #[must_use]
    pub const fn new(kid: Option<String>, alg: Option<String>, public_key: String) -> Self {
        Self {
            kid,
            alg,
            public_key,
        }
    }

    /// The PEM encoded public key
    #[must_use]
    pub fn get_public_key(&self) -> &str {
        &self.public_key
    }

    /// Alias of [`SigningKey::get_public_key`] kept for RSA-only consumers
    #[must_use]
    pub fn rsa_public_key(&self) -> &str {
        &self.public_key
    }

    /// `true` when this key answers to `kid`
    pub(crate) fn matches(&self, kid: &str) -> bool {
        self.kid.as_deref() == Some(kid)
    }
}
