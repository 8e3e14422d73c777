//! JSON Web Key (RFC 7517) as served by a JWKS endpoint.
//!
//! [`Jwk`] keeps the document exactly as received. [`KeyMaterial`] is the
//! typed view over the three key families that can verify JWT signatures.

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{JwksClientError, result::JwksClientResult};

/// base64url decoder accepting both padded and unpadded input
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// JWK members that only exist on private keys
const PRIVATE_MEMBERS: [&str; 6] = ["d", "p", "q", "dp", "dq", "qi"];

/// A single entry of a JSON Web Key Set.
///
/// Unknown members (`x5c`, `x5t`, `d`, ...) are kept in `other` so that the
/// key can be serialized back unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Jwk {
    /// `true` when the key is meant for signatures: `use` is absent or `sig`
    #[must_use]
    pub fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().is_none_or(|u| u == "sig")
    }

    /// `true` when the JWK carries private key material
    #[must_use]
    pub fn has_private_material(&self) -> bool {
        PRIVATE_MEMBERS.iter().any(|m| self.other.contains_key(*m))
    }
}

/// Elliptic curves accepted for `kty = EC`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
    Secp256k1,
}

impl EcCurve {
    fn from_crv(crv: &str) -> JwksClientResult<Self> {
        match crv {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            "secp256k1" => Ok(Self::Secp256k1),
            other => Err(JwksClientError::UnsupportedKey(format!(
                "EC curve '{other}' is not supported"
            ))),
        }
    }

    /// The JWS algorithm used when the JWK does not carry `alg`
    #[must_use]
    pub const fn default_alg(self) -> &'static str {
        match self {
            Self::P256 => "ES256",
            Self::P384 => "ES384",
            Self::P521 => "ES512",
            Self::Secp256k1 => "ES256K",
        }
    }
}

/// Edwards curves accepted for `kty = OKP`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkpCurve {
    Ed25519,
    Ed448,
}

impl OkpCurve {
    fn from_crv(crv: &str) -> JwksClientResult<Self> {
        match crv {
            "Ed25519" => Ok(Self::Ed25519),
            "Ed448" => Ok(Self::Ed448),
            other => Err(JwksClientError::UnsupportedKey(format!(
                "OKP curve '{other}' is not supported"
            ))),
        }
    }
}

/// Decoded public key material, one variant per supported `kty`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { curve: EcCurve, x: Vec<u8>, y: Vec<u8> },
    Okp { curve: OkpCurve, x: Vec<u8> },
}

impl KeyMaterial {
    /// The JWS algorithm implied by the key material alone
    #[must_use]
    pub const fn default_alg(&self) -> &'static str {
        match self {
            Self::Rsa { .. } => "RS256",
            Self::Ec { curve, .. } => curve.default_alg(),
            Self::Okp { .. } => "EdDSA",
        }
    }

    /// Check that an explicit `alg` belongs to this key family
    pub(crate) fn accepts_alg(&self, alg: &str) -> bool {
        match self {
            Self::Rsa { .. } => matches!(
                alg,
                "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512"
            ),
            Self::Ec { .. } => matches!(alg, "ES256" | "ES384" | "ES512" | "ES256K"),
            Self::Okp { .. } => matches!(alg, "EdDSA" | "Ed25519" | "Ed448"),
        }
    }
}

impl TryFrom<&Jwk> for KeyMaterial {
    type Error = JwksClientError;

    fn try_from(jwk: &Jwk) -> Result<Self, Self::Error> {
        match jwk.kty.as_str() {
            "RSA" => Ok(Self::Rsa {
                n: decode_member(jwk.n.as_deref(), "n")?,
                e: decode_member(jwk.e.as_deref(), "e")?,
            }),
            "EC" => Ok(Self::Ec {
                curve: EcCurve::from_crv(required(jwk.crv.as_deref(), "crv")?)?,
                x: decode_member(jwk.x.as_deref(), "x")?,
                y: decode_member(jwk.y.as_deref(), "y")?,
            }),
            "OKP" => Ok(Self::Okp {
                curve: OkpCurve::from_crv(required(jwk.crv.as_deref(), "crv")?)?,
                x: decode_member(jwk.x.as_deref(), "x")?,
            }),
            other => Err(JwksClientError::UnsupportedKey(format!(
                "key type '{other}' is not supported"
            ))),
        }
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> JwksClientResult<&'a str> {
    value.ok_or_else(|| JwksClientError::UnsupportedKey(format!("missing JWK member '{name}'")))
}

fn decode_member(value: Option<&str>, name: &str) -> JwksClientResult<Vec<u8>> {
    let bytes = BASE64_URL.decode(required(value, name)?)?;
    if bytes.is_empty() {
        return Err(JwksClientError::UnsupportedKey(format!(
            "empty JWK member '{name}'"
        )));
    }
    Ok(bytes)
}

/// Encode bytes as unpadded base64url, as used in JWK members
#[cfg(test)]
pub(crate) fn base64url_encode(bytes: &[u8]) -> String {
    BASE64_URL.encode(bytes)
}

#[expect(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{EcCurve, Jwk, KeyMaterial, OkpCurve, base64url_encode};
    use crate::JwksClientError;

    fn jwk(value: serde_json::Value) -> Jwk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_use_filter() {
        assert!(jwk(json!({"kty": "RSA"})).is_signing_key());
        assert!(jwk(json!({"kty": "RSA", "use": "sig"})).is_signing_key());
        assert!(!jwk(json!({"kty": "RSA", "use": "enc"})).is_signing_key());
    }

    #[test]
    fn test_unknown_members_are_preserved() {
        let value = json!({"kty": "RSA", "kid": "a", "use": "sig", "x5t": "abc", "n": "AQAB"});
        let key = jwk(value.clone());
        assert_eq!(key.other.get("x5t"), Some(&json!("abc")));
        assert_eq!(serde_json::to_value(&key).unwrap(), value);
    }

    #[test]
    fn test_private_material_detection() {
        let private = jwk(json!({"kty": "OKP", "crv": "Ed25519", "x": "AA", "d": "AA"}));
        assert!(private.has_private_material());
        let public = jwk(json!({"kty": "OKP", "crv": "Ed25519", "x": "AA"}));
        assert!(!public.has_private_material());
    }

    #[test]
    fn test_key_material_dispatch() {
        let rsa =
            KeyMaterial::try_from(&jwk(json!({"kty": "RSA", "n": "AQAB", "e": "AQAB"}))).unwrap();
        assert_eq!(rsa.default_alg(), "RS256");

        let ec = KeyMaterial::try_from(&jwk(
            json!({"kty": "EC", "crv": "secp256k1", "x": "AQ", "y": "AQ=="}),
        ))
        .unwrap();
        assert!(matches!(
            ec,
            KeyMaterial::Ec {
                curve: EcCurve::Secp256k1,
                ..
            }
        ));
        assert_eq!(ec.default_alg(), "ES256K");

        let okp =
            KeyMaterial::try_from(&jwk(json!({"kty": "OKP", "crv": "Ed448", "x": "AQ"}))).unwrap();
        assert!(matches!(
            okp,
            KeyMaterial::Okp {
                curve: OkpCurve::Ed448,
                ..
            }
        ));
        assert_eq!(okp.default_alg(), "EdDSA");
    }

    #[test]
    fn test_unsupported_key_material() {
        for value in [
            json!({"kty": "oct", "k": "AQAB"}),
            json!({"kty": "RSA", "e": "AQAB"}),
            json!({"kty": "EC", "crv": "P-192", "x": "AQ", "y": "AQ"}),
            json!({"kty": "OKP", "crv": "X25519", "x": "AQ"}),
            json!({"kty": "RSA", "n": "!!!", "e": "AQAB"}),
        ] {
            let err = KeyMaterial::try_from(&jwk(value)).unwrap_err();
            assert!(matches!(err, JwksClientError::UnsupportedKey(_)), "{err}");
        }
    }

    #[test]
    fn test_base64url_round_trip_of_exponent() {
        assert_eq!(base64url_encode(&[1, 0, 1]), "AQAB");
    }
}
