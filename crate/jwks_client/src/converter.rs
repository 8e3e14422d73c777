//! JWK to SPKI PEM conversion.
//!
//! Only keys that can verify JWT signatures survive: `use` must be absent or
//! `sig`, the key type must be RSA, EC or OKP and the material must import as
//! a public key. Anything else is reported as [`JwksClientError::UnsupportedKey`],
//! which [`retrieve_signing_keys`] turns into a silent skip.

use openssl::{
    bn::{BigNum, BigNumContext},
    ec::{EcGroup, EcKey},
    nid::Nid,
    pkey::{Id, PKey, Public},
    rsa::Rsa,
};
use tracing::debug;

use crate::{
    error::{JwksClientError, result::JwksClientResult},
    jwk::{EcCurve, Jwk, KeyMaterial, OkpCurve},
    signing_key::SigningKey,
};

/// Convert a JWK into a [`SigningKey`] holding the PEM encoded public key.
///
/// # Errors
///
/// Fails with [`JwksClientError::UnsupportedKey`] when the JWK is not a
/// signing key, has an unsupported type, curve or algorithm, carries private
/// material, or when its numbers do not form a valid public key.
pub fn convert(jwk: &Jwk) -> JwksClientResult<SigningKey> {
    if !jwk.is_signing_key() {
        return Err(JwksClientError::UnsupportedKey(format!(
            "key use '{}' is not 'sig'",
            jwk.key_use.as_deref().unwrap_or_default()
        )));
    }
    if jwk.has_private_material() {
        return Err(JwksClientError::UnsupportedKey(
            "the JWK holds private key material".to_owned(),
        ));
    }

    let material = KeyMaterial::try_from(jwk)?;
    let alg = match jwk.alg.as_deref() {
        None => material.default_alg().to_owned(),
        Some(alg) if material.accepts_alg(alg) => alg.to_owned(),
        Some(alg) => {
            return Err(JwksClientError::UnsupportedKey(format!(
                "algorithm '{alg}' does not match key type '{}'",
                jwk.kty
            )));
        }
    };

    let public_key = import_public_key(&material)
        .map_err(|e| JwksClientError::UnsupportedKey(format!("cannot import the key: {e}")))?;
    let pem = public_key.public_key_to_pem()?;
    let pem = String::from_utf8(pem)
        .map_err(|e| JwksClientError::UnsupportedKey(format!("invalid PEM output: {e}")))?;

    Ok(SigningKey::new(jwk.kid.clone(), Some(alg), pem))
}

/// Convert every JWK of a set, dropping the ones that cannot verify signatures.
///
/// The relative order of the input is preserved.
#[must_use]
pub fn retrieve_signing_keys(jwks: &[Jwk]) -> Vec<SigningKey> {
    jwks.iter()
        .filter_map(|jwk| match convert(jwk) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(
                    "Skipping JWK kid={:?} kty={}: {e}",
                    jwk.kid.as_deref(),
                    jwk.kty
                );
                None
            }
        })
        .collect()
}

fn import_public_key(material: &KeyMaterial) -> JwksClientResult<PKey<Public>> {
    let pkey = match material {
        KeyMaterial::Rsa { n, e } => {
            let rsa = Rsa::from_public_components(BigNum::from_slice(n)?, BigNum::from_slice(e)?)?;
            PKey::from_rsa(rsa)?
        }
        KeyMaterial::Ec { curve, x, y } => {
            let group = EcGroup::from_curve_name(curve_nid(*curve))?;
            check_coordinates_length(&group, x, y)?;
            let (x, y) = (BigNum::from_slice(x)?, BigNum::from_slice(y)?);
            let ec_key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
            ec_key.check_key()?;
            PKey::from_ec_key(ec_key)?
        }
        KeyMaterial::Okp { curve, x } => {
            let id = match curve {
                OkpCurve::Ed25519 => Id::ED25519,
                OkpCurve::Ed448 => Id::ED448,
            };
            PKey::public_key_from_raw_bytes(x, id)?
        }
    };
    Ok(pkey)
}

const fn curve_nid(curve: EcCurve) -> Nid {
    match curve {
        EcCurve::P256 => Nid::X9_62_PRIME256V1,
        EcCurve::P384 => Nid::SECP384R1,
        EcCurve::P521 => Nid::SECP521R1,
        EcCurve::Secp256k1 => Nid::SECP256K1,
    }
}

/// RFC 7518 requires the coordinates to be exactly the field size
fn check_coordinates_length(group: &EcGroup, x: &[u8], y: &[u8]) -> JwksClientResult<()> {
    let mut ctx = BigNumContext::new()?;
    let mut p = BigNum::new()?;
    let mut a = BigNum::new()?;
    let mut b = BigNum::new()?;
    group.components_gfp(&mut p, &mut a, &mut b, &mut ctx)?;
    let field_len = usize::try_from(p.num_bytes())
        .map_err(|e| JwksClientError::UnsupportedKey(e.to_string()))?;
    if x.len() != field_len || y.len() != field_len {
        return Err(JwksClientError::UnsupportedKey(format!(
            "EC coordinates must be {field_len} bytes long"
        )));
    }
    Ok(())
}
