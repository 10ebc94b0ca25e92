//! # JSON Web Key (JWK)
//!
//! A JWK ([RFC7517]) is a JSON representation of a cryptographic key.
//! Additionally, a JWK Set (JWKS) is used to represent a set of JWKs.
//!
//! JWK Thumbprint [RFC7638]: SHA-256 hash of the UTF-8 JSON of the required
//! members in lexicographic order (`{crv,kty,x,y}` for EC, `{crv,kty,x}` for
//! OKP), base64url encoded.
//!
//! [RFC7638]: https://www.rfc-editor.org/rfc/rfc7638
//! [RFC7517]: https://www.rfc-editor.org/rfc/rfc7517

use anyhow::anyhow;
use base64ct::{Base64UrlUnpadded, Encoding};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::EncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Simplified JSON Web Key (JWK) key structure.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct PublicKeyJwk {
    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Key type.
    pub kty: KeyType,

    /// Cryptographic curve type.
    pub crv: Curve,

    /// X coordinate.
    pub x: String,

    /// Y coordinate. Not required for `EdDSA` verification keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// Algorithm intended for use with the key, e.g. `ES256` or `ECDH-ES`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Use of the key.
    #[serde(rename = "use")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_: Option<KeyUse>,
}

impl PublicKeyJwk {
    /// RFC 7638 thumbprint of the key.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        // members are written in lexicographic order with no whitespace
        let canonical = match self.kty {
            KeyType::Ec => format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                self.crv,
                self.x,
                self.y.as_deref().unwrap_or_default()
            ),
            KeyType::Okp => format!(r#"{{"crv":"{}","kty":"OKP","x":"{}"}}"#, self.crv, self.x),
        };
        Base64UrlUnpadded::encode_string(&Sha256::digest(canonical.as_bytes()))
    }

    /// Whether both keys represent the same public key, ignoring metadata
    /// such as `kid`, `alg` and `use`.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        self.kty == other.kty && self.crv == other.crv && self.x == other.x && self.y == other.y
    }
}

impl From<&p256::PublicKey> for PublicKeyJwk {
    fn from(public_key: &p256::PublicKey) -> Self {
        let point = public_key.to_encoded_point(false);
        Self {
            kty: KeyType::Ec,
            crv: Curve::P256,
            x: point.x().map(|x| Base64UrlUnpadded::encode_string(x)).unwrap_or_default(),
            y: point.y().map(|y| Base64UrlUnpadded::encode_string(y)),
            ..Self::default()
        }
    }
}

impl TryFrom<&PublicKeyJwk> for p256::PublicKey {
    type Error = anyhow::Error;

    fn try_from(jwk: &PublicKeyJwk) -> anyhow::Result<Self> {
        if jwk.kty != KeyType::Ec || jwk.crv != Curve::P256 {
            return Err(anyhow!("expected a P-256 key"));
        }
        let y = jwk.y.as_ref().ok_or_else(|| anyhow!("JWK 'y' is missing"))?;
        let x = Base64UrlUnpadded::decode_vec(&jwk.x).map_err(|e| anyhow!("JWK 'x': {e}"))?;
        let y = Base64UrlUnpadded::decode_vec(y).map_err(|e| anyhow!("JWK 'y': {e}"))?;
        if x.len() != 32 || y.len() != 32 {
            return Err(anyhow!("invalid P-256 coordinate length"));
        }

        let point = EncodedPoint::from_affine_coordinates(
            x.as_slice().into(),
            y.as_slice().into(),
            false,
        );
        Option::from(Self::from_encoded_point(&point))
            .ok_or_else(|| anyhow!("JWK is not a point on P-256"))
    }
}

/// Cryptographic key type.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub enum KeyType {
    /// Elliptic curve key pair
    #[default]
    #[serde(rename = "EC")]
    Ec,

    /// Octet key pair (Edwards curve)
    #[serde(rename = "OKP")]
    Okp,
}

/// Cryptographic curve type.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub enum Curve {
    /// NIST P-256 curve
    #[default]
    #[serde(rename = "P-256")]
    P256,

    /// Ed25519 curve
    Ed25519,
}

impl std::fmt::Display for Curve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P256 => write!(f, "P-256"),
            Self::Ed25519 => write!(f, "Ed25519"),
        }
    }
}

/// The intended usage of the public `KeyType`.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum KeyUse {
    /// Public key is to be used for signature verification
    #[default]
    #[serde(rename = "sig")]
    Signature,

    /// Public key is to be used for encryption
    #[serde(rename = "enc")]
    Encryption,
}

/// A set of JWKs.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwks {
    /// The set of public key JWKs
    pub keys: Vec<PublicKeyJwk>,
}

impl Jwks {
    /// Find a key by its `kid`.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&PublicKeyJwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8037 appendix A.3
    #[test]
    fn okp_thumbprint() {
        let jwk = PublicKeyJwk {
            kty: KeyType::Okp,
            crv: Curve::Ed25519,
            x: "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo".into(),
            ..PublicKeyJwk::default()
        };
        assert_eq!(jwk.thumbprint(), "kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k");
    }

    #[test]
    fn p256_round_trip() {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let jwk = PublicKeyJwk::from(&secret.public_key());
        let public_key = p256::PublicKey::try_from(&jwk).expect("should convert");
        assert_eq!(public_key, secret.public_key());
    }

    #[test]
    fn rejects_off_curve_point() {
        let jwk = PublicKeyJwk {
            kty: KeyType::Ec,
            crv: Curve::P256,
            x: Base64UrlUnpadded::encode_string(&[1u8; 32]),
            y: Some(Base64UrlUnpadded::encode_string(&[2u8; 32])),
            ..PublicKeyJwk::default()
        };
        assert!(p256::PublicKey::try_from(&jwk).is_err());
    }
}
