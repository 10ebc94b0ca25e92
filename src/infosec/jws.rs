//! # JSON Web Signature (JWS)
//!
//! JWS ([RFC7515]) represents content secured with digital signatures using JSON-based data
//! structures. Cryptographic algorithms and identifiers for use with this
//! specification are described in the JWA ([RFC7518]) specification.
//!
//! Only the compact serialization is supported.
//!
//! [RFC7515]: https://www.rfc-editor.org/rfc/rfc7515
//! [RFC7518]: https://www.rfc-editor.org/rfc/rfc7518

use std::fmt::{self, Display};

use anyhow::{anyhow, bail};
use base64ct::{Base64UrlUnpadded, Encoding};
use p256::ecdsa::signature::Verifier as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::infosec::jwk::{Curve, PublicKeyJwk};
use crate::infosec::{Algorithm, Signer};

/// Represents a verified JWT.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct Jwt<T> {
    /// The JWT header.
    pub header: Header,

    /// The JWT claims.
    pub claims: T,
}

/// Represents the JWT header.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Header {
    /// Digital signature algorithm identifier as per IANA "JSON Web Signature
    /// and Encryption Algorithms" registry.
    pub alg: Algorithm,

    /// Used to declare the media type of the JWS.
    pub typ: Type,

    /// The key material for the public key.
    #[serde(flatten)]
    pub key: Key,

    /// A key attestation JWT covering the key used to sign this JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_attestation: Option<String>,
}

/// The JWT `typ` header.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Type {
    /// Plain JWT.
    #[default]
    #[serde(rename = "JWT", alias = "jwt")]
    Jwt,

    /// `DPoP` proof of possession.
    #[serde(rename = "dpop+jwt")]
    Dpop,

    /// Wallet's proof of possession of key material.
    #[serde(rename = "openid4vci-proof+jwt")]
    Proof,

    /// Issuer-signed SD-JWT VC.
    #[serde(rename = "dc+sd-jwt", alias = "vc+sd-jwt")]
    SdJwt,

    /// SD-JWT key binding JWT.
    #[serde(rename = "kb+jwt")]
    KbJwt,

    /// Authorization Request Object.
    #[serde(rename = "oauth-authz-req+jwt")]
    Request,

    /// Wallet or key attestation.
    #[serde(rename = "key-attestation+jwt", alias = "oauth-client-attestation+jwt")]
    Attestation,
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The type of public key material for the JWT.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Key {
    /// Identifies the signing key out of band, e.g. in a trusted JWKS.
    #[serde(rename = "kid")]
    KeyId(String),

    /// Embeds the signing key.
    #[serde(rename = "jwk")]
    Jwk(PublicKeyJwk),
}

impl Default for Key {
    fn default() -> Self {
        Self::KeyId(String::new())
    }
}

/// Encode the provided header and claims and sign, returning a JWT in compact
/// JWS form.
///
/// # Errors
///
/// Returns an error if the claims cannot be serialized or the signer fails.
pub async fn encode<T>(
    typ: Type, claims: &T, key: Key, signer: &impl Signer,
) -> anyhow::Result<String>
where
    T: Serialize + Send + Sync,
{
    let header = Header {
        alg: signer.algorithm(),
        typ,
        key,
        key_attestation: None,
    };
    encode_with(&header, claims, signer).await
}

/// Encode and sign using a caller-supplied header.
///
/// # Errors
///
/// Returns an error if the claims cannot be serialized or the signer fails.
pub async fn encode_with<T>(
    header: &Header, claims: &T, signer: &impl Signer,
) -> anyhow::Result<String>
where
    T: Serialize + Send + Sync,
{
    let header = Base64UrlUnpadded::encode_string(&serde_json::to_vec(header)?);
    let claims = Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims)?);
    let payload = format!("{header}.{claims}");

    let sig = signer.try_sign(payload.as_bytes()).await?;
    let sig_enc = Base64UrlUnpadded::encode_string(&sig);

    Ok(format!("{payload}.{sig_enc}"))
}

/// A parsed JWS whose signature has not yet been checked.
#[derive(Clone, Debug)]
pub struct Unverified<T> {
    /// The JWT header.
    pub header: Header,

    /// The JWT claims.
    pub claims: T,

    signing_input: String,
    signature: Vec<u8>,
    private_key_in_header: bool,
}

impl<T> Unverified<T> {
    /// Whether the embedded `jwk` header carries private key material.
    #[must_use]
    pub const fn has_private_key(&self) -> bool {
        self.private_key_in_header
    }

    /// The key embedded in the header, if any.
    #[must_use]
    pub const fn embedded_jwk(&self) -> Option<&PublicKeyJwk> {
        match &self.header.key {
            Key::Jwk(jwk) => Some(jwk),
            Key::KeyId(_) => None,
        }
    }

    /// The `kid` header, if any.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        match &self.header.key {
            Key::KeyId(kid) => Some(kid),
            Key::Jwk(jwk) => jwk.kid.as_deref(),
        }
    }

    /// Verify the signature against `jwk`, returning the verified JWT.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not suit the header `alg` or the
    /// signature does not verify.
    pub fn verify(self, jwk: &PublicKeyJwk) -> anyhow::Result<Jwt<T>> {
        match (self.header.alg, jwk.crv) {
            (Algorithm::ES256, Curve::P256) | (Algorithm::EdDSA, Curve::Ed25519) => {}
            (alg, crv) => bail!("'alg' {alg} cannot be used with a {crv} key"),
        }
        verify(jwk, &self.signing_input, &self.signature)?;
        Ok(Jwt {
            header: self.header,
            claims: self.claims,
        })
    }
}

/// Parse a compact JWS without verifying its signature.
///
/// # Errors
///
/// Returns an error if the token is not a well-formed compact JWS.
pub fn parse<T: DeserializeOwned>(token: &str) -> anyhow::Result<Unverified<T>> {
    let parts = token.split('.').collect::<Vec<&str>>();
    if parts.len() != 3 {
        bail!("invalid Compact JWS format");
    }

    let decoded = Base64UrlUnpadded::decode_vec(parts[0])
        .map_err(|e| anyhow!("issue decoding header: {e}"))?;
    let raw: Value =
        serde_json::from_slice(&decoded).map_err(|e| anyhow!("issue deserializing header: {e}"))?;
    let private_key_in_header = raw.get("jwk").and_then(|jwk| jwk.get("d")).is_some();
    let header: Header =
        serde_json::from_value(raw).map_err(|e| anyhow!("issue deserializing header: {e}"))?;

    let decoded = Base64UrlUnpadded::decode_vec(parts[1])
        .map_err(|e| anyhow!("issue decoding claims: {e}"))?;
    let claims =
        serde_json::from_slice(&decoded).map_err(|e| anyhow!("issue deserializing claims: {e}"))?;
    let signature = Base64UrlUnpadded::decode_vec(parts[2])
        .map_err(|e| anyhow!("issue decoding signature: {e}"))?;

    Ok(Unverified {
        header,
        claims,
        signing_input: format!("{}.{}", parts[0], parts[1]),
        signature,
        private_key_in_header,
    })
}

/// Verify the signature of the provided message using the JWK.
///
/// # Errors
///
/// Will return an error if the signature is invalid, the JWK is invalid, or the
/// algorithm is unsupported.
pub fn verify(jwk: &PublicKeyJwk, msg: &str, sig: &[u8]) -> anyhow::Result<()> {
    match jwk.crv {
        Curve::P256 => verify_es256(jwk, msg, sig),
        Curve::Ed25519 => verify_eddsa(jwk, msg, sig),
    }
}

// Verify the signature of the provided message using the ES256 algorithm.
fn verify_es256(jwk: &PublicKeyJwk, msg: &str, sig: &[u8]) -> anyhow::Result<()> {
    use p256::ecdsa::{Signature, VerifyingKey};

    let public_key = p256::PublicKey::try_from(jwk)?;
    let verifying_key = VerifyingKey::from(public_key);
    let signature = Signature::from_slice(sig).map_err(|e| anyhow!("invalid signature: {e}"))?;

    verifying_key
        .verify(msg.as_bytes(), &signature)
        .map_err(|e| anyhow!("unable to verify signature: {e}"))
}

// Verify the signature of the provided message using the EdDSA algorithm.
fn verify_eddsa(jwk: &PublicKeyJwk, msg: &str, sig_bytes: &[u8]) -> anyhow::Result<()> {
    use ed25519_dalek::{Signature, VerifyingKey};

    let x_bytes = Base64UrlUnpadded::decode_vec(&jwk.x)
        .map_err(|e| anyhow!("unable to base64 decode JWK 'x': {e}"))?;
    let bytes = &x_bytes.try_into().map_err(|_| anyhow!("invalid public key length"))?;
    let verifying_key = VerifyingKey::from_bytes(bytes)
        .map_err(|e| anyhow!("unable to build verifying key: {e}"))?;
    let signature =
        Signature::from_slice(sig_bytes).map_err(|e| anyhow!("unable to build signature: {e}"))?;

    verifying_key
        .verify_strict(msg.as_bytes(), &signature)
        .map_err(|e| anyhow!("unable to verify signature: {e}"))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::infosec::KeyPair;

    #[tokio::test]
    async fn embedded_key() {
        let key = KeyPair::generate(Curve::P256);
        let claims = json!({"nonce": "n-0S6_WzA2Mj"});
        let token = encode(Type::Proof, &claims, Key::Jwk(key.public_jwk()), &key)
            .await
            .expect("should encode");

        let parsed = parse::<Value>(&token).expect("should parse");
        assert_eq!(parsed.header.typ, Type::Proof);
        assert!(!parsed.has_private_key());

        let jwk = parsed.embedded_jwk().cloned().expect("has jwk");
        let jwt = parsed.verify(&jwk).expect("should verify");
        assert_eq!(jwt.claims, claims);
    }

    #[tokio::test]
    async fn wrong_key() {
        let key = KeyPair::generate(Curve::P256);
        let other = KeyPair::generate(Curve::P256);
        let token = encode(Type::Jwt, &json!({}), Key::KeyId(key.kid().into()), &key)
            .await
            .expect("should encode");

        let parsed = parse::<Value>(&token).expect("should parse");
        assert_eq!(parsed.kid(), Some(key.kid()));
        assert!(parsed.clone().verify(&other.public_jwk()).is_err());
        assert!(parsed.verify(&key.public_jwk()).is_ok());
    }

    #[test]
    fn private_key_header() {
        let header = json!({
            "alg": "ES256", "typ": "dpop+jwt",
            "jwk": {"kty": "EC", "crv": "P-256", "x": "x", "y": "y", "d": "secret"}
        });
        let token = format!(
            "{}.{}.{}",
            Base64UrlUnpadded::encode_string(header.to_string().as_bytes()),
            Base64UrlUnpadded::encode_string(b"{}"),
            Base64UrlUnpadded::encode_string(b"sig"),
        );
        let parsed = parse::<Value>(&token).expect("should parse");
        assert!(parsed.has_private_key());
    }

    #[test]
    fn legacy_sd_jwt_typ() {
        let typ: Type = serde_json::from_str(r#""vc+sd-jwt""#).expect("should deserialize");
        assert_eq!(typ, Type::SdJwt);
        assert_eq!(serde_json::to_string(&typ).expect("should serialize"), r#""dc+sd-jwt""#);
    }
}
