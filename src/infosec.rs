//! # Information Security
//!
//! Key and signature primitives: the provider traits implementers use to
//! supply signing and decryption, a software [`KeyPair`] implementing them,
//! and JOSE encodings (JWK, JWS, JWE) built on top.

pub mod jwe;
pub mod jwk;
pub mod jws;

use std::fmt::{self, Display};
use std::future::Future;

use anyhow::anyhow;
use base64ct::{Base64UrlUnpadded, Encoding};
use p256::ecdsa::signature::Signer as _;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

pub use crate::infosec::jwk::{Curve, Jwks, KeyType, KeyUse, PublicKeyJwk};
pub use crate::infosec::jws::Jwt;

/// The `SecOps` trait is used to provide methods needed for signing and
/// decrypting data.
pub trait SecOps: Send + Sync {
    /// Signer provides digital signing-related funtionality.
    /// The `identifier` parameter is one of `credential_issuer` or
    /// `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signer cannot be created.
    fn signer(&self, identifier: &str) -> anyhow::Result<impl Signer>;

    /// Decryptor provides data decryption functionality.
    ///
    /// # Errors
    ///
    /// Returns an error if the decryptor cannot be created.
    fn decryptor(&self, identifier: &str) -> anyhow::Result<impl Decryptor>;
}

/// Signer is used by implementers to provide signing functionality for
/// credential issuance, request objects and holder proofs.
pub trait Signer: Send + Sync {
    /// Sign the message, returning the raw signature (`r || s` for ECDSA).
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;

    /// The public key of the key pair used in signing. The possibility of key
    /// rotation mean this key should only be referenced at the point of signing.
    fn public_key(&self) -> impl Future<Output = anyhow::Result<PublicKeyJwk>> + Send;

    /// Algorithm returns the algorithm used by the signer.
    fn algorithm(&self) -> Algorithm;

    /// The key identifier a verifier should use to locate the signer's public
    /// key.
    fn verification_method(&self) -> String;
}

/// Decryptor is used by implementers to provide ECDH key agreement for
/// decrypting JWEs addressed to them.
pub trait Decryptor: Send + Sync {
    /// The public key JWEs should be encrypted to, including its `kid`.
    fn public_key(&self) -> PublicKeyJwk;

    /// Compute the shared secret `Z` with the sender's (ephemeral) public key.
    fn shared_secret(
        &self, sender_public_key: &PublicKeyJwk,
    ) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

/// Signing algorithms supported.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// ECDSA using P-256 and SHA-256
    #[default]
    ES256,

    /// Algorithm for the Ed25519 curve
    EdDSA,
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone)]
enum Secret {
    P256(p256::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// An asymmetric key pair held exclusively by its creator. The public half
/// is shared as a [`PublicKeyJwk`].
#[derive(Clone)]
pub struct KeyPair {
    kid: String,
    secret: Secret,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("kid", &self.kid).finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a new key pair on the given curve. The key identifier
    /// defaults to the JWK thumbprint of the public key.
    #[must_use]
    pub fn generate(curve: Curve) -> Self {
        let secret = match curve {
            Curve::P256 => Secret::P256(p256::SecretKey::random(&mut OsRng)),
            Curve::Ed25519 => Secret::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng)),
        };
        let mut pair = Self {
            kid: String::new(),
            secret,
        };
        pair.kid = pair.public_jwk().thumbprint();
        pair
    }

    /// Replace the key identifier.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = kid.into();
        self
    }

    /// The key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The curve the key is on.
    #[must_use]
    pub const fn curve(&self) -> Curve {
        match self.secret {
            Secret::P256(_) => Curve::P256,
            Secret::Ed25519(_) => Curve::Ed25519,
        }
    }

    /// The public half of the key pair as a JWK, carrying `kid` and `alg`.
    #[must_use]
    pub fn public_jwk(&self) -> PublicKeyJwk {
        let mut jwk = match &self.secret {
            Secret::P256(secret) => PublicKeyJwk::from(&secret.public_key()),
            Secret::Ed25519(signing_key) => PublicKeyJwk {
                kty: KeyType::Okp,
                crv: Curve::Ed25519,
                x: Base64UrlUnpadded::encode_string(signing_key.verifying_key().as_bytes()),
                ..PublicKeyJwk::default()
            },
        };
        if !self.kid.is_empty() {
            jwk.kid = Some(self.kid.clone());
        }
        jwk
    }

    /// Sign the message.
    #[must_use]
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        match &self.secret {
            Secret::P256(secret) => {
                let signing_key = p256::ecdsa::SigningKey::from(secret);
                let sig: p256::ecdsa::Signature = signing_key.sign(msg);
                sig.to_bytes().to_vec()
            }
            Secret::Ed25519(signing_key) => {
                ed25519_dalek::Signer::sign(signing_key, msg).to_bytes().to_vec()
            }
        }
    }

    /// ECDH shared secret with the given P-256 public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key pair is not a P-256 key or the public key
    /// is not a valid P-256 point.
    pub fn diffie_hellman(&self, public_key: &PublicKeyJwk) -> anyhow::Result<Vec<u8>> {
        let Secret::P256(secret) = &self.secret else {
            return Err(anyhow!("key agreement requires a P-256 key"));
        };
        let public_key = p256::PublicKey::try_from(public_key)?;
        let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public_key.as_affine());
        Ok(shared.raw_secret_bytes().to_vec())
    }
}

impl Signer for KeyPair {
    async fn try_sign(&self, msg: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(self.sign(msg))
    }

    async fn public_key(&self) -> anyhow::Result<PublicKeyJwk> {
        Ok(self.public_jwk())
    }

    fn algorithm(&self) -> Algorithm {
        match self.secret {
            Secret::P256(_) => Algorithm::ES256,
            Secret::Ed25519(_) => Algorithm::EdDSA,
        }
    }

    fn verification_method(&self) -> String {
        self.kid.clone()
    }
}

impl Decryptor for KeyPair {
    fn public_key(&self) -> PublicKeyJwk {
        self.public_jwk()
    }

    async fn shared_secret(&self, sender_public_key: &PublicKeyJwk) -> anyhow::Result<Vec<u8>> {
        self.diffie_hellman(sender_public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify() {
        for curve in [Curve::P256, Curve::Ed25519] {
            let key = KeyPair::generate(curve);
            let sig = key.sign(b"payload");
            jws::verify(&key.public_jwk(), "payload", &sig).expect("should verify");
            assert!(jws::verify(&key.public_jwk(), "tampered", &sig).is_err());
        }
    }

    #[test]
    fn agreement() {
        let alice = KeyPair::generate(Curve::P256);
        let bob = KeyPair::generate(Curve::P256);

        let z1 = alice.diffie_hellman(&bob.public_jwk()).expect("should agree");
        let z2 = bob.diffie_hellman(&alice.public_jwk()).expect("should agree");
        assert_eq!(z1, z2);

        let eddsa = KeyPair::generate(Curve::Ed25519);
        assert!(eddsa.diffie_hellman(&bob.public_jwk()).is_err());
    }
}
