//! A wallet and its wallet provider: `DPoP` and holder keys, wallet unit
//! attestations, key proofs, and presentations.

use chrono::{TimeDelta, Utc};
use wallet_ecosystem::dpop::{self, ProofParams};
use wallet_ecosystem::infosec::jws::{self, Header, Key, Type};
use wallet_ecosystem::infosec::{Curve, KeyPair, PublicKeyJwk, Signer};
use wallet_ecosystem::issuer::{AttestationClaims, AttestationCnf, ProofClaims};
use wallet_ecosystem::sd_jwt::{self, KbParams};

/// Issuer of wallet unit attestations.
pub const WALLET_PROVIDER: &str = "https://localhost/wallet-provider";

#[derive(Clone, Debug)]
pub struct Wallet {
    /// Key the wallet's `DPoP` proofs are signed with.
    pub dpop_key: KeyPair,

    /// Key issued credentials are bound to.
    pub holder_key: KeyPair,

    /// The wallet provider's attestation signing key.
    pub authority: KeyPair,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dpop_key: KeyPair::generate(Curve::P256),
            holder_key: KeyPair::generate(Curve::P256),
            authority: KeyPair::generate(Curve::P256).with_kid("wallet-provider"),
        }
    }

    /// The key issuers trust for wallet attestations.
    #[must_use]
    pub fn wallet_provider_jwk(&self) -> PublicKeyJwk {
        self.authority.public_jwk()
    }

    /// Thumbprint of the `DPoP` key, as bound into access tokens.
    #[must_use]
    pub fn jkt(&self) -> String {
        let mut jwk = self.dpop_key.public_jwk();
        jwk.kid = None;
        jwk.thumbprint()
    }

    /// A `DPoP` proof for `POST` to `url`.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub async fn dpop(&self, url: &str, access_token: Option<&str>) -> String {
        let params = ProofParams {
            method: "POST",
            url,
            access_token,
            nonce: None,
        };
        dpop::create_proof(&self.dpop_key, &params).await.expect("should create proof")
    }

    /// A wallet unit attestation for `key`, signed by `authority`.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub async fn attestation(&self, authority: &KeyPair, key: &PublicKeyJwk) -> String {
        let claims = AttestationClaims {
            iss: Some(WALLET_PROVIDER.into()),
            iat: Some(Utc::now().timestamp()),
            exp: (Utc::now() + TimeDelta::hours(1)).timestamp(),
            cnf: Some(AttestationCnf { jwk: key.clone() }),
            ..AttestationClaims::default()
        };
        let kid = Key::KeyId(authority.kid().to_string());
        jws::encode(Type::Attestation, &claims, kid, authority).await.expect("should encode")
    }

    /// A key proof for the holder key, attested by the wallet provider.
    pub async fn proof(&self, aud: &str, nonce: &str) -> String {
        let wua = self.attestation(&self.authority, &self.holder_key.public_jwk()).await;
        self.proof_with(&self.holder_key, aud, nonce, Some(wua)).await
    }

    /// A key proof signed by `key`, optionally carrying an attestation.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub async fn proof_with(
        &self, key: &KeyPair, aud: &str, nonce: &str, wua: Option<String>,
    ) -> String {
        let claims = ProofClaims {
            iss: None,
            aud: aud.to_string(),
            iat: Utc::now().timestamp(),
            nonce: Some(nonce.to_string()),
            wua,
        };
        let mut jwk = key.public_jwk();
        jwk.kid = None;
        jws::encode(Type::Proof, &claims, Key::Jwk(jwk), key).await.expect("should encode")
    }

    /// A key proof signed by `key` with the attestation in the `key_attestation`
    /// header rather than the claims.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub async fn proof_attested_in_header(
        &self, key: &KeyPair, aud: &str, nonce: &str, attestation: String,
    ) -> String {
        let claims = ProofClaims {
            iss: None,
            aud: aud.to_string(),
            iat: Utc::now().timestamp(),
            nonce: Some(nonce.to_string()),
            wua: None,
        };
        let mut jwk = key.public_jwk();
        jwk.kid = None;
        let header = Header {
            alg: key.algorithm(),
            typ: Type::Proof,
            key: Key::Jwk(jwk),
            key_attestation: Some(attestation),
        };
        jws::encode_with(&header, &claims, key).await.expect("should encode")
    }

    /// Present `credential` to a verifier, revealing only the named claims.
    ///
    /// # Panics
    ///
    /// Panics if the credential cannot be presented.
    pub async fn present(
        &self, credential: &str, reveal: &[&str], aud: &str, nonce: &str,
    ) -> String {
        let kb = KbParams { aud, nonce };
        sd_jwt::present(credential, reveal, &kb, &self.holder_key).await.expect("should present")
    }
}
