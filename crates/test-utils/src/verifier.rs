//! Verifier provider: client metadata, trusted PID issuer keys, and the
//! request object signing key.

use anyhow::{anyhow, Result};
use wallet_ecosystem::infosec::{Curve, Decryptor, KeyPair, PublicKeyJwk, SecOps, Signer};
use wallet_ecosystem::verifier::provider::{IssuerTrust, Metadata};
use wallet_ecosystem::verifier::VerifierMetadata;

/// The verifier's client identifier, and the audience of key binding JWTs.
pub const VERIFIER_AUDIENCE: &str = "x509_san_dns:refimpl-verifier-backend.wallet.local";

#[derive(Clone, Debug)]
pub struct Provider {
    signing: KeyPair,
    issuers: Vec<PublicKeyJwk>,
}

impl Provider {
    /// A provider accepting credentials signed by any of `issuers`.
    #[must_use]
    pub fn new(issuers: Vec<PublicKeyJwk>) -> Self {
        Self {
            signing: KeyPair::generate(Curve::P256).with_kid("verifier-request-signing"),
            issuers,
        }
    }

    /// The key request objects are signed with.
    #[must_use]
    pub fn request_jwk(&self) -> PublicKeyJwk {
        self.signing.public_jwk()
    }
}

impl wallet_ecosystem::verifier::Provider for Provider {}

impl Metadata for Provider {
    async fn verifier(&self, client_id: &str) -> Result<VerifierMetadata> {
        Ok(VerifierMetadata {
            client_id: client_id.to_string(),
            client_name: Some("Wallet Ecosystem Verifier".into()),
            ..VerifierMetadata::default()
        })
    }
}

impl IssuerTrust for Provider {
    async fn issuer_keys(&self) -> Result<Vec<PublicKeyJwk>> {
        Ok(self.issuers.clone())
    }
}

impl SecOps for Provider {
    fn signer(&self, _identifier: &str) -> Result<impl Signer> {
        Ok(self.signing.clone())
    }

    fn decryptor(&self, _identifier: &str) -> Result<impl Decryptor> {
        Err::<KeyPair, _>(anyhow!("verifier does not decrypt"))
    }
}
