//! # Issuer Provider
//!
//! Traits implemented by the host application to supply metadata, subject
//! data, token introspection, attestation trust and key operations to the
//! issuer endpoints.

use std::future::Future;

use anyhow::Result;

pub use crate::infosec::{Decryptor, SecOps, Signer};
use crate::infosec::PublicKeyJwk;
use crate::issuer::types::{Dataset, Issuer, TokenInfo};

/// Issuer Provider trait.
pub trait Provider: Metadata + Subject + Authorization + Attestation + SecOps + Clone {}

/// The `Metadata` trait is used by implementers to provide `Issuer` metadata
/// to the library.
pub trait Metadata: Send + Sync {
    /// Credential Issuer metadata for the specified issuer.
    fn issuer(&self, issuer_id: &str) -> impl Future<Output = Result<Issuer>> + Send;
}

/// The Subject trait specifies how the library expects issuance subject (user)
/// information to be provided by implementers.
pub trait Subject: Send + Sync {
    /// Returns a populated `Dataset` object for the given subject (holder) and
    /// credential configuration.
    fn dataset(
        &self, subject_id: &str, credential_configuration_id: &str,
    ) -> impl Future<Output = Result<Dataset>> + Send;
}

/// Access token introspection, delegated to the identity provider.
pub trait Authorization: Send + Sync {
    /// Introspect the access token.
    fn introspect(&self, access_token: &str) -> impl Future<Output = Result<TokenInfo>> + Send;
}

/// Trust anchors of the wallet attestation authority.
pub trait Attestation: Send + Sync {
    /// Keys trusted to sign wallet and key attestations.
    fn trust_anchors(&self) -> impl Future<Output = Result<Vec<PublicKeyJwk>>> + Send;
}
