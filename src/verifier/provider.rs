//! # Verifier Provider
//!
//! Traits implemented by the host application to supply client metadata,
//! issuer trust anchors and request object signing to the verifier
//! endpoints.

use std::future::Future;

use anyhow::Result;

pub use crate::infosec::{SecOps, Signer};
use crate::infosec::PublicKeyJwk;
use crate::verifier::types::VerifierMetadata;

/// Verifier Provider trait.
pub trait Provider: Metadata + IssuerTrust + SecOps + Clone {}

/// The `Metadata` trait is used by implementers to provide `Verifier` (client)
/// metadata to the library.
pub trait Metadata: Send + Sync {
    /// Verifier (Client) metadata for the specified verifier.
    fn verifier(&self, client_id: &str) -> impl Future<Output = Result<VerifierMetadata>> + Send;
}

/// Credential issuers whose signatures the verifier accepts.
pub trait IssuerTrust: Send + Sync {
    /// Keys trusted to sign presented credentials.
    fn issuer_keys(&self) -> impl Future<Output = Result<Vec<PublicKeyJwk>>> + Send;
}
