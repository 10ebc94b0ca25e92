//! # `OpenID` for Verifiable Credential Issuance
//!
//! The issuer side of the ecosystem: nonce, credential, and metadata
//! endpoints for SD-JWT VC issuance to wallets holding `DPoP`-bound access
//! tokens.
//!
//! ```text
//! wallet ── DPoP ──▶ nonce       ──▶ { c_nonce }
//! wallet ── DPoP ──▶ credential  ──▶ { credentials: [...] } (optionally JWE)
//!                    └─ token binding, key proofs, nonce, attestation
//! ```
//!
//! Each request is handled by a message type implementing [`Handler`],
//! routed through [`Endpoint::handle`].

mod attestation;
mod credential;
mod metadata;
mod nonce;
pub mod provider;
pub mod types;

use std::fmt::Debug;
use std::future::Future;

pub use self::credential::credential;
pub use self::metadata::metadata;
pub use self::nonce::nonce;
pub use self::provider::Provider;
pub use self::types::*;
use crate::dpop::ProofValidator;
use crate::nonce::NonceService;
use crate::settings::IssuerConfig;
use crate::{invalid, Error, Result};

/// Issuer endpoint state: the provider, configuration, and the stores shared
/// between requests.
#[derive(Debug)]
pub struct Endpoint<P> {
    provider: P,
    config: IssuerConfig,
    nonces: NonceService,
    proofs: ProofValidator,
}

impl<P: Provider> Endpoint<P> {
    /// Create an endpoint with fresh nonce and `DPoP` replay stores.
    #[must_use]
    pub fn new(provider: P, config: IssuerConfig) -> Self {
        Self {
            nonces: NonceService::new(config.nonce_ttl),
            proofs: ProofValidator::new(config.skew),
            provider,
            config,
        }
    }

    /// Handle incoming messages.
    ///
    /// # Errors
    ///
    /// This method can fail for a number of reasons related to the incoming
    /// message's viability. Expected failures include invalid proofs of
    /// possession, stale nonces, and untrusted attestations.
    ///
    /// Implementers should look to the Error type and description for more
    /// information on the reason for failure.
    pub async fn handle<T>(&self, message: impl Handler<Response = T>) -> Result<T> {
        message.validate(self).await?;
        message.handle(self).await
    }

    /// The issuer configuration.
    pub const fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// The nonce service backing the nonce endpoint.
    pub const fn nonces(&self) -> &NonceService {
        &self.nonces
    }

    // Await a call to an external collaborator, bounded by the configured
    // upstream timeout.
    async fn upstream<T, F>(
        &self, call: F, on_err: impl FnOnce(anyhow::Error) -> Error + Send,
    ) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>> + Send,
    {
        match tokio::time::timeout(self.config.upstream_timeout, call).await {
            Ok(result) => result.map_err(on_err),
            Err(_) => Err(Error::UpstreamUnavailable(format!(
                "no response within {:?}",
                self.config.upstream_timeout
            ))),
        }
    }
}

/// Methods common to all messages.
///
/// The primary role of this trait is to provide a common interface for
/// messages so they can be handled by [`Endpoint::handle`].
pub trait Handler: Clone + Debug + Send + Sync {
    /// The inner reply type specific to the implementing message.
    type Response;

    /// Routes the message to the concrete handler used to process the message.
    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send;

    /// Perform initial validation of the message.
    ///
    /// Validation undertaken here is common to all messages, with message-
    /// specific validation performed by the message's handler.
    fn validate<P: Provider>(
        &self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<()>> + Send {
        let unconfigured = endpoint.config.credential_issuer.is_empty();
        async move {
            if unconfigured {
                return Err(invalid!("no `credential_issuer` configured"));
            }
            Ok(())
        }
    }
}
