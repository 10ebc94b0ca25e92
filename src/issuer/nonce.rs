//! # Nonce Endpoint
//!
//! Issues a `c_nonce` for the wallet to include in the key proofs of its next
//! Credential Request. The nonce is bound to the thumbprint of the wallet's
//! `DPoP` key and can be used once.

use std::future::Future;

use tracing::instrument;

use crate::dpop::Expected;
use crate::issuer::provider::Provider;
use crate::issuer::types::{NonceRequest, NonceResponse};
use crate::issuer::{Endpoint, Handler};
use crate::{Error, ProofError, Result};

/// Nonce request handler.
///
/// # Errors
///
/// Returns `Error::ProofInvalid` if the `DPoP` proof is missing or not valid
/// for the nonce endpoint.
#[instrument(level = "debug", skip(endpoint))]
pub async fn nonce<P: Provider>(
    endpoint: &Endpoint<P>, request: NonceRequest,
) -> Result<NonceResponse> {
    if request.dpop.is_empty() {
        return Err(Error::ProofInvalid(ProofError::Malformed("`DPoP` header missing".into())));
    }

    let expected = Expected {
        method: "POST",
        url: &endpoint.config.nonce_endpoint,
        ..Expected::default()
    };
    let proof = endpoint.proofs.validate_proof(&request.dpop, &expected)?;

    tracing::debug!("nonce::process");
    let nonce = endpoint.nonces.issue(&proof.jkt);

    Ok(NonceResponse { c_nonce: nonce.value })
}

impl Handler for NonceRequest {
    type Response = NonceResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        nonce(endpoint, self)
    }
}
