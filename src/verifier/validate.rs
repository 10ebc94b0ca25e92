//! # SD-JWT VC Validation Utility
//!
//! Validates a standalone SD-JWT VC outside any presentation transaction,
//! returning its claims flattened into a single object.

use std::future::Future;

use tracing::instrument;

use crate::verifier::provider::{IssuerTrust, Provider};
use crate::verifier::types::{ValidateRequest, ValidateResponse};
use crate::verifier::{Endpoint, Handler};
use crate::{invalid, presentation, sd_jwt, server, Result};

/// Validate an SD-JWT VC against the trusted issuer keys.
///
/// With a `nonce` the token must carry a key binding JWT for that nonce and
/// the verifier's client identifier. Without one, only the issuer-signed
/// part is verified and any key binding JWT is ignored.
///
/// # Errors
///
/// Returns the credential or key binding verification error.
#[instrument(level = "debug", skip(endpoint))]
pub async fn validate_sd_jwt_vc<P: Provider>(
    endpoint: &Endpoint<P>, request: ValidateRequest,
) -> Result<ValidateResponse> {
    tracing::debug!("validate::process");

    if request.sd_jwt_vc.is_empty() {
        return Err(invalid!("no `sd_jwt_vc` specified"));
    }
    let anchors = IssuerTrust::issuer_keys(&endpoint.provider)
        .await
        .map_err(|e| server!("issue getting issuer keys: {e}"))?;

    let mut claims = match &request.nonce {
        Some(nonce) => {
            let client_id = &endpoint.config.client_id;
            presentation::validate(&request.sd_jwt_vc, nonce, client_id, &anchors)?.claims
        }
        None => {
            let (credential, _) = sd_jwt::split_presentation(&request.sd_jwt_vc)?;
            sd_jwt::verify(credential, &anchors)?.claims
        }
    };
    claims.remove("cnf");

    Ok(ValidateResponse { claims })
}

impl Handler for ValidateRequest {
    type Response = ValidateResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        validate_sd_jwt_vc(endpoint, self)
    }
}
