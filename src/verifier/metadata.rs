//! # Metadata Endpoint
//!
//! This endpoint is used to make Verifier metadata available to the Wallet.
//!
//! As the Verifier is a client to the Wallet's Authorization Server, this
//! endpoint returns Client metadata as defined in [RFC7591](https://www.rfc-editor.org/rfc/rfc7591).

use std::future::Future;

use tracing::instrument;

use crate::infosec::Algorithm;
use crate::sd_jwt::FORMAT_SD_JWT_VC;
use crate::verifier::provider::{Metadata, Provider};
use crate::verifier::types::{MetadataRequest, MetadataResponse, VpFormat};
use crate::verifier::{Endpoint, Handler};
use crate::{invalid, server, Result};

/// Endpoint for Wallets to request Verifier (Client) metadata.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` for a client other than the configured
/// verifier, or `Error::ServerError` if the provider cannot supply metadata.
#[instrument(level = "debug", skip(endpoint))]
pub async fn metadata<P: Provider>(
    endpoint: &Endpoint<P>, request: MetadataRequest,
) -> Result<MetadataResponse> {
    tracing::debug!("metadata::process");

    let client_id = &endpoint.config.client_id;
    if !request.client_id.is_empty() && &request.client_id != client_id {
        return Err(invalid!("unknown client {}", request.client_id));
    }

    let mut client = Metadata::verifier(&endpoint.provider, client_id)
        .await
        .map_err(|e| server!("issue getting metadata: {e}"))?;

    let algs = [Algorithm::ES256, Algorithm::EdDSA].map(|a| a.to_string()).to_vec();
    client.client_id.clone_from(client_id);
    client.vp_formats_supported.entry(FORMAT_SD_JWT_VC.into()).or_insert_with(|| VpFormat {
        sd_jwt_alg_values: algs.clone(),
        kb_jwt_alg_values: algs.clone(),
    });
    if client.request_object_signing_alg_values_supported.is_empty() {
        client.request_object_signing_alg_values_supported = algs;
    }

    Ok(MetadataResponse { client })
}

impl Handler for MetadataRequest {
    type Response = MetadataResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        metadata(endpoint, self)
    }
}
