//! # Metadata Endpoint
//!
//! The Credential Issuer Metadata published at
//! `/.well-known/openid-credential-issuer`. Endpoint locations come from the
//! issuer configuration and the request encryption key from the issuer's
//! decryptor, so they always agree with what the endpoints accept.

use std::future::Future;

use tracing::instrument;

use crate::infosec::{Decryptor, Jwks, KeyUse, SecOps};
use crate::issuer::provider::{Metadata, Provider};
use crate::issuer::types::{
    MetadataRequest, MetadataResponse, RequestEncryption, SupportedResponseEncryption,
};
use crate::issuer::{Endpoint, Handler};
use crate::{invalid, server, Result};

const ENC_VALUES: [&str; 2] = ["A128GCM", "A256GCM"];

/// Metadata request handler.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` when the requested issuer is not the
/// configured issuer, or `Error::UpstreamUnavailable` when metadata cannot be
/// retrieved in time.
#[instrument(level = "debug", skip(endpoint))]
pub async fn metadata<P: Provider>(
    endpoint: &Endpoint<P>, request: MetadataRequest,
) -> Result<MetadataResponse> {
    tracing::debug!("metadata::process");

    let config = &endpoint.config;
    let requested = request.credential_issuer.trim_end_matches('/');
    if !requested.is_empty() && requested != config.credential_issuer {
        return Err(invalid!("unknown credential issuer {requested}"));
    }

    let mut issuer = endpoint
        .upstream(Metadata::issuer(&endpoint.provider, &config.credential_issuer), |e| {
            server!("issue getting metadata: {e}")
        })
        .await?;

    issuer.credential_issuer.clone_from(&config.credential_issuer);
    issuer.credential_endpoint.clone_from(&config.credential_endpoint);
    issuer.nonce_endpoint = Some(config.nonce_endpoint.clone());
    if issuer.authorization_servers.is_empty() {
        issuer.authorization_servers.clone_from(&config.authorization_servers);
    }

    let decryptor = SecOps::decryptor(&endpoint.provider, &config.credential_issuer)
        .map_err(|e| server!("issue getting decryptor: {e}"))?;
    let mut jwk = decryptor.public_key();
    jwk.alg = Some("ECDH-ES".into());
    jwk.use_ = Some(KeyUse::Encryption);

    issuer.credential_request_encryption = Some(RequestEncryption {
        jwks: Jwks { keys: vec![jwk] },
        enc_values_supported: ENC_VALUES.map(String::from).to_vec(),
        encryption_required: false,
    });
    issuer.credential_response_encryption = Some(SupportedResponseEncryption {
        alg_values_supported: vec!["ECDH-ES".into()],
        enc_values_supported: ENC_VALUES.map(String::from).to_vec(),
        encryption_required: false,
    });

    Ok(MetadataResponse {
        credential_issuer: issuer,
    })
}

impl Handler for MetadataRequest {
    type Response = MetadataResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        metadata(endpoint, self)
    }
}
