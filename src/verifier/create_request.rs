//! # Create Request Endpoint
//!
//! Initializes a presentation transaction for a DCQL query and prepares the
//! Authorization Request Object for the wallet.
//!
//! The request object may be sent by value or by reference as defined in
//! JWT-Secured Authorization Request (JAR) [RFC9101](https://www.rfc-editor.org/rfc/rfc9101).
//! By value, the signed object is returned immediately. By reference, the
//! response carries a `request_uri` and the object is signed when the wallet
//! first retrieves it.

use std::future::Future;

use chrono::Utc;
use tracing::instrument;

use crate::core::generate;
use crate::infosec::jws::{self, Type};
use crate::infosec::{SecOps, Signer};
use crate::verifier::provider::Provider;
use crate::verifier::state::Transaction;
use crate::verifier::types::{
    CreateRequestRequest, CreateRequestResponse, JarMode, RequestObject, RequestUriMethod,
};
use crate::verifier::{Endpoint, Handler};
use crate::{server, Result};

/// Initiate a presentation transaction.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` if the DCQL query is malformed, or
/// `Error::ServerError` if the request object cannot be signed.
#[instrument(level = "debug", skip(endpoint))]
pub async fn create_request<P: Provider>(
    endpoint: &Endpoint<P>, request: CreateRequestRequest,
) -> Result<CreateRequestResponse> {
    verify(&request)?;
    process(endpoint, request).await
}

impl Handler for CreateRequestRequest {
    type Response = CreateRequestResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        create_request(endpoint, self)
    }
}

fn verify(request: &CreateRequestRequest) -> Result<()> {
    tracing::debug!("create_request::verify");
    request.dcql_query.validate()
}

async fn process<P: Provider>(
    endpoint: &Endpoint<P>, request: CreateRequestRequest,
) -> Result<CreateRequestResponse> {
    tracing::debug!("create_request::process");

    let config = &endpoint.config;
    let transaction_id = generate::transaction_id();
    let now = Utc::now();

    let request_object = RequestObject {
        response_type: "vp_token".into(),
        response_mode: "direct_post".into(),
        client_id: config.client_id.clone(),
        response_uri: endpoint.response_uri(&transaction_id),
        nonce: request.nonce.clone().unwrap_or_else(generate::nonce),
        state: generate::state_key(),
        dcql_query: request.dcql_query.clone(),
        aud: "https://self-issued.me/v2".into(),
        iat: now.timestamp(),
        exp: (now + config.request_ttl).timestamp(),
    };

    let mut tx = Transaction::new(
        transaction_id.clone(),
        request.dcql_query,
        request.jar_mode,
        request_object,
        config.request_ttl,
    );

    let mut response = CreateRequestResponse {
        transaction_id: transaction_id.clone(),
        client_id: config.client_id.clone(),
        ..CreateRequestResponse::default()
    };

    match request.jar_mode {
        JarMode::ByValue => {
            let jwt = sign(endpoint, &tx.request_object).await?;
            tx.request_jwt = Some(jwt.clone());
            response.request = Some(jwt);
        }
        JarMode::ByReference => {
            response.request_uri = Some(endpoint.request_uri(&transaction_id));
            response.request_uri_method =
                Some(request.request_uri_method.unwrap_or(RequestUriMethod::Get));
        }
    }

    endpoint.transactions.insert(tx);

    Ok(response)
}

// Sign the request object with the verifier's key.
pub(super) async fn sign<P: Provider>(
    endpoint: &Endpoint<P>, request_object: &RequestObject,
) -> Result<String> {
    let signer = SecOps::signer(&endpoint.provider, &endpoint.config.client_id)
        .map_err(|e| server!("issue getting signer: {e}"))?;
    let kid = jws::Key::KeyId(signer.verification_method());
    jws::encode(Type::Request, request_object, kid, &signer)
        .await
        .map_err(|e| server!("issue signing request object: {e}"))
}
