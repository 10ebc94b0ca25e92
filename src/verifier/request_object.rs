//! # Request Object Endpoint
//!
//! This endpoint is used by the Wallet to retrieve a previously created
//! Authorization Request Object sent by reference.
//!
//! The object is signed on first retrieval and retained: a repeated
//! retrieval within the reference's validity window returns the same JWT
//! without appending a further event. The request object MUST be returned as
//! an encoded JWT.

use std::future::Future;

use chrono::Utc;
use tracing::instrument;

use crate::verifier::create_request::sign;
use crate::verifier::provider::Provider;
use crate::verifier::state::{EventKind, TransactionState};
use crate::verifier::types::{JarMode, RequestObjectRequest, RequestObjectResponse};
use crate::verifier::{missing_transaction_id, Endpoint, Handler};
use crate::{Error, Result};

/// Endpoint for the Wallet to retrieve the Verifier's Request Object.
///
/// # Errors
///
/// Returns `Error::TransactionNotFound` for an unknown transaction and
/// `Error::InvalidStateTransition` once the transaction has moved on or the
/// reference has expired.
#[instrument(level = "debug", skip(endpoint))]
pub async fn request_object<P: Provider>(
    endpoint: &Endpoint<P>, request: RequestObjectRequest,
) -> Result<RequestObjectResponse> {
    tracing::debug!("request_object::process");

    if request.transaction_id.is_empty() {
        return Err(missing_transaction_id());
    }
    let entry = endpoint.transactions.get(&request.transaction_id).await?;
    let mut tx = entry.lock().await;

    if tx.jar_mode != JarMode::ByReference {
        return Err(Error::InvalidStateTransition(
            "request object was sent by value".into(),
        ));
    }
    if Utc::now() >= tx.request_expires_at {
        return Err(Error::InvalidStateTransition(
            "request object reference has expired".into(),
        ));
    }

    match tx.state {
        TransactionState::Initialized => {
            let jwt = sign(endpoint, &tx.request_object).await?;
            tx.transition(TransactionState::RequestRetrieved)?;
            tx.request_jwt = Some(jwt);
            tx.log(EventKind::RequestObjectRetrieved, None);
        }
        TransactionState::RequestRetrieved => {
            tracing::debug!("request_object::replay");
        }
        state => {
            return Err(Error::InvalidStateTransition(format!(
                "request object cannot be retrieved in {state}"
            )));
        }
    }

    let Some(jwt) = tx.request_jwt.clone() else {
        return Err(Error::ServerError("request object was not signed".into()));
    };
    Ok(RequestObjectResponse { request_object: jwt })
}

impl Handler for RequestObjectRequest {
    type Response = RequestObjectResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        request_object(endpoint, self)
    }
}
