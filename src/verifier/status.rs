//! # Status Endpoints
//!
//! Transaction status and event log, for the verifier's front end.

use std::future::Future;

use tracing::instrument;

use crate::verifier::provider::Provider;
use crate::verifier::state::TransactionState;
use crate::verifier::types::{
    EventsRequest, EventsResponse, Status, StatusRequest, StatusResponse,
};
use crate::verifier::{missing_transaction_id, Endpoint, Handler};
use crate::Result;

/// Current state of a transaction and, once verified, the disclosed claims.
///
/// # Errors
///
/// Returns `Error::TransactionNotFound` for an unknown transaction.
#[instrument(level = "debug", skip(endpoint))]
pub async fn status<P: Provider>(
    endpoint: &Endpoint<P>, request: StatusRequest,
) -> Result<StatusResponse> {
    tracing::debug!("status::process");

    if request.transaction_id.is_empty() {
        return Err(missing_transaction_id());
    }
    let entry = endpoint.transactions.get(&request.transaction_id).await?;
    let tx = entry.lock().await;

    let status = if tx.state == TransactionState::Verified {
        Status::Verified
    } else {
        Status::Pending
    };
    Ok(StatusResponse {
        status,
        state: tx.state,
        vp_token: tx.vp_token.clone(),
    })
}

/// The transaction's event log, in insertion order.
///
/// # Errors
///
/// Returns `Error::TransactionNotFound` for an unknown transaction.
#[instrument(level = "debug", skip(endpoint))]
pub async fn events<P: Provider>(
    endpoint: &Endpoint<P>, request: EventsRequest,
) -> Result<EventsResponse> {
    tracing::debug!("events::process");

    if request.transaction_id.is_empty() {
        return Err(missing_transaction_id());
    }
    let entry = endpoint.transactions.get(&request.transaction_id).await?;
    let tx = entry.lock().await;

    Ok(EventsResponse {
        transaction_id: tx.id.clone(),
        events: tx.events().to_vec(),
    })
}

impl Handler for StatusRequest {
    type Response = StatusResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        status(endpoint, self)
    }
}

impl Handler for EventsRequest {
    type Response = EventsResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        events(endpoint, self)
    }
}
