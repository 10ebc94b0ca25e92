//! # Response Endpoint
//!
//! This endpoint is where the Wallet posts its Authorization Response
//! (`response_mode=direct_post`): the `state` from the request object and a
//! `vp_token` holding presentations keyed by DCQL credential query id.
//!
//! Every presentation must verify, with key binding to the transaction's
//! nonce and the verifier's client identifier, and the satisfied queries
//! must meet the query's credential sets. Anything less rejects the whole
//! response: the rejection is logged and the transaction keeps its state so
//! the wallet may try again.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use serde_json::{Map, Value};
use tracing::instrument;

use crate::presentation;
use crate::verifier::provider::{IssuerTrust, Provider};
use crate::verifier::state::{EventKind, Transaction, TransactionState};
use crate::verifier::types::{JarMode, ResponseRequest, ResponseResponse};
use crate::verifier::{missing_transaction_id, Endpoint, Handler};
use crate::{invalid, server, Error, Result};

/// Endpoint for the Wallet to respond to the Verifier's Authorization Request.
///
/// # Errors
///
/// Returns `Error::TransactionNotFound` for an unknown transaction,
/// `Error::InvalidStateTransition` when the transaction is not awaiting a
/// response, the presentation error when a presentation fails verification,
/// and `Error::PresentationIncomplete` when the credential sets are not met.
#[instrument(level = "debug", skip(endpoint))]
pub async fn response<P: Provider>(
    endpoint: &Endpoint<P>, request: ResponseRequest,
) -> Result<ResponseResponse> {
    if request.transaction_id.is_empty() {
        return Err(missing_transaction_id());
    }
    let entry = endpoint.transactions.get(&request.transaction_id).await?;
    let mut tx = entry.lock().await;

    // terminal transactions are immutable
    if tx.state == TransactionState::Verified {
        return Err(Error::InvalidStateTransition(format!(
            "transaction {} is already verified",
            tx.id
        )));
    }

    let verified = match verify(endpoint, &tx, &request).await {
        Ok(verified) => verified,
        Err(e) => {
            tracing::warn!(id = %tx.id, code = e.code(), "response::rejected");
            tx.log(EventKind::WalletResponseRejected, Some(e.code()));
            return Err(e);
        }
    };

    tracing::debug!("response::process");
    tx.transition(TransactionState::ResponsePosted)?;
    tx.log(EventKind::WalletResponsePosted, None);
    tx.vp_token = verified;
    tx.transition(TransactionState::Verified)?;
    tx.log(EventKind::VerifierGotWalletResponse, None);

    Ok(ResponseResponse { state: tx.state })
}

impl Handler for ResponseRequest {
    type Response = ResponseResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        response(endpoint, self)
    }
}

// Verify the response against the transaction, returning the disclosed
// claims of each satisfied credential query.
async fn verify<P: Provider>(
    endpoint: &Endpoint<P>, tx: &Transaction, request: &ResponseRequest,
) -> Result<HashMap<String, Vec<Map<String, Value>>>> {
    tracing::debug!("response::verify");

    let awaiting = match tx.state {
        TransactionState::RequestRetrieved => true,
        TransactionState::Initialized => tx.jar_mode == JarMode::ByValue,
        _ => false,
    };
    if !awaiting {
        return Err(Error::InvalidStateTransition(format!(
            "transaction {} is not awaiting a response in {}",
            tx.id, tx.state
        )));
    }
    if request.state != tx.request_object.state {
        return Err(invalid!("`state` does not match the request"));
    }

    let anchors = IssuerTrust::issuer_keys(&endpoint.provider)
        .await
        .map_err(|e| server!("issue getting issuer keys: {e}"))?;

    let mut satisfied = HashSet::new();
    let mut disclosed = HashMap::new();

    for (id, presentations) in &request.vp_token.0 {
        let Some(query) = tx.query.credential(id) else {
            tracing::debug!(id, "response::unrequested");
            continue;
        };
        if presentations.len() > 1 && !query.multiple {
            return Err(invalid!("multiple presentations for {id}"));
        }

        let mut claims = Vec::with_capacity(presentations.len());
        for token in presentations.iter() {
            let presented = presentation::validate(
                token,
                &tx.request_object.nonce,
                &endpoint.config.client_id,
                &anchors,
            )?;
            if !query.matches(&presented) {
                tracing::debug!(id, "response::unmatched");
                claims.clear();
                break;
            }
            claims.push(presented.disclosed);
        }
        if !claims.is_empty() {
            satisfied.insert(id.as_str());
            disclosed.insert(id.clone(), claims);
        }
    }

    tx.query.satisfied(&satisfied)?;
    Ok(disclosed)
}
