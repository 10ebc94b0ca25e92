//! # Transaction State
//!
//! A presentation transaction moves through
//!
//! ```text
//! INITIALIZED ─▶ REQUEST_RETRIEVED ─▶ RESPONSE_POSTED ─▶ VERIFIED
//! ```
//!
//! with `VERIFIED` terminal. Every step appends to an append-only event log.
//! A rejected wallet response is logged but leaves the state unchanged.
//!
//! Transactions are held in a [`TransactionStore`] behind a per-transaction
//! lock, so transitions on one transaction are serialized while different
//! transactions proceed independently.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::verifier::dcql::DcqlQuery;
use crate::verifier::types::{JarMode, RequestObject};
use crate::{Error, Result};

/// Lifecycle state of a presentation transaction.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Created; the request object has not been retrieved.
    #[default]
    Initialized,

    /// The wallet has retrieved the request object.
    RequestRetrieved,

    /// A wallet response has been received and is being verified.
    ResponsePosted,

    /// The wallet response has been verified. Terminal.
    Verified,
}

impl TransactionState {
    // Permitted transitions.
    const fn can_move_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initialized, Self::RequestRetrieved)
                | (Self::Initialized | Self::RequestRetrieved, Self::ResponsePosted)
                | (Self::ResponsePosted, Self::Verified)
        )
    }
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialized => "INITIALIZED",
            Self::RequestRetrieved => "REQUEST_RETRIEVED",
            Self::ResponsePosted => "RESPONSE_POSTED",
            Self::Verified => "VERIFIED",
        };
        write!(f, "{s}")
    }
}

/// Kinds of transaction event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// The transaction was created.
    TransactionInitialized,

    /// The wallet retrieved the request object.
    RequestObjectRetrieved,

    /// The wallet posted a response.
    WalletResponsePosted,

    /// The wallet response was verified.
    VerifierGotWalletResponse,

    /// The wallet response was rejected.
    WalletResponseRejected,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TransactionInitialized => "Transaction initialized",
            Self::RequestObjectRetrieved => "Request object retrieved",
            Self::WalletResponsePosted => "Wallet response posted",
            Self::VerifierGotWalletResponse => "Verifier got wallet response",
            Self::WalletResponseRejected => "Wallet response rejected",
        };
        write!(f, "{label}")
    }
}

/// An entry in a transaction's event log.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Event {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Event label.
    pub event: String,

    /// Error code of a rejected response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// A presentation transaction.
#[derive(Clone, Debug, Default)]
pub struct Transaction {
    /// Transaction identifier.
    pub id: String,

    /// Lifecycle state.
    pub state: TransactionState,

    /// The credentials requested.
    pub query: DcqlQuery,

    /// How the request object is delivered.
    pub jar_mode: JarMode,

    /// Request object claims, signed on delivery.
    pub request_object: RequestObject,

    /// The signed request object, once produced.
    pub request_jwt: Option<String>,

    /// Until when the request object may be (re-)retrieved.
    pub request_expires_at: DateTime<Utc>,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,

    /// Disclosed claims per credential query id, once verified.
    pub vp_token: HashMap<String, Vec<Map<String, Value>>>,

    events: Vec<Event>,
}

impl Transaction {
    /// Create a transaction in `INITIALIZED`, logging its creation.
    #[must_use]
    pub fn new(
        id: String, query: DcqlQuery, jar_mode: JarMode, request_object: RequestObject,
        request_ttl: TimeDelta,
    ) -> Self {
        let now = Utc::now();
        let mut tx = Self {
            id,
            query,
            jar_mode,
            request_object,
            request_expires_at: now + request_ttl,
            created_at: now,
            ..Self::default()
        };
        tx.log(EventKind::TransactionInitialized, None);
        tx
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the move is not permitted
    /// from the current state.
    pub fn transition(&mut self, next: TransactionState) -> Result<()> {
        if !self.state.can_move_to(next) {
            return Err(Error::InvalidStateTransition(format!(
                "transaction {} cannot move from {} to {next}",
                self.id, self.state
            )));
        }
        tracing::debug!(id = %self.id, from = %self.state, to = %next, "state::transition");
        self.state = next;
        Ok(())
    }

    /// Append an event to the log.
    pub fn log(&mut self, kind: EventKind, cause: Option<&str>) {
        self.events.push(Event {
            timestamp: Utc::now(),
            event: kind.to_string(),
            cause: cause.map(ToString::to_string),
        });
    }

    /// The event log, oldest first.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn is_expired(&self, retention: TimeDelta, now: DateTime<Utc>) -> bool {
        now >= self.created_at + retention
    }
}

/// Shared transaction store with retention-based eviction.
#[derive(Debug)]
pub struct TransactionStore {
    retention: TimeDelta,
    transactions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Transaction>>>>,
}

impl TransactionStore {
    /// Create a store retaining transactions for `retention` after creation.
    #[must_use]
    pub fn new(retention: TimeDelta) -> Self {
        Self {
            retention,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Add a new transaction.
    pub fn insert(&self, tx: Transaction) {
        let now = Utc::now();
        let mut transactions = self.transactions.lock().unwrap_or_else(PoisonError::into_inner);
        transactions.retain(|_, entry| {
            entry.try_lock().map_or(true, |tx| !tx.is_expired(self.retention, now))
        });
        transactions.insert(tx.id.clone(), Arc::new(tokio::sync::Mutex::new(tx)));
    }

    /// Get the transaction's lock handle.
    ///
    /// # Errors
    ///
    /// Returns `Error::TransactionNotFound` for unknown or expired
    /// transactions.
    pub async fn get(&self, id: &str) -> Result<Arc<tokio::sync::Mutex<Transaction>>> {
        let entry = {
            let transactions = self.transactions.lock().unwrap_or_else(PoisonError::into_inner);
            transactions.get(id).cloned()
        };
        let Some(entry) = entry else {
            return Err(Error::TransactionNotFound(id.to_string()));
        };

        if entry.lock().await.is_expired(self.retention, Utc::now()) {
            self.transactions.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
            return Err(Error::TransactionNotFound(id.to_string()));
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use assert_let_bind::assert_let;

    use super::*;

    fn transaction(id: &str) -> Transaction {
        Transaction::new(
            id.into(),
            DcqlQuery::default(),
            JarMode::ByReference,
            RequestObject::default(),
            TimeDelta::minutes(5),
        )
    }

    #[test]
    fn transitions() {
        let mut tx = transaction("t1");
        assert_eq!(tx.events().len(), 1);
        assert_eq!(tx.events()[0].event, "Transaction initialized");

        assert_let!(Err(Error::InvalidStateTransition(_)), tx.transition(TransactionState::Verified));
        tx.transition(TransactionState::RequestRetrieved).expect("should move");
        assert_let!(
            Err(Error::InvalidStateTransition(_)),
            tx.transition(TransactionState::RequestRetrieved)
        );
        tx.transition(TransactionState::ResponsePosted).expect("should move");
        tx.transition(TransactionState::Verified).expect("should move");

        // terminal
        for next in [
            TransactionState::Initialized,
            TransactionState::RequestRetrieved,
            TransactionState::ResponsePosted,
            TransactionState::Verified,
        ] {
            assert!(tx.transition(next).is_err());
        }
    }

    #[tokio::test]
    async fn store_lookup() {
        let store = TransactionStore::new(TimeDelta::hours(1));
        store.insert(transaction("t1"));

        let entry = store.get("t1").await.expect("should exist");
        assert_eq!(entry.lock().await.state, TransactionState::Initialized);
        assert_let!(Err(Error::TransactionNotFound(_)), store.get("t2").await);
    }

    #[tokio::test]
    async fn store_retention() {
        let store = TransactionStore::new(TimeDelta::zero());
        store.insert(transaction("t1"));
        assert_let!(Err(Error::TransactionNotFound(_)), store.get("t1").await);
    }
}
