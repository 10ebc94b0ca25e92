//! # `OpenID` for Verifiable Presentations
//!
//! The verifier side of the ecosystem: presentation transactions requesting
//! SD-JWT VCs with a DCQL query, and verification of the wallet's response.
//!
//! ```text
//! create_request ──▶ INITIALIZED        "Transaction initialized"
//! request_object ──▶ REQUEST_RETRIEVED  "Request object retrieved"
//! response       ──▶ RESPONSE_POSTED    "Wallet response posted"
//!                └─▶ VERIFIED           "Verifier got wallet response"
//! ```
//!
//! Each request is handled by a message type implementing [`Handler`],
//! routed through [`Endpoint::handle`].

mod create_request;
pub mod dcql;
mod metadata;
pub mod provider;
mod request_object;
mod response;
pub mod state;
mod status;
pub mod types;
mod validate;

use std::fmt::Debug;
use std::future::Future;

pub use self::create_request::create_request;
pub use self::metadata::metadata;
pub use self::provider::Provider;
pub use self::request_object::request_object;
pub use self::response::response;
pub use self::status::{events, status};
pub use self::types::*;
pub use self::validate::validate_sd_jwt_vc;
use self::state::TransactionStore;
use crate::settings::VerifierConfig;
use crate::{invalid, Error, Result};

/// Verifier endpoint state: the provider, configuration and transaction
/// store.
#[derive(Debug)]
pub struct Endpoint<P> {
    provider: P,
    config: VerifierConfig,
    transactions: TransactionStore,
}

impl<P: Provider> Endpoint<P> {
    /// Create an endpoint with an empty transaction store.
    #[must_use]
    pub fn new(provider: P, config: VerifierConfig) -> Self {
        Self {
            transactions: TransactionStore::new(config.retention),
            provider,
            config,
        }
    }

    /// Handle incoming messages.
    ///
    /// # Errors
    ///
    /// This method can fail for a number of reasons related to the incoming
    /// message's viability. Expected failures include unknown transactions,
    /// out of order requests, and presentations that fail verification.
    ///
    /// Implementers should look to the Error type and description for more
    /// information on the reason for failure.
    pub async fn handle<T>(&self, message: impl Handler<Response = T>) -> Result<T> {
        message.validate(self).await?;
        message.handle(self).await
    }

    /// The verifier configuration.
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    fn response_uri(&self, transaction_id: &str) -> String {
        format!("{}/wallet/direct_post/{transaction_id}", self.config.public_url)
    }

    fn request_uri(&self, transaction_id: &str) -> String {
        format!("{}/wallet/request.jwt/{transaction_id}", self.config.public_url)
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
        let unconfigured = endpoint.config.client_id.is_empty();
        async move {
            if unconfigured {
                return Err(invalid!("no `client_id` configured"));
            }
            Ok(())
        }
    }
}

// Error raised for a transaction id absent from a request.
fn missing_transaction_id() -> Error {
    invalid!("no `transaction_id` specified")
}
