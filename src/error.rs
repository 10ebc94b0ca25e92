//! # Errors
//!
//! Errors returned by the issuance and presentation handlers. Each variant
//! maps to a stable, distinct `code()` so clients can tell "retry with a new
//! nonce" apart from "request is fundamentally invalid", and to the `OAuth`
//! error value used on the wire.

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Issuance and presentation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The `DPoP` proof presented with the request is not acceptable.
    #[error("invalid DPoP proof: {0}")]
    ProofInvalid(#[from] ProofError),

    /// The nonce presented with the request is not acceptable.
    #[error("invalid nonce: {0}")]
    Nonce(#[from] NonceError),

    /// A key proof in the credential request is invalid.
    #[error("invalid key proof: {0}")]
    KeyProofInvalid(String),

    /// The wallet or key attestation could not be verified.
    #[error("invalid attestation: {0}")]
    AttestationInvalid(String),

    /// The encrypted request could not be decrypted.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The response could not be encrypted to the requester's key.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// A disclosure's digest is not committed to by the issuer signature.
    #[error("disclosure not bound: {0}")]
    DisclosureNotBound(String),

    /// A disclosure could not be decoded or is structurally invalid.
    #[error("malformed disclosure: {0}")]
    MalformedDisclosure(String),

    /// The credential issuer's signature could not be verified.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// The key binding JWT is missing, unsigned by the holder key, or bound
    /// to different credential material.
    #[error("key binding mismatch: {0}")]
    KeyBindingMismatch(String),

    /// The key binding JWT `aud` is not the relying party.
    #[error("audience mismatch: {0}")]
    AudienceMismatch(String),

    /// The key binding JWT `nonce` is not the one issued for the exchange.
    #[error("nonce mismatch: {0}")]
    NonceMismatch(String),

    /// The presented credential has expired.
    #[error("credential expired: {0}")]
    CredentialExpired(String),

    /// The submitted presentations do not satisfy the declared query.
    #[error("presentation incomplete: {0}")]
    PresentationIncomplete(String),

    /// No presentation transaction exists for the identifier.
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    /// The operation is not valid in the transaction's current state.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// An external collaborator failed or did not answer in time.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The access token is unknown, inactive, or not valid for the request.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The request is missing a required parameter or is otherwise malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An unexpected condition prevented the request from being fulfilled.
    #[error("server error: {0}")]
    ServerError(String),
}

/// `DPoP` proof failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// The proof signature does not verify against the embedded key.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The proof `iat` is outside the accepted skew window.
    #[error("proof expired: {0}")]
    Expired(String),

    /// The proof `htm` or `htu` does not match the request.
    #[error("target mismatch: {0}")]
    TargetMismatch(String),

    /// The proof `jti` has already been seen for this key.
    #[error("proof replayed: {0}")]
    Replayed(String),

    /// The proof key is not the key the access token is bound to.
    #[error("unbound key: {0}")]
    UnboundKey(String),

    /// The proof could not be parsed or is missing required members.
    #[error("malformed proof: {0}")]
    Malformed(String),
}

/// Nonce failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceError {
    /// The nonce was never issued, or was issued to another subject.
    #[error("nonce unknown")]
    Unknown,

    /// The nonce has passed its expiry.
    #[error("nonce expired")]
    Expired,

    /// The nonce has already been consumed.
    #[error("nonce already consumed")]
    AlreadyConsumed,

    /// A nonce is required but none was presented.
    #[error("nonce required")]
    Required,
}

impl Error {
    /// Stable, distinct error code for the failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ProofInvalid(e) => match e {
                ProofError::InvalidSignature(_) => "proof_invalid_signature",
                ProofError::Expired(_) => "proof_expired",
                ProofError::TargetMismatch(_) => "proof_target_mismatch",
                ProofError::Replayed(_) => "proof_replayed",
                ProofError::UnboundKey(_) => "proof_unbound_key",
                ProofError::Malformed(_) => "proof_malformed",
            },
            Self::Nonce(e) => match e {
                NonceError::Unknown => "nonce_unknown",
                NonceError::Expired => "nonce_expired",
                NonceError::AlreadyConsumed => "nonce_already_consumed",
                NonceError::Required => "nonce_required",
            },
            Self::KeyProofInvalid(_) => "key_proof_invalid",
            Self::AttestationInvalid(_) => "attestation_invalid",
            Self::DecryptionFailed(_) => "decryption_failed",
            Self::EncryptionFailed(_) => "encryption_failed",
            Self::DisclosureNotBound(_) => "disclosure_not_bound",
            Self::MalformedDisclosure(_) => "malformed_disclosure",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::KeyBindingMismatch(_) => "key_binding_mismatch",
            Self::AudienceMismatch(_) => "audience_mismatch",
            Self::NonceMismatch(_) => "nonce_mismatch",
            Self::CredentialExpired(_) => "credential_expired",
            Self::PresentationIncomplete(_) => "presentation_incomplete",
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::InvalidStateTransition(_) => "invalid_state_transition",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::AccessDenied(_) => "access_denied",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ServerError(_) => "server_error",
        }
    }

    /// The `OAuth` (RFC 6749, RFC 9449, `OpenID4VCI`, `OpenID4VP`) error value.
    #[must_use]
    pub const fn oauth_error(&self) -> &'static str {
        match self {
            Self::ProofInvalid(_) => "invalid_dpop_proof",
            Self::Nonce(NonceError::Required) => "invalid_proof",
            Self::Nonce(_) => "invalid_nonce",
            Self::KeyProofInvalid(_) | Self::AttestationInvalid(_) => "invalid_proof",
            Self::DecryptionFailed(_) => "invalid_encryption_parameters",
            Self::DisclosureNotBound(_)
            | Self::MalformedDisclosure(_)
            | Self::SignatureInvalid(_)
            | Self::KeyBindingMismatch(_)
            | Self::AudienceMismatch(_)
            | Self::NonceMismatch(_)
            | Self::CredentialExpired(_)
            | Self::PresentationIncomplete(_) => "invalid_presentation",
            Self::TransactionNotFound(_) => "not_found",
            Self::InvalidStateTransition(_) | Self::InvalidRequest(_) => "invalid_request",
            Self::UpstreamUnavailable(_) => "temporarily_unavailable",
            Self::AccessDenied(_) => "invalid_token",
            Self::EncryptionFailed(_) | Self::ServerError(_) => "server_error",
        }
    }

    /// True when the caller may retry the same request with a freshly issued
    /// nonce or proof.
    #[must_use]
    pub const fn is_retryable_with_fresh_nonce(&self) -> bool {
        matches!(
            self,
            Self::Nonce(NonceError::Unknown | NonceError::Expired | NonceError::AlreadyConsumed)
                | Self::ProofInvalid(ProofError::Replayed(_) | ProofError::Expired(_))
        )
    }

    /// Transform error to `OpenID` compatible json format.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Error response body.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// `OAuth` error value.
    pub error: String,

    /// Stable error code.
    pub error_code: String,

    /// Human-readable description.
    pub error_description: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            error: err.oauth_error().to_string(),
            error_code: err.code().to_string(),
            error_description: err.to_string(),
        }
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ErrorResponse::from(self).serialize(serializer)
    }
}

/// Construct an `Error::InvalidRequest` from a format string.
#[macro_export]
macro_rules! invalid {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::InvalidRequest(format!($fmt, $($arg)*))
    };
    ($err:expr $(,)?) => {
        $crate::Error::InvalidRequest(format!($err))
    };
}

/// Construct an `Error::ServerError` from a format string.
#[macro_export]
macro_rules! server {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::ServerError(format!($fmt, $($arg)*))
    };
    ($err:expr $(,)?) => {
        $crate::Error::ServerError(format!($err))
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    #[test]
    fn err_json() {
        let err = Error::Nonce(NonceError::AlreadyConsumed);
        assert_eq!(
            err.to_json(),
            json!({
                "error": "invalid_nonce",
                "error_code": "nonce_already_consumed",
                "error_description": "invalid nonce: nonce already consumed"
            })
        );
    }

    #[test]
    fn codes_distinct() {
        let errors = [
            Error::ProofInvalid(ProofError::InvalidSignature(String::new())),
            Error::ProofInvalid(ProofError::Expired(String::new())),
            Error::ProofInvalid(ProofError::TargetMismatch(String::new())),
            Error::ProofInvalid(ProofError::Replayed(String::new())),
            Error::ProofInvalid(ProofError::UnboundKey(String::new())),
            Error::ProofInvalid(ProofError::Malformed(String::new())),
            Error::Nonce(NonceError::Unknown),
            Error::Nonce(NonceError::Expired),
            Error::Nonce(NonceError::AlreadyConsumed),
            Error::Nonce(NonceError::Required),
            Error::KeyProofInvalid(String::new()),
            Error::AttestationInvalid(String::new()),
            Error::DecryptionFailed(String::new()),
            Error::EncryptionFailed(String::new()),
            Error::DisclosureNotBound(String::new()),
            Error::MalformedDisclosure(String::new()),
            Error::SignatureInvalid(String::new()),
            Error::KeyBindingMismatch(String::new()),
            Error::AudienceMismatch(String::new()),
            Error::NonceMismatch(String::new()),
            Error::CredentialExpired(String::new()),
            Error::PresentationIncomplete(String::new()),
            Error::TransactionNotFound(String::new()),
            Error::InvalidStateTransition(String::new()),
            Error::UpstreamUnavailable(String::new()),
            Error::AccessDenied(String::new()),
            Error::InvalidRequest(String::new()),
            Error::ServerError(String::new()),
        ];
        let codes = errors.iter().map(Error::code).collect::<HashSet<_>>();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn retry_hint() {
        assert!(Error::Nonce(NonceError::Expired).is_retryable_with_fresh_nonce());
        assert!(Error::ProofInvalid(ProofError::Replayed("jti".into()))
            .is_retryable_with_fresh_nonce());
        assert!(!Error::Nonce(NonceError::Required).is_retryable_with_fresh_nonce());
        assert!(!Error::SignatureInvalid("bad".into()).is_retryable_with_fresh_nonce());
    }
}
