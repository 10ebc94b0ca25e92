//! An API for the issuance and verification of SD-JWT VC credentials based on
//! the [OpenID for Verifiable Credential Issuance](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html)
//! and [OpenID for Verifiable Presentations](https://openid.net/specs/openid-4-verifiable-presentations-1_0.html)
//! specifications.
//!
//! Access tokens and key proofs are sender-constrained with `DPoP`
//! ([RFC9449](https://www.rfc-editor.org/rfc/rfc9449)) and single-use
//! server nonces. Credentials use selective disclosure
//! ([SD-JWT VC](https://datatracker.ietf.org/doc/draft-ietf-oauth-sd-jwt-vc/))
//! with holder key binding.
//!
//! # Feature Flags
//!
//! Both features are enabled by default:
//!
//! * `issuer` - Enables the credential issuer API.
//! * `verifier` - Enables the verifier API and presentation transactions.

#[cfg(feature = "issuer")]
pub mod issuer;

#[cfg(feature = "verifier")]
pub mod verifier;

pub mod core;
pub mod dpop;
mod error;
pub mod infosec;
pub mod metadata;
pub mod nonce;
pub mod presentation;
pub mod sd_jwt;
pub mod settings;

pub use crate::core::Quota;
pub use crate::error::{Error, ErrorResponse, NonceError, ProofError, Result};
pub use crate::settings::{IssuerConfig, Settings, VerifierConfig};
