//! # Issuer Types
//!
//! Request, response and metadata types for the nonce, credential, and
//! metadata endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::infosec::jwe::EncryptionAlgorithm;
use crate::infosec::{Jwks, PublicKeyJwk};
pub use crate::sd_jwt::{FORMAT_SD_JWT_VC, FORMAT_VC_SD_JWT};

/// The user information returned by the Subject trait.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Dataset {
    /// The claims known about the subject.
    pub claims: Map<String, Value>,
}

/// The result of introspecting an access token with the authorization
/// server.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TokenInfo {
    /// Whether the token is currently active.
    pub active: bool,

    /// The subject (end-user) the token was issued to.
    pub subject_id: String,

    /// Thumbprint of the `DPoP` key the token is bound to (`cnf.jkt`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jkt: Option<String>,
}

/// Request for a fresh `c_nonce`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct NonceRequest {
    /// The `DPoP` proof from the `DPoP` header.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub dpop: String,
}

/// A fresh `c_nonce`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct NonceResponse {
    /// The nonce to use in key proofs of the next credential request.
    pub c_nonce: String,
}

/// `CredentialRequest` is used by the Wallet to make a Credential Request to
/// the Credential Endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialRequest {
    /// A previously issued Access Token, as extracted from the Authorization
    /// header of the Credential Request.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub access_token: String,

    /// The `DPoP` proof from the `DPoP` header.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub dpop: String,

    /// The request body, in the clear or as a compact JWE encrypted to the
    /// issuer's request encryption key.
    pub body: RequestBody,
}

/// A credential request body.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RequestBody {
    /// A compact JWE (`application/jwt`) wrapping a [`CredentialBody`].
    Encrypted(String),

    /// A clear JSON body.
    Plain(CredentialBody),
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::Plain(CredentialBody::default())
    }
}

/// The JSON body of a Credential Request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialBody {
    /// The requested credential format. Informational when
    /// `credential_configuration_id` is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Wallet's proofs of possession of the key material the issued
    /// credentials are to be bound to. One credential is issued per proof.
    pub proofs: Proofs,

    /// Identifies the credential in the issuer's
    /// `credential_configurations_supported`.
    pub credential_configuration_id: String,

    /// If present, specifies how the Credential Response should be
    /// encrypted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_response_encryption: Option<CredentialResponseEncryption>,
}

/// Key proofs by proof type.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Proofs {
    /// Key proof JWTs (`typ` of `openid4vci-proof+jwt`).
    #[serde(default)]
    pub jwt: Vec<String>,
}

/// Claims containing a Wallet's proof of possession of key material that can
/// be used for binding an issued Credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProofClaims {
    /// The wallet or client identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// The Credential Issuer Identifier.
    pub aud: String,

    /// The time at which the proof was issued, as
    /// [RFC7519](https://www.rfc-editor.org/rfc/rfc7519) `NumericDate`.
    pub iat: i64,

    /// A server-provided `c_nonce`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Wallet unit attestation covering the proof key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wua: Option<String>,
}

/// Claims of a wallet unit or key attestation issued by the wallet provider.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AttestationClaims {
    /// The attestation authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Time of issuance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiry time.
    pub exp: i64,

    /// Keys attested as held in the wallet's secure storage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attested_keys: Vec<PublicKeyJwk>,

    /// The wallet key the attestation is bound to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<AttestationCnf>,

    /// Nonce the attestation was issued against, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Confirmation claim of an attestation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AttestationCnf {
    /// The attested key.
    pub jwk: PublicKeyJwk,
}

/// Specifies how the Credential Response should be encrypted.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialResponseEncryption {
    /// The public key used for encrypting the Credential Response.
    pub jwk: PublicKeyJwk,

    /// JWE [RFC7516] enc algorithm for encoding the Credential Response.
    ///
    /// [RFC7516]: (https://www.rfc-editor.org/rfc/rfc7516)
    pub enc: EncryptionAlgorithm,

    /// Compression algorithm requested for the response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

/// The Credential Response.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CredentialResponse {
    /// A compact JWE wrapping [`Credentials`], when the wallet asked for
    /// response encryption.
    Encrypted(String),

    /// Issued credentials in the clear.
    Plain(Credentials),
}

/// Issued credentials.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Credentials {
    /// The credential issuer. Included in encrypted responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// One credential per key proof, in proof order.
    pub credentials: Vec<IssuedCredential>,
}

/// An issued credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct IssuedCredential {
    /// The serialized SD-JWT VC, with trailing `~`.
    pub credential: String,
}

/// Request to retrieve the Credential Issuer's metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetadataRequest {
    /// The Credential Issuer Identifier for which the configuration is to be
    /// returned.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub credential_issuer: String,
}

/// Response containing the Credential Issuer's metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetadataResponse {
    /// The Credential Issuer metadata.
    #[serde(flatten)]
    pub credential_issuer: Issuer,
}

/// The Credential Issuer's configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[allow(clippy::struct_field_names)]
pub struct Issuer {
    /// The Credential Issuer's identifier.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub credential_issuer: String,

    /// Authorization servers trusted to issue access tokens for this
    /// issuer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_servers: Vec<String>,

    /// URL of the Credential Issuer's Credential Endpoint.
    #[serde(default)]
    pub credential_endpoint: String,

    /// URL of the Credential Issuer's Nonce Endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce_endpoint: Option<String>,

    /// Keys and algorithms for encrypting credential requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_request_encryption: Option<RequestEncryption>,

    /// Supported algorithms for encrypting credential responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_response_encryption: Option<SupportedResponseEncryption>,

    /// The maximum number of proofs accepted in one request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_credential_issuance: Option<BatchCredentialIssuance>,

    /// Credentials supported by the issuer, keyed by configuration id.
    #[serde(default)]
    pub credential_configurations_supported: HashMap<String, CredentialConfiguration>,
}

/// Keys the wallet may encrypt credential requests to.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RequestEncryption {
    /// Encryption public keys.
    pub jwks: Jwks,

    /// Supported JWE `enc` values.
    pub enc_values_supported: Vec<String>,

    /// Whether requests must be encrypted.
    pub encryption_required: bool,
}

/// Contains information about whether the Credential Issuer supports
/// encryption of the Credential Response on top of TLS.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SupportedResponseEncryption {
    /// Supported JWE `alg` values.
    pub alg_values_supported: Vec<String>,

    /// Supported JWE `enc` values.
    pub enc_values_supported: Vec<String>,

    /// Whether responses must be encrypted.
    pub encryption_required: bool,
}

/// Batch issuance support.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct BatchCredentialIssuance {
    /// The maximum array size for the `proofs` parameter.
    pub batch_size: usize,
}

/// Credential configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialConfiguration {
    /// The credential format, e.g. `dc+sd-jwt`.
    pub format: String,

    /// The OAuth `scope` that authorizes issuance of the credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// The type of the SD-JWT VC.
    pub vct: String,

    /// Supported key proof types and their signing algorithms.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub proof_types_supported: HashMap<String, ProofTypesSupported>,

    /// Claims the credential may contain.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<ClaimsDescription>,
}

impl CredentialConfiguration {
    /// Top-level claim names issued as selectively disclosable.
    #[must_use]
    pub fn disclosable(&self) -> Vec<String> {
        self.claims
            .iter()
            .filter(|c| c.selectively_disclosable)
            .filter_map(|c| c.path.first().cloned())
            .collect()
    }
}

/// Description of a claim in a credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClaimsDescription {
    /// Claims path pointer, e.g. `["address", "country"]`.
    pub path: Vec<String>,

    /// Whether the claim is always included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mandatory: Option<bool>,

    /// Whether the claim is issued as a selectively disclosable claim.
    #[serde(default)]
    pub selectively_disclosable: bool,
}

/// Details of a supported key proof type.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProofTypesSupported {
    /// Algorithms accepted for signing the proof.
    pub proof_signing_alg_values_supported: Vec<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_body() {
        let body: RequestBody = serde_json::from_value(json!("eyJhbGciOi.x.y.z.w"))
            .expect("should deserialize");
        assert!(matches!(body, RequestBody::Encrypted(_)));

        let body: RequestBody = serde_json::from_value(json!({
            "format": "vc+sd-jwt",
            "proofs": {"jwt": ["a.b.c"]},
            "credential_configuration_id": "eu.europa.ec.eudi.pid_vc_sd_jwt",
            "credential_response_encryption": {
                "jwk": {"kty": "EC", "crv": "P-256", "x": "x", "y": "y"},
                "enc": "A128GCM",
                "zip": "DEF"
            }
        }))
        .expect("should deserialize");
        let RequestBody::Plain(body) = body else {
            panic!("should be plain");
        };
        assert_eq!(body.proofs.jwt.len(), 1);
        let encryption = body.credential_response_encryption.expect("should be set");
        assert_eq!(encryption.enc, EncryptionAlgorithm::A128Gcm);
    }
}
