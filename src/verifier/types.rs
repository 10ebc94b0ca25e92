//! # Verifier Types
//!
//! Request and response types for the presentation transaction endpoints.

use std::collections::HashMap;
use std::fmt::{self, Display};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::Quota;
use crate::verifier::dcql::DcqlQuery;
use crate::verifier::state::{Event, TransactionState};

/// Request to initialize a presentation transaction.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CreateRequestRequest {
    /// The credentials requested.
    pub dcql_query: DcqlQuery,

    /// Nonce the wallet must echo in its key binding JWTs. Generated when not
    /// supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Whether the request object is returned by value or by reference.
    #[serde(default)]
    pub jar_mode: JarMode,

    /// HTTP method the wallet uses to retrieve a request object by reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_uri_method: Option<RequestUriMethod>,
}

/// How the signed request object reaches the wallet (RFC 9101).
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JarMode {
    /// The request object is embedded in the authorization request.
    ByValue,

    /// The authorization request carries a `request_uri` the wallet
    /// dereferences.
    #[default]
    ByReference,
}

/// HTTP method for `request_uri` retrieval.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestUriMethod {
    /// Plain `GET`.
    #[default]
    Get,

    /// `POST`, allowing the wallet to send its metadata.
    Post,
}

/// The initialized transaction.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CreateRequestResponse {
    /// Identifies the transaction in subsequent calls.
    pub transaction_id: String,

    /// The verifier's client identifier, also the expected key binding
    /// audience.
    pub client_id: String,

    /// Where the wallet retrieves the request object (by reference).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,

    /// Method to use with `request_uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_uri_method: Option<RequestUriMethod>,

    /// The signed request object (by value).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

/// Claims of the signed Authorization Request Object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RequestObject {
    /// Always `vp_token`.
    pub response_type: String,

    /// Always `direct_post`.
    pub response_mode: String,

    /// The verifier's client identifier.
    pub client_id: String,

    /// Where the wallet posts its response.
    pub response_uri: String,

    /// Nonce for the key binding JWTs.
    pub nonce: String,

    /// Opaque value the wallet returns with its response.
    pub state: String,

    /// The credentials requested.
    pub dcql_query: DcqlQuery,

    /// Audience of the request object.
    pub aud: String,

    /// Issued at, seconds since the epoch.
    pub iat: i64,

    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Wallet request for a request object by reference.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RequestObjectRequest {
    /// The transaction identifier from the `request_uri`.
    pub transaction_id: String,
}

/// The signed request object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RequestObjectResponse {
    /// Compact JWS, `typ` `oauth-authz-req+jwt`.
    pub request_object: String,
}

/// The wallet's response, posted to the `response_uri`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ResponseRequest {
    /// The transaction identifier from the `response_uri`.
    #[serde(default, skip_serializing)]
    pub transaction_id: String,

    /// The `state` value from the request object.
    pub state: String,

    /// Presentations keyed by credential query id.
    pub vp_token: VpToken,
}

/// Presentations keyed by credential query id. Form-encoded responses carry
/// the object as a JSON string, so both forms are accepted.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct VpToken(pub HashMap<String, Quota<String>>);

impl VpToken {
    /// Presentations submitted for the query id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Quota<String>> {
        self.0.get(id)
    }
}

impl<'de> Deserialize<'de> for VpToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Map(HashMap<String, Quota<String>>),
            Json(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Map(map) => Ok(Self(map)),
            Repr::Json(json) => serde_json::from_str(&json).map(Self).map_err(de::Error::custom),
        }
    }
}

/// Acknowledgement of an accepted wallet response.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ResponseResponse {
    /// The transaction's new state.
    pub state: TransactionState,
}

/// Request for the status of a transaction.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusRequest {
    /// The transaction identifier.
    pub transaction_id: String,
}

/// Coarse outcome of a transaction.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No verified response yet.
    #[default]
    Pending,

    /// The wallet response has been verified.
    Verified,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Verified => write!(f, "verified"),
        }
    }
}

/// Transaction status.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    /// Coarse outcome.
    pub status: Status,

    /// Lifecycle state.
    pub state: TransactionState,

    /// Disclosed claims per credential query id, once verified.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vp_token: HashMap<String, Vec<Map<String, Value>>>,
}

/// Request for a transaction's event log.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EventsRequest {
    /// The transaction identifier.
    pub transaction_id: String,
}

/// The transaction's event log, oldest first.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EventsResponse {
    /// The transaction identifier.
    pub transaction_id: String,

    /// Events in the order they were appended.
    pub events: Vec<Event>,
}

/// Request to validate a standalone SD-JWT VC.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ValidateRequest {
    /// The SD-JWT VC, with or without a key binding JWT.
    pub sd_jwt_vc: String,

    /// When set, a key binding JWT is required and must carry this nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Claims of a validated SD-JWT VC, flattened.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ValidateResponse {
    /// The claims, including `iss` and `vct`.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// Request for the verifier's client metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetadataRequest {
    /// The verifier's client identifier. Defaults to the configured client.
    #[serde(default)]
    pub client_id: String,
}

/// The verifier's client metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetadataResponse {
    /// Client metadata.
    #[serde(flatten)]
    pub client: VerifierMetadata,
}

/// Verifier (client) metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VerifierMetadata {
    /// The client identifier.
    #[serde(default)]
    pub client_id: String,

    /// Human-readable name of the verifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Credential formats and algorithms accepted.
    #[serde(default)]
    pub vp_formats_supported: HashMap<String, VpFormat>,

    /// Algorithms used to sign request objects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_object_signing_alg_values_supported: Vec<String>,
}

/// Algorithms accepted for one presentation format.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VpFormat {
    /// Issuer-signed JWT algorithms.
    #[serde(rename = "sd-jwt_alg_values", default, skip_serializing_if = "Vec::is_empty")]
    pub sd_jwt_alg_values: Vec<String>,

    /// Key binding JWT algorithms.
    #[serde(rename = "kb-jwt_alg_values", default, skip_serializing_if = "Vec::is_empty")]
    pub kb_jwt_alg_values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn vp_token_forms() {
        let object: ResponseRequest = serde_json::from_value(json!({
            "state": "abc",
            "vp_token": { "pid": "a~b~", "mdl": ["c~", "d~"] }
        }))
        .expect("should deserialize");
        assert_eq!(object.vp_token.get("pid"), Some(&Quota::One("a~b~".into())));
        assert_eq!(object.vp_token.get("mdl").map(Quota::len), Some(2));

        // form-encoded bodies carry the object as a string
        let string: ResponseRequest = serde_json::from_value(json!({
            "state": "abc",
            "vp_token": r#"{"pid":["a~b~"]}"#
        }))
        .expect("should deserialize");
        assert_eq!(string.vp_token.get("pid"), Some(&Quota::Many(vec!["a~b~".into()])));
    }

    #[test]
    fn create_request_defaults() {
        let request: CreateRequestRequest = serde_json::from_value(json!({
            "dcql_query": { "credentials": [] },
            "jar_mode": "by_value"
        }))
        .expect("should deserialize");
        assert_eq!(request.jar_mode, JarMode::ByValue);
        assert!(request.nonce.is_none());
    }
}
