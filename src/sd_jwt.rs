//! # SD-JWT VC
//!
//! Selective-disclosure credentials: an issuer-signed JWT committing to
//! claims by digest, followed by the disclosures that reveal them.
//!
//! ```text
//! <issuer-jwt>~<disclosure>~<disclosure>~[<kb-jwt>]
//! ```
//!
//! The trailing `~` is mandatory when no key binding JWT follows.

mod issue;
mod present;
mod verify;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub use self::issue::{issue_credential, CredentialParams};
pub use self::present::{present, KbParams};
pub use self::verify::{verify, VerifiedCredential};
use crate::core::generate;
use crate::error::Error;
use crate::infosec::PublicKeyJwk;
use crate::Result;

/// Credential format identifier for SD-JWT VC credentials.
pub const FORMAT_SD_JWT_VC: &str = "dc+sd-jwt";

/// Legacy format identifier still used by some wallets.
pub const FORMAT_VC_SD_JWT: &str = "vc+sd-jwt";

/// Digest algorithm used for `_sd` digests and `sd_hash`.
pub const SD_ALG: &str = "sha-256";

/// Claim names managed by the issuer which can be neither selectively
/// disclosed nor supplied as subject claims.
pub const RESERVED_CLAIMS: [&str; 9] =
    ["_sd", "_sd_alg", "iss", "iat", "nbf", "exp", "cnf", "vct", "status"];

/// Claims in the payload of an issuer-signed SD-JWT VC.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SdJwtClaims {
    /// Digests of selectively disclosable claims, sorted.
    #[serde(rename = "_sd", default, skip_serializing_if = "Vec::is_empty")]
    pub sd: Vec<String>,

    /// Algorithm used to generate `_sd` digests.
    #[serde(rename = "_sd_alg", skip_serializing_if = "Option::is_none")]
    pub sd_alg: Option<String>,

    /// The Issuer of the credential.
    pub iss: String,

    /// Time of issuance, in seconds since the epoch.
    pub iat: i64,

    /// Expiry time, in seconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// The type of credential, e.g. `urn:eudi:pid:1`.
    pub vct: String,

    /// Holder key binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<Cnf>,

    /// Claims that are always disclosed.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// Confirmation claim carrying the holder's public key.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Cnf {
    /// The holder's public key.
    pub jwk: PublicKeyJwk,
}

/// Claims of a key binding JWT.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct KbJwtClaims {
    /// The relying party's client identifier.
    pub aud: String,

    /// Time of issuance, in seconds since the epoch.
    pub iat: i64,

    /// The nonce issued by the relying party for this exchange.
    pub nonce: String,

    /// Hash of the issuer-signed JWT and disclosures the KB-JWT is bound to.
    pub sd_hash: String,
}

/// A claim disclosure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disclosure {
    /// Random salt, base64url encoded.
    pub salt: String,

    /// The claim name.
    pub name: String,

    /// The claim value.
    pub value: Value,

    encoded: String,
}

impl Disclosure {
    /// Create a new disclosure with a fresh 128-bit salt.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self::with_salt(generate::salt(), name, value)
    }

    fn with_salt(salt: String, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        let array =
            Value::Array(vec![Value::String(salt.clone()), Value::String(name.clone()), value.clone()]);
        let encoded = Base64UrlUnpadded::encode_string(array.to_string().as_bytes());
        Self {
            salt,
            name,
            value,
            encoded,
        }
    }

    /// Unpack a base64url-encoded disclosure.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedDisclosure` if decoding fails or the
    /// disclosure is not a JSON array of `[salt, name, value]`.
    pub fn parse(encoded: &str) -> Result<Self> {
        let decoded = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|e| Error::MalformedDisclosure(format!("issue decoding disclosure: {e}")))?;
        let Ok(Value::Array(mut parts)) = serde_json::from_slice::<Value>(&decoded) else {
            return Err(Error::MalformedDisclosure("disclosure is not a JSON array".into()));
        };
        if parts.len() != 3 {
            return Err(Error::MalformedDisclosure(
                "disclosure must be a JSON array of length 3".into(),
            ));
        }
        let value = parts.remove(2);
        let (Value::String(salt), Value::String(name)) = (&parts[0], &parts[1]) else {
            return Err(Error::MalformedDisclosure("disclosure salt or name is invalid".into()));
        };
        if RESERVED_CLAIMS.contains(&name.as_str()) || name == "..." {
            return Err(Error::MalformedDisclosure(format!("claim name '{name}' is reserved")));
        }

        Ok(Self {
            salt: salt.clone(),
            name: name.clone(),
            value,
            encoded: encoded.to_string(),
        })
    }

    /// The base64url-encoded disclosure, exactly as serialized.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The digest of the disclosure as committed to in `_sd`.
    #[must_use]
    pub fn digest(&self) -> String {
        sd_hash(&self.encoded)
    }
}

/// An SD-JWT: the issuer-signed JWT and its disclosures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdJwt {
    /// The issuer-signed JWT.
    pub jwt: String,

    /// Ordered disclosures.
    pub disclosures: Vec<Disclosure>,
}

impl SdJwt {
    /// Serialize as `<jwt>~<disclosure>~...~`, ready to be extended with a
    /// key binding JWT.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = self.jwt.clone();
        out.push('~');
        for disclosure in &self.disclosures {
            out.push_str(disclosure.encoded());
            out.push('~');
        }
        out
    }
}

/// Base64url SHA-256 hash over the UTF-8 bytes of `input`.
#[must_use]
pub fn sd_hash(input: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(input.as_bytes()))
}

/// Split a presentation into the credential part (including its trailing
/// `~`) and the key binding JWT, if any.
///
/// The final segment is taken to be a key binding JWT when it is a
/// three-part compact JWS rather than a base64url disclosure.
///
/// # Errors
///
/// Returns `Error::MalformedDisclosure` if the token has no `~` separator or
/// its final segment is neither empty nor a JWT.
pub fn split_presentation(token: &str) -> Result<(&str, Option<&str>)> {
    let Some(pos) = token.rfind('~') else {
        return Err(Error::MalformedDisclosure("no '~' separator".into()));
    };
    let (credential, last) = token.split_at(pos + 1);
    if last.is_empty() {
        return Ok((credential, None));
    }

    let parts = last.split('.').collect::<Vec<_>>();
    if parts.len() == 3 && parts.iter().all(|p| !p.is_empty()) {
        return Ok((credential, Some(last)));
    }
    Err(Error::MalformedDisclosure("final segment is neither empty nor a key binding JWT".into()))
}
