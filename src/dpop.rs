//! # Demonstrating Proof of Possession (`DPoP`)
//!
//! Short-lived, single-use JWTs ([RFC9449]) binding an HTTP request to a key
//! held by the caller and to a specific method and URL.
//!
//! [RFC9449]: https://www.rfc-editor.org/rfc/rfc9449

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::error::ProofError;
use crate::infosec::jws::{self, Key, Type};
use crate::infosec::{Algorithm, PublicKeyJwk, Signer};

/// Default accepted clock skew for `iat`.
pub const DEFAULT_SKEW_SECS: i64 = 60;

/// `DPoP` proof JWT claims.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DpopClaims {
    /// Unique identifier for the proof.
    pub jti: String,

    /// Time the proof was created, in seconds since the epoch.
    pub iat: i64,

    /// HTTP method of the request the proof is bound to.
    pub htm: String,

    /// HTTP URI of the request, without query and fragment.
    pub htu: String,

    /// Hash of the access token the request carries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,

    /// Server-provided nonce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Parameters for creating a `DPoP` proof.
#[derive(Clone, Debug, Default)]
pub struct ProofParams<'a> {
    /// HTTP method, e.g. "POST".
    pub method: &'a str,

    /// Request URL.
    pub url: &'a str,

    /// Access token to bind the proof to via `ath`.
    pub access_token: Option<&'a str>,

    /// Server-provided `DPoP` nonce.
    pub nonce: Option<&'a str>,
}

/// The request a proof is expected to be bound to.
#[derive(Clone, Debug, Default)]
pub struct Expected<'a> {
    /// HTTP method of the request.
    pub method: &'a str,

    /// URL of the request.
    pub url: &'a str,

    /// Access token presented with the request, checked against `ath` when
    /// the proof carries one.
    pub access_token: Option<&'a str>,
}

/// A successfully validated proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedProof {
    /// The proof key.
    pub jwk: PublicKeyJwk,

    /// RFC 7638 thumbprint of the proof key.
    pub jkt: String,

    /// The proof's claims.
    pub claims: DpopClaims,
}

/// Create a signed `DPoP` proof embedding the signer's public key.
///
/// # Errors
///
/// Returns an error if the signer fails.
pub async fn create_proof(
    signer: &impl Signer, params: &ProofParams<'_>,
) -> anyhow::Result<String> {
    let claims = DpopClaims {
        jti: Uuid::new_v4().to_string(),
        iat: Utc::now().timestamp(),
        htm: params.method.to_uppercase(),
        htu: params.url.to_string(),
        ath: params.access_token.map(access_token_hash),
        nonce: params.nonce.map(ToString::to_string),
    };
    let mut jwk = signer.public_key().await?;
    jwk.kid = None;

    jws::encode(Type::Dpop, &claims, Key::Jwk(jwk), signer).await
}

/// Base64url SHA-256 hash of an access token, as used in `ath`.
#[must_use]
pub fn access_token_hash(access_token: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(access_token.as_bytes()))
}

/// Validates `DPoP` proofs, rejecting replayed `jti` values.
#[derive(Debug)]
pub struct ProofValidator {
    skew: TimeDelta,
    replay: ReplayCache,
}

impl Default for ProofValidator {
    fn default() -> Self {
        Self::new(TimeDelta::try_seconds(DEFAULT_SKEW_SECS).unwrap_or_default())
    }
}

impl ProofValidator {
    /// Create a validator accepting `iat` within `skew` of the current
    /// time. Seen proof identifiers are retained for twice the skew window.
    #[must_use]
    pub fn new(skew: TimeDelta) -> Self {
        Self {
            skew,
            replay: ReplayCache::new(skew * 2),
        }
    }

    /// Validate a `DPoP` proof against the expected request.
    ///
    /// # Errors
    ///
    /// Returns `ProofError::Malformed` if the proof cannot be parsed,
    /// `InvalidSignature` if its signature does not verify against the
    /// embedded key, `Expired` if `iat` is outside the skew window,
    /// `TargetMismatch` if the method, URL or access token hash differ, and
    /// `Replayed` if the `jti` has already been seen for the key.
    pub fn validate_proof(
        &self, proof: &str, expected: &Expected<'_>,
    ) -> Result<ValidatedProof, ProofError> {
        tracing::debug!("dpop::validate_proof");

        let unverified = jws::parse::<DpopClaims>(proof)
            .map_err(|e| ProofError::Malformed(format!("issue parsing proof: {e}")))?;
        if unverified.header.typ != Type::Dpop {
            return Err(ProofError::Malformed(format!("invalid typ: {}", unverified.header.typ)));
        }
        if !matches!(unverified.header.alg, Algorithm::ES256 | Algorithm::EdDSA) {
            return Err(ProofError::Malformed("unsupported alg".into()));
        }
        if unverified.has_private_key() {
            return Err(ProofError::Malformed("header jwk contains a private key".into()));
        }
        let Some(jwk) = unverified.embedded_jwk().cloned() else {
            return Err(ProofError::Malformed("header jwk is missing".into()));
        };
        if unverified.claims.jti.is_empty() {
            return Err(ProofError::Malformed("jti is missing".into()));
        }

        let jwt = unverified
            .verify(&jwk)
            .map_err(|e| ProofError::InvalidSignature(e.to_string()))?;
        let claims = jwt.claims;

        let now = Utc::now();
        let Some(iat) = DateTime::from_timestamp(claims.iat, 0) else {
            return Err(ProofError::Malformed("invalid iat".into()));
        };
        if (now - iat).abs() > self.skew {
            let msg = format!("iat {} is outside the skew window", claims.iat);
            return Err(ProofError::Expired(msg));
        }

        if !claims.htm.eq_ignore_ascii_case(expected.method) {
            let msg = format!("htm {} is not {}", claims.htm, expected.method);
            return Err(ProofError::TargetMismatch(msg));
        }
        if !same_target(&claims.htu, expected.url) {
            let msg = format!("htu {} is not {}", claims.htu, expected.url);
            return Err(ProofError::TargetMismatch(msg));
        }
        if let Some(ath) = &claims.ath {
            let Some(access_token) = expected.access_token else {
                let msg = "ath set but no access token presented";
                return Err(ProofError::TargetMismatch(msg.into()));
            };
            if *ath != access_token_hash(access_token) {
                return Err(ProofError::TargetMismatch("ath does not match access token".into()));
            }
        }

        let jkt = jwk.thumbprint();
        if !self.replay.check_and_insert(&format!("{jkt}:{}", claims.jti), now) {
            return Err(ProofError::Replayed(format!("jti {} already used", claims.jti)));
        }

        Ok(ValidatedProof { jwk, jkt, claims })
    }
}

// Compare URLs ignoring query and fragment, per RFC 9449 section 4.3.
fn same_target(htu: &str, expected: &str) -> bool {
    let (Ok(htu), Ok(expected)) = (Url::parse(htu), Url::parse(expected)) else {
        return false;
    };
    htu.scheme() == expected.scheme()
        && htu.host_str().map(str::to_ascii_lowercase)
            == expected.host_str().map(str::to_ascii_lowercase)
        && htu.port_or_known_default() == expected.port_or_known_default()
        && htu.path() == expected.path()
}

/// Remembers proof identifiers for a bounded time.
#[derive(Debug)]
pub struct ReplayCache {
    ttl: TimeDelta,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ReplayCache {
    /// Create a cache retaining entries for `ttl`.
    #[must_use]
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record `key`, returning `false` if it was already present and
    /// unexpired.
    pub fn check_and_insert(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.retain(|_, expires_at| *expires_at > now);
        if seen.contains_key(key) {
            return false;
        }
        seen.insert(key.to_string(), now + self.ttl);
        true
    }
}

#[cfg(test)]
mod tests {
    use assert_let_bind::assert_let;

    use super::*;
    use crate::infosec::{Curve, KeyPair};

    const NONCE_URL: &str = "https://localhost/pid-issuer/wallet/nonceEndpoint";

    fn expected() -> Expected<'static> {
        Expected {
            method: "POST",
            url: NONCE_URL,
            access_token: None,
        }
    }

    async fn proof(key: &KeyPair, claims: &DpopClaims) -> String {
        let mut jwk = key.public_jwk();
        jwk.kid = None;
        jws::encode(Type::Dpop, claims, Key::Jwk(jwk), key).await.expect("should encode")
    }

    #[tokio::test]
    async fn valid_proof() {
        let key = KeyPair::generate(Curve::P256);
        let params = ProofParams {
            method: "post",
            url: NONCE_URL,
            ..ProofParams::default()
        };
        let token = create_proof(&key, &params).await.expect("should create");

        let validator = ProofValidator::default();
        let validated = validator.validate_proof(&token, &expected()).expect("should validate");
        assert_eq!(validated.jkt, key.public_jwk().thumbprint());
        assert_eq!(validated.claims.htm, "POST");
    }

    #[tokio::test]
    async fn replayed() {
        let key = KeyPair::generate(Curve::P256);
        let params = ProofParams {
            method: "POST",
            url: NONCE_URL,
            ..ProofParams::default()
        };
        let token = create_proof(&key, &params).await.expect("should create");

        let validator = ProofValidator::default();
        validator.validate_proof(&token, &expected()).expect("should validate");
        let err = validator.validate_proof(&token, &expected()).expect_err("should be replayed");
        assert_let!(ProofError::Replayed(_), err);
    }

    #[tokio::test]
    async fn stale_iat() {
        let key = KeyPair::generate(Curve::P256);
        let claims = DpopClaims {
            jti: Uuid::new_v4().to_string(),
            iat: Utc::now().timestamp() - 120,
            htm: "POST".into(),
            htu: NONCE_URL.into(),
            ..DpopClaims::default()
        };
        let token = proof(&key, &claims).await;

        let err = ProofValidator::default()
            .validate_proof(&token, &expected())
            .expect_err("should be expired");
        assert_let!(ProofError::Expired(_), err);
    }

    #[tokio::test]
    async fn target_mismatch() {
        let key = KeyPair::generate(Curve::P256);
        let params = ProofParams {
            method: "GET",
            url: NONCE_URL,
            ..ProofParams::default()
        };
        let token = create_proof(&key, &params).await.expect("should create");
        let err = ProofValidator::default()
            .validate_proof(&token, &expected())
            .expect_err("method should mismatch");
        assert_let!(ProofError::TargetMismatch(_), err);

        let params = ProofParams {
            method: "POST",
            url: "https://localhost/pid-issuer/wallet/credentialEndpoint",
            ..ProofParams::default()
        };
        let token = create_proof(&key, &params).await.expect("should create");
        let err = ProofValidator::default()
            .validate_proof(&token, &expected())
            .expect_err("url should mismatch");
        assert_let!(ProofError::TargetMismatch(_), err);
    }

    #[tokio::test]
    async fn query_ignored() {
        let key = KeyPair::generate(Curve::P256);
        let url = format!("{NONCE_URL}?lang=sv#top");
        let params = ProofParams {
            method: "POST",
            url: &url,
            ..ProofParams::default()
        };
        let token = create_proof(&key, &params).await.expect("should create");
        assert!(ProofValidator::default().validate_proof(&token, &expected()).is_ok());
    }

    #[tokio::test]
    async fn access_token_hash_checked() {
        let key = KeyPair::generate(Curve::P256);
        let params = ProofParams {
            method: "POST",
            url: NONCE_URL,
            access_token: Some("token-1"),
            ..ProofParams::default()
        };
        let token = create_proof(&key, &params).await.expect("should create");

        let validator = ProofValidator::default();
        let wrong = Expected {
            access_token: Some("token-2"),
            ..expected()
        };
        let err = validator.validate_proof(&token, &wrong).expect_err("ath should mismatch");
        assert_let!(ProofError::TargetMismatch(_), err);

        let right = Expected {
            access_token: Some("token-1"),
            ..expected()
        };
        assert!(validator.validate_proof(&token, &right).is_ok());
    }

    #[tokio::test]
    async fn forged_signature() {
        let key = KeyPair::generate(Curve::P256);
        let other = KeyPair::generate(Curve::P256);
        let claims = DpopClaims {
            jti: Uuid::new_v4().to_string(),
            iat: Utc::now().timestamp(),
            htm: "POST".into(),
            htu: NONCE_URL.into(),
            ..DpopClaims::default()
        };

        // header embeds `key` but the proof is signed by `other`
        let mut jwk = key.public_jwk();
        jwk.kid = None;
        let token = jws::encode(Type::Dpop, &claims, Key::Jwk(jwk), &other)
            .await
            .expect("should encode");

        let err = ProofValidator::default()
            .validate_proof(&token, &expected())
            .expect_err("signature should fail");
        assert_let!(ProofError::InvalidSignature(_), err);
    }
}
