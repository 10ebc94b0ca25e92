//! # Presentation Validation
//!
//! Relying-party validation of an SD-JWT VC presentation: the issuer-signed
//! credential, its disclosures, and the holder's key binding JWT.
//!
//! A presentation is accepted whole or not at all.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::infosec::jws::{self, Type};
use crate::infosec::PublicKeyJwk;
use crate::sd_jwt::{self, KbJwtClaims};
use crate::{Error, Result};

/// Maximum age of a key binding JWT.
pub const KB_MAX_AGE_SECS: i64 = 300;

/// Tolerated clock skew for a key binding JWT issued in the future.
pub const KB_MAX_SKEW_SECS: i64 = 60;

/// Claims recovered from a valid presentation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Presented {
    /// The credential issuer.
    pub iss: String,

    /// The credential type.
    pub vct: String,

    /// All claims of the credential visible to the relying party.
    pub claims: Map<String, Value>,

    /// The selectively disclosed claims revealed in this presentation.
    pub disclosed: Map<String, Value>,
}

/// Validate a presented SD-JWT VC with key binding.
///
/// The key binding JWT must be signed by the holder key in the credential's
/// `cnf` claim, name `expected_audience` as `aud`, carry `expected_nonce`, and
/// commit via `sd_hash` to exactly the credential bytes preceding it.
///
/// # Errors
///
/// Returns `Error::KeyBindingMismatch` if the key binding JWT is missing,
/// stale, or bound to different material; `Error::SignatureInvalid` if a
/// signature does not verify; `Error::AudienceMismatch` and
/// `Error::NonceMismatch` for the respective claims; and any credential
/// verification error.
pub fn validate(
    token: &str, expected_nonce: &str, expected_audience: &str, trust: &[PublicKeyJwk],
) -> Result<Presented> {
    tracing::debug!("presentation::validate");

    let (credential, kb_jwt) = sd_jwt::split_presentation(token)?;
    let Some(kb_jwt) = kb_jwt else {
        return Err(Error::KeyBindingMismatch("presentation has no key binding JWT".into()));
    };

    let verified = sd_jwt::verify(credential, trust)?;
    let Some(holder_jwk) = &verified.holder_jwk else {
        return Err(Error::KeyBindingMismatch("credential is not key bound".into()));
    };

    verify_key_binding(kb_jwt, credential, holder_jwk, expected_nonce, expected_audience)?;

    Ok(Presented {
        iss: verified.iss,
        vct: verified.vct,
        claims: verified.claims,
        disclosed: verified.disclosed,
    })
}

/// Check the key binding JWT against the holder key and the exchange.
///
/// # Errors
///
/// See [`validate`].
pub fn verify_key_binding(
    kb_jwt: &str, credential: &str, holder_jwk: &PublicKeyJwk, expected_nonce: &str,
    expected_audience: &str,
) -> Result<()> {
    let unverified = jws::parse::<KbJwtClaims>(kb_jwt)
        .map_err(|e| Error::KeyBindingMismatch(format!("issue parsing key binding JWT: {e}")))?;
    if unverified.header.typ != Type::KbJwt {
        return Err(Error::KeyBindingMismatch(format!(
            "unexpected key binding 'typ' {}",
            unverified.header.typ
        )));
    }
    let kb = unverified
        .verify(holder_jwk)
        .map_err(|e| Error::SignatureInvalid(format!("key binding JWT: {e}")))?;

    if kb.claims.aud != expected_audience {
        return Err(Error::AudienceMismatch(format!(
            "expected '{expected_audience}', got '{}'",
            kb.claims.aud
        )));
    }
    if kb.claims.nonce != expected_nonce {
        return Err(Error::NonceMismatch("key binding nonce was not issued for this exchange".into()));
    }
    if kb.claims.sd_hash != sd_jwt::sd_hash(credential) {
        return Err(Error::KeyBindingMismatch("'sd_hash' does not match presentation".into()));
    }

    let now = Utc::now().timestamp();
    if kb.claims.iat > now + KB_MAX_SKEW_SECS || kb.claims.iat < now - KB_MAX_AGE_SECS {
        return Err(Error::KeyBindingMismatch("key binding JWT 'iat' is not fresh".into()));
    }

    tracing::debug!("presentation::verify_key_binding");
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_let_bind::assert_let;
    use serde_json::json;

    use super::*;
    use crate::infosec::{Curve, KeyPair};
    use crate::sd_jwt::{issue_credential, present, CredentialParams, KbParams};

    const AUD: &str = "x509_san_dns:verifier.localhost";
    const NONCE: &str = "n-0S6_WzA2Mj";

    struct Fixture {
        issuer: KeyPair,
        holder: KeyPair,
        credential: String,
    }

    async fn fixture() -> Fixture {
        let issuer = KeyPair::generate(Curve::P256);
        let holder = KeyPair::generate(Curve::P256);
        let Value::Object(claims) = json!({
            "given_name": "Tyler",
            "family_name": "Neal",
            "birthdate": "1955-04-12"
        }) else {
            unreachable!()
        };
        let disclosable = claims.keys().cloned().collect::<Vec<_>>();
        let params = CredentialParams {
            issuer: "https://localhost/pid-issuer",
            vct: "urn:eudi:pid:1",
            holder_jwk: Some(holder.public_jwk()),
            claims: &claims,
            disclosable: &disclosable,
            expires_in: None,
        };
        let credential =
            issue_credential(&issuer, &params).await.expect("should issue").serialize();
        Fixture {
            issuer,
            holder,
            credential,
        }
    }

    async fn presentation(f: &Fixture, aud: &str, nonce: &str) -> String {
        let kb = KbParams { aud, nonce };
        present(&f.credential, &["given_name", "family_name"], &kb, &f.holder)
            .await
            .expect("should present")
    }

    #[tokio::test]
    async fn valid() {
        let f = fixture().await;
        let token = presentation(&f, AUD, NONCE).await;

        let presented = validate(&token, NONCE, AUD, &[f.issuer.public_jwk()]).expect("valid");
        assert_eq!(
            Value::Object(presented.disclosed),
            json!({"given_name": "Tyler", "family_name": "Neal"})
        );
        assert_eq!(presented.vct, "urn:eudi:pid:1");
    }

    #[tokio::test]
    async fn wrong_nonce() {
        let f = fixture().await;
        let token = presentation(&f, AUD, "stale-nonce").await;

        let result = validate(&token, NONCE, AUD, &[f.issuer.public_jwk()]);
        assert_let!(Err(Error::NonceMismatch(_)), result);
    }

    #[tokio::test]
    async fn wrong_audience() {
        let f = fixture().await;
        let token = presentation(&f, "x509_san_dns:other.localhost", NONCE).await;

        let result = validate(&token, NONCE, AUD, &[f.issuer.public_jwk()]);
        assert_let!(Err(Error::AudienceMismatch(_)), result);
    }

    #[tokio::test]
    async fn missing_key_binding() {
        let f = fixture().await;
        let result = validate(&f.credential, NONCE, AUD, &[f.issuer.public_jwk()]);
        assert_let!(Err(Error::KeyBindingMismatch(_)), result);
    }

    #[tokio::test]
    async fn stripped_disclosure() {
        let f = fixture().await;
        let token = presentation(&f, AUD, NONCE).await;

        // drop one disclosure after the holder signed over both
        let (credential, kb_jwt) = sd_jwt::split_presentation(&token).expect("should split");
        let mut segments = credential.trim_end_matches('~').split('~').collect::<Vec<_>>();
        segments.pop();
        let tampered = format!("{}~{}", segments.join("~"), kb_jwt.expect("kb-jwt"));

        let result = validate(&tampered, NONCE, AUD, &[f.issuer.public_jwk()]);
        assert_let!(Err(Error::KeyBindingMismatch(_)), result);
    }

    #[tokio::test]
    async fn signed_by_other_key() {
        let f = fixture().await;
        let imposter = KeyPair::generate(Curve::P256);
        let kb = KbParams {
            aud: AUD,
            nonce: NONCE,
        };
        let token = present(&f.credential, &["given_name"], &kb, &imposter)
            .await
            .expect("should present");

        let result = validate(&token, NONCE, AUD, &[f.issuer.public_jwk()]);
        assert_let!(Err(Error::SignatureInvalid(_)), result);
    }
}
