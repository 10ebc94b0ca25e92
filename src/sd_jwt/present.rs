//! # SD-JWT Presentation
//!
//! Holder-side helper: select the disclosures to reveal and append a key
//! binding JWT for a relying party.

use chrono::Utc;

use crate::infosec::jws::{self, Key, Type};
use crate::infosec::Signer;
use crate::sd_jwt::{sd_hash, Disclosure, KbJwtClaims};
use crate::{server, Error, Result};

/// Key binding parameters supplied by the relying party.
#[derive(Clone, Debug, Default)]
pub struct KbParams<'a> {
    /// The relying party's client identifier.
    pub aud: &'a str,

    /// The nonce issued for the exchange.
    pub nonce: &'a str,
}

/// Create a presentation of `credential` revealing only the claims named in
/// `reveal`, bound to the holder key held by `signer`.
///
/// # Errors
///
/// Returns `Error::MalformedDisclosure` if the credential cannot be parsed,
/// and `Error::ServerError` if signing the key binding JWT fails.
pub async fn present(
    credential: &str, reveal: &[&str], kb: &KbParams<'_>, signer: &impl Signer,
) -> Result<String> {
    tracing::debug!("sd_jwt::present");

    let mut segments = credential.split('~');
    let Some(jwt) = segments.next().filter(|s| !s.is_empty()) else {
        return Err(Error::MalformedDisclosure("credential has no issuer JWT".into()));
    };

    let mut presentation = format!("{jwt}~");
    for encoded in segments.filter(|s| !s.is_empty()) {
        let disclosure = Disclosure::parse(encoded)?;
        if reveal.contains(&disclosure.name.as_str()) {
            presentation.push_str(encoded);
            presentation.push('~');
        }
    }

    let claims = KbJwtClaims {
        aud: kb.aud.to_string(),
        iat: Utc::now().timestamp(),
        nonce: kb.nonce.to_string(),
        sd_hash: sd_hash(&presentation),
    };
    let jwk = signer.public_key().await.map_err(|e| server!("issue getting holder key: {e}"))?;
    let kb_jwt = jws::encode(Type::KbJwt, &claims, Key::Jwk(jwk), signer)
        .await
        .map_err(|e| server!("issue signing key binding JWT: {e}"))?;

    presentation.push_str(&kb_jwt);
    Ok(presentation)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::infosec::{Curve, KeyPair};
    use crate::sd_jwt::{issue_credential, split_presentation, CredentialParams};

    #[tokio::test]
    async fn reveal_subset() {
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

        let kb = KbParams {
            aud: "x509_san_dns:verifier.localhost",
            nonce: "n-0S6_WzA2Mj",
        };
        let presentation =
            present(&credential, &["given_name"], &kb, &holder).await.expect("should present");

        let (bound, kb_jwt) = split_presentation(&presentation).expect("should split");
        assert_eq!(bound.matches('~').count(), 2);

        let kb_jwt = jws::parse::<KbJwtClaims>(kb_jwt.expect("should have kb-jwt"))
            .expect("should parse");
        assert_eq!(kb_jwt.header.typ, Type::KbJwt);
        assert_eq!(kb_jwt.claims.sd_hash, sd_hash(bound));
        assert_eq!(kb_jwt.claims.aud, kb.aud);
    }
}
