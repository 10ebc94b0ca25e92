//! # SD-JWT Verification
//!
//! Verify the issuer signature over an SD-JWT VC and reconstruct the claims
//! revealed by its disclosures.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::infosec::jws::{self, Type};
use crate::infosec::PublicKeyJwk;
use crate::sd_jwt::{Disclosure, SdJwtClaims, SD_ALG};
use crate::{Error, Result};

/// A credential whose issuer signature and disclosures have been verified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifiedCredential {
    /// The credential issuer.
    pub iss: String,

    /// The credential type.
    pub vct: String,

    /// All claims: those always disclosed plus those revealed by
    /// disclosures, with digests removed.
    pub claims: Map<String, Value>,

    /// Only the top-level claims revealed by disclosures.
    pub disclosed: Map<String, Value>,

    /// The holder key from `cnf`, if the credential is key bound.
    pub holder_jwk: Option<PublicKeyJwk>,

    /// The disclosures, in presentation order.
    pub disclosures: Vec<Disclosure>,
}

/// Verify a serialized SD-JWT (`<jwt>~<disclosure>~...~`) against the
/// trusted issuer keys in `trust`.
///
/// # Errors
///
/// Returns `Error::SignatureInvalid` if no trusted key verifies the issuer
/// signature, `Error::DisclosureNotBound` if a disclosure's digest is not
/// committed to by the payload, `Error::MalformedDisclosure` for structural
/// problems, and `Error::CredentialExpired` if the credential is outside its
/// validity period.
pub fn verify(serialized: &str, trust: &[PublicKeyJwk]) -> Result<VerifiedCredential> {
    tracing::debug!("sd_jwt::verify");

    let Some(body) = serialized.strip_suffix('~') else {
        return Err(Error::MalformedDisclosure("SD-JWT must end with '~'".into()));
    };
    let mut segments = body.split('~');
    let Some(jwt) = segments.next().filter(|s| !s.is_empty()) else {
        return Err(Error::MalformedDisclosure("SD-JWT has no issuer JWT".into()));
    };

    let payload = verify_signature(jwt, trust)?;

    if let Some(alg) = payload.get("_sd_alg") {
        if alg.as_str() != Some(SD_ALG) {
            return Err(Error::MalformedDisclosure(format!("unsupported '_sd_alg': {alg}")));
        }
    }

    let mut disclosures = Vec::new();
    let mut by_digest = HashMap::new();
    for encoded in segments {
        if encoded.is_empty() {
            return Err(Error::MalformedDisclosure("empty disclosure".into()));
        }
        let disclosure = Disclosure::parse(encoded)?;
        if by_digest.insert(disclosure.digest(), disclosure.clone()).is_some() {
            return Err(Error::MalformedDisclosure("duplicate disclosure".into()));
        }
        disclosures.push(disclosure);
    }

    let mut resolver = Resolver {
        by_digest: &by_digest,
        used: HashSet::new(),
    };
    let mut claims = payload;
    claims.remove("_sd_alg");
    let revealed = resolver.expand_object(&mut claims)?;

    if let Some(unbound) = disclosures.iter().find(|d| !resolver.used.contains(&d.digest())) {
        return Err(Error::DisclosureNotBound(format!(
            "disclosure for '{}' is not committed to by the issuer",
            unbound.name
        )));
    }

    let typed: SdJwtClaims = serde_json::from_value(Value::Object(claims.clone()))
        .map_err(|e| Error::MalformedDisclosure(format!("issue deserializing claims: {e}")))?;

    let now = Utc::now().timestamp();
    if typed.exp.is_some_and(|exp| exp <= now) {
        return Err(Error::CredentialExpired("credential 'exp' has passed".into()));
    }
    if claims.get("nbf").and_then(Value::as_i64).is_some_and(|nbf| nbf > now) {
        return Err(Error::CredentialExpired("credential is not yet valid".into()));
    }

    let disclosed = revealed
        .into_iter()
        .filter_map(|name| claims.get(&name).map(|v| (name, v.clone())))
        .collect();

    Ok(VerifiedCredential {
        iss: typed.iss,
        vct: typed.vct,
        claims,
        disclosed,
        holder_jwk: typed.cnf.map(|cnf| cnf.jwk),
        disclosures,
    })
}

// Check the issuer signature using the trusted key named by `kid`, or any
// trusted key when the header names none that is trusted.
fn verify_signature(jwt: &str, trust: &[PublicKeyJwk]) -> Result<Map<String, Value>> {
    let unverified = jws::parse::<Map<String, Value>>(jwt)
        .map_err(|e| Error::MalformedDisclosure(format!("issue parsing issuer JWT: {e}")))?;
    if unverified.header.typ != Type::SdJwt {
        return Err(Error::SignatureInvalid(format!(
            "unexpected 'typ' {}",
            unverified.header.typ
        )));
    }

    let by_kid = unverified
        .kid()
        .map(|kid| trust.iter().filter(|k| k.kid.as_deref() == Some(kid)).collect::<Vec<_>>())
        .unwrap_or_default();
    let candidates = if by_kid.is_empty() { trust.iter().collect() } else { by_kid };

    for jwk in candidates {
        if let Ok(verified) = unverified.clone().verify(jwk) {
            return Ok(verified.claims);
        }
    }
    Err(Error::SignatureInvalid("issuer signature not verified by a trusted key".into()))
}

struct Resolver<'a> {
    by_digest: &'a HashMap<String, Disclosure>,
    used: HashSet<String>,
}

impl Resolver<'_> {
    // Replace `_sd` digests in `obj` with the claims they commit to,
    // returning the names revealed at this level.
    fn expand_object(&mut self, obj: &mut Map<String, Value>) -> Result<Vec<String>> {
        let digests = match obj.remove("_sd") {
            None => Vec::new(),
            Some(Value::Array(digests)) => digests,
            Some(_) => return Err(Error::MalformedDisclosure("'_sd' is not an array".into())),
        };

        for value in obj.values_mut() {
            self.expand_value(value)?;
        }

        let mut revealed = Vec::new();
        for digest in digests {
            let Value::String(digest) = digest else {
                return Err(Error::MalformedDisclosure("'_sd' digest is not a string".into()));
            };
            // digests without a disclosure are decoys or undisclosed claims
            let Some(disclosure) = self.by_digest.get(&digest) else {
                continue;
            };
            if !self.used.insert(digest) {
                return Err(Error::MalformedDisclosure("digest appears more than once".into()));
            }
            if obj.contains_key(&disclosure.name) {
                return Err(Error::MalformedDisclosure(format!(
                    "claim '{}' is disclosed more than once",
                    disclosure.name
                )));
            }
            let mut value = disclosure.value.clone();
            self.expand_value(&mut value)?;
            obj.insert(disclosure.name.clone(), value);
            revealed.push(disclosure.name.clone());
        }

        Ok(revealed)
    }

    fn expand_value(&mut self, value: &mut Value) -> Result<()> {
        match value {
            Value::Object(obj) => {
                self.expand_object(obj)?;
            }
            Value::Array(items) => {
                items.retain(|item| !is_array_digest(item));
                for item in items {
                    self.expand_value(item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// Array element placeholders have the form `{"...": "<digest>"}`.
fn is_array_digest(item: &Value) -> bool {
    item.as_object().is_some_and(|obj| obj.len() == 1 && obj.contains_key("..."))
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;
    use crate::infosec::{Curve, KeyPair};
    use crate::sd_jwt::{issue_credential, CredentialParams, SdJwt};

    async fn credential(issuer: &KeyPair, expires_in: Option<TimeDelta>) -> SdJwt {
        let Value::Object(claims) = json!({
            "given_name": "Tyler",
            "family_name": "Neal",
            "address": {"country": "SE"}
        }) else {
            unreachable!()
        };
        let disclosable = vec!["given_name".to_string(), "family_name".to_string()];
        let params = CredentialParams {
            issuer: "https://localhost/pid-issuer",
            vct: "urn:eudi:pid:1",
            holder_jwk: Some(KeyPair::generate(Curve::P256).public_jwk()),
            claims: &claims,
            disclosable: &disclosable,
            expires_in,
        };
        issue_credential(issuer, &params).await.expect("should issue")
    }

    #[tokio::test]
    async fn disclosed_subset() {
        let issuer = KeyPair::generate(Curve::P256);
        let mut sd_jwt = credential(&issuer, None).await;
        sd_jwt.disclosures.retain(|d| d.name == "given_name");

        let verified = verify(&sd_jwt.serialize(), &[issuer.public_jwk()]).expect("should verify");
        assert_eq!(verified.disclosed, json!({"given_name": "Tyler"}).as_object().cloned().unwrap());
        assert_eq!(verified.claims.get("address"), Some(&json!({"country": "SE"})));
        assert!(!verified.claims.contains_key("family_name"));
        assert!(!verified.claims.contains_key("_sd"));
        assert!(verified.holder_jwk.is_some());
    }

    #[tokio::test]
    async fn tampered_disclosure() {
        let issuer = KeyPair::generate(Curve::P256);
        let mut sd_jwt = credential(&issuer, None).await;
        sd_jwt.disclosures[0] = Disclosure::new(sd_jwt.disclosures[0].name.clone(), json!("Mallory"));

        let result = verify(&sd_jwt.serialize(), &[issuer.public_jwk()]);
        assert!(matches!(result, Err(Error::DisclosureNotBound(_))));
    }

    #[tokio::test]
    async fn untrusted_issuer() {
        let issuer = KeyPair::generate(Curve::P256);
        let other = KeyPair::generate(Curve::P256);
        let sd_jwt = credential(&issuer, None).await;

        let result = verify(&sd_jwt.serialize(), &[other.public_jwk()]);
        assert!(matches!(result, Err(Error::SignatureInvalid(_))));
    }

    #[tokio::test]
    async fn duplicate_and_missing_tilde() {
        let issuer = KeyPair::generate(Curve::P256);
        let sd_jwt = credential(&issuer, None).await;
        let trust = [issuer.public_jwk()];

        let first = sd_jwt.disclosures[0].encoded();
        let duplicated = format!("{}{first}~", sd_jwt.serialize());
        assert!(matches!(verify(&duplicated, &trust), Err(Error::MalformedDisclosure(_))));

        let serialized = sd_jwt.serialize();
        let no_tilde = serialized.trim_end_matches('~');
        assert!(matches!(verify(no_tilde, &trust), Err(Error::MalformedDisclosure(_))));
    }

    #[tokio::test]
    async fn expired() {
        let issuer = KeyPair::generate(Curve::P256);
        let sd_jwt = credential(&issuer, TimeDelta::try_seconds(-10)).await;

        let result = verify(&sd_jwt.serialize(), &[issuer.public_jwk()]);
        assert!(matches!(result, Err(Error::CredentialExpired(_))));
    }
}
