//! # SD-JWT Issuance
//!
//! Build and sign an SD-JWT VC, replacing each selectively disclosable claim
//! with the digest of a freshly salted disclosure.

use chrono::{TimeDelta, Utc};
use serde_json::{Map, Value};

use crate::infosec::jws::{self, Key, Type};
use crate::infosec::{PublicKeyJwk, Signer};
use crate::sd_jwt::{Cnf, Disclosure, SdJwt, SdJwtClaims, RESERVED_CLAIMS, SD_ALG};
use crate::{invalid, server, Result};

/// Parameters for issuing a credential.
#[derive(Clone, Debug)]
pub struct CredentialParams<'a> {
    /// The credential issuer identifier, used as `iss`.
    pub issuer: &'a str,

    /// The credential type, used as `vct`.
    pub vct: &'a str,

    /// The holder's public key, bound via `cnf`.
    pub holder_jwk: Option<PublicKeyJwk>,

    /// The subject's claims.
    pub claims: &'a Map<String, Value>,

    /// Names of the top-level claims to make selectively disclosable.
    pub disclosable: &'a [String],

    /// Validity period of the credential.
    pub expires_in: Option<TimeDelta>,
}

/// Issue an SD-JWT VC signed by `signer`.
///
/// Claims named in `disclosable` are replaced by digests in `_sd`; all other
/// claims appear directly in the payload. Digests are sorted so their order
/// reveals nothing about the order of claims.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` if a subject claim uses a reserved name,
/// and `Error::ServerError` if signing fails.
pub async fn issue_credential(
    signer: &impl Signer, params: &CredentialParams<'_>,
) -> Result<SdJwt> {
    tracing::debug!("sd_jwt::issue_credential");

    let mut plain = Map::new();
    let mut disclosures = Vec::new();

    for (name, value) in params.claims {
        if RESERVED_CLAIMS.contains(&name.as_str()) {
            return Err(invalid!("claim name '{name}' is reserved"));
        }
        if params.disclosable.contains(name) {
            disclosures.push(Disclosure::new(name.clone(), value.clone()));
        } else {
            plain.insert(name.clone(), value.clone());
        }
    }

    let mut sd = disclosures.iter().map(Disclosure::digest).collect::<Vec<_>>();
    sd.sort();

    let now = Utc::now();
    let claims = SdJwtClaims {
        sd_alg: (!sd.is_empty()).then(|| SD_ALG.to_string()),
        sd,
        iss: params.issuer.to_string(),
        iat: now.timestamp(),
        exp: params.expires_in.map(|ttl| (now + ttl).timestamp()),
        vct: params.vct.to_string(),
        cnf: params.holder_jwk.clone().map(|jwk| Cnf { jwk }),
        claims: plain,
    };

    let kid = signer.verification_method();
    let jwt = jws::encode(Type::SdJwt, &claims, Key::KeyId(kid), signer)
        .await
        .map_err(|e| server!("issue signing credential: {e}"))?;

    Ok(SdJwt { jwt, disclosures })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::infosec::{Curve, KeyPair};

    #[tokio::test]
    async fn digests_replace_values() {
        let issuer = KeyPair::generate(Curve::P256);
        let claims = json!({
            "given_name": "Tyler",
            "family_name": "Neal",
            "issuing_country": "SE"
        });
        let Value::Object(claims) = claims else { unreachable!() };
        let disclosable = vec!["given_name".to_string(), "family_name".to_string()];

        let params = CredentialParams {
            issuer: "https://localhost/pid-issuer",
            vct: "urn:eudi:pid:1",
            claims: &claims,
            disclosable: &disclosable,
            holder_jwk: None,
            expires_in: None,
        };
        let sd_jwt = issue_credential(&issuer, &params).await.expect("should issue");
        assert_eq!(sd_jwt.disclosures.len(), 2);

        let jwt = jws::parse::<SdJwtClaims>(&sd_jwt.jwt).expect("should parse");
        assert_eq!(jwt.header.typ, Type::SdJwt);
        assert_eq!(jwt.claims.sd.len(), 2);
        assert!(jwt.claims.sd.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(jwt.claims.claims.get("issuing_country"), Some(&json!("SE")));
        assert!(!jwt.claims.claims.contains_key("given_name"));

        let serialized = sd_jwt.serialize();
        assert!(serialized.ends_with('~'));
        assert_eq!(serialized.matches('~').count(), 3);
    }

    #[tokio::test]
    async fn reserved_claim() {
        let issuer = KeyPair::generate(Curve::P256);
        let Value::Object(claims) = json!({"iss": "spoofed"}) else { unreachable!() };
        let params = CredentialParams {
            issuer: "https://localhost/pid-issuer",
            vct: "urn:eudi:pid:1",
            claims: &claims,
            holder_jwk: None,
            disclosable: &[],
            expires_in: None,
        };
        assert!(issue_credential(&issuer, &params).await.is_err());
    }
}
