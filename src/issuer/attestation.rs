//! # Wallet Attestation
//!
//! Structural validation of a wallet unit or key attestation: signed by a
//! trusted attestation authority, unexpired, and attesting the key used in
//! the accompanying key proof.

use chrono::Utc;

use crate::infosec::jws::{self, Type};
use crate::infosec::PublicKeyJwk;
use crate::issuer::types::AttestationClaims;
use crate::{Error, Result};

/// Verify `attestation` covers `proof_key`.
///
/// When the attestation carries a nonce it must equal `nonce`, the nonce of
/// the key proof it accompanies.
///
/// # Errors
///
/// Returns [`Error::AttestationInvalid`] if the attestation is malformed, not
/// signed by one of `anchors`, expired, does not attest `proof_key`, or
/// carries a different nonce.
pub fn verify(
    attestation: &str, proof_key: &PublicKeyJwk, nonce: &str, anchors: &[PublicKeyJwk],
) -> Result<()> {
    tracing::debug!("attestation::verify");

    let unverified = jws::parse::<AttestationClaims>(attestation)
        .map_err(|e| Error::AttestationInvalid(format!("issue parsing attestation: {e}")))?;
    if !matches!(unverified.header.typ, Type::Attestation | Type::Jwt) {
        return Err(Error::AttestationInvalid(format!(
            "unexpected 'typ' {}",
            unverified.header.typ
        )));
    }

    let kid = unverified.kid().map(ToString::to_string);
    let candidates = anchors
        .iter()
        .filter(|a| kid.is_none() || a.kid.is_none() || a.kid == kid)
        .collect::<Vec<_>>();
    let Some(claims) = candidates.iter().find_map(|a| unverified.clone().verify(a).ok()) else {
        return Err(Error::AttestationInvalid("not signed by a trusted authority".into()));
    };
    let claims = claims.claims;

    if claims.exp <= Utc::now().timestamp() {
        return Err(Error::AttestationInvalid("attestation has expired".into()));
    }

    let attested = claims.attested_keys.iter().any(|k| k.same_key(proof_key))
        || claims.cnf.as_ref().is_some_and(|cnf| cnf.jwk.same_key(proof_key));
    if !attested {
        return Err(Error::AttestationInvalid("proof key is not attested".into()));
    }

    if let Some(attested_nonce) = &claims.nonce {
        if attested_nonce != nonce {
            return Err(Error::AttestationInvalid("attestation nonce does not match".into()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::infosec::jws::Key;
    use crate::infosec::{Curve, KeyPair};
    use crate::issuer::types::AttestationCnf;

    async fn attest(authority: &KeyPair, key: &PublicKeyJwk, ttl: TimeDelta) -> String {
        let claims = AttestationClaims {
            iss: Some("https://localhost/wallet-provider".into()),
            exp: (Utc::now() + ttl).timestamp(),
            cnf: Some(AttestationCnf { jwk: key.clone() }),
            ..AttestationClaims::default()
        };
        let kid = Key::KeyId(authority.kid().to_string());
        jws::encode(Type::Attestation, &claims, kid, authority).await.expect("should encode")
    }

    #[tokio::test]
    async fn attested_key() {
        let authority = KeyPair::generate(Curve::P256);
        let wallet = KeyPair::generate(Curve::P256).public_jwk();
        let wua = attest(&authority, &wallet, TimeDelta::hours(1)).await;

        assert_eq!(verify(&wua, &wallet, "n", &[authority.public_jwk()]), Ok(()));

        let other = KeyPair::generate(Curve::P256).public_jwk();
        let result = verify(&wua, &other, "n", &[authority.public_jwk()]);
        assert!(matches!(result, Err(Error::AttestationInvalid(_))));
    }

    #[tokio::test]
    async fn untrusted_or_expired() {
        let authority = KeyPair::generate(Curve::P256);
        let wallet = KeyPair::generate(Curve::P256).public_jwk();

        let wua = attest(&authority, &wallet, TimeDelta::hours(1)).await;
        let stranger = KeyPair::generate(Curve::P256).public_jwk();
        assert!(verify(&wua, &wallet, "n", &[stranger]).is_err());

        let expired = attest(&authority, &wallet, TimeDelta::seconds(-5)).await;
        assert!(verify(&expired, &wallet, "n", &[authority.public_jwk()]).is_err());
    }
}
