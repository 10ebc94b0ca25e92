//! # Credential Endpoint
//!
//! The Credential Endpoint issues one SD-JWT VC per key proof upon
//! presentation of a valid `DPoP`-bound Access Token.
//!
//! A request is processed in order: the `DPoP` proof and token binding, then
//! decryption of the body, the key proofs and their shared `c_nonce`, and the
//! wallet attestation of each proof key. Any failure aborts the request and
//! no credential is returned.

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::dpop::Expected;
use crate::infosec::jws::{self, Type};
use crate::infosec::{jwe, Algorithm, PublicKeyJwk, SecOps};
use crate::issuer::provider::{Attestation, Authorization, Metadata, Provider, Subject};
use crate::issuer::types::{
    CredentialBody, CredentialConfiguration, CredentialRequest, CredentialResponse, Credentials,
    IssuedCredential, ProofClaims, RequestBody, FORMAT_SD_JWT_VC, FORMAT_VC_SD_JWT,
};
use crate::issuer::{attestation, Endpoint, Handler};
use crate::sd_jwt::{self, CredentialParams};
use crate::{invalid, server, Error, NonceError, ProofError, Result};

/// Credential request handler.
///
/// # Errors
///
/// Returns an error naming the first step that failed: `DPoP` proof or token
/// binding, decryption, key proof, nonce, attestation, or encryption of the
/// response.
#[instrument(level = "debug", skip(endpoint))]
pub async fn credential<P: Provider>(
    endpoint: &Endpoint<P>, request: CredentialRequest,
) -> Result<CredentialResponse> {
    let mut ctx = Context::default();
    let body = ctx.verify(endpoint, request).await?;
    ctx.process(endpoint, body).await
}

impl Handler for CredentialRequest {
    type Response = CredentialResponse;

    fn handle<P: Provider>(
        self, endpoint: &Endpoint<P>,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        credential(endpoint, self)
    }
}

#[derive(Debug, Default)]
struct Context {
    subject_id: String,
    configuration: CredentialConfiguration,
    holder_keys: Vec<PublicKeyJwk>,
}

impl Context {
    // Verify the credential request, returning the (decrypted) body.
    async fn verify<P: Provider>(
        &mut self, endpoint: &Endpoint<P>, request: CredentialRequest,
    ) -> Result<CredentialBody> {
        tracing::debug!("credential::verify");

        let config = &endpoint.config;
        if request.access_token.is_empty() {
            return Err(Error::AccessDenied("no access token".into()));
        }
        if request.dpop.is_empty() {
            return Err(Error::ProofInvalid(ProofError::Malformed("`DPoP` header missing".into())));
        }

        // proof of possession of the token's key
        let expected = Expected {
            method: "POST",
            url: &config.credential_endpoint,
            access_token: Some(&request.access_token),
        };
        let dpop = endpoint.proofs.validate_proof(&request.dpop, &expected)?;

        let token = endpoint
            .upstream(Authorization::introspect(&endpoint.provider, &request.access_token), |e| {
                Error::AccessDenied(format!("issue introspecting token: {e}"))
            })
            .await?;
        if !token.active {
            return Err(Error::AccessDenied("access token is not active".into()));
        }
        if token.jkt.as_deref() != Some(dpop.jkt.as_str()) {
            return Err(ProofError::UnboundKey("token is not bound to the `DPoP` key".into()).into());
        }
        self.subject_id = token.subject_id;

        let body = match request.body {
            RequestBody::Plain(body) => body,
            RequestBody::Encrypted(compact) => {
                let decryptor = SecOps::decryptor(&endpoint.provider, &config.credential_issuer)
                    .map_err(|e| server!("issue getting decryptor: {e}"))?;
                jwe::decrypt(&compact, &decryptor)
                    .await
                    .map_err(|e| Error::DecryptionFailed(e.to_string()))?
            }
        };

        let issuer = endpoint
            .upstream(Metadata::issuer(&endpoint.provider, &config.credential_issuer), |e| {
                server!("issue getting metadata: {e}")
            })
            .await?;
        let Some(configuration) =
            issuer.credential_configurations_supported.get(&body.credential_configuration_id)
        else {
            return Err(invalid!(
                "unsupported credential_configuration_id {}",
                body.credential_configuration_id
            ));
        };
        if let Some(format) = &body.format {
            if format != FORMAT_SD_JWT_VC && format != FORMAT_VC_SD_JWT {
                return Err(invalid!("unsupported format {format}"));
            }
        }
        self.configuration = configuration.clone();

        if body.proofs.jwt.is_empty() {
            return Err(Error::KeyProofInvalid("no key proofs".into()));
        }
        if let Some(batch) = &issuer.batch_credential_issuance {
            if body.proofs.jwt.len() > batch.batch_size {
                return Err(invalid!("more than {} key proofs", batch.batch_size));
            }
        }

        // key proofs share a single nonce, consumed once for the request
        let mut proofs = Vec::with_capacity(body.proofs.jwt.len());
        for proof_jwt in &body.proofs.jwt {
            proofs.push(verify_proof(proof_jwt, &config.credential_issuer, config.skew)?);
        }
        let Some(nonce) = proofs[0].claims.nonce.clone() else {
            return Err(NonceError::Required.into());
        };
        if proofs.iter().any(|p| p.claims.nonce.as_ref() != Some(&nonce)) {
            return Err(Error::KeyProofInvalid("key proofs use different nonces".into()));
        }
        endpoint.nonces.consume(&nonce, &dpop.jkt)?;

        let needs_anchors = config.attestation_required
            || proofs.iter().any(|p| p.attestation.is_some());
        let anchors = if needs_anchors {
            endpoint
                .upstream(Attestation::trust_anchors(&endpoint.provider), |e| {
                    Error::AttestationInvalid(format!("issue getting trust anchors: {e}"))
                })
                .await?
        } else {
            Vec::new()
        };

        for proof in proofs {
            match &proof.attestation {
                Some(wua) => attestation::verify(wua, &proof.jwk, &nonce, &anchors)?,
                None if config.attestation_required => {
                    return Err(Error::AttestationInvalid("key proof has no attestation".into()));
                }
                None => {}
            }
            self.holder_keys.push(proof.jwk);
        }

        Ok(body)
    }

    // Issue a credential per holder key.
    async fn process<P: Provider>(
        &self, endpoint: &Endpoint<P>, body: CredentialBody,
    ) -> Result<CredentialResponse> {
        tracing::debug!("credential::process");

        let config = &endpoint.config;
        let dataset = endpoint
            .upstream(
                Subject::dataset(
                    &endpoint.provider,
                    &self.subject_id,
                    &body.credential_configuration_id,
                ),
                |e| server!("issue populating claims: {e}"),
            )
            .await?;

        let signer = SecOps::signer(&endpoint.provider, &config.credential_issuer)
            .map_err(|e| server!("issue getting signer: {e}"))?;
        let disclosable = self.configuration.disclosable();

        let mut credentials = Vec::with_capacity(self.holder_keys.len());
        for holder_jwk in &self.holder_keys {
            let params = CredentialParams {
                issuer: &config.credential_issuer,
                vct: &self.configuration.vct,
                holder_jwk: Some(holder_jwk.clone()),
                claims: &dataset.claims,
                disclosable: &disclosable,
                expires_in: Some(config.credential_validity),
            };
            let sd_jwt = sd_jwt::issue_credential(&signer, &params).await?;
            credentials.push(IssuedCredential {
                credential: sd_jwt.serialize(),
            });
        }

        let Some(encryption) = body.credential_response_encryption else {
            return Ok(CredentialResponse::Plain(Credentials {
                iss: None,
                credentials,
            }));
        };

        // compression (`zip`) is not applied to response payloads
        let payload = Credentials {
            iss: Some(config.credential_issuer.clone()),
            credentials,
        };
        let jwe = jwe::encrypt(&payload, &encryption.jwk, encryption.enc)
            .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

        Ok(CredentialResponse::Encrypted(jwe))
    }
}

// A key proof whose signature and claims have been checked.
struct VerifiedProof {
    jwk: PublicKeyJwk,
    claims: ProofClaims,
    attestation: Option<String>,
}

fn verify_proof(
    proof_jwt: &str, credential_issuer: &str, skew: chrono::TimeDelta,
) -> Result<VerifiedProof> {
    let unverified = jws::parse::<ProofClaims>(proof_jwt)
        .map_err(|e| Error::KeyProofInvalid(format!("issue parsing key proof: {e}")))?;
    if unverified.header.typ != Type::Proof {
        return Err(Error::KeyProofInvalid(format!(
            "key proof 'typ' {} is not {}",
            unverified.header.typ,
            Type::Proof
        )));
    }
    if !matches!(unverified.header.alg, Algorithm::ES256 | Algorithm::EdDSA) {
        return Err(Error::KeyProofInvalid("unsupported key proof 'alg'".into()));
    }
    if unverified.has_private_key() {
        return Err(Error::KeyProofInvalid("key proof header contains a private key".into()));
    }
    let Some(jwk) = unverified.embedded_jwk().cloned() else {
        return Err(Error::KeyProofInvalid("key proof 'jwk' is missing".into()));
    };
    let header_attestation = unverified.header.key_attestation.clone();

    let jwt = unverified
        .verify(&jwk)
        .map_err(|e| Error::KeyProofInvalid(format!("key proof signature: {e}")))?;
    let claims = jwt.claims;

    if claims.aud != credential_issuer {
        return Err(Error::KeyProofInvalid(format!("key proof 'aud' {} is invalid", claims.aud)));
    }
    let Some(iat) = DateTime::from_timestamp(claims.iat, 0) else {
        return Err(Error::KeyProofInvalid("key proof 'iat' is invalid".into()));
    };
    if (Utc::now() - iat).abs() > skew {
        return Err(Error::KeyProofInvalid("key proof 'iat' is outside the window".into()));
    }

    let attestation = claims.wua.clone().or(header_attestation);
    Ok(VerifiedProof {
        jwk,
        claims,
        attestation,
    })
}
