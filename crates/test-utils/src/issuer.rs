//! Issuer provider: PID metadata and subject data, an in-memory identity
//! provider, and the issuer's signing and encryption keys.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use wallet_ecosystem::infosec::{Curve, KeyPair, PublicKeyJwk, SecOps};
use wallet_ecosystem::issuer::provider::{
    Attestation, Authorization, Decryptor, Metadata, Signer, Subject,
};
use wallet_ecosystem::issuer::{
    BatchCredentialIssuance, ClaimsDescription, CredentialConfiguration, Dataset, Issuer,
    ProofTypesSupported, TokenInfo, FORMAT_SD_JWT_VC,
};

use crate::{NORMAL_USER, PID_CONFIGURATION_ID, PID_VCT};

/// Maximum number of key proofs per credential request.
pub const BATCH_SIZE: usize = 3;

#[derive(Clone, Debug)]
pub struct Provider {
    signing: KeyPair,
    encryption: KeyPair,
    wallet_provider: Vec<PublicKeyJwk>,
    tokens: Arc<Mutex<HashMap<String, TokenInfo>>>,
    latency: Option<Duration>,
}

impl Provider {
    /// A provider trusting attestations signed by `wallet_provider`.
    #[must_use]
    pub fn new(wallet_provider: PublicKeyJwk) -> Self {
        Self {
            signing: KeyPair::generate(Curve::P256).with_kid("pid-issuer-signing"),
            encryption: KeyPair::generate(Curve::P256).with_kid("pid-issuer-encryption"),
            wallet_provider: vec![wallet_provider],
            tokens: Arc::new(Mutex::new(HashMap::new())),
            latency: None,
        }
    }

    /// Delay every identity provider and subject lookup by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Issue an access token for `subject_id`, bound to the `DPoP` key with
    /// thumbprint `jkt`.
    #[must_use]
    pub fn issue_token(&self, subject_id: &str, jkt: &str) -> String {
        let token = format!("at-{}", self.tokens.lock().expect("should lock").len() + 1);
        let info = TokenInfo {
            active: true,
            subject_id: subject_id.to_string(),
            jkt: Some(jkt.to_string()),
        };
        self.tokens.lock().expect("should lock").insert(token.clone(), info);
        token
    }

    /// Deactivate a previously issued access token.
    pub fn revoke_token(&self, token: &str) {
        if let Some(info) = self.tokens.lock().expect("should lock").get_mut(token) {
            info.active = false;
        }
    }

    /// The key credentials are signed with.
    #[must_use]
    pub fn issuer_jwk(&self) -> PublicKeyJwk {
        self.signing.public_jwk()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl wallet_ecosystem::issuer::Provider for Provider {}

impl Metadata for Provider {
    async fn issuer(&self, issuer_id: &str) -> Result<Issuer> {
        let claims = ["given_name", "family_name", "birthdate", "issuing_authority"]
            .into_iter()
            .map(|name| ClaimsDescription {
                path: vec![name.to_string()],
                mandatory: None,
                selectively_disclosable: true,
            })
            .collect();
        let pid = CredentialConfiguration {
            format: FORMAT_SD_JWT_VC.into(),
            scope: Some(PID_CONFIGURATION_ID.into()),
            vct: PID_VCT.into(),
            proof_types_supported: HashMap::from([(
                "jwt".into(),
                ProofTypesSupported {
                    proof_signing_alg_values_supported: vec!["ES256".into(), "EdDSA".into()],
                },
            )]),
            claims,
        };

        Ok(Issuer {
            credential_issuer: issuer_id.to_string(),
            batch_credential_issuance: Some(BatchCredentialIssuance {
                batch_size: BATCH_SIZE,
            }),
            credential_configurations_supported: HashMap::from([(
                PID_CONFIGURATION_ID.into(),
                pid,
            )]),
            ..Issuer::default()
        })
    }
}

impl Subject for Provider {
    async fn dataset(
        &self, subject_id: &str, credential_configuration_id: &str,
    ) -> Result<Dataset> {
        self.delay().await;

        if credential_configuration_id != PID_CONFIGURATION_ID {
            return Err(anyhow!("no dataset for {credential_configuration_id}"));
        }
        if subject_id != NORMAL_USER {
            return Err(anyhow!("unknown subject {subject_id}"));
        }
        let Value::Object(claims) = json!({
            "given_name": "Tyler",
            "family_name": "Neal",
            "birthdate": "1955-04-12",
            "issuing_authority": "SE Administrative authority",
            "issuing_country": "SE"
        }) else {
            return Err(anyhow!("dataset is not an object"));
        };
        Ok(Dataset { claims })
    }
}

impl Authorization for Provider {
    async fn introspect(&self, access_token: &str) -> Result<TokenInfo> {
        self.delay().await;

        let tokens = self.tokens.lock().map_err(|_| anyhow!("token store poisoned"))?;
        Ok(tokens.get(access_token).cloned().unwrap_or_default())
    }
}

impl Attestation for Provider {
    async fn trust_anchors(&self) -> Result<Vec<PublicKeyJwk>> {
        Ok(self.wallet_provider.clone())
    }
}

impl SecOps for Provider {
    fn signer(&self, _identifier: &str) -> Result<impl Signer> {
        Ok(self.signing.clone())
    }

    fn decryptor(&self, _identifier: &str) -> Result<impl Decryptor> {
        Ok(self.encryption.clone())
    }
}
