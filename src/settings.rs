//! # Settings
//!
//! Service identifiers and tunables for the issuer and verifier, loaded from
//! `DIGG_WALLET_ECOSYSTEM_`-prefixed environment variables over built-in
//! defaults.
//!
//! Handlers never read the environment themselves: an [`IssuerConfig`] or
//! [`VerifierConfig`] derived from [`Settings`] is passed in at construction.

use std::collections::HashMap;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::dpop::DEFAULT_SKEW_SECS;
use crate::metadata::MetadataLocation;
use crate::nonce::DEFAULT_TTL_SECS;

/// Prefix of environment variables overriding settings.
pub const ENV_PREFIX: &str = "DIGG_WALLET_ECOSYSTEM";

const DEFAULTS: [(&str, &str); 7] = [
    ("keycloak_base_uri", "https://localhost/idp"),
    ("pid_issuer_base_uri", "https://localhost/pid-issuer"),
    ("wallet_provider_base_uri", "https://localhost/wallet-provider"),
    ("verifier_backend_base_uri", "https://localhost/refimpl-verifier-backend"),
    ("verifier_frontend_base_uri", "https://localhost/custom-verifier"),
    ("verifier_client_id", "x509_san_dns:refimpl-verifier-backend.wallet.local"),
    ("metadata_location", "BASIC"),
];

/// Ecosystem service identifiers.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    /// Identity provider base URI.
    pub keycloak_base_uri: String,

    /// PID issuer base URI, also its credential issuer identifier.
    pub pid_issuer_base_uri: String,

    /// Wallet provider (attestation authority) base URI.
    pub wallet_provider_base_uri: String,

    /// Verifier backend base URI.
    pub verifier_backend_base_uri: String,

    /// Verifier frontend base URI.
    pub verifier_frontend_base_uri: String,

    /// Client identifier the verifier presents to wallets.
    pub verifier_client_id: String,

    /// Well-known metadata addressing convention.
    pub metadata_location: MetadataLocation,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            keycloak_base_uri: DEFAULTS[0].1.into(),
            pid_issuer_base_uri: DEFAULTS[1].1.into(),
            wallet_provider_base_uri: DEFAULTS[2].1.into(),
            verifier_backend_base_uri: DEFAULTS[3].1.into(),
            verifier_frontend_base_uri: DEFAULTS[4].1.into(),
            verifier_client_id: DEFAULTS[5].1.into(),
            metadata_location: MetadataLocation::Basic,
        }
    }
}

impl Settings {
    /// Load settings from the process environment, after reading a `.env`
    /// file if one is present.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed into its setting.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::load(None)
    }

    /// Load settings from `vars` in place of the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed into its setting.
    pub fn from_vars(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        for (key, value) in DEFAULTS {
            builder = builder.set_default(key, value)?;
        }
        let env = ::config::Environment::with_prefix(ENV_PREFIX).source(vars);
        let settings = builder.add_source(env).build()?.try_deserialize::<Self>()?;

        tracing::debug!(?settings.metadata_location, "settings::load");
        Ok(settings)
    }

    /// Issuer configuration derived from these settings.
    #[must_use]
    pub fn issuer_config(&self) -> IssuerConfig {
        let base = self.pid_issuer_base_uri.trim_end_matches('/');
        IssuerConfig {
            credential_issuer: base.to_string(),
            credential_endpoint: format!("{base}/wallet/credentialEndpoint"),
            nonce_endpoint: format!("{base}/wallet/nonceEndpoint"),
            authorization_servers: vec![self.keycloak_base_uri.clone()],
            metadata_location: self.metadata_location,
            skew: TimeDelta::seconds(DEFAULT_SKEW_SECS),
            nonce_ttl: TimeDelta::seconds(DEFAULT_TTL_SECS),
            upstream_timeout: Duration::from_secs(10),
            attestation_required: true,
            credential_validity: TimeDelta::days(365),
        }
    }

    /// Verifier configuration derived from these settings.
    #[must_use]
    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            client_id: self.verifier_client_id.clone(),
            public_url: self.verifier_backend_base_uri.trim_end_matches('/').to_string(),
            ..VerifierConfig::default()
        }
    }
}

/// Credential issuer configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuerConfig {
    /// Credential issuer identifier.
    pub credential_issuer: String,

    /// URL of the credential endpoint, the `htu` of credential requests.
    pub credential_endpoint: String,

    /// URL of the nonce endpoint, the `htu` of nonce requests.
    pub nonce_endpoint: String,

    /// Authorization servers issuing access tokens for the issuer.
    pub authorization_servers: Vec<String>,

    /// Addressing convention for the issuer's metadata.
    pub metadata_location: MetadataLocation,

    /// Accepted clock skew for `DPoP` and key proof `iat`.
    pub skew: TimeDelta,

    /// Lifetime of issued nonces.
    pub nonce_ttl: TimeDelta,

    /// Time allowed for each call to an external collaborator.
    pub upstream_timeout: Duration,

    /// Whether key proofs must be accompanied by a wallet attestation.
    pub attestation_required: bool,

    /// Validity period of issued credentials.
    pub credential_validity: TimeDelta,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Settings::default().issuer_config()
    }
}

/// Verifier configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Client identifier presented to wallets, the expected key binding
    /// `aud`.
    pub client_id: String,

    /// Public base URL of the verifier backend.
    pub public_url: String,

    /// Validity window of a request object reference.
    pub request_ttl: TimeDelta,

    /// How long transactions are retained.
    pub retention: TimeDelta,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            client_id: settings.verifier_client_id,
            public_url: settings.verifier_backend_base_uri,
            request_ttl: TimeDelta::minutes(5),
            retention: TimeDelta::hours(24),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::from_vars(HashMap::new()).expect("should load");
        assert_eq!(settings, Settings::default());

        let config = settings.issuer_config();
        assert_eq!(
            config.credential_endpoint,
            "https://localhost/pid-issuer/wallet/credentialEndpoint"
        );
        assert_eq!(config.nonce_endpoint, "https://localhost/pid-issuer/wallet/nonceEndpoint");
        assert!(config.attestation_required);
    }

    #[test]
    fn env_overrides() {
        let vars = HashMap::from([
            ("DIGG_WALLET_ECOSYSTEM_PID_ISSUER_BASE_URI".into(), "https://issuer.test/".into()),
            ("DIGG_WALLET_ECOSYSTEM_METADATA_LOCATION".into(), "OID4VCI_COMPLIANT".into()),
        ]);
        let settings = Settings::from_vars(vars).expect("should load");
        assert_eq!(settings.metadata_location, MetadataLocation::Oid4vciCompliant);
        assert_eq!(settings.issuer_config().credential_issuer, "https://issuer.test");
        assert_eq!(settings.verifier_client_id, DEFAULTS[5].1);
    }
}
