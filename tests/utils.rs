#![allow(missing_docs, dead_code)]

use rstest::fixture;
pub use test_utils::init_tracer;
use test_utils::wallet::Wallet;
use test_utils::{issuer, PID_CONFIGURATION_ID};
use wallet_ecosystem::issuer::{
    CredentialBody, CredentialRequest, CredentialResponse, Endpoint, NonceRequest, Proofs,
    RequestBody,
};
use wallet_ecosystem::infosec::PublicKeyJwk;
use wallet_ecosystem::IssuerConfig;

#[fixture]
pub fn wallet() -> Wallet {
    Wallet::new()
}

/// An issuer trusting the wallet's provider. The returned provider shares
/// its token store with the endpoint's.
pub fn issuer_endpoint(wallet: &Wallet) -> (issuer::Provider, Endpoint<issuer::Provider>) {
    let provider = issuer::Provider::new(wallet.wallet_provider_jwk());
    (provider.clone(), Endpoint::new(provider, IssuerConfig::default()))
}

/// Fetch a fresh `c_nonce` for the wallet's `DPoP` key.
pub async fn c_nonce(endpoint: &Endpoint<issuer::Provider>, wallet: &Wallet) -> String {
    let request = NonceRequest {
        dpop: wallet.dpop(&endpoint.config().nonce_endpoint, None).await,
    };
    endpoint.handle(request).await.expect("should issue nonce").c_nonce
}

/// A credential request for the PID carrying `proofs`.
pub async fn credential_request(
    endpoint: &Endpoint<issuer::Provider>, wallet: &Wallet, access_token: &str,
    proofs: Vec<String>,
) -> CredentialRequest {
    let url = &endpoint.config().credential_endpoint;
    CredentialRequest {
        access_token: access_token.to_string(),
        dpop: wallet.dpop(url, Some(access_token)).await,
        body: RequestBody::Plain(CredentialBody {
            format: None,
            proofs: Proofs { jwt: proofs },
            credential_configuration_id: PID_CONFIGURATION_ID.into(),
            credential_response_encryption: None,
        }),
    }
}

/// Run the issuance flow end to end, returning the wallet's PID and the key
/// it was signed with.
pub async fn issue_pid(wallet: &Wallet) -> (String, PublicKeyJwk) {
    let (provider, endpoint) = issuer_endpoint(wallet);
    let access_token = provider.issue_token(test_utils::NORMAL_USER, &wallet.jkt());
    let nonce = c_nonce(&endpoint, wallet).await;
    let proof = wallet.proof(&endpoint.config().credential_issuer, &nonce).await;
    let request = credential_request(&endpoint, wallet, &access_token, vec![proof]).await;

    let CredentialResponse::Plain(response) =
        endpoint.handle(request).await.expect("should issue credential")
    else {
        panic!("should be plain");
    };
    (response.credentials[0].credential.clone(), provider.issuer_jwk())
}
