//! # Metadata Location
//!
//! Locate a well-known metadata document relative to a service identifier.
//!
//! ```text
//! identifier:        https://issuer.example.com/tenant
//! BASIC:             https://issuer.example.com/tenant/.well-known/openid-credential-issuer
//! OID4VCI_COMPLIANT: https://issuer.example.com/.well-known/openid-credential-issuer/tenant
//! ```

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{invalid, Result};

/// Well-known path of credential issuer metadata.
pub const CREDENTIAL_ISSUER: &str = "/.well-known/openid-credential-issuer";

/// Well-known path of authorization server metadata.
pub const AUTHORIZATION_SERVER: &str = "/.well-known/oauth-authorization-server";

/// Well-known path of verifier metadata.
pub const VERIFIER: &str = "/.well-known/openid4vp-verifier";

/// Strategy for placing the well-known path relative to the identifier.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataLocation {
    /// Append the well-known path to the identifier's path.
    #[default]
    #[serde(alias = "basic")]
    Basic,

    /// Insert the well-known path between the host and the identifier's path.
    #[serde(rename = "OID4VCI_COMPLIANT", alias = "oid4vci_compliant")]
    Oid4vciCompliant,
}

impl Display for MetadataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "BASIC"),
            Self::Oid4vciCompliant => write!(f, "OID4VCI_COMPLIANT"),
        }
    }
}

/// Resolve the location of the `well_known` document for `identifier`.
///
/// Any query or fragment on the identifier is dropped, and a trailing `/` on
/// its path is ignored.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` if `identifier` is not an absolute
/// hierarchical URL.
pub fn resolve(strategy: MetadataLocation, identifier: &str, well_known: &str) -> Result<Url> {
    let mut url =
        Url::parse(identifier).map_err(|e| invalid!("invalid identifier '{identifier}': {e}"))?;
    if url.cannot_be_a_base() {
        return Err(invalid!("identifier '{identifier}' has no path"));
    }
    url.set_query(None);
    url.set_fragment(None);

    let path = url.path().trim_end_matches('/').to_string();
    let well_known = format!("/{}", well_known.trim_matches('/'));

    match strategy {
        MetadataLocation::Basic => url.set_path(&format!("{path}{well_known}")),
        MetadataLocation::Oid4vciCompliant => url.set_path(&format!("{well_known}{path}")),
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_serde() {
        let location: MetadataLocation =
            serde_json::from_str(r#""OID4VCI_COMPLIANT""#).expect("should deserialize");
        assert_eq!(location, MetadataLocation::Oid4vciCompliant);
        assert_eq!(location.to_string(), "OID4VCI_COMPLIANT");
        assert_eq!(serde_json::to_string(&MetadataLocation::Basic).expect("ser"), r#""BASIC""#);
    }

    #[test]
    fn drops_query_and_fragment() {
        let url = resolve(
            MetadataLocation::Basic,
            "https://issuer.example.com/tenant/?a=b#frag",
            CREDENTIAL_ISSUER,
        )
        .expect("should resolve");
        assert_eq!(
            url.as_str(),
            "https://issuer.example.com/tenant/.well-known/openid-credential-issuer"
        );
    }

    #[test]
    fn not_a_base() {
        assert!(resolve(MetadataLocation::Basic, "mailto:x@example.com", VERIFIER).is_err());
        assert!(resolve(MetadataLocation::Basic, "/tenant", VERIFIER).is_err());
    }
}
