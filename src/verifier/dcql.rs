//! # Digital Credentials Query Language
//!
//! A DCQL query names the credentials a verifier will accept and the
//! combinations (credential sets) that satisfy it. Only SD-JWT VC queries are
//! supported.
//!
//! ```json
//! {
//!     "credentials": [{
//!         "id": "pid",
//!         "format": "dc+sd-jwt",
//!         "meta": { "vct_values": ["urn:eudi:pid:1"] },
//!         "claims": [{ "path": ["family_name"] }]
//!     }],
//!     "credential_sets": [{
//!         "purpose": "We need to verify your identity",
//!         "options": [["pid"]]
//!     }]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::presentation::Presented;
use crate::sd_jwt::{FORMAT_SD_JWT_VC, FORMAT_VC_SD_JWT};
use crate::{invalid, Error, Result};

/// A DCQL query.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlQuery {
    /// Credential queries, each identified by `id`.
    pub credentials: Vec<CredentialQuery>,

    /// Accepted combinations of credential queries. When absent, every
    /// credential query must be satisfied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credential_sets: Vec<CredentialSetQuery>,
}

/// A query for one credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialQuery {
    /// Identifies the query in the `vp_token` response.
    pub id: String,

    /// Requested credential format.
    pub format: String,

    /// Format-specific constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaQuery>,

    /// Single accepted credential type, the form used by earlier drafts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,

    /// Claims that must be disclosed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<ClaimQuery>>,

    /// Alternative sets of claim ids, in order of preference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_sets: Option<Vec<Vec<String>>>,

    /// Whether more than one presentation may be returned for this query.
    #[serde(default)]
    pub multiple: bool,
}

/// SD-JWT VC metadata constraints.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetaQuery {
    /// Accepted `vct` values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vct_values: Vec<String>,

    /// `mso_mdoc` document type. Carried through for mixed-format wallets but
    /// not used to match SD-JWT VCs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctype_value: Option<String>,
}

/// A claim that must be present in the presented credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClaimQuery {
    /// Referenced by `claim_sets`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Path into the claims: strings select object members, integers array
    /// elements and `null` every array element.
    pub path: Vec<Value>,

    /// When present, the claim must equal one of these values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

/// A set of acceptable credential combinations.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialSetQuery {
    /// Each option is a list of credential query ids which together satisfy
    /// the set.
    pub options: Vec<Vec<String>>,

    /// Whether the set must be satisfied.
    #[serde(default = "required")]
    pub required: bool,

    /// Why the credentials are requested, for display to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Value>,
}

const fn required() -> bool {
    true
}

impl DcqlQuery {
    /// Check the query is well formed: at least one credential query, unique
    /// ids, and credential sets referencing only declared ids.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.credentials.is_empty() {
            return Err(invalid!("no credentials requested"));
        }

        let mut ids = HashSet::new();
        for query in &self.credentials {
            if query.id.is_empty() {
                return Err(invalid!("credential query has no id"));
            }
            if !ids.insert(query.id.as_str()) {
                return Err(invalid!("duplicate credential query id {}", query.id));
            }
            if query.format != FORMAT_SD_JWT_VC && query.format != FORMAT_VC_SD_JWT {
                return Err(invalid!("unsupported format {}", query.format));
            }
        }

        for set in &self.credential_sets {
            if set.options.is_empty() {
                return Err(invalid!("credential set has no options"));
            }
            if let Some(id) = set.options.iter().flatten().find(|id| !ids.contains(id.as_str())) {
                return Err(invalid!("credential set references unknown id {id}"));
            }
        }
        Ok(())
    }

    /// Find a credential query by id.
    #[must_use]
    pub fn credential(&self, id: &str) -> Option<&CredentialQuery> {
        self.credentials.iter().find(|q| q.id == id)
    }

    /// Check the ids of satisfied credential queries meet the query's
    /// credential sets.
    ///
    /// # Errors
    ///
    /// Returns `Error::PresentationIncomplete` naming the first required set
    /// for which no option is fully satisfied.
    pub fn satisfied(&self, satisfied: &HashSet<&str>) -> Result<()> {
        if self.credential_sets.is_empty() {
            if let Some(query) = self.credentials.iter().find(|q| !satisfied.contains(q.id.as_str()))
            {
                return Err(Error::PresentationIncomplete(format!(
                    "no presentation for {}",
                    query.id
                )));
            }
            return Ok(());
        }

        for set in self.credential_sets.iter().filter(|s| s.required) {
            let met = set
                .options
                .iter()
                .any(|option| option.iter().all(|id| satisfied.contains(id.as_str())));
            if !met {
                let purpose = set.purpose.as_ref().and_then(Value::as_str).unwrap_or("credential set");
                return Err(Error::PresentationIncomplete(format!("{purpose} not satisfied")));
            }
        }
        Ok(())
    }
}

impl CredentialQuery {
    /// Whether the presented credential meets this query's type and claim
    /// constraints.
    #[must_use]
    pub fn matches(&self, presented: &Presented) -> bool {
        let mut vct_values = self.meta.as_ref().map(|m| m.vct_values.clone()).unwrap_or_default();
        vct_values.extend(self.vct.clone());
        if !vct_values.is_empty() && !vct_values.contains(&presented.vct) {
            return false;
        }

        let Some(claims) = &self.claims else {
            return true;
        };
        let Some(claim_sets) = &self.claim_sets else {
            return claims.iter().all(|c| c.matches(&presented.claims));
        };

        // any one claim set, each a list of claim ids
        claim_sets.iter().any(|set| {
            set.iter().all(|id| {
                claims
                    .iter()
                    .find(|c| c.id.as_deref() == Some(id.as_str()))
                    .is_some_and(|c| c.matches(&presented.claims))
            })
        })
    }
}

impl ClaimQuery {
    fn matches(&self, claims: &Map<String, Value>) -> bool {
        let root = Value::Object(claims.clone());
        let selected = select(&root, &self.path);
        if selected.is_empty() {
            return false;
        }
        match &self.values {
            Some(values) => selected.iter().any(|v| values.contains(v)),
            None => true,
        }
    }
}

// Resolve a claims path to the values it selects.
fn select<'a>(value: &'a Value, path: &[Value]) -> Vec<&'a Value> {
    let Some((head, rest)) = path.split_first() else {
        return vec![value];
    };

    match (head, value) {
        (Value::String(name), Value::Object(map)) => {
            map.get(name).map(|v| select(v, rest)).unwrap_or_default()
        }
        (Value::Number(n), Value::Array(items)) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| items.get(i))
            .map(|v| select(v, rest))
            .unwrap_or_default(),
        (Value::Null, Value::Array(items)) => items.iter().flat_map(|v| select(v, rest)).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use assert_let_bind::assert_let;
    use serde_json::json;

    use super::*;

    fn presented() -> Presented {
        let claims = json!({
            "vct": "urn:eudi:pid:1",
            "given_name": "Tyler",
            "family_name": "Neal",
            "nationalities": ["SE", "NZ"],
            "address": { "locality": "Stockholm" }
        });
        Presented {
            iss: "https://localhost/pid-issuer".into(),
            vct: "urn:eudi:pid:1".into(),
            claims: claims.as_object().cloned().unwrap_or_default(),
            ..Presented::default()
        }
    }

    #[test]
    fn deserialize_query() {
        let query: DcqlQuery = serde_json::from_value(json!({
            "credentials": [{
                "format": "dc+sd-jwt",
                "vct": "urn:eudi:pid:1",
                "id": "pid",
                "meta": { "doctype_value": "eu.europa.ec.eudi.pid.1" }
            }],
            "credential_sets": [{
                "purpose": "We need to verify your identity",
                "options": [["pid"]]
            }]
        }))
        .expect("should deserialize");

        assert!(query.credential_sets[0].required);
        assert_eq!(query.validate(), Ok(()));
        assert!(query.credentials[0].matches(&presented()));
    }

    #[test]
    fn invalid_query() {
        let query = DcqlQuery {
            credentials: vec![CredentialQuery {
                id: "pid".into(),
                format: "mso_mdoc".into(),
                ..CredentialQuery::default()
            }],
            ..DcqlQuery::default()
        };
        assert_let!(Err(Error::InvalidRequest(_)), query.validate());

        let query = DcqlQuery {
            credentials: vec![CredentialQuery {
                id: "pid".into(),
                format: FORMAT_SD_JWT_VC.into(),
                ..CredentialQuery::default()
            }],
            credential_sets: vec![CredentialSetQuery {
                options: vec![vec!["mdl".into()]],
                required: true,
                purpose: None,
            }],
        };
        assert_let!(Err(Error::InvalidRequest(_)), query.validate());
    }

    #[test]
    fn claim_paths() {
        let claims = presented().claims;
        let query = |path: Value| ClaimQuery {
            path: serde_json::from_value(path).unwrap_or_default(),
            ..ClaimQuery::default()
        };

        assert!(query(json!(["address", "locality"])).matches(&claims));
        assert!(query(json!(["nationalities", 1])).matches(&claims));
        assert!(query(json!(["nationalities", null])).matches(&claims));
        assert!(!query(json!(["birthdate"])).matches(&claims));

        let nz = ClaimQuery {
            values: Some(vec![json!("NZ")]),
            ..query(json!(["nationalities", null]))
        };
        assert!(nz.matches(&claims));
    }

    #[test]
    fn claim_sets() {
        let query: CredentialQuery = serde_json::from_value(json!({
            "id": "pid",
            "format": "dc+sd-jwt",
            "meta": { "vct_values": ["urn:eudi:pid:1"] },
            "claims": [
                { "id": "a", "path": ["birthdate"] },
                { "id": "b", "path": ["family_name"] },
                { "id": "c", "path": ["given_name"] }
            ],
            "claim_sets": [["a"], ["b", "c"]]
        }))
        .expect("should deserialize");
        assert!(query.matches(&presented()));

        let other_type = CredentialQuery {
            vct: Some("urn:eudi:mdl:1".into()),
            meta: None,
            ..query
        };
        assert!(!other_type.matches(&presented()));
    }

    #[test]
    fn credential_sets() {
        let query: DcqlQuery = serde_json::from_value(json!({
            "credentials": [
                { "id": "pid", "format": "dc+sd-jwt" },
                { "id": "mdl", "format": "dc+sd-jwt" },
                { "id": "loyalty", "format": "dc+sd-jwt" }
            ],
            "credential_sets": [
                { "purpose": "identity", "options": [["pid"], ["mdl"]] },
                { "required": false, "options": [["loyalty"]] }
            ]
        }))
        .expect("should deserialize");

        assert_eq!(query.satisfied(&HashSet::from(["mdl"])), Ok(()));
        assert_let!(
            Err(Error::PresentationIncomplete(msg)),
            query.satisfied(&HashSet::from(["loyalty"]))
        );
        assert_eq!(msg, "identity not satisfied");

        // without credential sets every query is required
        let all = DcqlQuery {
            credential_sets: Vec::new(),
            ..query
        };
        assert_let!(Err(Error::PresentationIncomplete(_)), all.satisfied(&HashSet::from(["pid"])));
    }
}
