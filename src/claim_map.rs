//! Inbound claim type mapping
//!
//! Maps the short JWT claim names found in identity tokens and user-info
//! documents to the claim types stored on a [`ClaimsIdentity`]. The map is
//! chosen once at start-up and handed to the sign-in pipeline.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::auth::{ClaimsIdentity, UserInfoDocument, DEFAULT_NAME_CLAIM_TYPE, DEFAULT_ROLE_CLAIM_TYPE};

const WS_CLAIMS: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimTypeMap {
    map: HashMap<String, String>,
}

impl ClaimTypeMap {
    /// Keeps every inbound claim type verbatim.
    pub fn empty() -> Self {
        Self::default()
    }

    /// WS-* claim type URIs for the common OpenID Connect claims.
    pub fn legacy() -> Self {
        let mut map = Self::empty();
        map.insert("sub", format!("{WS_CLAIMS}/nameidentifier"));
        map.insert("name", DEFAULT_NAME_CLAIM_TYPE);
        map.insert("given_name", format!("{WS_CLAIMS}/givenname"));
        map.insert("family_name", format!("{WS_CLAIMS}/surname"));
        map.insert("email", format!("{WS_CLAIMS}/emailaddress"));
        map.insert("gender", format!("{WS_CLAIMS}/gender"));
        map.insert("birthdate", format!("{WS_CLAIMS}/dateofbirth"));
        map.insert("website", format!("{WS_CLAIMS}/webpage"));
        map.insert("role", DEFAULT_ROLE_CLAIM_TYPE);
        map
    }

    pub fn from_settings(map_inbound_claims: bool) -> Self {
        if map_inbound_claims {
            Self::legacy()
        } else {
            Self::empty()
        }
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.map.insert(from.into(), to.into());
    }

    pub fn map<'a>(&'a self, claim_type: &'a str) -> &'a str {
        self.map
            .get(claim_type)
            .map(String::as_str)
            .unwrap_or(claim_type)
    }
}

/// Claim values carried by one JSON member. Arrays expand to one value per
/// element, objects are kept as compact JSON, nulls produce nothing.
fn claim_values(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(claim_values).collect(),
        Value::Object(_) => vec![value.to_string()],
    }
}

/// Build the identity produced by a validated identity token.
pub fn identity_from_payload(
    payload: &Map<String, Value>,
    authentication_type: &str,
    map: &ClaimTypeMap,
) -> ClaimsIdentity {
    let mut identity = ClaimsIdentity::new(authentication_type);
    for (key, value) in payload {
        let claim_type = map.map(key);
        for v in claim_values(value) {
            identity.add_claim(claim_type, v);
        }
    }
    identity
}

/// Add user-info claims whose type the identity does not already carry.
pub fn merge_user_info(identity: &mut ClaimsIdentity, document: &UserInfoDocument, map: &ClaimTypeMap) {
    for (key, value) in document {
        let claim_type = map.map(key).to_owned();
        if identity.has_claim_type(&claim_type) {
            continue;
        }
        for v in claim_values(value) {
            identity.add_claim(claim_type.as_str(), v);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::auth::SUBJECT;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn empty_map_keeps_short_claim_types() {
        let payload = object(json!({ "sub": "abc123", "given_name": "Alice" }));
        let identity = identity_from_payload(&payload, "oidc", &ClaimTypeMap::empty());

        assert_eq!(identity.authentication_type, "oidc");
        assert_eq!(identity.subject(), Some("abc123"));
        assert_eq!(identity.find_first("given_name").map(|c| c.value.as_str()), Some("Alice"));
    }

    #[test]
    fn legacy_map_renames_subject() {
        let payload = object(json!({ "sub": "abc123", "name": "Alice Smith" }));
        let identity = identity_from_payload(&payload, "oidc", &ClaimTypeMap::legacy());

        assert_eq!(identity.subject(), None);
        assert_eq!(
            identity
                .find_first("http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier")
                .map(|c| c.value.as_str()),
            Some("abc123")
        );
        assert_eq!(identity.name(), Some("Alice Smith"));
    }

    #[test]
    fn arrays_objects_and_nulls() {
        let payload = object(json!({
            "sub": "abc123",
            "amr": ["pwd", "mfa"],
            "address": { "country": "BE" },
            "email_verified": true,
            "auth_time": 1700000000,
            "middle_name": null
        }));
        let identity = identity_from_payload(&payload, "oidc", &ClaimTypeMap::empty());

        let amr: Vec<_> = identity
            .claims
            .iter()
            .filter(|c| c.claim_type == "amr")
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(amr, vec!["pwd", "mfa"]);
        assert_eq!(
            identity.find_first("address").map(|c| c.value.as_str()),
            Some(r#"{"country":"BE"}"#)
        );
        assert_eq!(identity.find_first("email_verified").map(|c| c.value.as_str()), Some("true"));
        assert_eq!(identity.find_first("auth_time").map(|c| c.value.as_str()), Some("1700000000"));
        assert!(!identity.has_claim_type("middle_name"));
    }

    #[test]
    fn user_info_merge_skips_existing_types() {
        let mut identity = ClaimsIdentity::new("oidc");
        identity.add_claim(SUBJECT, "abc123");
        let document = object(json!({
            "sub": "abc123",
            "given_name": "Alice",
            "family_name": "Smith"
        }));

        merge_user_info(&mut identity, &document, &ClaimTypeMap::empty());

        assert_eq!(identity.claims.iter().filter(|c| c.claim_type == SUBJECT).count(), 1);
        assert_eq!(identity.find_first("given_name").map(|c| c.value.as_str()), Some("Alice"));
        assert_eq!(identity.find_first("family_name").map(|c| c.value.as_str()), Some("Smith"));
        assert_eq!(identity.claims.len(), 3);
    }
}
