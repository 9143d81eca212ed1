use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SUBJECT: &str = "sub";
pub const GIVEN_NAME: &str = "given_name";
pub const ROLE: &str = "role";
pub const ADDRESS: &str = "address";

pub const DEFAULT_NAME_CLAIM_TYPE: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
pub const DEFAULT_ROLE_CLAIM_TYPE: &str =
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

/// JSON object returned by the provider's user-info endpoint.
pub type UserInfoDocument = Map<String, Value>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// A set of claims about one subject, tagged with the scheme that produced
/// it and the claim types used for name and role lookups.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClaimsIdentity {
    pub authentication_type: String,
    pub name_claim_type: String,
    pub role_claim_type: String,
    pub claims: Vec<Claim>,
}

impl ClaimsIdentity {
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self::with_claim_types(
            authentication_type,
            DEFAULT_NAME_CLAIM_TYPE,
            DEFAULT_ROLE_CLAIM_TYPE,
        )
    }

    pub fn with_claim_types(
        authentication_type: impl Into<String>,
        name_claim_type: impl Into<String>,
        role_claim_type: impl Into<String>,
    ) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            name_claim_type: name_claim_type.into(),
            role_claim_type: role_claim_type.into(),
            claims: Vec::new(),
        }
    }

    pub fn add_claim(&mut self, claim_type: impl Into<String>, value: impl Into<String>) {
        self.claims.push(Claim::new(claim_type, value));
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    pub fn has_claim_type(&self, claim_type: &str) -> bool {
        self.find_first(claim_type).is_some()
    }

    pub fn subject(&self) -> Option<&str> {
        self.find_first(SUBJECT).map(|c| c.value.as_str())
    }

    /// Value of the first claim whose type is the declared name claim type.
    pub fn name(&self) -> Option<&str> {
        self.find_first(&self.name_claim_type)
            .map(|c| c.value.as_str())
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.claims
            .iter()
            .filter(move |c| c.claim_type == self.role_claim_type)
            .map(|c| c.value.as_str())
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles().any(|r| r == role)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationProperties {
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub items: BTreeMap<String, String>,
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

impl AuthenticationProperties {
    pub fn store_token(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tokens.insert(name.into(), value.into());
    }

    pub fn get_token(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }
}

/// Result of a successful remote authentication, handed to the cookie layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AuthenticationTicket {
    pub principal: ClaimsIdentity,
    pub properties: AuthenticationProperties,
    pub scheme: String,
}

impl AuthenticationTicket {
    pub fn new(
        principal: ClaimsIdentity,
        properties: AuthenticationProperties,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            principal,
            properties,
            scheme: scheme.into(),
        }
    }
}

/// Form posted back by the provider to the callback path.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AuthData {
    pub code: Option<String>,
    pub id_token: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoginData {
    pub redirect: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenForm {
    pub code: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub grant_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
}
