//! Layered application settings
//!
//! Settings start from built-in defaults and are overlaid, in order, by
//! `appsettings.json`, `appsettings.{environment}.json` and environment
//! variables of the form `GALLERY__SECTION__KEY`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::claims::MissingSubjectPolicy;

pub const ENV_PREFIX: &str = "GALLERY__";
pub const ENVIRONMENT_VAR: &str = "GALLERY_ENVIRONMENT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerOptions,
    pub oidc: OidcOptions,
    pub cookie: CookieOptions,
    pub claims: ClaimsOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    /// Externally visible origin used to build redirect URIs.
    pub public_origin: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            public_origin: "http://localhost:8080".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcOptions {
    pub scheme: String,
    pub authority: String,
    pub require_https_metadata: bool,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub response_type: String,
    pub sign_in_scheme: String,
    pub callback_path: String,
    pub signed_out_callback_path: String,
    pub save_tokens: bool,
    pub get_claims_from_user_info_endpoint: bool,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
    /// PEM RSA public key for RS256 identity tokens. HS256 with the client
    /// secret is used when unset.
    pub id_token_signing_key_path: Option<PathBuf>,
    pub http_timeout_secs: u64,
}

impl Default for OidcOptions {
    fn default() -> Self {
        Self {
            scheme: "oidc".to_owned(),
            authority: String::new(),
            require_https_metadata: true,
            client_id: String::new(),
            client_secret: String::new(),
            scopes: vec!["openid".to_owned(), "profile".to_owned()],
            response_type: "code id_token".to_owned(),
            sign_in_scheme: "Cookies".to_owned(),
            callback_path: "/signin-oidc".to_owned(),
            signed_out_callback_path: "/signout-callback-oidc".to_owned(),
            save_tokens: true,
            get_claims_from_user_info_endpoint: true,
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            end_session_endpoint: None,
            id_token_signing_key_path: None,
            http_timeout_secs: 60,
        }
    }
}

impl OidcOptions {
    fn authority_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.authority.trim_end_matches('/'), path)
    }

    pub fn issuer(&self) -> &str {
        self.authority.trim_end_matches('/')
    }

    pub fn authorization_endpoint(&self) -> String {
        self.authorization_endpoint
            .clone()
            .unwrap_or_else(|| self.authority_endpoint("connect/authorize"))
    }

    pub fn token_endpoint(&self) -> String {
        self.token_endpoint
            .clone()
            .unwrap_or_else(|| self.authority_endpoint("connect/token"))
    }

    pub fn userinfo_endpoint(&self) -> String {
        self.userinfo_endpoint
            .clone()
            .unwrap_or_else(|| self.authority_endpoint("connect/userinfo"))
    }

    pub fn end_session_endpoint(&self) -> String {
        self.end_session_endpoint
            .clone()
            .unwrap_or_else(|| self.authority_endpoint("connect/endsession"))
    }

    pub fn response_type_contains(&self, value: &str) -> bool {
        self.response_type.split_whitespace().any(|v| v == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    pub name: String,
    pub correlation_name: String,
    /// HMAC key for session and correlation cookies.
    pub secret: String,
    pub lifetime_minutes: u64,
    pub secure: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: "gallery.session".to_owned(),
            correlation_name: "gallery.oidc.correlation".to_owned(),
            secret: String::new(),
            lifetime_minutes: 60 * 24 * 14,
            secure: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimsOptions {
    pub missing_subject: MissingSubjectPolicy,
    /// Rename inbound JWT claim types to their WS-* URIs.
    pub map_inbound_claims: bool,
}

impl Settings {
    /// Load settings for `environment` from `content_root` and the process environment.
    pub fn load(content_root: &Path, environment: &str) -> Result<Self, ConfigError> {
        Self::load_with_vars(content_root, environment, std::env::vars())
    }

    pub fn load_with_vars<I>(content_root: &Path, environment: &str, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layered = serde_json::to_value(Settings::default())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for name in ["appsettings.json".to_owned(), format!("appsettings.{environment}.json")] {
            let path = content_root.join(name);
            if let Some(layer) = read_optional_json(&path)? {
                debug!(path = %path.display(), "loaded settings file");
                merge_json(&mut layered, layer);
            }
        }

        apply_env_overrides(&mut layered, vars);

        let settings: Settings =
            serde_json::from_value(layered).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oidc.authority.is_empty() {
            return Err(ConfigError::Missing("oidc.authority"));
        }
        if self.oidc.client_id.is_empty() {
            return Err(ConfigError::Missing("oidc.client_id"));
        }
        if self.oidc.client_secret.is_empty() {
            return Err(ConfigError::Missing("oidc.client_secret"));
        }
        if self.cookie.secret.is_empty() {
            return Err(ConfigError::Missing("cookie.secret"));
        }
        if self.oidc.require_https_metadata && !self.oidc.authority.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "authority {} must use https",
                self.oidc.authority
            )));
        }
        if !self.oidc.scopes.iter().any(|s| s == "openid") {
            return Err(ConfigError::Invalid("scopes must include openid".to_owned()));
        }
        if !self.oidc.response_type_contains("id_token") {
            return Err(ConfigError::Invalid(format!(
                "response type {} must include id_token",
                self.oidc.response_type
            )));
        }
        Ok(())
    }

    /// Absolute URI the provider posts the sign-in response to.
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.server.public_origin.trim_end_matches('/'),
            self.oidc.callback_path
        )
    }

    pub fn post_logout_redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.server.public_origin.trim_end_matches('/'),
            self.oidc.signed_out_callback_path
        )
    }
}

fn read_optional_json(path: &Path) -> Result<Option<Value>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
}

/// Deep-merge `layer` into `base`. Objects merge key by key, everything else replaces.
fn merge_json(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn apply_env_overrides<I>(settings: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, raw) in vars {
        let Some(path) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let segments: Vec<String> = path.split("__").map(str::to_lowercase).collect();
        if segments.iter().any(String::is_empty) {
            continue;
        }
        set_path(settings, &segments, raw);
    }
}

fn set_path(root: &mut Value, segments: &[String], raw: String) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let value = coerce_env_value(map.get(last), raw);
        map.insert(last.clone(), value);
    }
}

/// Env values are strings. Parse them as JSON only where the setting being
/// replaced is not a string, so `CLIENT_SECRET=123` stays a string.
fn coerce_env_value(existing: Option<&Value>, raw: String) -> Value {
    match existing {
        Some(Value::Bool(_)) | Some(Value::Number(_)) | Some(Value::Array(_)) => {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        }
        _ => Value::String(raw),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;

    fn required_vars() -> Vec<(String, String)> {
        vec![
            ("GALLERY__OIDC__AUTHORITY".to_owned(), "https://localhost:44370/".to_owned()),
            ("GALLERY__OIDC__CLIENT_ID".to_owned(), "imagegalleryclient".to_owned()),
            ("GALLERY__OIDC__CLIENT_SECRET".to_owned(), "secret".to_owned()),
            ("GALLERY__COOKIE__SECRET".to_owned(), "cookie-secret".to_owned()),
        ]
    }

    #[test]
    fn defaults_follow_hybrid_flow() {
        let oidc = OidcOptions::default();

        assert_eq!(oidc.scheme, "oidc");
        assert_eq!(oidc.sign_in_scheme, "Cookies");
        assert_eq!(oidc.response_type, "code id_token");
        assert_eq!(oidc.scopes, vec!["openid", "profile"]);
        assert!(oidc.save_tokens);
        assert!(oidc.get_claims_from_user_info_endpoint);
    }

    #[test]
    fn endpoints_derive_from_authority() {
        let oidc = OidcOptions {
            authority: "https://localhost:44370/".to_owned(),
            ..OidcOptions::default()
        };

        assert_eq!(oidc.issuer(), "https://localhost:44370");
        assert_eq!(oidc.authorization_endpoint(), "https://localhost:44370/connect/authorize");
        assert_eq!(oidc.token_endpoint(), "https://localhost:44370/connect/token");
        assert_eq!(oidc.userinfo_endpoint(), "https://localhost:44370/connect/userinfo");
        assert_eq!(oidc.end_session_endpoint(), "https://localhost:44370/connect/endsession");
    }

    #[test]
    fn env_only_settings_load() {
        let dir = tempfile::tempdir().unwrap();

        let settings = Settings::load_with_vars(dir.path(), "Production", required_vars()).unwrap();

        assert_eq!(settings.oidc.client_id, "imagegalleryclient");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.claims.missing_subject, MissingSubjectPolicy::Reject);
    }

    #[test]
    fn files_layer_in_order_and_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("appsettings.json"),
            json!({
                "server": { "port": 5000, "host": "0.0.0.0" },
                "claims": { "missing_subject": "anonymous" }
            })
            .to_string(),
        )
        .unwrap();
        fs::write(
            dir.path().join("appsettings.Development.json"),
            json!({ "server": { "port": 5001 } }).to_string(),
        )
        .unwrap();

        let mut vars = required_vars();
        vars.push(("GALLERY__SERVER__HOST".to_owned(), "localhost".to_owned()));
        vars.push(("GALLERY__OIDC__SCOPES".to_owned(), r#"["openid","profile","roles"]"#.to_owned()));
        vars.push(("GALLERY__OIDC__SAVE_TOKENS".to_owned(), "false".to_owned()));
        vars.push(("UNRELATED".to_owned(), "ignored".to_owned()));

        let settings = Settings::load_with_vars(dir.path(), "Development", vars).unwrap();

        assert_eq!(settings.server.port, 5001);
        assert_eq!(settings.server.host, "localhost");
        assert_eq!(settings.claims.missing_subject, MissingSubjectPolicy::Anonymous);
        assert_eq!(settings.oidc.scopes, vec!["openid", "profile", "roles"]);
        assert!(!settings.oidc.save_tokens);
    }

    #[test]
    fn numeric_secret_from_env_stays_a_string() {
        let dir = tempfile::tempdir().unwrap();
        let mut vars = required_vars();
        vars.push(("GALLERY__OIDC__CLIENT_SECRET".to_owned(), "12345".to_owned()));

        let settings = Settings::load_with_vars(dir.path(), "Production", vars).unwrap();

        assert_eq!(settings.oidc.client_secret, "12345");
    }

    #[test]
    fn missing_client_id_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let vars: Vec<_> = required_vars()
            .into_iter()
            .filter(|(k, _)| k != "GALLERY__OIDC__CLIENT_ID")
            .collect();

        let err = Settings::load_with_vars(dir.path(), "Production", vars).unwrap_err();

        assert!(matches!(err, ConfigError::Missing("oidc.client_id")));
    }

    #[test]
    fn http_authority_requires_opt_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut vars = required_vars();
        vars.push(("GALLERY__OIDC__AUTHORITY".to_owned(), "http://localhost:5000".to_owned()));

        let err = Settings::load_with_vars(dir.path(), "Production", vars.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        vars.push(("GALLERY__OIDC__REQUIRE_HTTPS_METADATA".to_owned(), "false".to_owned()));
        assert!(Settings::load_with_vars(dir.path(), "Production", vars).is_ok());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("appsettings.json"), "{ not json").unwrap();

        let err = Settings::load_with_vars(dir.path(), "Production", required_vars()).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
