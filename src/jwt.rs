use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AuthenticationTicket;
use crate::config::{ConfigError, OidcOptions};
use crate::error::AuthError;

pub const CORRELATION_LIFETIME_SECS: u64 = 15 * 60;

const LEEWAY_SECS: u64 = 60;

/// Claims of the signed session cookie.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub exp: u64,
    pub ticket: AuthenticationTicket,
}

/// Claims of the short-lived cookie binding a challenge to the callback.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CorrelationClaims {
    pub state: String,
    pub nonce: String,
    pub redirect: String,
    pub exp: u64,
}

fn sign<T: Serialize>(claims: &T, secret_key: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret_key),
    )
}

pub fn verify_jwt<T: DeserializeOwned>(
    token: &str,
    secret_key: &[u8],
) -> Result<T, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = LEEWAY_SECS;

    let decoded = decode::<T>(token, &DecodingKey::from_secret(secret_key), &validation)?;

    Ok(decoded.claims)
}

pub fn generate_session_token(
    ticket: &AuthenticationTicket,
    lifetime_secs: u64,
    secret_key: &[u8],
) -> Result<(String, u64), jsonwebtoken::errors::Error> {
    let expiration = get_current_timestamp().saturating_add(lifetime_secs);

    let claims = SessionClaims {
        exp: expiration,
        ticket: ticket.clone(),
    };

    sign(&claims, secret_key).map(|token| (token, expiration))
}

pub fn verify_session_token(
    token: &str,
    secret_key: &[u8],
) -> Result<AuthenticationTicket, jsonwebtoken::errors::Error> {
    verify_jwt::<SessionClaims>(token, secret_key).map(|claims| claims.ticket)
}

pub fn generate_correlation_token(
    state: &str,
    nonce: &str,
    redirect: &str,
    secret_key: &[u8],
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = CorrelationClaims {
        state: state.to_owned(),
        nonce: nonce.to_owned(),
        redirect: redirect.to_owned(),
        exp: get_current_timestamp() + CORRELATION_LIFETIME_SECS,
    };

    sign(&claims, secret_key)
}

/// Verifies identity tokens issued by the configured authority.
pub struct IdTokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl IdTokenValidator {
    pub fn new(key: DecodingKey, algorithm: Algorithm, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.leeway = LEEWAY_SECS;
        // Accept the authority with or without its trailing slash.
        validation.set_issuer(&[issuer.to_owned(), format!("{issuer}/")]);
        validation.set_audience(&[audience]);

        Self { key, validation }
    }

    /// RS256 with the configured PEM key, or HS256 keyed by the client secret.
    pub fn from_options(options: &OidcOptions) -> Result<Self, ConfigError> {
        let (key, algorithm) = match &options.id_token_signing_key_path {
            Some(path) => {
                let pem = std::fs::read(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                let key = DecodingKey::from_rsa_pem(&pem).map_err(|e| {
                    ConfigError::Invalid(format!("signing key {}: {e}", path.display()))
                })?;
                (key, Algorithm::RS256)
            }
            None => (
                DecodingKey::from_secret(options.client_secret.as_bytes()),
                Algorithm::HS256,
            ),
        };

        Ok(Self::new(key, algorithm, options.issuer(), &options.client_id))
    }

    /// Validate `token` and return its payload. The `nonce` claim must equal
    /// `expected_nonce`.
    pub fn validate(&self, token: &str, expected_nonce: &str) -> Result<Map<String, Value>, AuthError> {
        let payload = decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::invalid_id_token(e.to_string()))?
            .claims;

        match payload.get("nonce").and_then(Value::as_str) {
            Some(nonce) if nonce == expected_nonce => Ok(payload),
            Some(_) => Err(AuthError::invalid_id_token("nonce mismatch")),
            None => Err(AuthError::invalid_id_token("nonce missing")),
        }
    }
}
