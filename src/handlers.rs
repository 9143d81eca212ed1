use actix_web::{web, HttpRequest, HttpResponse, Result};
use http::header::LOCATION;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{AuthData, AuthenticationTicket, Claim, LoginData};
use crate::config::OidcOptions;
use crate::cookies::{cookie, remove_cookie};
use crate::error::AuthError;
use crate::extractor::SignedInUser;
use crate::jwt::{
    generate_correlation_token, generate_session_token, verify_jwt, CorrelationClaims,
    CORRELATION_LIFETIME_SECS,
};
use crate::state::AppState;

/// Browsers silently drop cookies larger than this.
const MAX_COOKIE_BYTES: usize = 4096;

/// Only same-site paths may be used as post sign-in targets.
fn local_redirect(redirect: Option<&str>) -> &str {
    match redirect {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\") => path,
        _ => "/",
    }
}

fn session_fits(cookie_name: &str, session: &str) -> bool {
    cookie_name.len() + 1 + session.len() <= MAX_COOKIE_BYTES
}

/// Sign the ticket into a session cookie value. Saved tokens are dropped
/// when they would push the cookie past the browser limit.
fn encode_session(
    ticket: &mut AuthenticationTicket,
    cookie_name: &str,
    lifetime_secs: u64,
    secret_key: &[u8],
) -> Result<String, AuthError> {
    let sign = |ticket: &AuthenticationTicket| {
        generate_session_token(ticket, lifetime_secs, secret_key)
            .map(|(session, _expiration)| session)
            .map_err(|e| AuthError::session(e.to_string()))
    };

    let mut session = sign(ticket)?;
    if !session_fits(cookie_name, &session) && !ticket.properties.tokens.is_empty() {
        warn!(size = session.len(), "session cookie too large, dropping saved tokens");
        ticket.properties.tokens.clear();
        session = sign(ticket)?;
    }

    if !session_fits(cookie_name, &session) {
        return Err(AuthError::session(format!(
            "session cookie of {} bytes exceeds {MAX_COOKIE_BYTES}",
            session.len()
        )));
    }
    Ok(session)
}

fn with_query(endpoint: &str, pairs: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    let separator = if endpoint.contains('?') { '&' } else { '?' };

    format!("{endpoint}{separator}{query}")
}

/// Start a challenge: remember state and nonce, send the browser to the provider.
pub async fn login(
    state: web::Data<AppState>,
    login_data: web::Query<LoginData>,
) -> Result<HttpResponse, AuthError> {
    let settings = &state.settings;
    let redirect = local_redirect(login_data.redirect.as_deref());

    let challenge_state = Uuid::new_v4().to_string();
    let nonce = Uuid::new_v4().to_string();
    let correlation = generate_correlation_token(&challenge_state, &nonce, redirect, state.cookie_secret())
        .map_err(|e| AuthError::internal(format!("correlation token: {e}")))?;

    let scope = settings.oidc.scopes.join(" ");
    let redirect_uri = settings.redirect_uri();
    let location = with_query(
        &settings.oidc.authorization_endpoint(),
        &[
            ("client_id", settings.oidc.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", settings.oidc.response_type.as_str()),
            ("response_mode", "form_post"),
            ("scope", scope.as_str()),
            ("state", challenge_state.as_str()),
            ("nonce", nonce.as_str()),
        ],
    );

    Ok(HttpResponse::Found()
        .cookie(cookie(
            &settings.cookie.correlation_name,
            correlation,
            CORRELATION_LIFETIME_SECS,
            settings.cookie.secure,
        ))
        .append_header((LOCATION, location))
        .finish())
}

/// Provider callback: validate, post-process claims, issue the session cookie.
pub async fn auth(
    req: HttpRequest,
    state: web::Data<AppState>,
    auth_data: web::Form<AuthData>,
) -> Result<HttpResponse, AuthError> {
    let settings = &state.settings;

    let correlation_cookie = req
        .cookie(&settings.cookie.correlation_name)
        .ok_or_else(|| AuthError::correlation("correlation cookie not found"))?;
    let correlation = verify_jwt::<CorrelationClaims>(correlation_cookie.value(), state.cookie_secret())
        .map_err(|e| AuthError::correlation(e.to_string()))?;

    let mut ticket = match state.pipeline.sign_in(&auth_data, &correlation).await {
        Ok(ticket) => ticket,
        Err(e) => {
            warn!(error = %e, "sign-in failed");
            return Err(e);
        }
    };

    let lifetime_secs = settings.cookie.lifetime_minutes.saturating_mul(60);
    let session = encode_session(&mut ticket, &settings.cookie.name, lifetime_secs, state.cookie_secret())?;

    info!(
        scheme = %ticket.scheme,
        sign_in_scheme = %settings.oidc.sign_in_scheme,
        "user signed in"
    );

    let location = local_redirect(ticket.properties.redirect_uri.as_deref()).to_owned();

    Ok(HttpResponse::Found()
        .cookie(cookie(&settings.cookie.name, session, lifetime_secs, settings.cookie.secure))
        .append_header(("set-cookie", remove_cookie(&settings.cookie.correlation_name)))
        .append_header((LOCATION, location))
        .finish())
}

/// Drop the local session and end the provider session.
pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let settings = &state.settings;

    let id_token = SignedInUser::from_request_cookie(&req)
        .ok()
        .and_then(|user| user.0.properties.get_token("id_token").map(str::to_owned));

    let post_logout_redirect_uri = settings.post_logout_redirect_uri();
    let mut pairs = vec![("post_logout_redirect_uri", post_logout_redirect_uri.as_str())];
    if let Some(id_token) = id_token.as_deref() {
        pairs.push(("id_token_hint", id_token));
    }

    HttpResponse::Found()
        .append_header(("set-cookie", remove_cookie(&settings.cookie.name)))
        .append_header((LOCATION, with_query(&settings.oidc.end_session_endpoint(), &pairs)))
        .finish()
}

pub async fn signed_out() -> HttpResponse {
    HttpResponse::Found().append_header((LOCATION, "/")).finish()
}

#[derive(Serialize)]
struct IdentityView<'a> {
    authentication_type: &'a str,
    name: Option<&'a str>,
    roles: Vec<&'a str>,
    claims: &'a [Claim],
}

pub async fn identity(user: SignedInUser) -> HttpResponse {
    let principal = &user.0.principal;

    HttpResponse::Ok().json(IdentityView {
        authentication_type: &principal.authentication_type,
        name: principal.name(),
        roles: principal.roles().collect(),
        claims: &principal.claims,
    })
}

pub fn configure(cfg: &mut web::ServiceConfig, options: &OidcOptions) {
    cfg.route("/signin", web::get().to(login))
        .route(&options.callback_path, web::post().to(auth))
        .route("/signout", web::get().to(logout))
        .route(&options.signed_out_callback_path, web::get().to(signed_out))
        .route("/identity", web::get().to(identity));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticationProperties, ClaimsIdentity};
    use crate::jwt::verify_session_token;

    #[test]
    fn redirects_stay_on_site() {
        assert_eq!(local_redirect(Some("/gallery/index")), "/gallery/index");
        assert_eq!(local_redirect(Some("//evil.example")), "/");
        assert_eq!(local_redirect(Some("/\\evil.example")), "/");
        assert_eq!(local_redirect(Some("https://evil.example")), "/");
        assert_eq!(local_redirect(None), "/");
    }

    fn ticket_with_tokens(access_token: String) -> AuthenticationTicket {
        let mut identity = ClaimsIdentity::with_claim_types("oidc", "given_name", "role");
        identity.add_claim("sub", "abc123");
        let mut properties = AuthenticationProperties::default();
        properties.store_token("access_token", access_token);
        AuthenticationTicket::new(identity, properties, "oidc")
    }

    #[test]
    fn small_session_keeps_saved_tokens() {
        let mut ticket = ticket_with_tokens("at".to_owned());

        let session = encode_session(&mut ticket, "gallery.session", 600, b"secret").unwrap();

        assert!(session_fits("gallery.session", &session));
        assert_eq!(ticket.properties.get_token("access_token"), Some("at"));
    }

    #[test]
    fn oversized_tokens_are_dropped_from_session() {
        let mut ticket = ticket_with_tokens("a".repeat(5000));

        let session = encode_session(&mut ticket, "gallery.session", 600, b"secret").unwrap();

        assert!(session.len() < MAX_COOKIE_BYTES);
        assert!(ticket.properties.tokens.is_empty());
        assert_eq!(verify_session_token(&session, b"secret").unwrap(), ticket);
    }

    #[test]
    fn oversized_identity_is_rejected() {
        let mut ticket = ticket_with_tokens("at".to_owned());
        ticket.principal.add_claim("picture", "p".repeat(5000));

        let err = encode_session(&mut ticket, "gallery.session", 600, b"secret").unwrap_err();

        assert!(matches!(err, AuthError::Session { .. }));
    }

    #[test]
    fn huge_lifetime_does_not_overflow() {
        let mut ticket = ticket_with_tokens("at".to_owned());

        assert!(encode_session(&mut ticket, "gallery.session", u64::MAX / 2, b"secret").is_ok());
    }

    #[test]
    fn query_is_encoded() {
        assert_eq!(
            with_query("https://idp/connect/authorize", &[("scope", "openid profile"), ("state", "a&b")]),
            "https://idp/connect/authorize?scope=openid+profile&state=a%26b"
        );
        assert_eq!(with_query("https://idp/x?a=1", &[("b", "2")]), "https://idp/x?a=1&b=2");
    }
}
