use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use tracing::debug;

use crate::auth::AuthenticationTicket;
use crate::error::AuthError;
use crate::jwt::verify_session_token;
use crate::state::AppState;

/// Ticket of the signed-in user, read from the session cookie.
#[derive(Debug, Clone)]
pub struct SignedInUser(pub AuthenticationTicket);

impl SignedInUser {
    pub fn from_request_cookie(req: &HttpRequest) -> Result<Self, AuthError> {
        let state = req
            .app_data::<web::Data<AppState>>()
            .ok_or_else(|| AuthError::internal("application state is not registered"))?;

        let cookie = req
            .cookie(&state.settings.cookie.name)
            .ok_or(AuthError::Unauthenticated)?;

        verify_session_token(cookie.value(), state.cookie_secret())
            .map(SignedInUser)
            .map_err(|e| {
                debug!(error = %e, "rejected session cookie");
                AuthError::Unauthenticated
            })
    }
}

impl FromRequest for SignedInUser {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_request_cookie(req))
    }
}
