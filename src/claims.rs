//! Claims post-processing hooks raised during the OpenID Connect sign-in.
//!
//! [`OpenIdConnectEvents`] is invoked by the sign-in pipeline once the
//! identity token has been validated and once the user-info document has been
//! fetched. [`ClaimsPostProcessor`] narrows the session identity to the
//! subject claim and drops the address from user info.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{
    AuthenticationTicket, ClaimsIdentity, UserInfoDocument, ADDRESS, GIVEN_NAME, ROLE, SUBJECT,
};
use crate::error::AuthError;

pub trait OpenIdConnectEvents: Send + Sync {
    /// Called after the identity token is validated, before sign-in.
    fn on_token_validated(
        &self,
        ticket: AuthenticationTicket,
    ) -> Result<AuthenticationTicket, AuthError> {
        Ok(ticket)
    }

    /// Called with the user-info response before it is merged into the identity.
    fn on_user_information_received(
        &self,
        _document: &mut UserInfoDocument,
    ) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Passes tickets and documents through untouched.
pub struct DefaultEvents;

impl OpenIdConnectEvents for DefaultEvents {}

/// What to do when the identity token has no `sub` claim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSubjectPolicy {
    /// Fail the sign-in.
    #[default]
    Reject,
    /// Sign in with an identity that carries no claims.
    Anonymous,
}

#[derive(Debug, Clone, Default)]
pub struct ClaimsPostProcessor {
    policy: MissingSubjectPolicy,
}

impl ClaimsPostProcessor {
    pub fn new(policy: MissingSubjectPolicy) -> Self {
        Self { policy }
    }
}

impl OpenIdConnectEvents for ClaimsPostProcessor {
    fn on_token_validated(
        &self,
        ticket: AuthenticationTicket,
    ) -> Result<AuthenticationTicket, AuthError> {
        let principal = filter_identity(&ticket.principal, &ticket.scheme, self.policy)?;
        debug!(
            scheme = %ticket.scheme,
            dropped = ticket.principal.claims.len() - principal.claims.len(),
            "narrowed identity to subject claim"
        );
        Ok(AuthenticationTicket::new(
            principal,
            ticket.properties,
            ticket.scheme,
        ))
    }

    fn on_user_information_received(
        &self,
        document: &mut UserInfoDocument,
    ) -> Result<(), AuthError> {
        if strip_address(document) {
            debug!("removed address from user info");
        }
        Ok(())
    }
}

/// Build a new identity holding only the `sub` claim of `raw`.
///
/// The result is tagged with `scheme` and declares `given_name` and `role`
/// as its name and role claim types. Values for those are not copied.
pub fn filter_identity(
    raw: &ClaimsIdentity,
    scheme: &str,
    policy: MissingSubjectPolicy,
) -> Result<ClaimsIdentity, AuthError> {
    let mut filtered = ClaimsIdentity::with_claim_types(scheme, GIVEN_NAME, ROLE);

    match raw.find_first(SUBJECT) {
        Some(subject) => filtered.add_claim(SUBJECT, subject.value.clone()),
        None => match policy {
            MissingSubjectPolicy::Reject => return Err(AuthError::MissingSubject),
            MissingSubjectPolicy::Anonymous => {
                warn!(scheme, "identity token has no subject, signing in anonymously")
            }
        },
    }

    Ok(filtered)
}

/// Remove the `address` member. Returns whether it was present.
pub fn strip_address(document: &mut UserInfoDocument) -> bool {
    document.remove(ADDRESS).is_some()
}
