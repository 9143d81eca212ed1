//! Remote sign-in: turns a provider callback into an authentication ticket.

use std::sync::Arc;

use jsonwebtoken::get_current_timestamp;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{AuthData, AuthenticationProperties, AuthenticationTicket, SUBJECT};
use crate::claim_map::{identity_from_payload, merge_user_info, ClaimTypeMap};
use crate::claims::OpenIdConnectEvents;
use crate::config::OidcOptions;
use crate::error::AuthError;
use crate::jwt::{CorrelationClaims, IdTokenValidator};
use crate::provider::IdentityProvider;

pub struct SignInPipeline {
    options: OidcOptions,
    claim_map: ClaimTypeMap,
    validator: IdTokenValidator,
    provider: Arc<dyn IdentityProvider>,
    events: Arc<dyn OpenIdConnectEvents>,
}

impl SignInPipeline {
    pub fn new(
        options: OidcOptions,
        claim_map: ClaimTypeMap,
        validator: IdTokenValidator,
        provider: Arc<dyn IdentityProvider>,
        events: Arc<dyn OpenIdConnectEvents>,
    ) -> Self {
        Self {
            options,
            claim_map,
            validator,
            provider,
            events,
        }
    }

    pub fn options(&self) -> &OidcOptions {
        &self.options
    }

    /// Complete a sign-in from the callback form and the correlation cookie
    /// issued when the challenge started.
    pub async fn sign_in(
        &self,
        callback: &AuthData,
        correlation: &CorrelationClaims,
    ) -> Result<AuthenticationTicket, AuthError> {
        if let Some(error) = &callback.error {
            warn!(error = %error, "provider returned an error to the callback");
            return Err(AuthError::provider(match &callback.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error.clone(),
            }));
        }

        if callback.state.as_deref() != Some(correlation.state.as_str()) {
            return Err(AuthError::correlation("state does not match"));
        }

        let id_token = callback
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::invalid_id_token("callback carries no id_token"))?;

        let payload = self.validator.validate(id_token, &correlation.nonce)?;
        let identity = identity_from_payload(&payload, &self.options.scheme, &self.claim_map);

        let properties = AuthenticationProperties {
            redirect_uri: Some(correlation.redirect.clone()),
            ..AuthenticationProperties::default()
        };
        let ticket = AuthenticationTicket::new(identity, properties, self.options.scheme.as_str());

        let mut ticket = self.events.on_token_validated(ticket)?;
        info!(scheme = %ticket.scheme, "identity token validated");

        if !self.options.response_type_contains("code") {
            if self.options.save_tokens {
                ticket.properties.store_token("id_token", id_token);
            }
            return Ok(ticket);
        }

        let code = callback
            .code
            .as_deref()
            .ok_or_else(|| AuthError::provider("callback carries no authorization code"))?;
        let tokens = self.provider.redeem_code(code).await?;

        if self.options.save_tokens {
            let properties = &mut ticket.properties;
            properties.store_token("id_token", id_token);
            properties.store_token("access_token", tokens.access_token.as_str());
            if let Some(token_type) = &tokens.token_type {
                properties.store_token("token_type", token_type.as_str());
            }
            if let Some(expires_in) = tokens.expires_in {
                properties.store_token(
                    "expires_at",
                    get_current_timestamp().saturating_add(expires_in).to_string(),
                );
            }
        }

        if self.options.get_claims_from_user_info_endpoint {
            // User info is only trusted once tied to the identity token's subject.
            let Some(subject) = ticket.principal.subject().map(str::to_owned) else {
                debug!("identity has no subject, skipping user info");
                return Ok(ticket);
            };

            let mut document = self.provider.fetch_user_info(&tokens.access_token).await?;
            if document.get(SUBJECT).and_then(Value::as_str) != Some(subject.as_str()) {
                return Err(AuthError::SubjectMismatch);
            }

            self.events.on_user_information_received(&mut document)?;
            merge_user_info(&mut ticket.principal, &document, &self.claim_map);
            debug!(claims = ticket.principal.claims.len(), "merged user info");
        }

        Ok(ticket)
    }
}
