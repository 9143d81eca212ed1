//! Back-channel calls to the identity provider

use std::time::Duration;

use async_trait::async_trait;
use awc::Client;
use tracing::{debug, warn};

use crate::auth::{TokenForm, TokenResponse, UserInfoDocument};
use crate::config::Settings;
use crate::error::AuthError;

/// Token and user-info endpoints of the provider.
///
/// Futures are not `Send`: they run on the actix worker that received the callback.
#[async_trait(?Send)]
pub trait IdentityProvider: Send + Sync {
    async fn redeem_code(&self, code: &str) -> Result<TokenResponse, AuthError>;

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfoDocument, AuthError>;
}

pub struct HttpIdentityProvider {
    token_endpoint: String,
    userinfo_endpoint: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    timeout: Duration,
}

impl HttpIdentityProvider {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            token_endpoint: settings.oidc.token_endpoint(),
            userinfo_endpoint: settings.oidc.userinfo_endpoint(),
            client_id: settings.oidc.client_id.clone(),
            client_secret: settings.oidc.client_secret.clone(),
            redirect_uri: settings.redirect_uri(),
            timeout: Duration::from_secs(settings.oidc.http_timeout_secs),
        }
    }

    fn client(&self) -> Client {
        Client::builder().timeout(self.timeout).finish()
    }
}

#[async_trait(?Send)]
impl IdentityProvider for HttpIdentityProvider {
    async fn redeem_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        debug!(endpoint = %self.token_endpoint, "redeeming authorization code");

        let mut response = self
            .client()
            .post(&self.token_endpoint)
            .insert_header(("Accept", "application/json"))
            .send_form(&TokenForm {
                code: code.to_owned(),
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                redirect_uri: self.redirect_uri.clone(),
                grant_type: "authorization_code".to_owned(),
            })
            .await
            .map_err(|e| AuthError::provider(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "token endpoint rejected the code");
            return Err(AuthError::provider(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::provider(format!("invalid token response: {e}")))
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfoDocument, AuthError> {
        debug!(endpoint = %self.userinfo_endpoint, "fetching user info");

        let mut response = self
            .client()
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token)
            .insert_header(("Accept", "application/json"))
            .send()
            .await
            .map_err(|e| AuthError::provider(format!("user info request failed: {e}")))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "user info endpoint returned an error");
            return Err(AuthError::provider(format!(
                "user info endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<UserInfoDocument>()
            .await
            .map_err(|e| AuthError::provider(format!("invalid user info response: {e}")))
    }
}
