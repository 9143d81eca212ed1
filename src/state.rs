use std::sync::Arc;

use crate::claim_map::ClaimTypeMap;
use crate::claims::ClaimsPostProcessor;
use crate::config::{ConfigError, Settings};
use crate::jwt::IdTokenValidator;
use crate::pipeline::SignInPipeline;
use crate::provider::{HttpIdentityProvider, IdentityProvider};

/// Shared, read-only state handed to every handler through `web::Data`.
pub struct AppState {
    pub settings: Settings,
    pub pipeline: SignInPipeline,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let provider = Arc::new(HttpIdentityProvider::from_settings(&settings));
        Self::with_provider(settings, provider)
    }

    pub fn with_provider(
        settings: Settings,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, ConfigError> {
        let validator = IdTokenValidator::from_options(&settings.oidc)?;
        let claim_map = ClaimTypeMap::from_settings(settings.claims.map_inbound_claims);
        let events = Arc::new(ClaimsPostProcessor::new(settings.claims.missing_subject));

        let pipeline = SignInPipeline::new(
            settings.oidc.clone(),
            claim_map,
            validator,
            provider,
            events,
        );

        Ok(Self { settings, pipeline })
    }

    pub fn cookie_secret(&self) -> &[u8] {
        self.settings.cookie.secret.as_bytes()
    }
}
