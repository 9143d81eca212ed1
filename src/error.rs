//! Error types and HTTP response mapping

use actix_web::{HttpResponse, ResponseError};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("identity token carries no subject claim")]
    MissingSubject,

    #[error("invalid identity token: {message}")]
    InvalidIdToken { message: String },

    #[error("sign-in correlation failed: {message}")]
    Correlation { message: String },

    #[error("identity provider error: {message}")]
    Provider { message: String },

    #[error("user info subject does not match identity token subject")]
    SubjectMismatch,

    #[error("not signed in")]
    Unauthenticated,

    #[error("session error: {message}")]
    Session { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AuthError {
    pub fn invalid_id_token(message: impl Into<String>) -> Self {
        Self::InvalidIdToken {
            message: message.into(),
        }
    }

    pub fn correlation(message: impl Into<String>) -> Self {
        Self::Correlation {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn error_key(&self) -> &'static str {
        match self {
            Self::MissingSubject => "missing_subject",
            Self::InvalidIdToken { .. } => "invalid_id_token",
            Self::Correlation { .. } => "correlation_failed",
            Self::Provider { .. } => "provider_error",
            Self::SubjectMismatch => "subject_mismatch",
            Self::Unauthenticated => "unauthenticated",
            Self::Session { .. } => "session_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSubject
            | Self::InvalidIdToken { .. }
            | Self::SubjectMismatch
            | Self::Unauthenticated
            | Self::Session { .. } => StatusCode::UNAUTHORIZED,
            Self::Correlation { .. } => StatusCode::BAD_REQUEST,
            Self::Provider { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.error_key(),
            message: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_failures_map_to_unauthorized() {
        assert_eq!(AuthError::MissingSubject.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::invalid_id_token("bad signature").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::SubjectMismatch.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn upstream_and_correlation_failures() {
        assert_eq!(AuthError::provider("500").status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AuthError::correlation("state mismatch").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::correlation("x").error_key(), "correlation_failed");
    }
}
