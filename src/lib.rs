//! OpenID Connect relying-party sign-in for the image gallery client.
//!
//! The provider callback is validated, the identity is narrowed to its subject
//! claim by [`claims::ClaimsPostProcessor`], and the result is kept in a signed
//! session cookie.

pub mod auth;
pub mod claim_map;
pub mod claims;
pub mod config;
pub mod cookies;
pub mod error;
pub mod extractor;
pub mod handlers;
pub mod jwt;
pub mod pipeline;
pub mod provider;
pub mod state;
