//! Bearer-token auth gate.
//!
//! Implements `agentgate_core::AuthGate` over static bearer tokens from
//! configuration. Two modes can coexist:
//!
//! - a single shared token (`auth.token`) — admits an anonymous principal
//! - a token → subject map (`auth.tokens`) — admits a named principal,
//!   which enables registry ownership checks
//!
//! With neither configured, authentication is disabled and everyone is
//! admitted anonymously. External identity-provider JWT validation is a
//! separate concern and not handled here.

use std::collections::HashMap;

use agentgate_config::AuthConfig;
use agentgate_core::auth::{AuthGate, AuthPrincipal};
use agentgate_core::error::AuthError;

/// A gate checking `Authorization: Bearer <token>` against configured tokens.
pub struct BearerTokenGate {
    shared_token: Option<String>,
    subject_tokens: HashMap<String, String>,
}

impl BearerTokenGate {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            shared_token: config.token.clone(),
            subject_tokens: config.tokens.clone(),
        }
    }

    fn enabled(&self) -> bool {
        self.shared_token.is_some() || !self.subject_tokens.is_empty()
    }
}

impl AuthGate for BearerTokenGate {
    fn enforce(&self, authorization: Option<&str>) -> Result<AuthPrincipal, AuthError> {
        if !self.enabled() {
            return Ok(AuthPrincipal::anonymous());
        }

        let token = authorization
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingHeader)?;

        if self.shared_token.as_deref() == Some(token) {
            return Ok(AuthPrincipal::anonymous());
        }
        if let Some(subject) = self.subject_tokens.get(token) {
            return Ok(AuthPrincipal::named(subject));
        }

        Err(AuthError::InvalidToken)
    }
}
