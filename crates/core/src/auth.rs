//! AuthGate trait — request authorization at the front of the pipeline.
//!
//! Authorization runs before any body parsing so unauthenticated callers
//! never learn anything about schemas or validation behavior.

use crate::error::AuthError;

/// The authenticated caller, as much as the gate can say about them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthPrincipal {
    /// Stable subject identifier when the gate can name the caller
    /// (used for registry ownership checks); `None` for shared-secret auth.
    pub subject: Option<String>,
}

impl AuthPrincipal {
    pub fn anonymous() -> Self {
        Self { subject: None }
    }

    pub fn named(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
        }
    }
}

/// The core AuthGate trait.
///
/// `authorization` is the raw `Authorization` header value, if any.
/// Implementations decide whether absence is acceptable (auth disabled)
/// or a failure.
pub trait AuthGate: Send + Sync {
    fn enforce(&self, authorization: Option<&str>) -> Result<AuthPrincipal, AuthError>;
}

/// A gate that admits everyone. Useful for tests and local runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl AuthGate for OpenGate {
    fn enforce(&self, _authorization: Option<&str>) -> Result<AuthPrincipal, AuthError> {
        Ok(AuthPrincipal::anonymous())
    }
}
