//! The tagged fault type threaded through pipeline steps.
//!
//! Each step of the pipeline returns `Result<_, Fault>`; the fault collapses
//! to an HTTP status plus error envelope only at the boundary. No exceptions
//! as control flow, no stringly-typed codes.

use serde::Serialize;
use serde_json::Value;

/// Stable error codes of the public envelope contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    MalformedRequest,
    InputValidationError,
    OutputValidationError,
    InternalError,
    NotImplemented,
    AgentNotFound,
    AgentSpecInvalid,
    AgentVersionExists,
    Forbidden,
    NotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::MalformedRequest => "MALFORMED_REQUEST",
            ErrorCode::InputValidationError => "INPUT_VALIDATION_ERROR",
            ErrorCode::OutputValidationError => "OUTPUT_VALIDATION_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::AgentNotFound => "AGENT_NOT_FOUND",
            ErrorCode::AgentSpecInvalid => "AGENT_SPEC_INVALID",
            ErrorCode::AgentVersionExists => "AGENT_VERSION_EXISTS",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }
}

/// A pipeline fault: HTTP status, stable code, message, optional details.
#[derive(Debug, Clone)]
pub struct Fault {
    pub status: u16,
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl Fault {
    pub fn new(
        status: u16,
        code: ErrorCode,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, ErrorCode::Unauthorized, message, None)
    }

    pub fn malformed(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::new(400, ErrorCode::MalformedRequest, message, details)
    }

    pub fn input_validation(message: impl Into<String>, details: Value) -> Self {
        Self::new(422, ErrorCode::InputValidationError, message, Some(details))
    }

    pub fn output_validation(message: impl Into<String>, details: Value) -> Self {
        Self::new(422, ErrorCode::OutputValidationError, message, Some(details))
    }

    pub fn internal(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::new(500, ErrorCode::InternalError, message, details)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(501, ErrorCode::NotImplemented, message, None)
    }

    pub fn agent_not_found(agent_id: &str) -> Self {
        Self::new(
            404,
            ErrorCode::AgentNotFound,
            format!("Agent not found: {agent_id}"),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_value(ErrorCode::InputValidationError).unwrap();
        assert_eq!(json, "INPUT_VALIDATION_ERROR");
        assert_eq!(ErrorCode::AgentVersionExists.as_str(), "AGENT_VERSION_EXISTS");
    }

    #[test]
    fn helpers_set_expected_status() {
        assert_eq!(Fault::unauthorized("no").status, 401);
        assert_eq!(Fault::malformed("bad", None).status, 400);
        assert_eq!(Fault::not_implemented("later").status, 501);
        assert_eq!(Fault::agent_not_found("x").status, 404);
    }
}
