//! Gateway error model.

use serde::Serialize;
use thiserror::Error;

/// Result type used across the gateway crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Coarse classification of a failure, shared by every crate so that the
/// transport layer can render any error without knowing where it came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    UnsupportedType,
    Internal,
}

impl ErrorKind {
    /// HTTP-like status code conventionally associated with the kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::UnsupportedType | ErrorKind::Internal => 500,
        }
    }

    /// Stable machine-readable code (used in JSON error bodies).
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::MethodNotAllowed => "method_not_allowed",
            ErrorKind::UnsupportedType => "unsupported_service_type",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Gateway-level error.
///
/// Authorization denials are *not* errors at this level (they are decisions);
/// these variants cover malformed input, failed lookups and collaborator
/// failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed request (undeclared payload format, bad identifier, ...).
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No service (or id) with that name exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The verb token is not one of the recognized verbs.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// A service descriptor names a type with no registered factory.
    #[error("unsupported service type: {0}")]
    UnsupportedType(String),

    /// A collaborator (persistence, cache backing store) failed.
    #[error("store error: {0}")]
    Store(String),
}

impl GatewayError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::MethodNotAllowed(msg.into())
    }

    pub fn unsupported_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedType(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::BadRequest(_) => ErrorKind::BadRequest,
            GatewayError::Unauthorized(_) => ErrorKind::Unauthorized,
            GatewayError::Forbidden(_) => ErrorKind::Forbidden,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::MethodNotAllowed(_) => ErrorKind::MethodNotAllowed,
            GatewayError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            GatewayError::Store(_) => ErrorKind::Internal,
        }
    }

    /// The human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            GatewayError::BadRequest(m)
            | GatewayError::Unauthorized(m)
            | GatewayError::Forbidden(m)
            | GatewayError::NotFound(m)
            | GatewayError::MethodNotAllowed(m)
            | GatewayError::UnsupportedType(m)
            | GatewayError::Store(m) => m,
        }
    }
}
