//! Error Types
//!
//! Auth rejections, dependency failures and server startup errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Access control failure. Every variant is terminal for the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token, malformed header, or no principal where one is required
    #[error("{0}")]
    Unauthorized(String),

    #[error("Authentication token has expired")]
    TokenExpired,

    #[error("Invalid authentication token")]
    TokenInvalid,

    /// Role or tenant mismatch
    #[error("{0}")]
    Forbidden(String),
}

impl AuthError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Machine-readable code sent in the `error` field
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthorized(_) => "Unauthorized",
            AuthError::TokenExpired => "TokenExpired",
            AuthError::TokenInvalid => "InvalidToken",
            AuthError::Forbidden(_) => "Forbidden",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// JSON error body shared by every rejection
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Dependency check failure, as reported by readiness
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("{name} is unhealthy")]
    Unhealthy { name: String },

    #[error("{name} is degraded")]
    Degraded { name: String },
}

/// Server startup errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_codes() {
        assert_eq!(AuthError::unauthorized("x").code(), "Unauthorized");
        assert_eq!(AuthError::TokenExpired.code(), "TokenExpired");
        assert_eq!(AuthError::TokenInvalid.code(), "InvalidToken");
        assert_eq!(AuthError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_dependency_error_display() {
        let err = DependencyError::Unhealthy {
            name: "database".to_string(),
        };
        assert_eq!(err.to_string(), "database is unhealthy");
    }
}
