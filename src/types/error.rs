//! Error types for pledgewall

use hyper::StatusCode;

/// Main error type for pledge operations
#[derive(Debug, thiserror::Error)]
pub enum PledgeError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Form rejected before anything was persisted. The message is user facing.
    #[error("{0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Local storage error: {0}")]
    LocalStorage(String),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PledgeError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::LocalStorage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Identity(_) => StatusCode::UNAUTHORIZED,
            Self::WebSocket(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

impl From<std::io::Error> for PledgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for PledgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for PledgeError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for PledgeError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for PledgeError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Identity(format!("Token error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PledgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

/// Result type alias for pledge operations
pub type Result<T> = std::result::Result<T, PledgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PledgeError::Validation("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            PledgeError::Unauthorized("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            PledgeError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = PledgeError::Validation("Please sign the commitment to proceed.".into());
        let (_, body) = err.into_status_code_and_body();
        assert_eq!(body, "Please sign the commitment to proceed.");
    }
}
