//! Error model shared by the REST and live layers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a failure must be handled by the caller.
///
/// - `Transient`: retried (connection policy or a bounded fetch retry)
/// - `Authentication`: credential expired/invalid; refresh or force logout
/// - `Validation`: business/validation rejection; surfaced, never retried
/// - `NotFound`: record already gone; surfaced and followed by a re-seed
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Authentication,
    Validation,
    NotFound,
}

/// Body of a non-2xx response (`{ message, code? }`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    /// Seconds to wait before retrying (sent with `429`).
    #[serde(default)]
    pub retry_after: Option<u64>,
}

/// Failure of a request/response exchange with the backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// `401` / `422`: the credential is no longer accepted.
    #[error("credential rejected ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Any other 4xx.
    #[error("request rejected ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Map a non-2xx status and its parsed body onto the taxonomy.
    ///
    /// `retry_after_header` wins over the body's `retry_after` when both exist.
    pub fn from_status(status: u16, body: ErrorBody, retry_after_header: Option<Duration>) -> Self {
        let message = if body.message.is_empty() {
            format!("HTTP {status}")
        } else {
            body.message
        };

        match status {
            401 | 422 => Self::Unauthorized { status, message },
            404 => Self::NotFound(message),
            429 => Self::RateLimited {
                retry_after: retry_after_header.or(body.retry_after.map(Duration::from_secs)),
            },
            400..=499 => Self::Rejected {
                status,
                message,
                code: body.code,
            },
            _ => Self::Server { status, message },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_) | Self::Timeout | Self::Server { .. } | Self::RateLimited { .. } => {
                ErrorClass::Transient
            }
            Self::Unauthorized { .. } => ErrorClass::Authentication,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Rejected { .. } | Self::Decode(_) => ErrorClass::Validation,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Short text suitable for a user-visible status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) | Self::Timeout => "Connection problem, please try again".to_string(),
            Self::Server { .. } => "The server could not complete the request".to_string(),
            Self::RateLimited { .. } => "Too many requests, retrying shortly".to_string(),
            Self::Unauthorized { .. } => "Your session has expired, please log in again".to_string(),
            Self::NotFound(msg) | Self::Rejected { message: msg, .. } => msg.clone(),
            Self::Decode(_) => "Unexpected response from the server".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(message: &str) -> ErrorBody {
        ErrorBody {
            message: message.to_string(),
            ..ErrorBody::default()
        }
    }

    #[test]
    fn auth_statuses_invalidate_the_credential() {
        for status in [401, 422] {
            let err = ApiError::from_status(status, body("expired"), None);
            assert_eq!(err.class(), ErrorClass::Authentication);
        }
    }

    #[test]
    fn rate_limit_prefers_header_delay() {
        let mut b = body("slow down");
        b.retry_after = Some(9);
        let err = ApiError::from_status(429, b.clone(), Some(Duration::from_secs(2)));
        assert_eq!(err, ApiError::RateLimited { retry_after: Some(Duration::from_secs(2)) });

        let err = ApiError::from_status(429, b, None);
        assert_eq!(err, ApiError::RateLimited { retry_after: Some(Duration::from_secs(9)) });
        assert!(err.is_transient());
    }

    #[test]
    fn other_client_errors_are_validation() {
        let err = ApiError::from_status(400, body("quantity must be positive"), None);
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(err.user_message(), "quantity must be positive");
    }

    #[test]
    fn missing_record_is_not_found_and_server_errors_are_transient() {
        assert_eq!(ApiError::from_status(404, body(""), None).class(), ErrorClass::NotFound);
        let err = ApiError::from_status(503, ErrorBody::default(), None);
        assert_eq!(err, ApiError::Server { status: 503, message: "HTTP 503".to_string() });
        assert!(err.is_transient());
    }
}
