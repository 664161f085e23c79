//! Error types for the control-plane clients.

use std::time::Duration;

/// Error codes returned in the JSON body of a failed request.
pub mod codes {
    pub const RESOURCE_ALREADY_EXISTS: &str = "RESOURCE_ALREADY_EXISTS";
    pub const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";
    pub const INVALID_PARAMETER_VALUE: &str = "INVALID_PARAMETER_VALUE";
}

/// Control-plane errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A resource with the requested name is already registered.
    #[error("already exists: {message}")]
    AlreadyExists { message: String },

    /// The addressed resource does not exist (or was deleted).
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Authentication failed or token invalid.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The request was understood but rejected.
    #[error("request rejected (HTTP {status}, {error_code}): {message}")]
    Rejected {
        status: u16,
        error_code: String,
        message: String,
    },

    /// Server side failure (5xx).
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// The connection could not be established; nothing reached the server.
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// Transport failure after the request may have been sent.
    #[error("network error: {message}")]
    Network { message: String },

    /// Response body did not have the expected shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// A SQL statement reached a failed terminal state.
    #[error("statement {statement_id} {state}: {message}")]
    StatementFailed {
        statement_id: String,
        state: String,
        message: String,
    },

    /// Polling for a terminal state gave up.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ApiError {
    /// Whether the error is transient and the request may be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Server { .. }
                | Self::Connect { .. }
                | Self::Network { .. }
        )
    }

    /// Whether the server certainly did not act on the request, so even a
    /// non-idempotent call may be sent again.
    pub fn is_unprocessed(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Connect { .. })
    }

    /// True for the typed "name already claimed" condition.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Connect {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Result type for control-plane operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ApiError::RateLimited { retry_after: None }.is_retryable());
        assert!(ApiError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!ApiError::AlreadyExists {
            message: "dup".into()
        }
        .is_retryable());
        assert!(!ApiError::NotFound {
            message: "gone".into()
        }
        .is_retryable());
    }

    #[test]
    fn only_rejected_before_processing_counts_as_unprocessed() {
        assert!(ApiError::RateLimited { retry_after: None }.is_unprocessed());
        assert!(ApiError::Connect {
            message: "refused".into()
        }
        .is_unprocessed());
        assert!(!ApiError::Network {
            message: "operation timed out".into()
        }
        .is_unprocessed());
        assert!(!ApiError::Server {
            status: 502,
            message: "bad gateway".into()
        }
        .is_unprocessed());
    }
}
