//! Fetch error taxonomy.

use thiserror::Error;

/// Outcome of a failed tile fetch.
///
/// Retryable failures (I/O trouble, short or undecodable images) may succeed
/// on another attempt. Non-retryable failures (bad URLs, auth and service
/// errors, unexpected content, timeouts) will not, so retry loops stop
/// immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("retryable: {0}")]
    Retryable(String),

    #[error("non-retryable: {0}")]
    NonRetryable(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Retryable(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Transport-level HTTP failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl From<HttpError> for FetchError {
    fn from(e: HttpError) -> Self {
        match e {
            // Timeouts are not retried: a slow server only gets slower when
            // hammered.
            HttpError::InvalidUrl(_) | HttpError::Timeout(_) => FetchError::NonRetryable(e.to_string()),
            HttpError::Connection(_) | HttpError::Body(_) => FetchError::Retryable(e.to_string()),
        }
    }
}

/// Classifies a non-success HTTP status.
pub fn status_error(status: u16, url: &str) -> FetchError {
    let message = format!("HTTP {} from {}", status, url);
    match status {
        500..=599 => FetchError::Retryable(message),
        _ => FetchError::NonRetryable(message),
    }
}
