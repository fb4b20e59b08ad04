//! The closed adapter error taxonomy (spec §7).

use libfed_domain::ErrorKind;
use thiserror::Error;

/// Errors a [`crate::base::CatalogAdapter`] call can fail with. Every
/// concrete adapter maps its own failure modes (HTTP status, XML/JSON
/// parse failures, missing config) onto one of these variants; the base
/// wrapper additionally maps raw transport/cancellation failures it
/// observes around the call (spec §4.6 step 2).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("adapter error: {0}")]
    Adapter(String),
}

impl AdapterError {
    /// Classify into the closed vocabulary spec §7 requires on
    /// `SystemError.errorType` and in the `error` metric dimension.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Connection(_) => ErrorKind::Connection,
            AdapterError::Timeout(_) => ErrorKind::Timeout,
            AdapterError::Auth(_) => ErrorKind::Auth,
            AdapterError::RateLimit(_) => ErrorKind::RateLimit,
            AdapterError::Parse(_) => ErrorKind::Parse,
            AdapterError::Adapter(_) => ErrorKind::Unknown,
        }
    }

    /// The retry engine's default predicate (spec §4.5): retry connection,
    /// timeout, and unknown errors; never retry auth, rate-limit, or parse
    /// errors, since retrying those can't change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Connection(_) | AdapterError::Timeout(_) | AdapterError::Adapter(_)
        )
    }

    /// Map a transport-layer [`reqwest::Error`] onto the taxonomy the way
    /// the base adapter wrapper does (spec §4.6 step 2): timeouts and
    /// cancellation sentinels become `Timeout`, everything else network-y
    /// becomes `Connection`.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout(err.to_string())
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            map_http_status(status, &err.to_string())
        } else {
            AdapterError::Connection(err.to_string())
        }
    }
}

/// Map an HTTP response status onto the taxonomy: 401/403 -> auth, 429 ->
/// rate limit, other 4xx/5xx -> connection (remote fault), per spec §7.
pub fn map_http_status(status: reqwest::StatusCode, context: &str) -> AdapterError {
    match status.as_u16() {
        401 | 403 => AdapterError::Auth(format!("{status}: {context}")),
        429 => AdapterError::RateLimit(format!("{status}: {context}")),
        _ => AdapterError::Connection(format!("{status}: {context}")),
    }
}
