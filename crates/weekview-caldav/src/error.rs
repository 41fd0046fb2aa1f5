//! Error types for CalDAV operations.

use std::fmt;
use thiserror::Error;

/// The category of a CalDAV error.
///
/// The engine's retry and fail-fast decisions key off this classification,
/// so authentication failures must never be folded into generic network
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalDavErrorCode {
    /// Authentication failed - credentials are invalid or expired.
    AuthenticationFailed,
    /// Network error - connection failed, timeout, DNS resolution.
    NetworkError,
    /// Rate limit exceeded.
    RateLimited,
    /// Server returned a 5xx status.
    ServerError,
    /// Response could not be parsed or had an unexpected shape.
    InvalidResponse,
    /// Resource not found (404).
    NotFound,
    /// Configuration error - missing or invalid config.
    ConfigurationError,
    /// Calendar-level error - e.g. unknown calendar id.
    CalendarError,
}

impl CalDavErrorCode {
    /// Returns true if the error is transient and the operation may be
    /// retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns a stable machine-readable name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::ConfigurationError => "configuration_error",
            Self::CalendarError => "calendar_error",
        }
    }
}

impl fmt::Display for CalDavErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from a CalDAV operation.
#[derive(Debug, Error)]
pub struct CalDavError {
    code: CalDavErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CalDavError {
    /// Creates a new error with the given code and message.
    pub fn new(code: CalDavErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(CalDavErrorCode::AuthenticationFailed, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CalDavErrorCode::NetworkError, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(CalDavErrorCode::RateLimited, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(CalDavErrorCode::ServerError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(CalDavErrorCode::InvalidResponse, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CalDavErrorCode::NotFound, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(CalDavErrorCode::ConfigurationError, message)
    }

    /// Creates a calendar-level error.
    pub fn calendar(message: impl Into<String>) -> Self {
        Self::new(CalDavErrorCode::CalendarError, message)
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> CalDavErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this is an authentication failure.
    pub fn is_authentication(&self) -> bool {
        self.code == CalDavErrorCode::AuthenticationFailed
    }

    /// Returns true if the error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for CalDavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for CalDAV operations.
pub type CalDavResult<T> = Result<T, CalDavError>;
