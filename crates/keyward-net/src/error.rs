//! Error types

use std::fmt;

/// Transport errors
///
/// Trust failures (`UntrustedHost`, `PinMismatch`) are raised before any
/// request byte leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// Host has no trust anchors
    #[error("Untrusted host: {0}")]
    UntrustedHost(String),

    /// Server key does not match any pin for the host
    #[error("Certificate pin mismatch for {host}")]
    PinMismatch {
        /// Host that presented the certificate
        host: String,
    },

    /// Connect or total deadline elapsed
    #[error("Timed out: {0}")]
    Timeout(String),

    /// TCP or HTTP connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS handshake or certificate parsing failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-2xx response
    #[error("HTTP status {status}")]
    Http {
        /// Response status code
        status: u16,
    },

    /// Response body did not match the expected shape
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// URL is unparsable or not https
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport settings or pins are invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, NetworkError>;

impl NetworkError {
    /// Check if this error is a trust-anchor rejection
    pub fn is_trust_failure(&self) -> bool {
        matches!(
            self,
            NetworkError::UntrustedHost(_) | NetworkError::PinMismatch { .. }
        )
    }

    /// Check if the caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Timeout(_) | NetworkError::Connection(_) => true,
            NetworkError::Http { status } => *status >= 500,
            _ => false,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            NetworkError::UntrustedHost(_) | NetworkError::PinMismatch { .. } => {
                "The server could not be verified. The connection was blocked.".to_string()
            }
            NetworkError::Timeout(_) => "The request timed out. Please try again.".to_string(),
            NetworkError::Connection(_) | NetworkError::Tls(_) => {
                "Could not connect to the server. Check your connection.".to_string()
            }
            NetworkError::Http { status } if *status >= 500 => {
                "The server is having trouble. Please try again later.".to_string()
            }
            NetworkError::Http { .. } | NetworkError::Decoding(_) => {
                "The server returned an unexpected response.".to_string()
            }
            NetworkError::InvalidUrl(_) | NetworkError::InvalidConfig(_) => {
                "The request is misconfigured.".to_string()
            }
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            NetworkError::UntrustedHost(_) | NetworkError::PinMismatch { .. } => {
                ErrorCategory::Trust
            }
            NetworkError::Timeout(_) | NetworkError::Connection(_) | NetworkError::Tls(_) => {
                ErrorCategory::Network
            }
            NetworkError::Http { .. } | NetworkError::Decoding(_) => ErrorCategory::Protocol,
            NetworkError::InvalidUrl(_) | NetworkError::InvalidConfig(_) => {
                ErrorCategory::Configuration
            }
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Host or certificate not trusted
    Trust,
    /// Connectivity
    Network,
    /// Server response
    Protocol,
    /// Caller or settings mistake
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Trust => write!(f, "Trust"),
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Protocol => write!(f, "Protocol"),
            ErrorCategory::Configuration => write!(f, "Configuration"),
        }
    }
}
