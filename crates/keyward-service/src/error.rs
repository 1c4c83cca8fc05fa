//! Error types

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
///
/// Wraps the component errors unchanged so callers can still match on the
/// precise kind.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Vault failure
    #[error(transparent)]
    Storage(#[from] keyward_vault::StorageError),

    /// Encryption failure
    #[error(transparent)]
    Crypto(#[from] keyward_vault::CryptoError),

    /// Biometric gate refused
    #[error(transparent)]
    Auth(#[from] keyward_vault::AuthError),

    /// Transport failure
    #[error(transparent)]
    Network(#[from] keyward_net::NetworkError),

    /// Input validation failure
    #[error(transparent)]
    Validation(#[from] keyward_core::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background task failed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::Storage(e) => e.user_message(),
            Error::Crypto(e) => e.user_message(),
            Error::Auth(e) => e.user_message(),
            Error::Network(e) => e.user_message(),
            Error::Validation(e) => e.user_message(),
            Error::Config(_) => "The app configuration is invalid.".to_string(),
            Error::Internal(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Storage(_) => ErrorCategory::Storage,
            Error::Crypto(_) => ErrorCategory::Crypto,
            Error::Auth(_) => ErrorCategory::Authentication,
            Error::Network(_) => ErrorCategory::Network,
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Config(_) => ErrorCategory::Configuration,
            Error::Internal(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Secure storage
    Storage,
    /// Encryption and integrity
    Crypto,
    /// Biometric gate
    Authentication,
    /// Transport and trust
    Network,
    /// User input
    Validation,
    /// Settings
    Configuration,
    /// Logic errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Storage => write!(f, "Storage"),
            ErrorCategory::Crypto => write!(f, "Crypto"),
            ErrorCategory::Authentication => write!(f, "Authentication"),
            ErrorCategory::Network => write!(f, "Network"),
            ErrorCategory::Validation => write!(f, "Validation"),
            ErrorCategory::Configuration => write!(f, "Configuration"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}
