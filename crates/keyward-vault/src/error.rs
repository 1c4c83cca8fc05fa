//! Error types
//!
//! Each component surfaces its own error kind. `user_message()` on every
//! type is deliberately coarse: it never reveals whether a decryption failed
//! on the tag or on the key, and never echoes a platform diagnostic.

use std::fmt;

/// Vault result type
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Encryption result type
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Biometric gate result type
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Secure storage errors
///
/// A missing entry is not an error: lookups return `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Vault refused access (device locked, platform policy)
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Stored item could not be read back
    #[error("Vault item corrupted: {0}")]
    Corrupted(String),

    /// Stored bytes are not valid text
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Any other backend failure
    #[error("Vault backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            StorageError::Unavailable(_) => {
                "Secure storage is not available right now. Unlock your device and try again."
                    .to_string()
            }
            _ => "Secure storage could not complete the request.".to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

/// Encryption errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Tag verification failed: tampered data or wrong key
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Decrypted bytes are not valid UTF-8
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Key material has the wrong length
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Sealed blob is structurally invalid (too short, bad base64)
    #[error("Malformed sealed message: {0}")]
    Malformed(String),

    /// Cipher could not produce a sealed message
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl CryptoError {
    /// Check if this error indicates tampering or a wrong key
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, CryptoError::AuthenticationFailed)
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CryptoError::AuthenticationFailed | CryptoError::Malformed(_) => {
                "The protected data could not be unlocked.".to_string()
            }
            _ => "The data could not be processed securely.".to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            CryptoError::Decoding(_) => ErrorCategory::Internal,
            _ => ErrorCategory::Crypto,
        }
    }
}

/// Biometric gate errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No biometric hardware, or nothing enrolled
    #[error("Biometric authentication unavailable: {0}")]
    ConfigurationUnavailable(String),

    /// Challenge ran and did not match
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// User or caller dismissed the prompt
    #[error("Authentication cancelled")]
    Cancelled,

    /// Another challenge is already on screen for this gate
    #[error("Authentication already in progress")]
    InProgress,

    /// Too many consecutive failures
    #[error("Biometric authentication locked out")]
    LockedOut,
}

impl AuthError {
    /// Check if this is a configuration failure (not worth re-prompting)
    pub fn is_configuration_failure(&self) -> bool {
        matches!(self, AuthError::ConfigurationUnavailable(_))
    }

    /// Check if the user may simply be prompted again
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::AuthenticationFailed(_) | AuthError::Cancelled)
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AuthError::ConfigurationUnavailable(_) => {
                "Biometric authentication is not set up on this device.".to_string()
            }
            AuthError::AuthenticationFailed(_) => {
                "Authentication failed. Please try again.".to_string()
            }
            AuthError::Cancelled => "Authentication was cancelled.".to_string(),
            AuthError::InProgress => "Authentication is already in progress.".to_string(),
            AuthError::LockedOut => {
                "Too many failed attempts. Biometric authentication is temporarily disabled."
                    .to_string()
            }
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::ConfigurationUnavailable(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Authentication,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Vault access
    Storage,
    /// Encryption and integrity
    Crypto,
    /// Biometric or PIN challenge
    Authentication,
    /// Missing hardware or enrollment
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
            ErrorCategory::Configuration => write!(f, "Configuration"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}
