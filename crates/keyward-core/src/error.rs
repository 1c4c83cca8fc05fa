//! Error types for credential validation

use crate::validation::PasswordRule;
use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Validation errors
///
/// Validation outcomes are normally plain return values
/// ([`crate::ValidationVerdict`], `bool`). This type exists for callers that
/// prefer to propagate a failed verdict with `?`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// One or more password rules were violated
    #[error("Validation failed: {}", describe_rules(.0))]
    ValidationFailed(Vec<PasswordRule>),

    /// Email address is structurally invalid
    #[error("Invalid email address")]
    InvalidEmail,
}

fn describe_rules(rules: &[PasswordRule]) -> String {
    rules
        .iter()
        .map(|rule| rule.description())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::ValidationFailed(rules) => {
                format!("Your password does not meet the requirements: {}.", describe_rules(rules))
            }
            Error::InvalidEmail => "Please enter a valid email address.".to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ValidationFailed(_) => ErrorCategory::Password,
            Error::InvalidEmail => ErrorCategory::Email,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Password rule violations
    Password,
    /// Email structure violations
    Email,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Password => write!(f, "Password"),
            ErrorCategory::Email => write!(f, "Email"),
        }
    }
}
