//! Keyward core
//!
//! Stateless credential validation shared by every Keyward front end:
//! email structure checks, password rule evaluation and markup
//! neutralization for free-text input.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod validation;

pub use error::{Error, ErrorCategory, Result};
pub use validation::{
    evaluate_strength, sanitize_input, validate_email, validate_password, CredentialValidator,
    PasswordRule, PasswordStrength, ValidationVerdict, MIN_PASSWORD_LENGTH, PASSWORD_SYMBOLS,
};
