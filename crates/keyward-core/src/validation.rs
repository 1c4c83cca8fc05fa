//! Credential validation
//!
//! Pure, stateless checks on user-supplied identifiers and text. Nothing in
//! this module allocates shared state or performs I/O.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Punctuation accepted as a password symbol
pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?`~";

/// local-part "@" domain "." tld
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .unwrap_or_else(|e| panic!("email pattern must compile: {e}"))
});

/// A single password rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordRule {
    /// At least [`MIN_PASSWORD_LENGTH`] characters
    MinLength,
    /// At least one uppercase letter
    Uppercase,
    /// At least one lowercase letter
    Lowercase,
    /// At least one digit
    Digit,
    /// At least one character from [`PASSWORD_SYMBOLS`]
    Symbol,
}

impl PasswordRule {
    /// Every rule, in evaluation order
    pub const ALL: [PasswordRule; 5] = [
        PasswordRule::MinLength,
        PasswordRule::Uppercase,
        PasswordRule::Lowercase,
        PasswordRule::Digit,
        PasswordRule::Symbol,
    ];

    /// Human-readable description, suitable for a UI checklist
    pub fn description(&self) -> &'static str {
        match self {
            PasswordRule::MinLength => "at least 8 characters",
            PasswordRule::Uppercase => "at least one uppercase letter",
            PasswordRule::Lowercase => "at least one lowercase letter",
            PasswordRule::Digit => "at least one digit",
            PasswordRule::Symbol => "at least one symbol",
        }
    }

    fn is_satisfied_by(&self, password: &str, min_length: usize) -> bool {
        match self {
            PasswordRule::MinLength => password.chars().count() >= min_length,
            PasswordRule::Uppercase => password.chars().any(|c| c.is_ascii_uppercase()),
            PasswordRule::Lowercase => password.chars().any(|c| c.is_ascii_lowercase()),
            PasswordRule::Digit => password.chars().any(|c| c.is_ascii_digit()),
            PasswordRule::Symbol => password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)),
        }
    }
}

impl fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Outcome of a password check: every violated rule, never just the first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    violations: Vec<PasswordRule>,
}

impl ValidationVerdict {
    /// Build a verdict from a list of violations
    pub fn new(violations: Vec<PasswordRule>) -> Self {
        Self { violations }
    }

    /// True iff no rule was violated
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violated rules, in evaluation order
    pub fn violations(&self) -> &[PasswordRule] {
        &self.violations
    }

    /// Check whether a specific rule was violated
    pub fn violates(&self, rule: PasswordRule) -> bool {
        self.violations.contains(&rule)
    }

    /// Convert into a `Result` for `?`-style callers
    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::ValidationFailed(self.violations))
        }
    }
}

/// Password strength estimate for UI feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PasswordStrength {
    /// Weak: < 8 characters
    Weak,
    /// Fair: 8-11 characters
    Fair,
    /// Good: 12-15 characters, or longer with little variety
    Good,
    /// Strong: 16+ characters with variety
    Strong,
}

/// Credential validator
///
/// Carries only the minimum password length; all checks are pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialValidator {
    min_password_length: usize,
}

impl CredentialValidator {
    /// Create validator with the standard rules
    pub fn new() -> Self {
        Self {
            min_password_length: MIN_PASSWORD_LENGTH,
        }
    }

    /// Structural email check. Does not verify deliverability.
    pub fn validate_email(&self, email: &str) -> bool {
        EMAIL_PATTERN.is_match(email)
    }

    /// Evaluate every password rule and report all violations at once
    pub fn validate_password(&self, password: &str) -> ValidationVerdict {
        let violations: Vec<PasswordRule> = PasswordRule::ALL
            .iter()
            .copied()
            .filter(|rule| !rule.is_satisfied_by(password, self.min_password_length))
            .collect();

        if !violations.is_empty() {
            tracing::debug!("Password check failed {} rule(s)", violations.len());
        }

        ValidationVerdict::new(violations)
    }

    /// Escape the five HTML-significant characters. See [`sanitize_input`].
    pub fn sanitize_input(&self, input: &str) -> String {
        sanitize_input(input)
    }
}

impl Default for CredentialValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural email check with the standard validator
pub fn validate_email(email: &str) -> bool {
    CredentialValidator::new().validate_email(email)
}

/// Password rule check with the standard validator
pub fn validate_password(password: &str) -> ValidationVerdict {
    CredentialValidator::new().validate_password(password)
}

/// Escape `<`, `>`, `&`, `"` and `'` to their HTML entities.
///
/// This is a context-free defensive transform for free-text input. It is
/// not a substitute for escaping at the output site: attribute values,
/// URLs, script and style contexts each need their own encoding.
pub fn sanitize_input(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Estimate password strength from length and character variety
pub fn evaluate_strength(password: &str) -> PasswordStrength {
    let len = password.chars().count();
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    let variety_score = [has_lower, has_upper, has_digit, has_special]
        .iter()
        .filter(|&&b| b)
        .count();

    if len < 8 {
        PasswordStrength::Weak
    } else if len < 12 {
        PasswordStrength::Fair
    } else if len < 16 || variety_score < 3 {
        PasswordStrength::Good
    } else {
        PasswordStrength::Strong
    }
}
