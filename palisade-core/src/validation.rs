//! Registration input validation
//!
//! Single source of truth for username/email/password format rules,
//! applied before any account is created or a password replaced.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ValidationError;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.-]{3,50}$").expect("Invalid username regex pattern"));

/// Validates an email address against a practical subset of RFC 5322.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField(
            "Email is required".to_string(),
        ));
    }

    if email.len() > 254 {
        return Err(ValidationError::InvalidEmail(
            "Email is too long".to_string(),
        ));
    }

    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(format!(
            "Invalid email format: {email}"
        )))
    }
}

/// Validates a username: 3-50 characters, alphanumerics plus `_.-`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::MissingField(
            "Username is required".to_string(),
        ));
    }

    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername(
            "Username must be 3-50 characters of letters, digits, '_', '.' or '-'".to_string(),
        ))
    }
}

/// Validates password strength requirements.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField(
            "Password is required".to_string(),
        ));
    }

    if password.len() < 8 {
        return Err(ValidationError::InvalidPassword(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    if password.len() > 128 {
        return Err(ValidationError::InvalidPassword(
            "Password must be at most 128 characters".to_string(),
        ));
    }

    Ok(())
}
