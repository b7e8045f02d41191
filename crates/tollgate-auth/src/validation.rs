//! Field validation for registration and client creation paths.
//!
//! Each creation path calls these functions directly and collects the
//! failures into a [`ValidationErrors`] list, so a single response can
//! report every offending field at once.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
        .expect("Invalid email regex")
});

const SPECIAL_CHARACTERS: &str = "!@#$%^&*()-_=+[]{}|;:'\",.<>/?`~\\";

/// Roles an account may be registered under.
pub const ALLOWED_ROLES: [&str; 3] = ["admin", "teacher", "student"];

/// A single field failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Ordered list of field failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Records `result` under `field` when it is an error.
    pub fn check(&mut self, field: &str, result: Result<(), String>) {
        if let Err(message) = result {
            self.push(field, message);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Returns `true` if any failure was recorded for `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Converts the list into `Ok(())` when empty, else [`AuthError::InvalidInput`].
    pub fn into_result(self) -> Result<(), AuthError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AuthError::invalid_input(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

/// Username: 4 to 50 characters, no whitespace.
pub fn validate_username(value: &str) -> Result<(), String> {
    let len = value.chars().count();
    if !(4..=50).contains(&len) {
        return Err("must be between 4 and 50 characters".to_string());
    }
    if value.chars().any(char::is_whitespace) {
        return Err("must not contain spaces".to_string());
    }
    Ok(())
}

pub fn validate_email(value: &str) -> Result<(), String> {
    if EMAIL_REGEX.is_match(value) {
        Ok(())
    } else {
        Err("must be a valid email address".to_string())
    }
}

/// Password: at least 8 characters with a lowercase letter, an uppercase
/// letter, a digit and a special character.
pub fn validate_password(value: &str) -> Result<(), String> {
    let mut missing = Vec::new();
    if value.chars().count() < 8 {
        missing.push("at least 8 characters");
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push("a lowercase letter");
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        missing.push("an uppercase letter");
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        missing.push("a digit");
    }
    if !value.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        missing.push("a special character");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("must contain {}", missing.join(", ")))
    }
}

pub fn validate_role_name(value: &str) -> Result<(), String> {
    if ALLOWED_ROLES.contains(&value) {
        Ok(())
    } else {
        Err(format!("must be one of {}", ALLOWED_ROLES.join(", ")))
    }
}

/// Absolute http(s) URL.
pub fn validate_url(value: &str) -> Result<(), String> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
        Ok(_) => Err("must be an absolute http or https URL".to_string()),
        Err(e) => Err(format!("invalid URL: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob").is_err());
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("alice@x.test").is_ok());
        assert!(validate_email("alice@").is_err());
        assert!(validate_email("not an email").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Str0ng!pass").is_ok());

        let err = validate_password("weak").unwrap_err();
        assert!(err.contains("at least 8 characters"));
        assert!(err.contains("an uppercase letter"));
        assert!(err.contains("a digit"));
        assert!(err.contains("a special character"));
        assert!(!err.contains("a lowercase letter"));
    }

    #[test]
    fn test_url_rules() {
        assert!(validate_url("https://app.example.com/callback").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("/relative").is_err());
    }

    #[test]
    fn test_errors_collect_and_display() {
        let mut errors = ValidationErrors::new();
        errors.check("username", validate_username("al"));
        errors.check("email", validate_email("alice@x.test"));
        errors.check("role", validate_role_name("guest"));

        assert_eq!(errors.len(), 2);
        assert!(errors.has_field("username"));
        assert!(!errors.has_field("email"));
        assert!(errors.to_string().starts_with("username: "));

        let err = errors.into_result().unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput { .. }));
    }
}
