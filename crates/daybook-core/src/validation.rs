//! Input checks applied before anything is sent upstream.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid email address: {0}")]
    Email(String),

    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("progress must be between 0 and 100, got {0}")]
    Progress(u8),

    #[error("mood must be between 1 and 5, got {0}")]
    Mood(u8),
}

pub fn check_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(email.trim()) {
        Ok(())
    } else {
        Err(ValidationError::Email(email.to_string()))
    }
}

/// Counts characters, not bytes.
pub fn check_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(ValidationError::PasswordTooShort)
    }
}

pub fn check_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    check_email(email)?;
    check_password(password)
}

pub fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(())
    }
}

pub fn check_progress(progress: u8) -> Result<(), ValidationError> {
    if progress <= 100 {
        Ok(())
    } else {
        Err(ValidationError::Progress(progress))
    }
}

pub fn check_mood(mood: u8) -> Result<(), ValidationError> {
    if (1..=5).contains(&mood) {
        Ok(())
    } else {
        Err(ValidationError::Mood(mood))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(check_email("jane@acme.io").is_ok());
        assert!(check_email(" jane@acme.io ").is_ok());
        assert!(check_email("jane@acme").is_err());
        assert!(check_email("jane acme.io").is_err());
        assert!(check_email("@acme.io").is_err());
        assert!(check_email("").is_err());
    }

    #[test]
    fn passwords() {
        assert_eq!(check_password("12345"), Err(ValidationError::PasswordTooShort));
        assert!(check_password("123456").is_ok());
        assert!(check_password("ééééé").is_err());
    }

    #[test]
    fn credentials_check_email_first() {
        assert!(matches!(
            check_credentials("nope", "1"),
            Err(ValidationError::Email(_))
        ));
    }

    #[test]
    fn ranges() {
        assert!(check_progress(0).is_ok());
        assert!(check_progress(100).is_ok());
        assert!(check_progress(101).is_err());
        assert!(check_mood(0).is_err());
        assert!(check_mood(5).is_ok());
    }

    #[test]
    fn blank_text() {
        assert_eq!(require_text("name", " \t"), Err(ValidationError::Empty("name")));
    }
}
