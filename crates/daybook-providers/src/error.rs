//! Error taxonomy shared by every external collaborator.
//!
//! Calendar, identity and record-store failures all surface as a
//! [`ProviderError`]. The [`ProviderErrorCode`] drives what the user is told
//! (see [`ProviderError::user_message`]); nothing here retries on its own.

use std::fmt;

use daybook_core::{RecordError, ValidationError};
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials are missing, invalid or expired.
    AuthenticationFailed,
    /// The user lacks permission for the resource.
    AuthorizationFailed,
    /// Connection failed, timed out, or DNS resolution failed.
    NetworkError,
    RateLimited,
    /// 5xx or otherwise unexpected status.
    ServerError,
    /// Body did not parse or had an unexpected shape.
    InvalidResponse,
    NotFound,
    BadRequest,
    ConfigurationError,
    CalendarError,
    /// Input was rejected before any request was made.
    ValidationFailed,
    InternalError,
}

impl ProviderErrorCode {
    /// Returns true if the failure is transient and re-running may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::CalendarError => "calendar_error",
            Self::ValidationFailed => "validation_failed",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while talking to an external service.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// Which collaborator raised it ("google", "supabase", "memory").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn calendar(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::CalendarError, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ValidationFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Returns true if signing in again is the fix.
    pub fn needs_reauth(&self) -> bool {
        self.code == ProviderErrorCode::AuthenticationFailed
    }

    /// Message shown to the user.
    ///
    /// Authentication failures keep the upstream reason and ask for a new
    /// sign-in, rate limits ask to try later, and network failures get a
    /// generic message. Everything else shows the upstream message as is.
    pub fn user_message(&self) -> String {
        match self.code {
            ProviderErrorCode::AuthenticationFailed => {
                format!("{}. Please sign in again.", self.message.trim_end_matches('.'))
            }
            ProviderErrorCode::RateLimited => {
                "Too many requests. Please try again later.".to_string()
            }
            ProviderErrorCode::NetworkError => {
                "Could not reach the service. Check your connection and try again.".to_string()
            }
            _ => self.message.clone(),
        }
    }

    /// Copies code, message and provider; the source is not carried over.
    pub fn duplicate(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            provider: self.provider.clone(),
            source: None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<ValidationError> for ProviderError {
    fn from(err: ValidationError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<RecordError> for ProviderError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Invalid(inner) => inner.into(),
            RecordError::Decode { .. } => Self::invalid_response(err.to_string()).with_source(err),
            RecordError::Encode { .. } => Self::internal(err.to_string()),
        }
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_retryable() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(!ProviderErrorCode::AuthenticationFailed.is_retryable());
        assert!(!ProviderErrorCode::ValidationFailed.is_retryable());
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderError::rate_limited("quota exceeded").with_provider("google");
        let display = format!("{}", err);
        assert!(display.contains("[google]"));
        assert!(display.contains("rate_limited"));
        assert!(display.contains("quota exceeded"));
    }

    #[test]
    fn provider_error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = ProviderError::internal("failed to save session").with_source(io_err);
        assert!(err.source().is_some());
        assert!(err.duplicate().source().is_none());
    }

    mod user_message {
        use super::*;

        #[test]
        fn authentication_prompts_sign_in() {
            let err = ProviderError::authentication("Invalid login credentials");
            assert_eq!(
                err.user_message(),
                "Invalid login credentials. Please sign in again."
            );
            assert!(err.needs_reauth());
        }

        #[test]
        fn rate_limit_asks_to_wait() {
            let err = ProviderError::rate_limited("userRateLimitExceeded");
            assert!(err.user_message().contains("try again later"));
        }

        #[test]
        fn network_is_generic() {
            let err = ProviderError::network("dns error: failed to lookup address");
            assert!(!err.user_message().contains("dns"));
        }

        #[test]
        fn others_pass_through() {
            let err = ProviderError::not_found("habit h-1 not found");
            assert_eq!(err.user_message(), "habit h-1 not found");
        }
    }

    #[test]
    fn validation_conversion() {
        let err: ProviderError = ValidationError::PasswordTooShort.into();
        assert_eq!(err.code(), ProviderErrorCode::ValidationFailed);

        let err: ProviderError = RecordError::Invalid(ValidationError::Mood(7)).into();
        assert_eq!(err.code(), ProviderErrorCode::ValidationFailed);
    }
}
