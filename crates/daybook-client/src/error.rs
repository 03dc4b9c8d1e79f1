//! Client error types.

use std::fmt;

use daybook_providers::{ProviderError, ProviderErrorCode};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by `daybook` commands.
#[derive(Debug)]
pub enum ClientError {
    /// Missing or invalid configuration.
    Config(String),
    /// A backend call failed.
    Provider(ProviderError),
    /// IO error.
    Io(std::io::Error),
    /// The command needs a signed-in user or a calendar token.
    AuthRequired(String),
    /// Bad command-line input that clap cannot catch.
    Input(String),
    /// Rendering output failed.
    Output(String),
}

impl ClientError {
    /// Suggested exit code: 2 for usage problems, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Input(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Provider(err) => f.write_str(&err.user_message()),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::AuthRequired(msg) => write!(f, "authentication required: {}", msg),
            Self::Input(msg) => write!(f, "invalid input: {}", msg),
            Self::Output(msg) => write!(f, "output error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Provider(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProviderError> for ClientError {
    fn from(err: ProviderError) -> Self {
        match err.code() {
            ProviderErrorCode::ConfigurationError => Self::Config(err.message().to_string()),
            _ => Self::Provider(err),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(err.to_string())
    }
}
