//! Supabase backend: GoTrue identity, PostgREST records and Realtime changes.
//!
//! ```ignore
//! use std::sync::Arc;
//! use daybook_providers::supabase::{SupabaseAuth, SupabaseConfig, SupabaseStore};
//!
//! let config = SupabaseConfig::new("https://abcd.supabase.co", anon_key);
//! let auth = Arc::new(SupabaseAuth::new(config.clone())?);
//! let store = SupabaseStore::new(config, auth.clone())?;
//! ```

mod auth;
mod config;
mod realtime;
mod rest;

pub use auth::SupabaseAuth;
pub use config::{HEARTBEAT_INTERVAL, SupabaseConfig};
pub use realtime::{RealtimeEvent, parse_message};
pub use rest::SupabaseStore;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::ProviderError;

/// Error codes GoTrue uses for bad sign-in state rather than bad input.
const AUTH_ERROR_CODES: [&str; 5] = [
    "invalid_credentials",
    "email_not_confirmed",
    "bad_jwt",
    "session_not_found",
    "refresh_token_not_found",
];

/// The error shapes GoTrue and PostgREST return.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ApiErrorBody {
    fn text(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .filter(|m| !m.trim().is_empty())
    }

    fn is_auth_failure(&self) -> bool {
        self.error.as_deref() == Some("invalid_grant")
            || self
                .error_code
                .as_deref()
                .is_some_and(|c| AUTH_ERROR_CODES.contains(&c))
    }
}

/// Maps a non-success Supabase response to the error taxonomy.
pub(crate) fn map_status(status: StatusCode, body: &str) -> ProviderError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .text()
        .unwrap_or_else(|| format!("request failed ({})", status));

    let error = match status {
        StatusCode::UNAUTHORIZED => ProviderError::authentication(message),
        StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN if parsed.is_auth_failure() => {
            ProviderError::authentication(message)
        }
        StatusCode::FORBIDDEN => ProviderError::authorization(message),
        StatusCode::NOT_FOUND => ProviderError::not_found(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::bad_request(message)
        }
        _ => ProviderError::server(format!("{} ({})", message, status)),
    };
    error.with_provider("supabase")
}
