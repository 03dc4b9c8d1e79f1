//! Google Calendar provider.
//!
//! Reads the signed-in user's calendars through the Calendar API v3.
//!
//! # Authentication Flow
//!
//! 1. User provides their own OAuth client ID/secret (required by Google)
//! 2. Provider binds a loopback listener on the first free port of a range
//! 3. Opens the browser on Google's consent page with a PKCE challenge
//! 4. Google redirects to the loopback listener with an authorization code
//! 5. The code is exchanged for access and refresh tokens, stored on disk
//!
//! # Example
//!
//! ```ignore
//! use daybook_providers::google::{GoogleConfig, GoogleProvider, OAuthCredentials};
//! use daybook_providers::fetch_day;
//!
//! let credentials = OAuthCredentials::from_file("client_secret.json")?;
//! let provider = GoogleProvider::new(GoogleConfig::new(credentials))?;
//!
//! if provider.needs_reauth() {
//!     provider.authenticate().await?;
//! }
//!
//! let events = fetch_day(&provider, today, &chrono::Local).await?;
//! ```

mod client;
mod config;
mod oauth;
mod provider;

pub use client::{CalendarListEntry, GoogleCalendarClient};
pub use config::{
    CALENDAR_API_BASE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GoogleConfig, OAuthCredentials,
};
pub use oauth::OAuthClient;
pub use provider::GoogleProvider;
