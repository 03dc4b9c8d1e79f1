//! Identity provider: accounts and sessions.
//!
//! Everything in the app besides the meetings view is owned by a signed-in
//! user. An [`IdentityProvider`] signs users up and in, keeps the session on
//! disk and refreshes it when the access token expires.

use chrono::{DateTime, Utc};
use daybook_core::validation;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;
use crate::tokens::StoredCredential;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// False while a sign-up confirmation email is outstanding.
    #[serde(default)]
    pub email_confirmed: bool,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            display_name: None,
            email_confirmed: true,
        }
    }

    /// Display name, falling back to the email address.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Optional profile fields collected at sign-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Profile {
    /// Blank names are dropped.
    pub fn new(display_name: Option<&str>) -> Self {
        Self {
            display_name: display_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
    }
}

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Session {
    pub fn owner_id(&self) -> &str {
        &self.user.id
    }
}

impl StoredCredential for Session {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }
}

/// Result of a sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The account is usable right away.
    Active(Session),
    /// A confirmation email was sent; sign in after confirming.
    PendingConfirmation(User),
}

/// Validates sign-in form input before any request is made.
pub fn check_sign_in(email: &str, password: &str) -> ProviderResult<()> {
    validation::check_credentials(email, password).map_err(ProviderError::from)
}

/// Account management.
///
/// Implementations validate form input first and fail with
/// [`ProviderErrorCode::ValidationFailed`](crate::ProviderErrorCode::ValidationFailed)
/// without contacting the service.
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        profile: Profile,
    ) -> BoxFuture<'a, ProviderResult<SignUpOutcome>>;

    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str)
    -> BoxFuture<'a, ProviderResult<Session>>;

    /// Signs in through a third-party OAuth provider such as `"google"`.
    fn sign_in_with_oauth<'a>(
        &'a self,
        provider: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Session>>;

    /// Ends the session locally even if the server call fails.
    fn sign_out(&self) -> BoxFuture<'_, ProviderResult<()>>;

    /// The stored session, refreshed first if it expired.
    ///
    /// Returns `Ok(None)` when nobody is signed in.
    fn current_session(&self) -> BoxFuture<'_, ProviderResult<Option<Session>>>;

    fn request_password_reset<'a>(&'a self, email: &'a str) -> BoxFuture<'a, ProviderResult<()>>;

    /// Changes the signed-in user's password.
    fn update_password<'a>(&'a self, new_password: &'a str) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Returns the current session or an authentication error.
pub async fn require_session(identity: &dyn IdentityProvider) -> ProviderResult<Session> {
    identity.current_session().await?.ok_or_else(|| {
        ProviderError::authentication("not signed in, run 'daybook account signin'")
            .with_provider(identity.name())
    })
}
