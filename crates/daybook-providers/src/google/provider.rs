//! Google Calendar provider implementation.
//!
//! Implements [`CalendarProvider`] on top of the Calendar API v3 with the
//! PKCE login from [`super::oauth`].

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{
    BoxFuture, CalendarInfo, CalendarProvider, FetchOptions, FetchResult, ProviderStatus,
};
use crate::tokens::{StoredCredential, TokenInfo, TokenStorage};

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;
use super::oauth::OAuthClient;

/// Google Calendar provider.
///
/// Tokens are loaded from disk at construction; an expired access token is
/// refreshed transparently before the next API call.
pub struct GoogleProvider {
    config: GoogleConfig,
    display_name: String,
    token_storage: TokenStorage<TokenInfo>,
    oauth_client: OAuthClient,
    api_client: GoogleCalendarClient,
    /// Serializes refreshes so concurrent fetches do not race on the refresh token.
    refresh_lock: Mutex<()>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
}

impl GoogleProvider {
    /// Creates a provider and loads any stored tokens.
    ///
    /// Does not start the login flow; call [`Self::authenticate`] for that.
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;

        let display_name = config.provider_name();
        let token_storage = TokenStorage::new(&config.token_path);
        token_storage.load()?;

        let oauth_client = OAuthClient::new(config.clone())?;
        let api_client = GoogleCalendarClient::new(&config.api_base_url, config.timeout)?;

        Ok(Self {
            config,
            display_name,
            token_storage,
            oauth_client,
            api_client,
            refresh_lock: Mutex::new(()),
            last_sync: RwLock::new(None),
        })
    }

    /// Runs the browser login and stores the resulting tokens.
    pub async fn authenticate(&self) -> ProviderResult<()> {
        info!("starting Google authentication flow");
        let tokens = self.oauth_client.authorize().await?;
        self.token_storage.set(tokens)?;
        info!("authentication successful");
        Ok(())
    }

    /// True when there are no tokens or the configured scopes changed.
    pub fn needs_reauth(&self) -> bool {
        self.token_storage.needs_reauth(&self.config.scopes)
    }

    /// Forgets the stored tokens.
    pub fn sign_out(&self) -> ProviderResult<()> {
        self.token_storage.clear()
    }

    /// Returns a usable access token, refreshing it first if it expired.
    async fn ensure_access_token(&self) -> ProviderResult<String> {
        let tokens = self.stored_tokens()?;
        if !tokens.is_expired() {
            return Ok(tokens.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited.
        let tokens = self.stored_tokens()?;
        if !tokens.is_expired() {
            return Ok(tokens.access_token);
        }
        self.refresh(tokens).await
    }

    async fn refresh(&self, tokens: TokenInfo) -> ProviderResult<String> {
        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            ProviderError::authentication("no refresh token, re-authentication required")
        })?;

        debug!("refreshing expired access token");
        let (access_token, rotated, expires_in) =
            self.oauth_client.refresh_token(refresh_token).await?;
        let updated = self
            .token_storage
            .update(|t| t.apply_refresh(access_token, rotated, expires_in))?;
        Ok(updated.access_token)
    }

    fn stored_tokens(&self) -> ProviderResult<TokenInfo> {
        self.token_storage.get().ok_or_else(|| {
            ProviderError::authentication("not signed in to Google, run 'daybook auth google'")
        })
    }

    /// Fetches events from every requested calendar, in calendar order.
    async fn fetch_all_calendars(&self, options: &FetchOptions) -> ProviderResult<FetchResult> {
        let access_token = self.ensure_access_token().await?;

        let (time_min, time_max) = match &options.time_window {
            Some(window) => (window.start, window.end),
            None => {
                let now = Utc::now();
                (now - chrono::Duration::hours(12), now + chrono::Duration::hours(48))
            }
        };

        let calendar_ids = options
            .calendar_ids
            .clone()
            .unwrap_or_else(|| self.config.calendar_ids.clone());

        let mut all_events = Vec::new();
        for calendar_id in &calendar_ids {
            debug!("fetching events from calendar: {}", calendar_id);
            let remaining = options.max_results.map(|max| max.saturating_sub(all_events.len()));
            if remaining == Some(0) {
                break;
            }
            let events = self
                .api_client
                .list_events(&access_token, calendar_id, time_min, time_max, remaining)
                .await
                .map_err(|e| e.with_provider(&self.display_name))?;
            all_events.extend(events);
        }

        *self.last_sync.write().unwrap() = Some(Utc::now());
        Ok(FetchResult::with_events(all_events))
    }

    async fn list_calendars_impl(&self) -> ProviderResult<Vec<CalendarInfo>> {
        let access_token = self.ensure_access_token().await?;
        let calendars = self
            .api_client
            .list_calendars(&access_token)
            .await
            .map_err(|e| e.with_provider(&self.display_name))?;

        Ok(calendars
            .into_iter()
            .map(|c| {
                let info = CalendarInfo::new(&c.id, &c.summary).with_primary(c.primary);
                match c.time_zone {
                    Some(tz) => info.with_timezone(tz),
                    None => info,
                }
            })
            .collect())
    }
}

impl CalendarProvider for GoogleProvider {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn fetch_events(&self, options: FetchOptions) -> BoxFuture<'_, ProviderResult<FetchResult>> {
        Box::pin(async move { self.fetch_all_calendars(&options).await })
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarInfo>>> {
        Box::pin(async move { self.list_calendars_impl().await })
    }

    fn status(&self) -> BoxFuture<'_, ProviderStatus> {
        Box::pin(async move {
            let mut status = ProviderStatus::new(&self.display_name);
            status.is_authenticated = self.is_authenticated();
            status.last_sync = *self.last_sync.read().unwrap();

            match self.token_storage.get() {
                Some(tokens) if tokens.is_expired() && tokens.refresh_token.is_none() => {
                    status.error = Some("tokens expired and no refresh token".to_string());
                }
                Some(_) => {}
                None => status.error = Some("not authenticated".to_string()),
            }
            status
        })
    }

    fn refresh_auth(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            let _guard = self.refresh_lock.lock().await;
            let tokens = self.stored_tokens()?;
            self.refresh(tokens).await.map(|_| ())
        })
    }

    fn is_authenticated(&self) -> bool {
        self.token_storage
            .get()
            .is_some_and(|t| !t.is_expired() || t.refresh_token.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::config::OAuthCredentials;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dir: &TempDir, server: &MockServer) -> GoogleConfig {
        let credentials =
            OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret");
        GoogleConfig::new(credentials)
            .with_token_path(dir.path().join("tokens.json"))
            .with_token_url(format!("{}/token", server.uri()))
            .with_api_base_url(server.uri())
    }

    fn seed_tokens(config: &GoogleConfig, tokens: TokenInfo) {
        TokenStorage::new(&config.token_path).set(tokens).unwrap();
    }

    fn scopes() -> Vec<String> {
        vec![GoogleConfig::DEFAULT_SCOPE.to_string()]
    }

    #[tokio::test]
    async fn name_and_initial_state() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = test_config(&dir, &server).with_account_name("work");
        let provider = GoogleProvider::new(config).unwrap();

        assert_eq!(provider.name(), "google:work");
        assert!(!provider.is_authenticated());
        assert!(provider.needs_reauth());

        let status = provider.status().await;
        assert_eq!(status.error.as_deref(), Some("not authenticated"));
    }

    #[tokio::test]
    async fn fetch_without_tokens_asks_for_sign_in() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let provider = GoogleProvider::new(test_config(&dir, &server)).unwrap();

        let err = provider.fetch_events(FetchOptions::new()).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert!(err.message().contains("daybook auth google"));
    }

    #[tokio::test]
    async fn fetch_with_valid_token() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = test_config(&dir, &server);
        seed_tokens(&config, TokenInfo::new("ya29.valid", None, Some(3600), scopes()));

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer ya29.valid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "e1",
                    "summary": "Standup",
                    "start": {"dateTime": "2024-01-01T09:00:00Z"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GoogleProvider::new(config).unwrap();
        assert!(!provider.needs_reauth());
        let result = provider.fetch_events(FetchOptions::new()).await.unwrap();
        assert_eq!(result.events.len(), 1);
        assert!(provider.status().await.last_sync.is_some());
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = test_config(&dir, &server);
        let mut expired =
            TokenInfo::new("ya29.old", Some("1//refresh".to_string()), None, scopes());
        expired.expires_at = Some(Utc::now() - chrono::Duration::minutes(5));
        seed_tokens(&config, expired);

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.fresh",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("authorization", "Bearer ya29.fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GoogleProvider::new(config.clone()).unwrap();
        assert!(provider.is_authenticated());
        provider.fetch_events(FetchOptions::new()).await.unwrap();

        let on_disk = TokenStorage::<TokenInfo>::new(&config.token_path);
        on_disk.load().unwrap();
        let stored = on_disk.get().unwrap();
        assert_eq!(stored.access_token, "ya29.fresh");
        assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[tokio::test]
    async fn expired_without_refresh_token() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = test_config(&dir, &server);
        let mut expired = TokenInfo::new("ya29.old", None, None, scopes());
        expired.expires_at = Some(Utc::now() - chrono::Duration::minutes(5));
        seed_tokens(&config, expired);

        let provider = GoogleProvider::new(config).unwrap();
        assert!(!provider.is_authenticated());
        let status = provider.status().await;
        assert_eq!(status.error.as_deref(), Some("tokens expired and no refresh token"));

        let err = provider.fetch_events(FetchOptions::new()).await.unwrap_err();
        assert!(err.needs_reauth());
    }

    #[tokio::test]
    async fn max_results_spans_calendars() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = test_config(&dir, &server)
            .with_calendar_ids(vec!["primary".to_string(), "team".to_string()]);
        seed_tokens(&config, TokenInfo::new("t", None, Some(3600), scopes()));

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "a", "start": {"dateTime": "2024-01-01T09:00:00Z"}},
                    {"id": "b", "start": {"dateTime": "2024-01-01T10:00:00Z"}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/team/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "c", "start": {"dateTime": "2024-01-01T11:00:00Z"}}]
            })))
            .expect(0)
            .mount(&server)
            .await;

        let provider = GoogleProvider::new(config).unwrap();
        let result = provider
            .fetch_events(FetchOptions::new().with_max_results(2))
            .await
            .unwrap();
        assert_eq!(result.events.len(), 2);
    }

    #[tokio::test]
    async fn api_errors_carry_provider_name() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = test_config(&dir, &server);
        seed_tokens(&config, TokenInfo::new("t", None, Some(3600), scopes()));

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = GoogleProvider::new(config).unwrap();
        let err = provider.list_calendars().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ServerError);
        assert_eq!(err.provider(), Some("google:default"));
    }

    #[tokio::test]
    async fn sign_out_clears_tokens() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = test_config(&dir, &server);
        seed_tokens(&config, TokenInfo::new("t", None, Some(3600), scopes()));

        let provider = GoogleProvider::new(config.clone()).unwrap();
        assert!(provider.is_authenticated());
        provider.sign_out().unwrap();
        assert!(!provider.is_authenticated());
        assert!(!config.token_path.exists());
    }
}
