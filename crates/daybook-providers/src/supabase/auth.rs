//! GoTrue identity provider.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use daybook_core::validation;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, transport_error, user_agent};
use crate::identity::{IdentityProvider, Profile, Session, SignUpOutcome, User, check_sign_in};
use crate::oauth::{CALLBACK_TIMEOUT, LoopbackServer, PkceFlow, open_browser};
use crate::provider::BoxFuture;
use crate::tokens::{StoredCredential, TokenStorage, expiry_from_lifetime};

use super::config::SupabaseConfig;
use super::map_status;

/// Supabase Auth (GoTrue) client.
///
/// The session is kept in a JSON file and refreshed on demand by
/// [`IdentityProvider::current_session`].
pub struct SupabaseAuth {
    config: SupabaseConfig,
    http_client: reqwest::Client,
    storage: TokenStorage<Session>,
    refresh_lock: Mutex<()>,
}

impl SupabaseAuth {
    pub fn new(config: SupabaseConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;
        let http_client = build_client(config.timeout, &user_agent())?;
        let storage = TokenStorage::new(&config.session_path);
        storage.load()?;
        Ok(Self {
            config,
            http_client,
            storage,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Sends a GoTrue request and returns the raw response body.
    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> ProviderResult<String> {
        let url = self.config.auth_url(path);
        debug!(%method, %url, "auth request");

        let mut request = self
            .http_client
            .request(method, &url)
            .header("apikey", &self.config.anon_key);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(map_status(status, &text));
        }
        Ok(text)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> ProviderResult<T> {
        let text = self.send(method, path, bearer, body).await?;
        serde_json::from_str(&text).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse auth response: {}", e))
        })
    }

    /// Runs a token grant and stores the resulting session.
    async fn grant(&self, grant_type: &str, body: Value) -> ProviderResult<Session> {
        let path = format!("token?grant_type={}", grant_type);
        let response: SessionResponse = self
            .send_json(reqwest::Method::POST, &path, None, Some(body))
            .await?;
        let session = response.into_session();
        self.storage.set(session.clone())?;
        Ok(session)
    }

    async fn refresh(&self, refresh_token: &str) -> ProviderResult<Session> {
        debug!("refreshing expired session");
        let session = self
            .grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        info!(user = %session.user.id, "session refreshed");
        Ok(session)
    }

    /// Authorize URL for a third-party provider with a PKCE challenge.
    pub fn build_oauth_url(&self, provider: &str, pkce: &PkceFlow, redirect_uri: &str) -> String {
        format!(
            "{}?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=s256",
            self.config.auth_url("authorize"),
            urlencoding::encode(provider),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&pkce.challenge),
        )
    }

    /// Exchanges the code from an OAuth redirect for a session.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> ProviderResult<Session> {
        self.grant("pkce", json!({ "auth_code": code, "code_verifier": verifier }))
            .await
    }

    async fn sign_up_impl(
        &self,
        email: &str,
        password: &str,
        profile: Profile,
    ) -> ProviderResult<SignUpOutcome> {
        check_sign_in(email, password)?;

        let mut body = json!({ "email": email.trim(), "password": password });
        if !profile.is_empty() {
            body["data"] = serde_json::to_value(&profile)
                .map_err(|e| ProviderError::internal(format!("failed to encode profile: {}", e)))?;
        }

        // With auto-confirm on, GoTrue answers with a session; otherwise with
        // the pending user alone.
        let response: Value = self
            .send_json(reqwest::Method::POST, "signup", None, Some(body))
            .await?;

        if response.get("access_token").is_some() {
            let session = parse::<SessionResponse>(response)?.into_session();
            self.storage.set(session.clone())?;
            info!(user = %session.user.id, "signed up");
            return Ok(SignUpOutcome::Active(session));
        }

        let user = parse::<ApiUser>(response)?.into_user();
        info!(user = %user.id, "sign-up pending email confirmation");
        Ok(SignUpOutcome::PendingConfirmation(user))
    }

    async fn sign_in_impl(&self, email: &str, password: &str) -> ProviderResult<Session> {
        check_sign_in(email, password)?;
        let session = self
            .grant("password", json!({ "email": email.trim(), "password": password }))
            .await?;
        info!(user = %session.user.id, "signed in");
        Ok(session)
    }

    async fn sign_in_with_oauth_impl(&self, provider: &str) -> ProviderResult<Session> {
        validation::require_text("provider", provider)?;

        let pkce = PkceFlow::new();
        let server = LoopbackServer::bind(self.config.loopback_port_range)?;
        let redirect_uri = server.redirect_uri();
        open_browser(&self.build_oauth_url(provider, &pkce, &redirect_uri));

        // GoTrue keeps its own state parameter, so none comes back to us.
        let callback = server.wait(CALLBACK_TIMEOUT).await?;
        let session = self.exchange_code(&callback.code, &pkce.verifier).await?;
        info!(user = %session.user.id, provider, "signed in with OAuth");
        Ok(session)
    }

    async fn sign_out_impl(&self) -> ProviderResult<()> {
        if let Some(session) = self.storage.get()
            && let Err(e) = self
                .send(reqwest::Method::POST, "logout", Some(&session.access_token), None)
                .await
        {
            warn!("server sign-out failed, clearing local session anyway: {}", e);
        }
        self.storage.clear()?;
        info!("signed out");
        Ok(())
    }

    async fn current_session_impl(&self) -> ProviderResult<Option<Session>> {
        let Some(session) = self.storage.get() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        let _guard = self.refresh_lock.lock().await;
        let Some(session) = self.storage.get() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }
        match session.refresh_token.as_deref() {
            Some(refresh_token) => self.refresh(refresh_token).await.map(Some),
            None => {
                info!("session expired without a refresh token");
                self.storage.clear()?;
                Ok(None)
            }
        }
    }

    async fn request_password_reset_impl(&self, email: &str) -> ProviderResult<()> {
        validation::check_email(email)?;
        self.send(
            reqwest::Method::POST,
            "recover",
            None,
            Some(json!({ "email": email.trim() })),
        )
        .await?;
        info!("password reset email requested");
        Ok(())
    }

    async fn update_password_impl(&self, new_password: &str) -> ProviderResult<()> {
        validation::check_password(new_password)?;
        let session = self.current_session_impl().await?.ok_or_else(|| {
            ProviderError::authentication("not signed in, run 'daybook account signin'")
        })?;
        self.send(
            reqwest::Method::PUT,
            "user",
            Some(&session.access_token),
            Some(json!({ "password": new_password })),
        )
        .await?;
        info!(user = %session.user.id, "password updated");
        Ok(())
    }
}

impl IdentityProvider for SupabaseAuth {
    fn name(&self) -> &str {
        "supabase"
    }

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        profile: Profile,
    ) -> BoxFuture<'a, ProviderResult<SignUpOutcome>> {
        Box::pin(self.sign_up_impl(email, password, profile))
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Session>> {
        Box::pin(self.sign_in_impl(email, password))
    }

    fn sign_in_with_oauth<'a>(
        &'a self,
        provider: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Session>> {
        Box::pin(self.sign_in_with_oauth_impl(provider))
    }

    fn sign_out(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(self.sign_out_impl())
    }

    fn current_session(&self) -> BoxFuture<'_, ProviderResult<Option<Session>>> {
        Box::pin(self.current_session_impl())
    }

    fn request_password_reset<'a>(&'a self, email: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.request_password_reset_impl(email))
    }

    fn update_password<'a>(&'a self, new_password: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.update_password_impl(new_password))
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> ProviderResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::invalid_response(format!("unexpected auth response: {}", e)))
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: ApiUser,
}

impl SessionResponse {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: expiry_from_lifetime(self.expires_in),
            user: self.user.into_user(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    email: Option<String>,
    email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    display_name: Option<String>,
    full_name: Option<String>,
}

impl ApiUser {
    fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            display_name: self
                .user_metadata
                .display_name
                .or(self.user_metadata.full_name)
                .filter(|n| !n.trim().is_empty()),
            email_confirmed: self.email_confirmed_at.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth(dir: &TempDir, server: &MockServer) -> SupabaseAuth {
        let config = SupabaseConfig::new(server.uri(), "anon-key")
            .with_session_path(dir.path().join("session.json"));
        SupabaseAuth::new(config).unwrap()
    }

    fn session_json(access_token: &str) -> Value {
        json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-1",
            "user": {
                "id": "user-1",
                "email": "ada@example.com",
                "email_confirmed_at": "2024-01-01T00:00:00Z",
                "user_metadata": {"display_name": "Ada"}
            }
        })
    }

    fn stored(dir: &TempDir) -> Option<Session> {
        let storage = TokenStorage::<Session>::new(dir.path().join("session.json"));
        storage.load().unwrap();
        storage.get()
    }

    #[tokio::test]
    async fn sign_in_persists_session() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon-key"))
            .and(body_partial_json(json!({"email": "ada@example.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("jwt-1")))
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth(&dir, &server);
        let session = auth.sign_in(" ada@example.com ", "secret").await.unwrap();
        assert_eq!(session.user.label(), "Ada");
        assert!(session.user.email_confirmed);
        assert_eq!(stored(&dir).unwrap().access_token, "jwt-1");
        assert_eq!(auth.current_session().await.unwrap().unwrap().access_token, "jwt-1");
    }

    #[tokio::test]
    async fn bad_credentials() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&server)
            .await;

        let err = auth(&dir, &server)
            .sign_in("ada@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(err.needs_reauth());
        assert_eq!(err.user_message(), "Invalid login credentials. Please sign in again.");
        assert!(stored(&dir).is_none());
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_server() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let auth = auth(&dir, &server);
        let err = auth.sign_in("ada", "secret").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ValidationFailed);
        let err = auth
            .sign_up("ada@example.com", "123", Profile::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ValidationFailed);
        let err = auth.request_password_reset("nope").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ValidationFailed);
    }

    mod sign_up {
        use super::*;

        #[tokio::test]
        async fn pending_confirmation() {
            let dir = TempDir::new().unwrap();
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/auth/v1/signup"))
                .and(body_partial_json(json!({"data": {"display_name": "Ada"}})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": "user-1",
                    "email": "ada@example.com",
                    "confirmation_sent_at": "2024-01-01T00:00:00Z",
                    "user_metadata": {"display_name": "Ada"}
                })))
                .expect(1)
                .mount(&server)
                .await;

            let outcome = auth(&dir, &server)
                .sign_up("ada@example.com", "secret", Profile::new(Some("Ada")))
                .await
                .unwrap();
            match outcome {
                SignUpOutcome::PendingConfirmation(user) => {
                    assert_eq!(user.id, "user-1");
                    assert!(!user.email_confirmed);
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
            assert!(stored(&dir).is_none());
        }

        #[tokio::test]
        async fn auto_confirmed() {
            let dir = TempDir::new().unwrap();
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/auth/v1/signup"))
                .respond_with(ResponseTemplate::new(200).set_body_json(session_json("jwt-new")))
                .mount(&server)
                .await;

            let outcome = auth(&dir, &server)
                .sign_up("ada@example.com", "secret", Profile::new(Some("  ")))
                .await
                .unwrap();
            assert!(matches!(outcome, SignUpOutcome::Active(ref s) if s.access_token == "jwt-new"));
            assert!(stored(&dir).is_some());
        }

        #[tokio::test]
        async fn already_registered() {
            let dir = TempDir::new().unwrap();
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/auth/v1/signup"))
                .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                    "code": 422,
                    "error_code": "user_already_exists",
                    "msg": "User already registered"
                })))
                .mount(&server)
                .await;

            let err = auth(&dir, &server)
                .sign_up("ada@example.com", "secret", Profile::default())
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::BadRequest);
            assert_eq!(err.message(), "User already registered");
        }
    }

    #[tokio::test]
    async fn expired_session_is_refreshed() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let mut expired: SessionResponse = serde_json::from_value(session_json("jwt-old")).unwrap();
        expired.expires_in = Some(0);
        TokenStorage::new(dir.path().join("session.json"))
            .set(expired.into_session())
            .unwrap();

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(body_partial_json(json!({"refresh_token": "refresh-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("jwt-fresh")))
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth(&dir, &server);
        let session = auth.current_session().await.unwrap().unwrap();
        assert_eq!(session.access_token, "jwt-fresh");
        assert_eq!(stored(&dir).unwrap().access_token, "jwt-fresh");
    }

    #[tokio::test]
    async fn expired_without_refresh_token_signs_out() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let mut expired: SessionResponse = serde_json::from_value(session_json("jwt-old")).unwrap();
        expired.expires_in = Some(0);
        expired.refresh_token = None;
        TokenStorage::new(dir.path().join("session.json"))
            .set(expired.into_session())
            .unwrap();

        let auth = auth(&dir, &server);
        assert!(auth.current_session().await.unwrap().is_none());
        assert!(stored(&dir).is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_even_when_server_fails() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("jwt-1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer jwt-1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth(&dir, &server);
        auth.sign_in("ada@example.com", "secret").await.unwrap();
        auth.sign_out().await.unwrap();
        assert!(auth.current_session().await.unwrap().is_none());
        assert!(stored(&dir).is_none());
    }

    #[tokio::test]
    async fn password_reset_and_update() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/recover"))
            .and(body_partial_json(json!({"email": "ada@example.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("jwt-1")))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer jwt-1"))
            .and(body_partial_json(json!({"password": "brand-new"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth(&dir, &server);
        auth.request_password_reset("ada@example.com").await.unwrap();

        let err = auth.update_password("brand-new").await.unwrap_err();
        assert!(err.needs_reauth());

        auth.sign_in("ada@example.com", "secret").await.unwrap();
        auth.update_password("brand-new").await.unwrap();
    }

    #[tokio::test]
    async fn oauth_url_and_pkce_exchange() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "pkce"))
            .and(body_partial_json(json!({"auth_code": "code-1", "code_verifier": "v"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("jwt-oauth")))
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth(&dir, &server);
        let pkce = PkceFlow::new();
        let url = auth.build_oauth_url("google", &pkce, "http://127.0.0.1:8080/callback");
        assert!(url.starts_with(&format!("{}/auth/v1/authorize?provider=google", server.uri())));
        assert!(url.contains("redirect_to=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"));
        assert!(url.contains("code_challenge_method=s256"));

        let session = auth.exchange_code("code-1", "v").await.unwrap();
        assert_eq!(session.access_token, "jwt-oauth");
    }
}
