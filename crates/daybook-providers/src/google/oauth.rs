//! Google token endpoint client: consent, code exchange and refresh.

use serde::Deserialize;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, transport_error, user_agent};
use crate::oauth::{CALLBACK_TIMEOUT, LoopbackServer, PkceFlow, open_browser};
use crate::tokens::TokenInfo;

use super::config::GoogleConfig;

/// OAuth client for Google APIs.
#[derive(Debug)]
pub struct OAuthClient {
    config: GoogleConfig,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let http_client = build_client(config.timeout, &user_agent())?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Runs the browser consent flow and returns fresh tokens.
    ///
    /// # Errors
    ///
    /// Fails if no loopback port is free, the user denies consent, the
    /// callback times out, or the code exchange is rejected.
    pub async fn authorize(&self) -> ProviderResult<TokenInfo> {
        let pkce = PkceFlow::new();
        let server = LoopbackServer::bind(self.config.loopback_port_range)?;
        let redirect_uri = server.redirect_uri();

        open_browser(&self.build_auth_url(&pkce, &redirect_uri));

        let callback = server.wait(CALLBACK_TIMEOUT).await?;
        callback.verify_state(&pkce.state)?;

        info!("received authorization code, exchanging for tokens");
        self.exchange_code(&callback.code, &pkce.verifier, &redirect_uri)
            .await
    }

    /// Builds the consent URL, requesting offline access so a refresh token is issued.
    pub fn build_auth_url(&self, pkce: &PkceFlow, redirect_uri: &str) -> String {
        let scope = self.config.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            self.config.auth_url,
            urlencoding::encode(&self.config.credentials.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&pkce.challenge),
            urlencoding::encode(&pkce.state),
        )
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<TokenInfo> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        let response = self.post_token(&params, "token exchange").await?;

        info!("obtained Google tokens");
        Ok(TokenInfo::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            self.granted_scopes(response.scope.as_deref()),
        ))
    }

    /// Refreshes an access token. The returned tuple is
    /// `(access_token, rotated_refresh_token, expires_in)`.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> ProviderResult<(String, Option<String>, Option<i64>)> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.post_token(&params, "token refresh").await?;

        info!("refreshed Google access token");
        Ok((
            response.access_token,
            response.refresh_token,
            response.expires_in,
        ))
    }

    async fn post_token(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or(body);
            let message = format!("{} failed ({}): {}", what, status, reason);
            return Err(if status.is_server_error() {
                ProviderError::server(message)
            } else {
                ProviderError::authentication(message)
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("invalid token response: {}", e)))
    }

    /// Scopes from the response, or the requested ones when Google omits them.
    fn granted_scopes(&self, scope: Option<&str>) -> Vec<String> {
        match scope {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(String::from).collect()
            }
            _ => self.config.scopes.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::config::OAuthCredentials;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> GoogleConfig {
        GoogleConfig::new(OAuthCredentials::new(
            "test-client.apps.googleusercontent.com",
            "test-secret",
        ))
        .with_token_url(format!("{}/token", server.uri()))
    }

    #[tokio::test]
    async fn auth_url_contains_pkce_parameters() {
        let server = MockServer::start().await;
        let client = OAuthClient::new(config(&server)).unwrap();
        let pkce = PkceFlow::new();
        let url = client.build_auth_url(&pkce, "http://127.0.0.1:8080/callback");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"));
        assert!(url.contains(&format!("code_challenge={}", pkce.challenge)));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
    }

    #[tokio::test]
    async fn exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.access",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/calendar.readonly",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OAuthClient::new(config(&server)).unwrap();
        let tokens = client
            .exchange_code("code", "verifier", "http://127.0.0.1:8080/callback")
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "ya29.access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert!(tokens.has_scopes(&[GoogleConfig::DEFAULT_SCOPE.to_string()]));
    }

    #[tokio::test]
    async fn refresh_rejected_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(config(&server)).unwrap();
        let err = client.refresh_token("stale").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert!(err.message().contains("expired or revoked"));
    }

    #[tokio::test]
    async fn refresh_returns_new_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(config(&server)).unwrap();
        let (access, rotated, expires_in) = client.refresh_token("1//refresh").await.unwrap();
        assert_eq!(access, "ya29.new");
        assert!(rotated.is_none());
        assert_eq!(expires_in, Some(3599));
    }
}
