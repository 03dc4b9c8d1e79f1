//! Google Calendar provider configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::oauth::DEFAULT_PORT_RANGE;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// OAuth 2.0 client credentials.
///
/// Google requires every desktop app to bring its own registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google's credentials JSON, in either the console layout (`installed` or
/// `web` section) or the flat layout written by gcloud.
#[derive(Debug, Deserialize)]
struct GoogleCredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from the JSON downloaded from the Cloud Console.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read credentials file: {}", e))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: GoogleCredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {}", e))?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(concat!(
            "credentials file must contain an 'installed'/'web' section ",
            "or 'client_id'/'client_secret' at root level"
        )
        .to_string())
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration for the Google Calendar provider.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Distinguishes token files when several Google accounts are used.
    pub account_name: String,
    pub credentials: OAuthCredentials,
    pub token_path: PathBuf,
    /// Calendars to read; `primary` by default.
    pub calendar_ids: Vec<String>,
    pub timeout: Duration,
    /// Inclusive port range tried for the OAuth loopback listener.
    pub loopback_port_range: (u16, u16),
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub api_base_url: String,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Read-only calendar access.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar.readonly";

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            account_name: "default".to_string(),
            credentials,
            token_path: Self::default_token_path("default"),
            calendar_ids: vec!["primary".to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            loopback_port_range: DEFAULT_PORT_RANGE,
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base_url: CALENDAR_API_BASE.to_string(),
        }
    }

    /// `~/.local/share/daybook/google-tokens-{account}.json`
    pub fn default_token_path(account_name: &str) -> PathBuf {
        crate::data_dir().join(format!("google-tokens-{}.json", account_name))
    }

    /// Sets the account name, moving the token path along if it was the default.
    pub fn with_account_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.token_path == Self::default_token_path(&self.account_name) {
            self.token_path = Self::default_token_path(&name);
        }
        self.account_name = name;
        self
    }

    /// e.g. `"google:work"`
    pub fn provider_name(&self) -> String {
        format!("google:{}", self.account_name)
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_calendar_ids(mut self, ids: Vec<String>) -> Self {
        self.calendar_ids = ids;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Points the token endpoint somewhere else (tests, proxies).
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Points the Calendar API somewhere else (tests, proxies).
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {}", e))?;

        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }

        if self.calendar_ids.is_empty() {
            return Err("at least one calendar id is required".to_string());
        }

        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err("invalid loopback port range".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    #[test]
    fn credentials_validation() {
        assert!(test_credentials().validate().is_ok());
        assert!(OAuthCredentials::new("", "secret").validate().is_err());
        assert!(OAuthCredentials::new("bad-id", "secret").validate().is_err());
        assert!(
            OAuthCredentials::new("test.apps.googleusercontent.com", "")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn config_defaults() {
        let config = GoogleConfig::new(test_credentials());
        assert_eq!(config.calendar_ids, vec!["primary".to_string()]);
        assert_eq!(config.loopback_port_range, (8080, 8090));
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
        assert!(
            config
                .token_path
                .ends_with("daybook/google-tokens-default.json")
        );
    }

    #[test]
    fn account_name_moves_default_token_path() {
        let config = GoogleConfig::new(test_credentials()).with_account_name("work");
        assert_eq!(config.provider_name(), "google:work");
        assert!(config.token_path.ends_with("google-tokens-work.json"));

        let custom = GoogleConfig::new(test_credentials())
            .with_token_path("/tmp/custom.json")
            .with_account_name("work");
        assert_eq!(custom.token_path, PathBuf::from("/tmp/custom.json"));
    }

    #[test]
    fn api_base_url_trims_slash() {
        let config = GoogleConfig::new(test_credentials()).with_api_base_url("http://127.0.0.1:9/");
        assert_eq!(config.api_base_url, "http://127.0.0.1:9");
    }

    #[test]
    fn config_validation() {
        assert!(GoogleConfig::new(test_credentials()).validate().is_ok());
        assert!(
            GoogleConfig::new(test_credentials())
                .with_scopes(vec![])
                .validate()
                .is_err()
        );
        assert!(
            GoogleConfig::new(test_credentials())
                .with_loopback_port_range(9010, 9000)
                .validate()
                .is_err()
        );
    }

    mod credentials_json {
        use super::*;

        #[test]
        fn installed() {
            let json = r#"{
                "installed": {
                    "client_id": "test-id.apps.googleusercontent.com",
                    "client_secret": "test-secret",
                    "project_id": "my-project"
                }
            }"#;
            let creds = OAuthCredentials::from_json(json).unwrap();
            assert_eq!(creds.client_id, "test-id.apps.googleusercontent.com");
            assert_eq!(creds.client_secret, "test-secret");
        }

        #[test]
        fn web() {
            let json = r#"{"web": {
                "client_id": "web-id.apps.googleusercontent.com",
                "client_secret": "web-secret"
            }}"#;
            let creds = OAuthCredentials::from_json(json).unwrap();
            assert_eq!(creds.client_secret, "web-secret");
        }

        #[test]
        fn flat() {
            let json = r#"{
                "client_id": "flat-id.apps.googleusercontent.com",
                "client_secret": "flat-secret",
                "refresh_token": "ignored"
            }"#;
            let creds = OAuthCredentials::from_json(json).unwrap();
            assert_eq!(creds.client_id, "flat-id.apps.googleusercontent.com");
        }

        #[test]
        fn missing_fields() {
            let err = OAuthCredentials::from_json(r#"{ "other": {} }"#).unwrap_err();
            assert!(err.contains("client_id"));
        }

        #[test]
        fn malformed() {
            let err = OAuthCredentials::from_json("not json").unwrap_err();
            assert!(err.contains("parse"));
        }
    }
}
