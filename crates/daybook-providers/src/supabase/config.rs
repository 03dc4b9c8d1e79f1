//! Supabase project configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::oauth::DEFAULT_PORT_RANGE;

/// Heartbeat interval expected by the Realtime server.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`.
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
    pub session_path: PathBuf,
    pub timeout: Duration,
    pub loopback_port_range: (u16, u16),
    pub heartbeat_interval: Duration,
}

impl SupabaseConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            session_path: Self::default_session_path(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            loopback_port_range: DEFAULT_PORT_RANGE,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    /// `~/.local/share/daybook/supabase-session.json`
    pub fn default_session_path() -> PathBuf {
        crate::data_dir().join("supabase-session.json")
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
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

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path)
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }

    /// Realtime websocket endpoint, with the scheme switched to ws/wss.
    pub fn realtime_url(&self) -> Result<String, String> {
        let mut url = Url::parse(&self.url).map_err(|e| format!("invalid Supabase URL: {}", e))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(format!("unsupported URL scheme: {}", other)),
        };
        url.set_scheme(scheme)
            .map_err(|_| "failed to set websocket scheme".to_string())?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = Url::parse(&self.url).map_err(|e| format!("invalid Supabase URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err("Supabase URL must use http or https".to_string());
        }
        if self.anon_key.trim().is_empty() {
            return Err("Supabase anon key is required".to_string());
        }
        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err("invalid loopback port range".to_string());
        }
        Ok(())
    }
}
