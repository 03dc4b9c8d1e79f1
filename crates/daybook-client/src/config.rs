//! Client configuration.
//!
//! Everything lives in one `config.toml`, by default at
//! `~/.config/daybook/config.toml`:
//!
//! ```toml
//! [supabase]
//! url = "https://abcd.supabase.co"
//! anon_key = "env::SUPABASE_ANON_KEY"
//!
//! [google]
//! client_id = "pass::google/daybook-id"
//! client_secret = "pass::google/daybook-secret"
//!
//! [display]
//! theme = "dark"
//! ```
//!
//! Credential values accept the secret references described in
//! [`crate::secret`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ClientError, ClientResult};
use crate::output::Theme;
use crate::secret;

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google Calendar settings.
    #[cfg(feature = "google")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleSettings>,

    /// Supabase project settings.
    #[cfg(feature = "supabase")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase: Option<SupabaseSettings>,

    /// Same as passing `--debug` on every run.
    pub debug: bool,

    pub display: DisplaySettings,

    pub offline: OfflineSettings,
}

/// `[display]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub theme: Theme,

    /// Maximum title length (truncated with an ellipsis).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_title_length: Option<usize>,

    /// Text shown by `daybook meetings` on an empty day.
    pub no_meeting_text: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            theme: Theme::Plain,
            max_title_length: None,
            no_meeting_text: "No meetings today".to_string(),
        }
    }
}

/// `[offline]`: local records instead of Supabase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineSettings {
    /// Always run as if `--offline` was given.
    pub enabled: bool,

    /// Where offline records are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
}

impl OfflineSettings {
    pub fn data_path(&self) -> PathBuf {
        self.data_path
            .clone()
            .unwrap_or_else(|| ClientConfig::default_data_dir().join("offline.json"))
    }
}

impl ClientConfig {
    /// Loads the default file, or defaults when it does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| ClientError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `~/.config/daybook/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daybook")
            .join("config.toml")
    }

    /// `~/.local/share/daybook`
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daybook")
    }
}

// ---------------------------------------------------------------------------
// [google]
// ---------------------------------------------------------------------------

/// Google Calendar settings.
#[cfg(feature = "google")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::`).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::`).
    pub client_secret: Option<String>,

    /// Calendars read by `daybook meetings`.
    #[serde(default = "default_calendar_ids")]
    pub calendar_ids: Vec<String>,

    /// Token file; defaults to the data directory.
    pub token_path: Option<PathBuf>,
}

#[cfg(feature = "google")]
impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            calendar_ids: default_calendar_ids(),
            token_path: None,
        }
    }
}

#[cfg(feature = "google")]
fn default_calendar_ids() -> Vec<String> {
    vec!["primary".to_string()]
}

#[cfg(feature = "google")]
impl GoogleSettings {
    /// Resolves credentials and builds the provider configuration.
    pub fn to_provider_config(&self) -> Result<daybook_providers::google::GoogleConfig, String> {
        use daybook_providers::google::GoogleConfig;

        let credentials = self.resolve_credentials()?;
        credentials.validate().map_err(str::to_string)?;

        let mut config = GoogleConfig::new(credentials);
        if !self.calendar_ids.is_empty() {
            config = config.with_calendar_ids(self.calendar_ids.clone());
        }
        if let Some(ref path) = self.token_path {
            config = config.with_token_path(path);
        }
        Ok(config)
    }

    pub(crate) fn resolve_credentials(
        &self,
    ) -> Result<daybook_providers::google::OAuthCredentials, String> {
        use daybook_providers::google::OAuthCredentials;

        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            format!(
                "Google credentials not found. Add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"\n\n  \
                 Or run: daybook auth google --credentials-file <path>",
                ClientConfig::default_path().display()
            )
        })?;
        let raw_secret = self
            .client_secret
            .as_deref()
            .ok_or_else(|| "client_secret is missing from the [google] section".to_string())?;

        let client_id =
            secret::resolve(raw_id).map_err(|e| format!("failed to resolve client_id: {}", e))?;
        let client_secret = secret::resolve(raw_secret)
            .map_err(|e| format!("failed to resolve client_secret: {}", e))?;
        Ok(OAuthCredentials::new(client_id, client_secret))
    }
}

// ---------------------------------------------------------------------------
// [supabase]
// ---------------------------------------------------------------------------

/// Supabase project settings.
#[cfg(feature = "supabase")]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupabaseSettings {
    /// Project URL (supports `pass::` and `env::`).
    pub url: Option<String>,

    /// Public anon key (supports `pass::` and `env::`).
    pub anon_key: Option<String>,

    /// Session file; defaults to the data directory.
    pub session_path: Option<PathBuf>,
}

#[cfg(feature = "supabase")]
impl SupabaseSettings {
    /// Lets `--supabase-url` / `--supabase-anon-key` (or their env vars)
    /// replace the file values.
    pub fn with_overrides(mut self, url: Option<String>, anon_key: Option<String>) -> Self {
        if url.is_some() {
            self.url = url;
        }
        if anon_key.is_some() {
            self.anon_key = anon_key;
        }
        self
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.anon_key.is_some()
    }

    pub fn to_provider_config(
        &self,
    ) -> Result<daybook_providers::supabase::SupabaseConfig, String> {
        use daybook_providers::supabase::SupabaseConfig;

        let raw_url = self.url.as_deref().ok_or_else(|| {
            format!(
                "Supabase project not configured. Add to {}:\n  \
                 [supabase]\n  \
                 url = \"https://YOUR_PROJECT.supabase.co\"\n  \
                 anon_key = \"YOUR_ANON_KEY\"\n\n  \
                 Or set SUPABASE_URL and SUPABASE_ANON_KEY, or run with --offline",
                ClientConfig::default_path().display()
            )
        })?;
        let raw_key = self
            .anon_key
            .as_deref()
            .ok_or_else(|| "anon_key is missing from the [supabase] section".to_string())?;

        let url = secret::resolve(raw_url).map_err(|e| format!("failed to resolve url: {}", e))?;
        let anon_key =
            secret::resolve(raw_key).map_err(|e| format!("failed to resolve anon_key: {}", e))?;

        let mut config = SupabaseConfig::new(url, anon_key);
        if let Some(ref path) = self.session_path {
            config = config.with_session_path(path);
        }
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Sets `[section] key = value` pairs in the file at `path`, keeping the
/// rest of the document (comments and ordering included) as it was.
///
/// Keys in `defaults` are only written when missing.
pub fn update_section(
    path: &Path,
    section: &str,
    values: &[(&str, &str)],
    defaults: &[(&str, toml_edit::Item)],
) -> ClientResult<()> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| ClientError::Config(format!("could not parse {}: {}", path.display(), e)))?;

    if !doc.contains_table(section) {
        doc[section] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let table = doc[section].as_table_mut().ok_or_else(|| {
        ClientError::Config(format!("[{}] in {} is not a table", section, path.display()))
    })?;

    for (key, value) in values {
        table[*key] = toml_edit::value(*value);
    }
    for (key, item) in defaults {
        if !table.contains_key(key) {
            table[*key] = item.clone();
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, doc.to_string())?;
    info!(path = %path.display(), section, "updated config file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    mod file {
        use super::*;

        #[test]
        fn empty_file_gives_defaults() {
            let config = ClientConfig::parse("").unwrap();
            assert_eq!(config.display.theme, Theme::Plain);
            assert_eq!(config.display.no_meeting_text, "No meetings today");
            assert!(!config.offline.enabled);
        }

        #[test]
        fn display_and_offline_sections() {
            let config = ClientConfig::parse(
                r#"
debug = true

[display]
theme = "light"
max_title_length = 30

[offline]
enabled = true
data_path = "/tmp/daybook.json"
"#,
            )
            .unwrap();
            assert!(config.debug);
            assert_eq!(config.display.theme, Theme::Light);
            assert_eq!(config.display.max_title_length, Some(30));
            assert_eq!(config.offline.data_path(), PathBuf::from("/tmp/daybook.json"));
        }

        #[test]
        fn unknown_theme_is_an_error() {
            assert!(ClientConfig::parse("[display]\ntheme = \"neon\"\n").is_err());
        }

        #[test]
        fn load_from_reports_path() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.toml");
            std::fs::write(&path, "[display\n").unwrap();

            let err = ClientConfig::load_from(&path).unwrap_err();
            assert!(matches!(err, ClientError::Config(_)));
            assert!(err.to_string().contains("config.toml"));
        }

        #[test]
        fn default_paths() {
            assert!(ClientConfig::default_path().ends_with("daybook/config.toml"));
            assert!(OfflineSettings::default().data_path().ends_with("daybook/offline.json"));
        }
    }

    mod writing {
        use super::*;

        #[test]
        fn keeps_existing_content() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.toml");
            std::fs::write(&path, "# my settings\n[display]\ntheme = \"dark\"\n").unwrap();

            update_section(&path, "supabase", &[("url", "https://abcd.supabase.co")], &[]).unwrap();

            let content = std::fs::read_to_string(&path).unwrap();
            assert!(content.starts_with("# my settings"));
            let config = ClientConfig::parse(&content).unwrap();
            assert_eq!(config.display.theme, Theme::Dark);
        }

        #[test]
        fn defaults_do_not_overwrite() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("config.toml");

            let mut primary = toml_edit::Array::new();
            primary.push("primary");
            let defaults = [("calendar_ids", toml_edit::value(primary))];

            update_section(&path, "google", &[("client_id", "a")], &defaults).unwrap();
            std::fs::write(
                &path,
                std::fs::read_to_string(&path)
                    .unwrap()
                    .replace("\"primary\"", "\"work\""),
            )
            .unwrap();
            update_section(&path, "google", &[("client_id", "b")], &defaults).unwrap();

            let doc: toml_edit::DocumentMut =
                std::fs::read_to_string(&path).unwrap().parse().unwrap();
            assert_eq!(doc["google"]["client_id"].as_str(), Some("b"));
            assert_eq!(doc["google"]["calendar_ids"][0].as_str(), Some("work"));
        }
    }

    #[cfg(feature = "google")]
    mod google {
        use super::*;

        #[test]
        fn plain_credentials() {
            let settings = GoogleSettings {
                client_id: Some("id.apps.googleusercontent.com".to_string()),
                client_secret: Some("shh".to_string()),
                ..Default::default()
            };
            let config = settings.to_provider_config().unwrap();
            assert_eq!(config.credentials.client_secret, "shh");
            assert_eq!(config.calendar_ids, vec!["primary".to_string()]);
        }

        #[test]
        fn env_references() {
            unsafe {
                std::env::set_var("_DAYBOOK_GOOGLE_ID", "env-id.apps.googleusercontent.com");
                std::env::set_var("_DAYBOOK_GOOGLE_SECRET", "env-secret");
            }
            let config = ClientConfig::parse(
                r#"
[google]
client_id = "env::_DAYBOOK_GOOGLE_ID"
client_secret = "env::_DAYBOOK_GOOGLE_SECRET"
calendar_ids = ["primary", "team@example.com"]
"#,
            )
            .unwrap();
            let google = config.google.unwrap();
            let creds = google.resolve_credentials().unwrap();
            assert_eq!(creds.client_id, "env-id.apps.googleusercontent.com");
            assert_eq!(google.calendar_ids.len(), 2);
            unsafe {
                std::env::remove_var("_DAYBOOK_GOOGLE_ID");
                std::env::remove_var("_DAYBOOK_GOOGLE_SECRET");
            }
        }

        #[test]
        fn missing_parts() {
            let err = GoogleSettings::default().resolve_credentials().unwrap_err();
            assert!(err.contains("credentials not found"));

            let only_id = GoogleSettings {
                client_id: Some("id".to_string()),
                ..Default::default()
            };
            assert!(only_id.resolve_credentials().unwrap_err().contains("client_secret"));
        }

        #[test]
        fn bare_section_uses_primary_calendar() {
            let config = ClientConfig::parse("[google]\n").unwrap();
            assert_eq!(config.google.unwrap().calendar_ids, vec!["primary".to_string()]);
        }
    }

    #[cfg(feature = "supabase")]
    mod supabase {
        use super::*;

        #[test]
        fn builds_provider_config() {
            let settings = SupabaseSettings {
                url: Some("https://abcd.supabase.co/".to_string()),
                anon_key: Some("anon".to_string()),
                session_path: Some(PathBuf::from("/tmp/session.json")),
            };
            let config = settings.to_provider_config().unwrap();
            assert_eq!(config.url, "https://abcd.supabase.co");
            assert_eq!(config.session_path, PathBuf::from("/tmp/session.json"));
        }

        #[test]
        fn overrides_win() {
            let settings = SupabaseSettings {
                url: Some("https://file.supabase.co".to_string()),
                anon_key: Some("file-key".to_string()),
                session_path: None,
            }
            .with_overrides(Some("https://flag.supabase.co".to_string()), None);
            assert_eq!(settings.url.as_deref(), Some("https://flag.supabase.co"));
            assert_eq!(settings.anon_key.as_deref(), Some("file-key"));
        }

        #[test]
        fn missing_url_explains_offline() {
            let err = SupabaseSettings::default().to_provider_config().unwrap_err();
            assert!(err.contains("--offline"));
            assert!(!SupabaseSettings::default().is_configured());
        }
    }
}
