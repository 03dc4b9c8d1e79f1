//! File-backed credential storage.
//!
//! Calendar tokens and identity sessions are both kept as a JSON file in the
//! user's data directory with an in-memory copy behind an `RwLock`. Writes go
//! to a temporary file that is renamed into place, and the file is made
//! readable by the owner only.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Seconds subtracted from a reported lifetime so refreshes happen early.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// A stored credential that can expire and be refreshed.
pub trait StoredCredential: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn is_expired(&self) -> bool;

    fn refresh_token(&self) -> Option<&str>;
}

/// Expiry instant for a token issued now with the given lifetime.
pub fn expiry_from_lifetime(expires_in_secs: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in_secs
        .map(|secs| Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_BUFFER_SECS))
}

/// An OAuth token set issued by the calendar provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Already includes the early-refresh buffer.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scopes: Vec<String>,
    pub last_refresh: DateTime<Utc>,
}

impl TokenInfo {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expiry_from_lifetime(expires_in_secs),
            scopes,
            last_refresh: Utc::now(),
        }
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Replaces the access token after a refresh. The refresh token is only
    /// replaced when the server rotated it.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) {
        self.access_token = access_token.into();
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self.expires_at = expiry_from_lifetime(expires_in_secs);
        self.last_refresh = Utc::now();
    }
}

impl StoredCredential for TokenInfo {
    /// Tokens without an expiry never expire.
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }
}

/// Persisted credential storage with a file backend.
#[derive(Debug)]
pub struct TokenStorage<T> {
    path: PathBuf,
    tokens: RwLock<Option<T>>,
}

impl<T: StoredCredential> TokenStorage<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tokens: RwLock::new(None),
        }
    }

    /// Loads the file into memory.
    ///
    /// Returns Ok(true) if a credential was loaded, Ok(false) if no file exists.
    pub fn load(&self) -> ProviderResult<bool> {
        if !self.path.exists() {
            debug!("no credential file at {:?}", self.path);
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        let tokens: T = serde_json::from_str(&content).map_err(|e| {
            ProviderError::configuration(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        debug!("loaded credentials from {:?}", self.path);
        *self.tokens.write().unwrap() = Some(tokens);
        Ok(true)
    }

    fn save(&self, tokens: &T) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::configuration(format!(
                    "failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tokens).map_err(|e| {
            ProviderError::internal(format!("failed to serialize credentials: {}", e))
        })?;

        fs::write(&temp_path, &content).map_err(|e| {
            ProviderError::configuration(format!("failed to write {}: {}", temp_path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to rename {}: {}", temp_path.display(), e))
        })?;

        debug!("saved credentials to {:?}", self.path);
        Ok(())
    }

    pub fn get(&self) -> Option<T> {
        self.tokens.read().unwrap().clone()
    }

    /// Replaces the credential and writes it to disk.
    pub fn set(&self, tokens: T) -> ProviderResult<()> {
        self.save(&tokens)?;
        *self.tokens.write().unwrap() = Some(tokens);
        Ok(())
    }

    /// Applies `f` to the stored credential and writes the result.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> ProviderResult<T> {
        let mut current = self
            .get()
            .ok_or_else(|| ProviderError::internal("no credentials to update"))?;
        f(&mut current);
        self.set(current.clone())?;
        Ok(current)
    }

    /// Clears the credential in memory and on disk.
    pub fn clear(&self) -> ProviderResult<()> {
        *self.tokens.write().unwrap() = None;
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                ProviderError::configuration(format!(
                    "failed to remove {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            info!("cleared credentials at {:?}", self.path);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_valid_tokens(&self) -> bool {
        self.tokens
            .read()
            .unwrap()
            .as_ref()
            .is_some_and(|t| !t.is_expired())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.tokens
            .read()
            .unwrap()
            .as_ref()
            .is_some_and(|t| t.refresh_token().is_some())
    }
}

impl TokenStorage<TokenInfo> {
    /// True when no tokens are stored or they lack a required scope.
    pub fn needs_reauth(&self, required_scopes: &[String]) -> bool {
        match self.tokens.read().unwrap().as_ref() {
            None => true,
            Some(tokens) => !tokens.has_scopes(required_scopes),
        }
    }
}
