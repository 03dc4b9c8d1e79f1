//! Identity and record-store wiring.
//!
//! Commands never build providers themselves: they ask for a [`Backend`],
//! which is either the configured Supabase project or the local offline
//! store.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use daybook_core::Record;
use daybook_providers::{
    IdentityProvider, MemoryIdentity, MemoryStore, RecordStore, Records, Session, require_session,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Where records are kept for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// Supabase, with the session file at the given path.
    Supabase,
    /// Local JSON file, signed in as the offline user.
    Offline(PathBuf),
}

/// Overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub offline: bool,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

pub struct Backend {
    kind: BackendKind,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.kind)
            .field("identity", &self.identity.name())
            .field("store", &self.store.name())
            .finish()
    }
}

impl Backend {
    /// Picks offline mode when asked for (flag or `[offline] enabled`),
    /// Supabase otherwise.
    pub fn from_config(config: &ClientConfig, options: BackendOptions) -> ClientResult<Self> {
        if options.offline || config.offline.enabled {
            return Self::offline(config.offline.data_path());
        }
        Self::supabase(config, options)
    }

    /// Records in a local file, owned by the built-in offline user.
    pub fn offline(path: PathBuf) -> ClientResult<Self> {
        let store = MemoryStore::open(&path)?;
        debug!(path = %path.display(), "using offline store");
        Ok(Self {
            kind: BackendKind::Offline(path),
            identity: Arc::new(MemoryIdentity::offline()),
            store: Arc::new(store),
        })
    }

    #[cfg(feature = "supabase")]
    fn supabase(config: &ClientConfig, options: BackendOptions) -> ClientResult<Self> {
        use daybook_providers::supabase::{SupabaseAuth, SupabaseStore};

        let settings = config
            .supabase
            .clone()
            .unwrap_or_default()
            .with_overrides(options.supabase_url, options.supabase_anon_key);
        let supabase_config = settings.to_provider_config().map_err(ClientError::Config)?;

        let auth = SupabaseAuth::new(supabase_config.clone())?.into_shared();
        let store = SupabaseStore::new(supabase_config, auth.clone())?;
        info!(store = store.name(), "using Supabase backend");
        Ok(Self {
            kind: BackendKind::Supabase,
            identity: auth,
            store: Arc::new(store),
        })
    }

    #[cfg(not(feature = "supabase"))]
    fn supabase(_config: &ClientConfig, _options: BackendOptions) -> ClientResult<Self> {
        Err(ClientError::Config(
            "this build has no Supabase support; run with --offline".to_string(),
        ))
    }

    /// Builds a backend from parts, for tests.
    pub fn from_parts(
        kind: BackendKind,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            kind,
            identity,
            store,
        }
    }

    pub fn kind(&self) -> &BackendKind {
        &self.kind
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    /// The current session, or [`ClientError::AuthRequired`].
    pub async fn session(&self) -> ClientResult<Session> {
        require_session(self.identity.as_ref()).await.map_err(|e| {
            if e.needs_reauth() {
                ClientError::AuthRequired(e.message().to_string())
            } else {
                e.into()
            }
        })
    }

    /// A typed record handle scoped to the signed-in user.
    pub async fn records<R: Record>(&self) -> ClientResult<Records<R>> {
        let session = self.session().await?;
        Ok(Records::new(self.store.clone(), session.owner_id()))
    }
}
