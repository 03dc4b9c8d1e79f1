//! In-process store and identity.
//!
//! Used by tests and by the CLI's offline mode. The store can optionally be
//! backed by a JSON file so offline data survives between runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use daybook_core::{Change, RecordKind};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};
use crate::identity::{IdentityProvider, Profile, Session, SignUpOutcome, User, check_sign_in};
use crate::provider::BoxFuture;
use crate::store::{RecordStore, Row, SUBSCRIPTION_BUFFER, Subscription};

/// Columns the store owns; callers cannot set them.
const SERVER_COLUMNS: [&str; 4] = ["id", "user_id", "created_at", "updated_at"];

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct StoredChange {
    kind: RecordKind,
    owner: String,
    change: Change,
}

type Tables = HashMap<RecordKind, Vec<Value>>;

/// A record store held in memory.
///
/// Rows are kept newest first. Every mutation is broadcast to subscribers of
/// the same kind and owner.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    changes: broadcast::Sender<StoredChange>,
    path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tables: RwLock::new(HashMap::new()),
            changes,
            path: None,
        }
    }

    /// Opens a store persisted to `path`, loading it if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> ProviderResult<Self> {
        let path = path.into();
        let mut store = Self::new();
        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                ProviderError::configuration(format!("failed to read {}: {}", path.display(), e))
            })?;
            let by_table: HashMap<String, Vec<Value>> = serde_json::from_str(&content).map_err(|e| {
                ProviderError::configuration(format!("failed to parse {}: {}", path.display(), e))
            })?;
            let mut tables = Tables::new();
            for kind in RecordKind::ALL {
                if let Some(rows) = by_table.get(kind.table()) {
                    tables.insert(kind, rows.clone());
                }
            }
            debug!("loaded offline data from {:?}", path);
            store.tables = RwLock::new(tables);
        }
        store.path = Some(path);
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, tables: &Tables) -> ProviderResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let by_table: HashMap<&str, &Vec<Value>> =
            tables.iter().map(|(kind, rows)| (kind.table(), rows)).collect();
        let content = serde_json::to_string_pretty(&by_table)
            .map_err(|e| ProviderError::internal(format!("failed to serialize store: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::configuration(format!(
                    "failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(|e| {
            ProviderError::configuration(format!("failed to write {}: {}", temp_path.display(), e))
        })?;
        fs::rename(&temp_path, path).map_err(|e| {
            ProviderError::configuration(format!("failed to rename {}: {}", temp_path.display(), e))
        })
    }

    fn publish(&self, kind: RecordKind, owner: &str, change: Change) {
        // No receivers is fine.
        let _ = self.changes.send(StoredChange {
            kind,
            owner: owner.to_string(),
            change,
        });
    }

    fn list_sync(&self, kind: RecordKind, owner: &str) -> Vec<Value> {
        self.tables
            .read()
            .unwrap()
            .get(&kind)
            .map(|rows| rows.iter().filter(|r| owned_by(r, owner)).cloned().collect())
            .unwrap_or_default()
    }

    /// Applies `change` to a copy of the tables and swaps it in only once
    /// the copy has been persisted.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut Tables) -> ProviderResult<T>,
    ) -> ProviderResult<T> {
        let mut tables = self.tables.write().unwrap();
        let mut next = tables.clone();
        let out = change(&mut next)?;
        self.persist(&next)?;
        *tables = next;
        Ok(out)
    }

    fn insert_sync(&self, kind: RecordKind, owner: &str, fields: Row) -> ProviderResult<Value> {
        let now = timestamp();
        let mut row = strip_server_columns(fields);
        row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        row.insert("user_id".into(), Value::String(owner.to_string()));
        row.insert("created_at".into(), now.clone());
        row.insert("updated_at".into(), now);
        let row = Value::Object(row);

        self.commit(|tables| {
            tables.entry(kind).or_default().insert(0, row.clone());
            Ok(())
        })?;

        let id = row_id(&row);
        debug!(%kind, %id, "inserted row");
        self.publish(kind, owner, Change::insert(id, row.clone()));
        Ok(row)
    }

    fn update_sync(
        &self,
        kind: RecordKind,
        owner: &str,
        id: &str,
        patch: Row,
    ) -> ProviderResult<Value> {
        let updated = self.commit(|tables| {
            let row = tables
                .get_mut(&kind)
                .and_then(|rows| rows.iter_mut().find(|r| owned_by(r, owner) && row_id(r) == id))
                .ok_or_else(|| not_found(kind, id))?;
            if let Value::Object(existing) = row {
                existing.extend(strip_server_columns(patch));
                existing.insert("updated_at".into(), timestamp());
            }
            Ok(row.clone())
        })?;

        self.publish(kind, owner, Change::update(id, updated.clone()));
        Ok(updated)
    }

    fn delete_sync(&self, kind: RecordKind, owner: &str, id: &str) -> ProviderResult<()> {
        self.commit(|tables| {
            let rows = tables.get_mut(&kind).ok_or_else(|| not_found(kind, id))?;
            let before = rows.len();
            rows.retain(|r| !(owned_by(r, owner) && row_id(r) == id));
            if rows.len() == before {
                return Err(not_found(kind, id));
            }
            Ok(())
        })?;

        self.publish(kind, owner, Change::delete(id));
        Ok(())
    }

    fn subscribe_sync(&self, kind: RecordKind, owner: &str) -> Subscription {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let owner = owner.to_string();

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(stored) if stored.kind == kind && stored.owner == owner => {
                        if tx.send(Ok(stored.change)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("subscription lagged, {} changes skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription::new(kind, rx, task)
    }
}

impl RecordStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn list<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<Value>>> {
        Box::pin(async move { Ok(self.list_sync(kind, owner)) })
    }

    fn insert<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        fields: Row,
    ) -> BoxFuture<'a, ProviderResult<Value>> {
        Box::pin(async move { self.insert_sync(kind, owner, fields) })
    }

    fn update<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        id: &'a str,
        patch: Row,
    ) -> BoxFuture<'a, ProviderResult<Value>> {
        Box::pin(async move { self.update_sync(kind, owner, id, patch) })
    }

    fn delete<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move { self.delete_sync(kind, owner, id) })
    }

    fn subscribe<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Subscription>> {
        Box::pin(async move { Ok(self.subscribe_sync(kind, owner)) })
    }
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

fn strip_server_columns(mut fields: Row) -> Row {
    for column in SERVER_COLUMNS {
        fields.remove(column);
    }
    fields
}

fn owned_by(row: &Value, owner: &str) -> bool {
    row.get("user_id").and_then(Value::as_str) == Some(owner)
}

fn row_id(row: &Value) -> String {
    row.get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn not_found(kind: RecordKind, id: &str) -> ProviderError {
    ProviderError::not_found(format!("{} {} not found", kind, id))
}

/// Id of the built-in offline user.
pub const LOCAL_USER_ID: &str = "local";

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password: String,
}

/// Identity provider with accounts held in memory.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    accounts: RwLock<HashMap<String, Account>>,
    session: RwLock<Option<Session>>,
    require_confirmation: bool,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign-ups wait for an email confirmation that never comes.
    pub fn with_email_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    /// Already signed in as the local offline user.
    pub fn offline() -> Self {
        let identity = Self::new();
        let mut user = User::new(LOCAL_USER_ID, "local@localhost");
        user.display_name = Some("Offline".to_string());
        *identity.session.write().unwrap() = Some(session_for(user));
        identity
    }

    fn sign_up_sync(
        &self,
        email: &str,
        password: &str,
        profile: Profile,
    ) -> ProviderResult<SignUpOutcome> {
        check_sign_in(email, password)?;
        let email = email.trim().to_lowercase();

        let mut accounts = self.accounts.write().unwrap();
        if accounts.contains_key(&email) {
            return Err(ProviderError::bad_request("User already registered"));
        }

        let mut user = User::new(Uuid::new_v4().to_string(), &email);
        user.display_name = profile.display_name;
        user.email_confirmed = !self.require_confirmation;
        accounts.insert(
            email,
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        drop(accounts);

        if self.require_confirmation {
            info!(user = %user.id, "sign-up pending confirmation");
            return Ok(SignUpOutcome::PendingConfirmation(user));
        }
        let session = session_for(user);
        *self.session.write().unwrap() = Some(session.clone());
        Ok(SignUpOutcome::Active(session))
    }

    fn sign_in_sync(&self, email: &str, password: &str) -> ProviderResult<Session> {
        check_sign_in(email, password)?;
        let email = email.trim().to_lowercase();
        let account = self
            .accounts
            .read()
            .unwrap()
            .get(&email)
            .filter(|a| a.password == password)
            .cloned()
            .ok_or_else(|| ProviderError::authentication("Invalid login credentials"))?;

        if !account.user.email_confirmed {
            return Err(ProviderError::authentication("Email not confirmed"));
        }
        let session = session_for(account.user);
        *self.session.write().unwrap() = Some(session.clone());
        info!(user = %session.user.id, "signed in");
        Ok(session)
    }

    fn update_password_sync(&self, new_password: &str) -> ProviderResult<()> {
        daybook_core::validation::check_password(new_password)?;
        let session = self
            .session
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::authentication("not signed in"))?;
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .values_mut()
            .find(|a| a.user.id == session.user.id)
            .ok_or_else(|| ProviderError::not_found("account not found"))?;
        account.password = new_password.to_string();
        Ok(())
    }
}

fn session_for(user: User) -> Session {
    Session {
        access_token: Uuid::new_v4().to_string(),
        refresh_token: None,
        expires_at: None,
        user,
    }
}

impl IdentityProvider for MemoryIdentity {
    fn name(&self) -> &str {
        "memory"
    }

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        profile: Profile,
    ) -> BoxFuture<'a, ProviderResult<SignUpOutcome>> {
        Box::pin(async move { self.sign_up_sync(email, password, profile) })
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Session>> {
        Box::pin(async move { self.sign_in_sync(email, password) })
    }

    fn sign_in_with_oauth<'a>(
        &'a self,
        provider: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Session>> {
        Box::pin(async move {
            Err(ProviderError::configuration(format!(
                "{} sign-in is not available offline",
                provider
            )))
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            *self.session.write().unwrap() = None;
            Ok(())
        })
    }

    fn current_session(&self) -> BoxFuture<'_, ProviderResult<Option<Session>>> {
        Box::pin(async move { Ok(self.session.read().unwrap().clone()) })
    }

    fn request_password_reset<'a>(&'a self, email: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            daybook_core::validation::check_email(email)?;
            debug!("password reset requested (nothing is sent offline)");
            Ok(())
        })
    }

    fn update_password<'a>(&'a self, new_password: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move { self.update_password_sync(new_password) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use daybook_core::ChangeKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn fields(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    mod store {
        use super::*;

        #[tokio::test]
        async fn insert_assigns_server_columns() {
            let store = MemoryStore::new();
            let row = store
                .insert(
                    RecordKind::Task,
                    "u1",
                    fields(json!({"title": "Ship", "id": "spoofed", "user_id": "u2"})),
                )
                .await
                .unwrap();

            assert_ne!(row["id"], "spoofed");
            assert_eq!(row["user_id"], "u1");
            assert!(row["created_at"].is_string());
            assert_eq!(row["title"], "Ship");
        }

        #[tokio::test]
        async fn list_is_owner_scoped_and_newest_first() {
            let store = MemoryStore::new();
            store.insert(RecordKind::Goal, "u1", fields(json!({"title": "first"}))).await.unwrap();
            store.insert(RecordKind::Goal, "u2", fields(json!({"title": "theirs"}))).await.unwrap();
            store.insert(RecordKind::Goal, "u1", fields(json!({"title": "second"}))).await.unwrap();

            let rows = store.list(RecordKind::Goal, "u1").await.unwrap();
            let titles: Vec<_> = rows.iter().map(|r| r["title"].as_str().unwrap()).collect();
            assert_eq!(titles, vec!["second", "first"]);
            assert!(store.list(RecordKind::Task, "u1").await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn foreign_rows_are_not_found() {
            let store = MemoryStore::new();
            let row = store
                .insert(RecordKind::Habit, "u1", fields(json!({"name": "Run"})))
                .await
                .unwrap();
            let id = row["id"].as_str().unwrap();

            let err = store
                .update(RecordKind::Habit, "u2", id, fields(json!({"name": "Walk"})))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::NotFound);

            let err = store.delete(RecordKind::Habit, "u2", id).await.unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::NotFound);

            store.delete(RecordKind::Habit, "u1", id).await.unwrap();
            let err = store.delete(RecordKind::Habit, "u1", id).await.unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::NotFound);
        }

        #[tokio::test]
        async fn update_merges_and_keeps_created_at() {
            let store = MemoryStore::new();
            let row = store
                .insert(RecordKind::Habit, "u1", fields(json!({"name": "Run", "streak": 2})))
                .await
                .unwrap();
            let id = row["id"].as_str().unwrap();

            let updated = store
                .update(
                    RecordKind::Habit,
                    "u1",
                    id,
                    fields(json!({"completed": true, "created_at": "1970-01-01T00:00:00Z"})),
                )
                .await
                .unwrap();
            assert_eq!(updated["name"], "Run");
            assert_eq!(updated["streak"], 2);
            assert_eq!(updated["completed"], true);
            assert_eq!(updated["created_at"], row["created_at"]);
        }

        #[tokio::test]
        async fn subscribers_see_only_their_changes() {
            let store = MemoryStore::new();
            let mut sub = store.subscribe(RecordKind::Task, "u1").await.unwrap();

            store.insert(RecordKind::Task, "u2", fields(json!({"title": "no"}))).await.unwrap();
            store.insert(RecordKind::Goal, "u1", fields(json!({"title": "no"}))).await.unwrap();
            let row = store
                .insert(RecordKind::Task, "u1", fields(json!({"title": "yes"})))
                .await
                .unwrap();
            let id = row["id"].as_str().unwrap();
            store.delete(RecordKind::Task, "u1", id).await.unwrap();

            let first = sub.recv().await.unwrap().unwrap();
            assert_eq!(first.kind, ChangeKind::Insert);
            assert_eq!(first.record.unwrap()["title"], "yes");

            let second = sub.recv().await.unwrap().unwrap();
            assert_eq!(second.kind, ChangeKind::Delete);
            assert_eq!(second.id, id);
            assert!(second.record.is_none());
        }

        #[tokio::test]
        async fn persists_to_file() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("offline.json");

            let store = MemoryStore::open(&path).unwrap();
            let entry = fields(json!({"title": "Day 1", "content": ""}));
            store
                .insert(RecordKind::JournalEntry, "local", entry)
                .await
                .unwrap();
            assert!(path.exists());

            let reopened = MemoryStore::open(&path).unwrap();
            let rows = reopened.list(RecordKind::JournalEntry, "local").await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0]["title"], "Day 1");
        }

        #[tokio::test]
        async fn failed_write_leaves_rows_unchanged() {
            let dir = TempDir::new().unwrap();
            let blocker = dir.path().join("not-a-dir");
            fs::write(&blocker, "").unwrap();
            let unwritable = blocker.join("offline.json");

            let store = MemoryStore::open(&unwritable).unwrap();
            let mut sub = store.subscribe(RecordKind::Task, "local").await.unwrap();
            let err = store
                .insert(RecordKind::Task, "local", fields(json!({"title": "Lost"})))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
            assert!(store.list(RecordKind::Task, "local").await.unwrap().is_empty());

            let mut store = MemoryStore::open(dir.path().join("offline.json")).unwrap();
            let row = store
                .insert(RecordKind::Task, "local", fields(json!({"title": "Kept"})))
                .await
                .unwrap();
            let id = row["id"].as_str().unwrap();
            store.path = Some(unwritable);

            store
                .update(RecordKind::Task, "local", id, fields(json!({"title": "Renamed"})))
                .await
                .unwrap_err();
            store.delete(RecordKind::Task, "local", id).await.unwrap_err();

            let rows = store.list(RecordKind::Task, "local").await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0]["title"], "Kept");
            let quiet =
                tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await;
            assert!(quiet.is_err(), "failed writes must not be broadcast");
        }
    }

    mod identity {
        use super::*;

        #[tokio::test]
        async fn sign_up_then_sign_in() {
            let identity = MemoryIdentity::new();
            let outcome = identity
                .sign_up("Ada@Example.com", "secret", Profile::new(Some("Ada")))
                .await
                .unwrap();
            let SignUpOutcome::Active(session) = outcome else {
                panic!("expected an active session");
            };
            assert_eq!(session.user.display_name.as_deref(), Some("Ada"));

            identity.sign_out().await.unwrap();
            assert!(identity.current_session().await.unwrap().is_none());

            let again = identity.sign_in("ada@example.com", "secret").await.unwrap();
            assert_eq!(again.user.id, session.user.id);
        }

        #[tokio::test]
        async fn validation_runs_first() {
            let identity = MemoryIdentity::new();
            let err = identity
                .sign_up("not-an-email", "secret", Profile::default())
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::ValidationFailed);

            let err = identity.sign_in("ada@example.com", "123").await.unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::ValidationFailed);
        }

        #[tokio::test]
        async fn wrong_password() {
            let identity = MemoryIdentity::new();
            identity
                .sign_up("ada@example.com", "secret", Profile::default())
                .await
                .unwrap();
            let err = identity.sign_in("ada@example.com", "wrong!").await.unwrap_err();
            assert!(err.needs_reauth());
            assert_eq!(err.user_message(), "Invalid login credentials. Please sign in again.");
        }

        #[tokio::test]
        async fn duplicate_sign_up() {
            let identity = MemoryIdentity::new();
            identity.sign_up("ada@example.com", "secret", Profile::default()).await.unwrap();
            let err = identity
                .sign_up("ada@example.com", "secret", Profile::default())
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::BadRequest);
        }

        #[tokio::test]
        async fn pending_confirmation_blocks_sign_in() {
            let identity = MemoryIdentity::new().with_email_confirmation();
            let outcome = identity
                .sign_up("ada@example.com", "secret", Profile::default())
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                SignUpOutcome::PendingConfirmation(ref u) if !u.email_confirmed
            ));
            assert!(identity.current_session().await.unwrap().is_none());
            assert!(identity.sign_in("ada@example.com", "secret").await.is_err());
        }

        #[tokio::test]
        async fn update_password_requires_session() {
            let identity = MemoryIdentity::new();
            let err = identity.update_password("newsecret").await.unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);

            identity.sign_up("ada@example.com", "secret", Profile::default()).await.unwrap();
            identity.update_password("newsecret").await.unwrap();
            identity.sign_out().await.unwrap();
            assert!(identity.sign_in("ada@example.com", "secret").await.is_err());
            identity.sign_in("ada@example.com", "newsecret").await.unwrap();
        }

        #[tokio::test]
        async fn offline_user_is_signed_in() {
            let identity = MemoryIdentity::offline();
            let session = crate::identity::require_session(&identity).await.unwrap();
            assert_eq!(session.owner_id(), LOCAL_USER_ID);
        }
    }
}
