//! Owner-scoped record storage with change notifications.
//!
//! [`RecordStore`] is the untyped seam: rows are JSON objects addressed by
//! [`RecordKind`] and always filtered by owner. [`Records`] wraps a store for
//! one record type and does the serde conversions.

use std::marker::PhantomData;
use std::sync::Arc;

use daybook_core::{Change, LiveList, Record, RecordKind, records};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// A JSON object of column values.
pub type Row = Map<String, Value>;

/// Capacity of the per-subscription change queue.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Storage backend for user-owned records.
///
/// Every call is scoped to `owner`. Updating or deleting a record that does
/// not exist or belongs to someone else fails with `NotFound`. Lists come
/// back newest first.
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &str;

    fn list<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<Value>>>;

    /// Inserts a row and returns it with server-assigned fields filled in.
    fn insert<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        fields: Row,
    ) -> BoxFuture<'a, ProviderResult<Value>>;

    /// Merges `patch` into the row and returns the updated row.
    fn update<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        id: &'a str,
        patch: Row,
    ) -> BoxFuture<'a, ProviderResult<Value>>;

    fn delete<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Streams changes to the owner's rows of `kind`.
    fn subscribe<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Subscription>>;
}

/// A live change feed.
///
/// Changes arrive in the order the backend delivered them. Dropping the
/// subscription stops the background task feeding it.
#[derive(Debug)]
pub struct Subscription {
    kind: RecordKind,
    rx: mpsc::Receiver<ProviderResult<Change>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wraps a receiver fed by `task`.
    pub fn new(
        kind: RecordKind,
        rx: mpsc::Receiver<ProviderResult<Change>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self { kind, rx, task }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Next change, or `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<ProviderResult<Change>> {
        self.rx.recv().await
    }

    /// Next change decoded as `R`.
    pub async fn recv_typed<R: Record>(&mut self) -> Option<ProviderResult<Change<R>>> {
        let change = self.recv().await?;
        Some(change.and_then(|c| c.decode::<R>().map_err(ProviderError::from)))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Typed access to one record kind for one owner.
pub struct Records<R> {
    store: Arc<dyn RecordStore>,
    owner: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> std::fmt::Debug for Records<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl<R: Record> Records<R> {
    pub fn new(store: Arc<dyn RecordStore>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
            _record: PhantomData,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn list(&self) -> ProviderResult<Vec<R>> {
        let rows = self.store.list(R::KIND, &self.owner).await?;
        rows.into_iter()
            .map(|row| records::decode_record(row).map_err(ProviderError::from))
            .collect()
    }

    /// Validates and inserts a draft.
    pub async fn insert(&self, draft: &R::Draft) -> ProviderResult<R> {
        R::validate_draft(draft)?;
        let fields = records::encode_fields(R::KIND, draft)?;
        let row = self.store.insert(R::KIND, &self.owner, fields).await?;
        Ok(records::decode_record(row)?)
    }

    /// Validates and applies a patch.
    pub async fn update(&self, id: &str, patch: &R::Patch) -> ProviderResult<R> {
        R::validate_patch(patch)?;
        let fields = records::encode_fields(R::KIND, patch)?;
        if fields.is_empty() {
            return Err(ProviderError::validation("nothing to update"));
        }
        let row = self.store.update(R::KIND, &self.owner, id, fields).await?;
        Ok(records::decode_record(row)?)
    }

    pub async fn delete(&self, id: &str) -> ProviderResult<()> {
        self.store.delete(R::KIND, &self.owner, id).await
    }

    pub async fn subscribe(&self) -> ProviderResult<Subscription> {
        self.store.subscribe(R::KIND, &self.owner).await
    }

    /// Subscribes, then loads the current list.
    ///
    /// Subscribing first means no change is lost between the two calls; a
    /// change that is also in the initial list is applied again harmlessly.
    pub async fn watch(&self) -> ProviderResult<(LiveList<R>, Subscription)> {
        let subscription = self.subscribe().await?;
        let items = self.list().await?;
        Ok((LiveList::new(items), subscription))
    }
}
