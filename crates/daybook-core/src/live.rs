//! Local record lists kept current by push notifications.
//!
//! A store subscription yields [`Change`]s in arrival order. [`LiveList`]
//! merges them by record id: inserts and updates replace the element with the
//! same id in place (or add it at the front when it is new), deletes remove
//! it. The last message wins; there is no version or timestamp reconciliation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::records::{Record, RecordError, decode_record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row-level change pushed by a store.
///
/// `record` is the new row for inserts and updates. Deletes carry only the id.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<T = Value> {
    pub kind: ChangeKind,
    pub id: String,
    pub record: Option<T>,
}

impl<T> Change<T> {
    pub fn insert(id: impl Into<String>, record: T) -> Self {
        Self {
            kind: ChangeKind::Insert,
            id: id.into(),
            record: Some(record),
        }
    }

    pub fn update(id: impl Into<String>, record: T) -> Self {
        Self {
            kind: ChangeKind::Update,
            id: id.into(),
            record: Some(record),
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            id: id.into(),
            record: None,
        }
    }
}

impl Change<Value> {
    /// Decodes the row payload into a typed record.
    pub fn decode<R: Record>(self) -> Result<Change<R>, RecordError> {
        let record = match self.record {
            Some(value) if self.kind != ChangeKind::Delete => Some(decode_record(value)?),
            _ => None,
        };
        Ok(Change {
            kind: self.kind,
            id: self.id,
            record,
        })
    }
}

/// An ordered list of records that absorbs [`Change`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveList<R> {
    items: Vec<R>,
}

impl<R> Default for LiveList<R> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<R: Record> LiveList<R> {
    /// Seeds the list with an initial fetch, kept in the given order.
    pub fn new(items: Vec<R>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.items.iter().find(|r| r.id() == id)
    }

    /// Merges one change. Returns true if the list was modified.
    pub fn apply(&mut self, change: Change<R>) -> bool {
        match change.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                let Some(record) = change.record else {
                    tracing::warn!(
                        id = %change.id,
                        kind = ?change.kind,
                        "change without a row, ignoring"
                    );
                    return false;
                };
                match self.items.iter().position(|r| r.id() == record.id()) {
                    Some(idx) => self.items[idx] = record,
                    None => self.items.insert(0, record),
                }
                true
            }
            ChangeKind::Delete => {
                let before = self.items.len();
                self.items.retain(|r| r.id() != change.id);
                self.items.len() != before
            }
        }
    }
}
