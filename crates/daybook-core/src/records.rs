//! Owner-scoped records: habits, tasks, goals and journal entries.
//!
//! Every record belongs to exactly one user id and carries a server-generated
//! identifier. Records are created from a *draft* (the record without id,
//! owner or timestamps) and modified with a *patch* whose absent fields are
//! left untouched.
//!
//! Stores exchange records as JSON objects; [`Record`] ties each concrete type
//! to its [`RecordKind`] and its draft/patch shapes so typed handles can
//! convert in both directions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::validation::{self, ValidationError};

/// Errors raised while converting or validating records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A stored row could not be decoded into the expected record type.
    #[error("failed to decode {kind} record: {source}")]
    Decode {
        kind: RecordKind,
        #[source]
        source: serde_json::Error,
    },

    /// A draft or patch could not be encoded as a JSON object.
    #[error("failed to encode {kind} fields: {reason}")]
    Encode { kind: RecordKind, reason: String },

    /// User input failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// The four record types a user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Habit,
    Task,
    Goal,
    JournalEntry,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [Self::Habit, Self::Task, Self::Goal, Self::JournalEntry];

    /// Name of the backing table.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Habit => "habits",
            Self::Task => "tasks",
            Self::Goal => "goals",
            Self::JournalEntry => "journal_entries",
        }
    }

    /// Returns the singular snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Habit => "habit",
            Self::Task => "task",
            Self::Goal => "goal",
            Self::JournalEntry => "journal_entry",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "habit" | "habits" => Ok(Self::Habit),
            "task" | "tasks" => Ok(Self::Task),
            "goal" | "goals" => Ok(Self::Goal),
            "journal" | "journal_entry" | "journal_entries" | "journal-entry" => {
                Ok(Self::JournalEntry)
            }
            other => Err(format!("unknown record kind: {}", other)),
        }
    }
}

/// A stored, owner-scoped record type.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The kind (and table) this record maps to.
    const KIND: RecordKind;

    /// Fields supplied on creation.
    type Draft: Serialize + Send + Sync;

    /// Fields supplied on update; `None` means "leave unchanged".
    type Patch: Serialize + Send + Sync;

    /// Server-generated identifier.
    fn id(&self) -> &str;

    /// Id of the owning user.
    fn owner_id(&self) -> &str;

    /// Checks a draft before it is sent to a store.
    fn validate_draft(draft: &Self::Draft) -> Result<(), ValidationError>;

    /// Checks the fields a patch sets; absent fields are not checked.
    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError>;
}

fn check_optional_text(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |v| validation::require_text(field, v))
}

/// Decodes a stored JSON row into a typed record.
pub fn decode_record<R: Record>(value: Value) -> Result<R, RecordError> {
    serde_json::from_value(value).map_err(|source| RecordError::Decode {
        kind: R::KIND,
        source,
    })
}

/// Encodes a draft or patch as a JSON object, dropping absent fields.
pub fn encode_fields<T: Serialize>(
    kind: RecordKind,
    fields: &T,
) -> Result<serde_json::Map<String, Value>, RecordError> {
    match serde_json::to_value(fields) {
        Ok(Value::Object(map)) => Ok(map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect()),
        Ok(other) => Err(RecordError::Encode {
            kind,
            reason: format!("expected an object, got {}", other),
        }),
        Err(e) => Err(RecordError::Encode {
            kind,
            reason: e.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Habit
// ---------------------------------------------------------------------------

/// How often a habit is expected to be done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitFrequency {
    #[default]
    Daily,
    Weekly,
}

impl FromStr for HabitFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Daily),
            "weekly" | "week" => Ok(Self::Weekly),
            other => Err(format!("unknown frequency: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub frequency: HabitFrequency,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub streak: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub frequency: HabitFrequency,
}

impl HabitDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::require_text("name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<HabitFrequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<u32>,
}

impl HabitPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_optional_text("name", self.name.as_deref())
    }
}

impl Habit {
    /// Builds the patch that marks this habit done (or not done).
    ///
    /// The streak moves by one only when the completion state changes.
    pub fn completion_patch(&self, done: bool) -> HabitPatch {
        let streak = match (self.completed, done) {
            (false, true) => self.streak.saturating_add(1),
            (true, false) => self.streak.saturating_sub(1),
            _ => self.streak,
        };
        HabitPatch {
            completed: Some(done),
            streak: Some(streak),
            ..Default::default()
        }
    }
}

impl Record for Habit {
    const KIND: RecordKind = RecordKind::Habit;
    type Draft = HabitDraft;
    type Patch = HabitPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn validate_draft(draft: &Self::Draft) -> Result<(), ValidationError> {
        draft.validate()
    }

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError> {
        patch.validate()
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::require_text("title", &self.title)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_optional_text("title", self.title.as_deref())
    }
}

impl Task {
    /// Returns true if the task is open and its due date is before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }
}

impl Record for Task {
    const KIND: RecordKind = RecordKind::Task;
    type Draft = TaskDraft;
    type Patch = TaskPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn validate_draft(draft: &Self::Draft) -> Result<(), ValidationError> {
        draft.validate()
    }

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError> {
        patch.validate()
    }
}

// ---------------------------------------------------------------------------
// Goal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Percentage, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

impl GoalDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::require_text("title", &self.title)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl GoalPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_optional_text("title", self.title.as_deref())?;
        self.progress.map_or(Ok(()), validation::check_progress)
    }

    /// Sets progress; reaching 100 also marks the goal completed.
    pub fn progress(progress: u8) -> Result<Self, ValidationError> {
        validation::check_progress(progress)?;
        Ok(Self {
            progress: Some(progress),
            completed: Some(progress == 100),
            ..Default::default()
        })
    }
}

impl Record for Goal {
    const KIND: RecordKind = RecordKind::Goal;
    type Draft = GoalDraft;
    type Patch = GoalPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn validate_draft(draft: &Self::Draft) -> Result<(), ValidationError> {
        draft.validate()
    }

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError> {
        patch.validate()
    }
}

// ---------------------------------------------------------------------------
// JournalEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Mood on a 1-5 scale.
    #[serde(default)]
    pub mood: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryDraft {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
}

impl JournalEntryDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            mood: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::require_text("title", &self.title)?;
        if let Some(mood) = self.mood {
            validation::check_mood(mood)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
}

impl JournalEntryPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_optional_text("title", self.title.as_deref())?;
        self.mood.map_or(Ok(()), validation::check_mood)
    }
}

impl Record for JournalEntry {
    const KIND: RecordKind = RecordKind::JournalEntry;
    type Draft = JournalEntryDraft;
    type Patch = JournalEntryPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn validate_draft(draft: &Self::Draft) -> Result<(), ValidationError> {
        draft.validate()
    }

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError> {
        patch.validate()
    }
}
