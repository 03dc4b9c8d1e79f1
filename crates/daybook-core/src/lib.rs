//! Core types: meetings, owner-scoped records, live lists, time, tracing

pub mod live;
pub mod meeting;
pub mod records;
pub mod time;
pub mod tracing;
pub mod validation;

pub use live::{Change, ChangeKind, LiveList};
pub use meeting::{ChecklistItem, Meeting, MeetingType, Participant};
pub use records::{
    Goal, GoalDraft, GoalPatch, Habit, HabitDraft, HabitFrequency, HabitPatch, JournalEntry,
    JournalEntryDraft, JournalEntryPatch, Priority, Record, RecordError, RecordKind, Task,
    TaskDraft, TaskPatch,
};
pub use time::TimeWindow;
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use validation::ValidationError;
