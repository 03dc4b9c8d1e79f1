//! Backends for daybook: calendars, identity and record storage.
//!
//! - [`CalendarProvider`]: reads raw calendar events for a time window
//! - [`normalize_meetings`]: turns raw events into classified [`Meeting`]s
//! - [`IdentityProvider`]: sign-up, sign-in and session refresh
//! - [`RecordStore`]: owner-scoped habits, tasks, goals and journal entries
//!   with change subscriptions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   ┌──────────────────────────────┐   ┌──────────────┐
//! │ Google Calendar │   │           Supabase           │   │  In-memory   │
//! └────────┬────────┘   │ GoTrue │ PostgREST │ Realtime │   │ (tests and   │
//!          │            └───┬────┴─────┬─────┴────┬────┘   │  --offline)  │
//!          ▼                ▼          ▼          ▼        └──────┬───────┘
//!   CalendarProvider  IdentityProvider   RecordStore  ◀───────────┘
//!          │                                  │
//!          ▼ normalize_meetings()             ▼ Records<R> / LiveList<R>
//!       Meeting                        Habit, Task, Goal, JournalEntry
//! ```
//!
//! [`Meeting`]: daybook_core::Meeting

pub mod error;
pub mod identity;
pub mod memory;
pub mod normalize;
pub mod provider;
pub mod raw_event;
pub mod store;
pub mod tokens;

#[cfg(feature = "oauth")]
mod http;
#[cfg(feature = "oauth")]
pub mod oauth;

#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "supabase")]
pub mod supabase;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use identity::{IdentityProvider, Profile, Session, SignUpOutcome, User, require_session};
pub use memory::{MemoryIdentity, MemoryStore};
pub use normalize::{normalize_event, normalize_meetings};
pub use provider::{
    BoxFuture, CalendarInfo, CalendarProvider, ErrorProvider, FetchOptions, FetchResult,
    ProviderStatus, fetch_day,
};
pub use raw_event::{RawAttendee, RawEvent, RawEventTime};
pub use store::{RecordStore, Records, Row, Subscription};
pub use tokens::{StoredCredential, TokenInfo, TokenStorage};

/// Directory for token, session and offline data files.
///
/// `~/.local/share/daybook` on Linux, falling back to `./daybook`.
#[cfg(feature = "oauth")]
pub fn data_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("daybook")
}
