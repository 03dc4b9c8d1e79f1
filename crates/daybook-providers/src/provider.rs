//! CalendarProvider trait definition.
//!
//! A calendar provider turns an authenticated account into [`RawEvent`]s for
//! a time range. The meetings view only ever asks for one local day at a
//! time, see [`fetch_day`].

use std::future::Future;
use std::pin::Pin;

use chrono::{NaiveDate, TimeZone};
use daybook_core::TimeWindow;

use crate::error::{ProviderError, ProviderResult};
use crate::raw_event::RawEvent;

/// A calendar the account can read.
#[derive(Debug, Clone)]
pub struct CalendarInfo {
    pub id: String,
    pub name: String,
    pub is_primary: bool,
    /// IANA identifier.
    pub timezone: Option<String>,
}

impl CalendarInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_primary: false,
            timezone: None,
        }
    }

    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }
}

/// Events returned by a fetch, in provider order.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub events: Vec<RawEvent>,
}

impl FetchResult {
    pub fn with_events(events: Vec<RawEvent>) -> Self {
        Self { events }
    }
}

/// Options for fetching events.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub time_window: Option<TimeWindow>,
    /// Upper bound on the number of events returned across all calendars.
    pub max_results: Option<usize>,
    /// Restricts the fetch to these calendars; the provider default otherwise.
    pub calendar_ids: Option<Vec<String>>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_calendar_ids(mut self, ids: Vec<String>) -> Self {
        self.calendar_ids = Some(ids);
        self
    }
}

/// Status information about a provider.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub provider_type: String,
    pub is_authenticated: bool,
    pub last_sync: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn new(provider_type: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            is_authenticated: false,
            last_sync: None,
            error: None,
        }
    }
}

/// A boxed future so the provider traits stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core abstraction for calendar providers.
///
/// Implementations handle pagination internally and drop cancelled events
/// before returning.
pub trait CalendarProvider: Send + Sync {
    /// Returns the name/type of this provider (e.g., "google").
    fn name(&self) -> &str;

    /// Fetches events within the options' time window.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on network errors, authentication failures, etc.
    fn fetch_events(&self, options: FetchOptions) -> BoxFuture<'_, ProviderResult<FetchResult>>;

    /// Lists calendars the account can read.
    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarInfo>>>;

    fn status(&self) -> BoxFuture<'_, ProviderStatus>;

    /// Refreshes the access token with the stored refresh token.
    fn refresh_auth(&self) -> BoxFuture<'_, ProviderResult<()>>;

    /// True if a non-expired access token is available.
    fn is_authenticated(&self) -> bool;
}

/// Fetches every event of the local day `date` in `tz`.
pub async fn fetch_day<Tz: TimeZone>(
    provider: &dyn CalendarProvider,
    date: NaiveDate,
    tz: &Tz,
) -> ProviderResult<Vec<RawEvent>> {
    let window = TimeWindow::for_date(date, tz);
    tracing::debug!(
        provider = provider.name(),
        %date,
        start = %window.start,
        end = %window.end,
        "fetching calendar day"
    );
    let result = provider
        .fetch_events(FetchOptions::new().with_time_window(window))
        .await?;
    Ok(result.events)
}

/// A provider that always returns an error.
///
/// Stands in when no calendar is configured so callers get a clear message.
#[derive(Debug)]
pub struct ErrorProvider {
    name: String,
    error: ProviderError,
}

impl ErrorProvider {
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }

    fn error(&self) -> ProviderError {
        self.error.duplicate().with_provider(&self.name)
    }
}

impl CalendarProvider for ErrorProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_events(&self, _options: FetchOptions) -> BoxFuture<'_, ProviderResult<FetchResult>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<Vec<CalendarInfo>>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn status(&self) -> BoxFuture<'_, ProviderStatus> {
        let mut status = ProviderStatus::new(&self.name);
        status.error = Some(self.error.message().to_string());
        Box::pin(async move { status })
    }

    fn refresh_auth(&self) -> BoxFuture<'_, ProviderResult<()>> {
        let error = self.error();
        Box::pin(async move { Err(error) })
    }

    fn is_authenticated(&self) -> bool {
        false
    }
}
