//! Google Calendar API v3 client.
//!
//! Thin wrapper over `events.list` and `calendarList.list`. The access token
//! is supplied per call; token lifecycle belongs to the provider.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, read_json, transport_error, user_agent};
use crate::raw_event::{RawAttendee, RawEvent, RawEventTime};

/// `errors[].reason` values Google uses for quota exhaustion.
const QUOTA_REASONS: [&str; 4] = [
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "quotaExceeded",
    "dailyLimitExceeded",
];

#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http_client: build_client(timeout, &user_agent())?,
            base_url: base_url.into(),
        })
    }

    /// Lists the events of one calendar that overlap `[time_min, time_max)`.
    ///
    /// Recurring events are expanded server side and results come back in
    /// start order. Cancelled events are skipped.
    pub async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: Option<usize>,
    ) -> ProviderResult<Vec<RawEvent>> {
        let mut all_events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_page(
                    access_token,
                    calendar_id,
                    time_min,
                    time_max,
                    max_results,
                    page_token.as_deref(),
                )
                .await?;

            all_events.extend(
                page.items
                    .into_iter()
                    .filter_map(|event| convert_event(event, calendar_id)),
            );

            if let Some(max) = max_results
                && all_events.len() >= max
            {
                all_events.truncate(max);
                break;
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("fetched {} events from calendar {}", all_events.len(), calendar_id);
        Ok(all_events)
    }

    async fn list_events_page(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: Option<usize>,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ]);

        if let Some(max) = max_results {
            request = request.query(&[("maxResults", max.min(2500).to_string())]);
        }

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body, retry_after));
        }

        read_json(response).await
    }

    pub async fn list_calendars(
        &self,
        access_token: &str,
    ) -> ProviderResult<Vec<CalendarListEntry>> {
        let url = format!("{}/users/me/calendarList", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body, None));
        }

        let list: CalendarListResponse = read_json(response).await?;
        Ok(list.items)
    }
}

/// Maps a non-success status to the error taxonomy.
///
/// A 403 is only a rate limit when Google says so in `errors[].reason`;
/// otherwise it is a permission problem.
pub(crate) fn map_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<u64>,
) -> ProviderError {
    let api_error = serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .map(|r| r.error);
    let message = api_error
        .as_ref()
        .and_then(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("API error ({})", status));
    let quota = api_error.as_ref().is_some_and(|e| {
        e.errors
            .iter()
            .any(|d| d.reason.as_deref().is_some_and(|r| QUOTA_REASONS.contains(&r)))
    });

    match status {
        StatusCode::UNAUTHORIZED => ProviderError::authentication(message),
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::rate_limited(with_retry_hint(message, retry_after))
        }
        StatusCode::FORBIDDEN if quota => {
            ProviderError::rate_limited(with_retry_hint(message, retry_after))
        }
        StatusCode::FORBIDDEN => ProviderError::authorization(message),
        StatusCode::NOT_FOUND => ProviderError::not_found(message),
        StatusCode::BAD_REQUEST => ProviderError::bad_request(message),
        _ => ProviderError::server(format!("{} ({})", message, status)),
    }
}

fn with_retry_hint(message: String, retry_after: Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!("{}, retry after {} seconds", message, secs),
        None => message,
    }
}

/// Converts an API event, skipping cancelled ones.
fn convert_event(event: ApiEvent, calendar_id: &str) -> Option<RawEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }
    let Some(id) = event.id else {
        warn!("skipping event without id");
        return None;
    };

    let start = event.start.as_ref().and_then(|t| t.parse(&id, "start"));
    let end = event.end.as_ref().and_then(|t| t.parse(&id, "end"));

    let attendees = event
        .attendees
        .unwrap_or_default()
        .into_iter()
        .map(|a| RawAttendee {
            email: a.email,
            display_name: a.display_name,
            organizer: a.organizer.unwrap_or(false),
            resource: a.resource.unwrap_or(false),
            is_self: a.is_self.unwrap_or(false),
        })
        .collect();

    Some(RawEvent {
        id,
        start,
        end,
        summary: event.summary,
        description: event.description,
        location: event.location,
        calendar_id: calendar_id.to_string(),
        status: event.status,
        attendees,
        html_link: event.html_link,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<ApiEventTime>,
    end: Option<ApiEventTime>,
    html_link: Option<String>,
    status: Option<String>,
    attendees: Option<Vec<ApiAttendee>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

impl ApiEventTime {
    /// Unparseable values are logged and treated as absent.
    fn parse(&self, event_id: &str, which: &str) -> Option<RawEventTime> {
        if let Some(ref dt) = self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .map(|parsed| RawEventTime::DateTime(parsed.with_timezone(&Utc)))
                .map_err(|e| warn!("event {}: bad {} time {:?}: {}", event_id, which, dt, e))
                .ok();
        }
        if let Some(ref date) = self.date {
            return NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(RawEventTime::Date)
                .map_err(|e| warn!("event {}: bad {} date {:?}: {}", event_id, which, date, e))
                .ok();
        }
        None
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttendee {
    email: Option<String>,
    display_name: Option<String>,
    #[serde(rename = "self")]
    is_self: Option<bool>,
    organizer: Option<bool>,
    resource: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

/// A calendar from the calendar list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub primary: bool,
    pub time_zone: Option<String>,
}
