//! RawEvent to Meeting conversion pipeline.
//!
//! The normalization process:
//! 1. Drops events that are not meetings (no time of day, or a placeholder
//!    block such as "Busy" or "Out of office")
//! 2. Renders the start time as `HH:MM` in the caller's timezone
//! 3. Extracts participants and the meeting's company from attendee emails
//! 4. Classifies the meeting from its title and fills the per-type tables
//!
//! Everything here is pure: the same events and timezone always produce the
//! same meetings. Missing upstream fields degrade to defaults; nothing fails.

use std::fmt::Display;

use chrono::TimeZone;
use daybook_core::meeting::{
    BASE_CHECKLIST, ChecklistItem, DEFAULT_TITLE, Meeting, MeetingType, Participant, UNKNOWN,
};

use crate::raw_event::{RawAttendee, RawEvent, RawEventTime};

/// Title fragments that mark personal or placeholder calendar blocks.
const PLACEHOLDER_MARKERS: [&str; 3] = ["busy", "out of office", "free"];

/// Title fragments that flag a meeting as moving the job search forward.
const GOAL_MARKERS: [&str; 2] = ["interview", "technical"];

/// Filters and normalizes a day of events, preserving order.
pub fn normalize_meetings<Tz>(raws: &[RawEvent], tz: &Tz) -> Vec<Meeting>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let meetings: Vec<Meeting> = raws
        .iter()
        .filter(|raw| is_meeting_candidate(raw))
        .map(|raw| normalize_event(raw, tz))
        .collect();
    tracing::debug!(
        received = raws.len(),
        kept = meetings.len(),
        "normalized calendar events"
    );
    meetings
}

/// Returns true if the event should be shown as a meeting.
///
/// Events without a time of day (all-day or missing start) are dropped, as are
/// events whose title contains "busy", "out of office" or "free" in any case.
pub fn is_meeting_candidate(raw: &RawEvent) -> bool {
    if raw.start_datetime().is_none() {
        return false;
    }
    let title = effective_title(raw).to_lowercase();
    !PLACEHOLDER_MARKERS.iter().any(|marker| title.contains(marker))
}

/// Converts a single event. Does not apply the candidate filter.
pub fn normalize_event<Tz>(raw: &RawEvent, tz: &Tz) -> Meeting
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let title = effective_title(raw);
    let meeting_type = classify_meeting(title);
    let participants: Vec<Participant> =
        raw.attendees.iter().map(participant_from_attendee).collect();
    let company = participants
        .iter()
        .find(|p| p.has_company())
        .map(|p| p.company.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());

    Meeting {
        id: raw.id.clone(),
        time: format_meeting_time(raw.start.as_ref(), tz),
        meeting_type,
        title: title.to_string(),
        description: raw
            .description
            .as_ref()
            .filter(|d| !d.trim().is_empty())
            .cloned(),
        participants,
        company,
        funding_stage: UNKNOWN.to_string(),
        key_topics: to_owned_list(meeting_type.key_topics()),
        my_questions: to_owned_list(meeting_type.questions()),
        success_criteria: to_owned_list(meeting_type.success_criteria()),
        checklist: build_checklist(&raw.id, meeting_type),
        prep_time_minutes: meeting_type.prep_time_minutes(),
        is_prepped: false,
        contributes_to_goal: contributes_to_goal(title),
    }
}

/// Classifies a meeting from its title.
///
/// Checked in order: "interview", then "intro", then "networking" or "coffee".
/// The first match wins.
pub fn classify_meeting(title: &str) -> MeetingType {
    let title = title.to_lowercase();
    if title.contains("interview") {
        MeetingType::TechnicalInterview
    } else if title.contains("intro") {
        MeetingType::IntroCall
    } else if title.contains("networking") || title.contains("coffee") {
        MeetingType::NetworkingCoffee
    } else {
        MeetingType::GeneralMeeting
    }
}

/// Returns true if the title mentions an interview or something technical.
pub fn contributes_to_goal(title: &str) -> bool {
    let title = title.to_lowercase();
    GOAL_MARKERS.iter().any(|marker| title.contains(marker))
}

/// Builds a participant from an attendee.
///
/// The name is the display name when present, else the local part of the
/// email. The company is the first label of the email domain
/// (`jane@acme.io` gives `acme`).
pub fn participant_from_attendee(attendee: &RawAttendee) -> Participant {
    let email = attendee
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let (local, domain) = match email {
        Some(email) => match email.rsplit_once('@') {
            Some((local, domain)) => (Some(local), Some(domain)),
            None => (Some(email), None),
        },
        None => (None, None),
    };

    let name = attendee
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or(local.filter(|l| !l.is_empty()))
        .unwrap_or(UNKNOWN);

    let company = domain
        .and_then(|d| d.split('.').next())
        .filter(|label| !label.is_empty())
        .unwrap_or(UNKNOWN);

    Participant::new(name, company)
}

/// Renders the start as 24-hour `HH:MM` in `tz`, or "Unknown".
pub fn format_meeting_time<Tz>(start: Option<&RawEventTime>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match start.and_then(RawEventTime::as_datetime) {
        Some(dt) => dt.with_timezone(tz).format("%H:%M").to_string(),
        None => UNKNOWN.to_string(),
    }
}

fn effective_title(raw: &RawEvent) -> &str {
    raw.title().unwrap_or(DEFAULT_TITLE)
}

fn build_checklist(meeting_id: &str, meeting_type: MeetingType) -> Vec<ChecklistItem> {
    BASE_CHECKLIST
        .iter()
        .chain(meeting_type.checklist_items())
        .enumerate()
        .map(|(idx, text)| ChecklistItem::new(format!("{}-{}", meeting_id, idx), *text))
        .collect()
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
