//! Meeting types for the prep view.
//!
//! A [`Meeting`] is the display-ready form of a calendar event, produced by
//! the normalizer in `daybook-providers`. It is never persisted: every fetch
//! rebuilds it from upstream event data.
//!
//! The static per-type tables (checklist items, topics, questions, success
//! criteria, preparation time) live on [`MeetingType`] so that the normalizer
//! and the renderer agree on a single wording.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder used for any value that cannot be derived from the event.
pub const UNKNOWN: &str = "Unknown";

/// Title used when an event has no (or a blank) summary.
pub const DEFAULT_TITLE: &str = "Untitled Event";

/// Role assigned to every extracted participant.
pub const PARTICIPANT_ROLE: &str = "Participant";

/// Checklist items every meeting starts with, regardless of type.
pub const BASE_CHECKLIST: [&str; 3] = [
    "Review the meeting agenda and objectives",
    "Research the participants' backgrounds",
    "Prepare questions and talking points",
];

/// The classified kind of a meeting.
///
/// Classification is keyword based; see `classify_meeting` in the providers
/// crate for the precedence rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeetingType {
    #[serde(rename = "Technical Interview")]
    TechnicalInterview,
    #[serde(rename = "Intro Call")]
    IntroCall,
    #[serde(rename = "Networking Coffee")]
    NetworkingCoffee,
    #[serde(rename = "General Meeting")]
    GeneralMeeting,
}

impl MeetingType {
    /// Returns the display label for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TechnicalInterview => "Technical Interview",
            Self::IntroCall => "Intro Call",
            Self::NetworkingCoffee => "Networking Coffee",
            Self::GeneralMeeting => "General Meeting",
        }
    }

    /// Checklist items appended after [`BASE_CHECKLIST`] for this type.
    pub fn checklist_items(&self) -> &'static [&'static str] {
        match self {
            Self::TechnicalInterview => &[
                "Review core data structures and algorithms",
                "Practice a system design walkthrough out loud",
                "Prepare two past projects to discuss in depth",
                "Test audio, video and screen sharing",
            ],
            Self::IntroCall => &[
                "Read up on the company's product and recent news",
                "Prepare a 60-second introduction",
                "Identify mutual connections or shared interests",
            ],
            Self::NetworkingCoffee => &[
                "Look up their recent posts and career path",
                "Prepare a few conversation starters",
                "Think about how you could help them",
            ],
            Self::GeneralMeeting => &[],
        }
    }

    /// Topics worth having notes on before the meeting.
    pub fn key_topics(&self) -> &'static [&'static str] {
        match self {
            Self::TechnicalInterview => &[
                "Technical background",
                "Problem-solving approach",
                "Team and engineering culture",
            ],
            Self::IntroCall => &["Company overview", "Role fit", "Next steps"],
            Self::NetworkingCoffee => &[
                "Career journey",
                "Industry trends",
                "Ways to stay in touch",
            ],
            Self::GeneralMeeting => &["Agenda items", "Action items"],
        }
    }

    /// Questions to ask during the meeting.
    pub fn questions(&self) -> &'static [&'static str] {
        match self {
            Self::TechnicalInterview => &[
                "What does a typical week look like for the team?",
                "How are technical decisions made and reviewed?",
                "What would success look like in the first 90 days?",
            ],
            Self::IntroCall => &[
                "What problem is the company focused on right now?",
                "What does the hiring process look like from here?",
            ],
            Self::NetworkingCoffee => &[
                "What are you most excited about at the moment?",
                "Who else would be good for me to talk to?",
            ],
            Self::GeneralMeeting => &["What decisions need to be made today?"],
        }
    }

    /// What a good outcome looks like.
    pub fn success_criteria(&self) -> &'static [&'static str] {
        match self {
            Self::TechnicalInterview => &[
                "Clearly explained my reasoning on every problem",
                "Left with a clear picture of the next round",
            ],
            Self::IntroCall => &[
                "Understood the role and the company's priorities",
                "Agreed on a next step",
            ],
            Self::NetworkingCoffee => &[
                "Built a genuine connection",
                "Got at least one introduction or follow-up",
            ],
            Self::GeneralMeeting => &["Left with clear action items"],
        }
    }

    /// Estimated preparation time in minutes.
    pub fn prep_time_minutes(&self) -> u32 {
        match self {
            Self::TechnicalInterview => 60,
            Self::IntroCall => 30,
            Self::NetworkingCoffee => 15,
            Self::GeneralMeeting => 10,
        }
    }
}

impl fmt::Display for MeetingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person attending a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub role: String,
    pub company: String,
}

impl Participant {
    /// Creates a participant with the default role.
    pub fn new(name: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PARTICIPANT_ROLE.to_string(),
            company: company.into(),
        }
    }

    /// Returns true if the company label is a real value rather than the placeholder.
    pub fn has_company(&self) -> bool {
        !self.company.is_empty() && self.company != UNKNOWN
    }
}

/// A single preparation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    pub completed: bool,
}

impl ChecklistItem {
    /// Creates an unchecked item.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            completed: false,
        }
    }
}

/// A calendar event in the shape used by the prep view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    /// Provider event identifier.
    pub id: String,
    /// Start time as `HH:MM` (24-hour), or `"Unknown"`.
    pub time: String,
    /// Classified meeting type.
    #[serde(rename = "type")]
    pub meeting_type: MeetingType,
    /// Event title.
    pub title: String,
    /// Free-text event description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Attendees, in the order the provider returned them.
    pub participants: Vec<Participant>,
    /// Company of the first attendee with a known company.
    pub company: String,
    pub funding_stage: String,
    pub key_topics: Vec<String>,
    pub my_questions: Vec<String>,
    pub success_criteria: Vec<String>,
    /// Base items followed by type-specific items.
    pub checklist: Vec<ChecklistItem>,
    pub prep_time_minutes: u32,
    /// True once every checklist item is completed.
    pub is_prepped: bool,
    /// Highlights meetings that move the user's job-search goal forward.
    pub contributes_to_goal: bool,
}

impl Meeting {
    /// Returns the number of completed checklist items.
    pub fn completed_items(&self) -> usize {
        self.checklist.iter().filter(|item| item.completed).count()
    }

    /// Returns the checklist completion as a percentage (0-100).
    pub fn prep_progress(&self) -> u8 {
        if self.checklist.is_empty() {
            return if self.is_prepped { 100 } else { 0 };
        }
        ((self.completed_items() * 100) / self.checklist.len()) as u8
    }
}
