//! Terminal and JSON rendering.
//!
//! Everything here returns strings; commands decide where to print them. The
//! [`Theme`] from `[display]` picks the ANSI palette, and [`Theme::Plain`]
//! produces text without any escape sequences.

use std::borrow::Cow;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use daybook_core::{Goal, Habit, JournalEntry, Meeting, Task};

use crate::error::ClientResult;

/// Colour scheme for terminal output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// No colours or text attributes.
    #[default]
    Plain,
    /// Bright colours for dark terminal backgrounds.
    Dark,
    /// Deeper colours for light terminal backgrounds.
    Light,
}

impl Theme {
    /// Falls back to [`Theme::Plain`] when stdout is not a terminal.
    pub fn for_terminal(self, is_terminal: bool) -> Self {
        if is_terminal { self } else { Self::Plain }
    }

    pub fn palette(self) -> Palette {
        match self {
            Self::Plain => Palette::default(),
            Self::Dark => Palette {
                heading: "1;97",
                accent: "96",
                muted: "90",
                done: "92",
                warn: "93",
            },
            Self::Light => Palette {
                heading: "1;30",
                accent: "34",
                muted: "2",
                done: "32",
                warn: "31",
            },
        }
    }
}

/// SGR parameters per text role. Empty means unstyled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Palette {
    pub heading: &'static str,
    pub accent: &'static str,
    pub muted: &'static str,
    pub done: &'static str,
    pub warn: &'static str,
}

impl Palette {
    fn paint(code: &str, text: &str) -> String {
        if code.is_empty() {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    pub fn heading(&self, text: &str) -> String {
        Self::paint(self.heading, text)
    }

    pub fn accent(&self, text: &str) -> String {
        Self::paint(self.accent, text)
    }

    pub fn muted(&self, text: &str) -> String {
        Self::paint(self.muted, text)
    }

    pub fn done(&self, text: &str) -> String {
        Self::paint(self.done, text)
    }

    pub fn warn(&self, text: &str) -> String {
        Self::paint(self.warn, text)
    }

    fn checkbox(&self, checked: bool) -> String {
        if checked { self.done("[x]") } else { "[ ]".to_string() }
    }
}

/// Options for terminal rendering.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub theme: Theme,
    /// Titles longer than this are cut with an ellipsis.
    pub max_title_length: Option<usize>,
    /// Shown by `meetings` when the day is empty.
    pub no_meeting_text: String,
    /// Include topics, questions and success criteria under each meeting.
    pub details: bool,
    /// Reference day for overdue markers.
    pub today: NaiveDate,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            theme: Theme::Plain,
            max_title_length: None,
            no_meeting_text: "No meetings today".to_string(),
            details: false,
            today: Local::now().date_naive(),
        }
    }
}

/// Renders `value` as pretty-printed JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> ClientResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Terminal renderer for meetings and records.
#[derive(Debug, Clone)]
pub struct Renderer {
    options: RenderOptions,
    palette: Palette,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        let palette = options.theme.palette();
        Self { options, palette }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    fn title<'a>(&self, title: &'a str) -> Cow<'a, str> {
        match self.options.max_title_length {
            Some(max) => ellipsis(title, max),
            None => Cow::Borrowed(title),
        }
    }

    /// The day's meetings with their preparation checklists.
    pub fn meetings(&self, meetings: &[Meeting]) -> String {
        if meetings.is_empty() {
            return self.palette.muted(&self.options.no_meeting_text);
        }
        meetings
            .iter()
            .map(|m| self.meeting(m))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn meeting(&self, meeting: &Meeting) -> String {
        let p = &self.palette;
        let mut header = format!(
            "{}  {}  {}",
            p.accent(&meeting.time),
            p.heading(&self.title(&meeting.title)),
            p.muted(&format!("[{}]", meeting.meeting_type))
        );
        if meeting.contributes_to_goal {
            header.push_str(&format!("  {}", p.warn("★ goal")));
        }

        let mut lines = vec![header];
        lines.push(format!(
            "       Company: {}   Prep: {} min   {}/{} prepped ({}%)",
            meeting.company,
            meeting.prep_time_minutes,
            meeting.completed_items(),
            meeting.checklist.len(),
            meeting.prep_progress()
        ));
        if !meeting.participants.is_empty() {
            let names: Vec<String> = meeting
                .participants
                .iter()
                .map(|person| {
                    if person.has_company() {
                        format!("{} ({})", person.name, person.company)
                    } else {
                        person.name.clone()
                    }
                })
                .collect();
            lines.push(format!("       With: {}", names.join(", ")));
        }
        for item in &meeting.checklist {
            lines.push(format!("       {} {}", p.checkbox(item.completed), item.text));
        }

        if self.options.details {
            for (label, items) in [
                ("Key topics", &meeting.key_topics),
                ("Questions", &meeting.my_questions),
                ("Success looks like", &meeting.success_criteria),
            ] {
                if items.is_empty() {
                    continue;
                }
                lines.push(format!("       {}", p.muted(&format!("{}:", label))));
                lines.extend(bulletize(items).lines().map(|l| format!("         {}", l)));
            }
        }
        lines.join("\n")
    }

    pub fn habits(&self, habits: &[Habit]) -> String {
        self.listing(habits, "No habits yet", |h| self.habit(h))
    }

    pub fn habit(&self, habit: &Habit) -> String {
        let p = &self.palette;
        let frequency = match habit.frequency {
            daybook_core::HabitFrequency::Daily => "daily",
            daybook_core::HabitFrequency::Weekly => "weekly",
        };
        format!(
            "{} {}  {}  streak {}  {}",
            p.checkbox(habit.completed),
            self.title(&habit.name),
            p.muted(frequency),
            habit.streak,
            p.muted(&habit.id)
        )
    }

    pub fn tasks(&self, tasks: &[Task]) -> String {
        self.listing(tasks, "No tasks yet", |t| self.task(t))
    }

    pub fn task(&self, task: &Task) -> String {
        let p = &self.palette;
        let priority = match task.priority {
            daybook_core::Priority::High => p.warn("high"),
            daybook_core::Priority::Medium => "medium".to_string(),
            daybook_core::Priority::Low => p.muted("low"),
        };
        let mut line = format!(
            "{} {}  {}",
            p.checkbox(task.completed),
            self.title(&task.title),
            priority
        );
        if let Some(due) = task.due_date {
            if task.is_overdue(self.options.today) {
                line.push_str(&format!("  {}", p.warn(&format!("due {} (overdue)", due))));
            } else {
                line.push_str(&format!("  due {}", due));
            }
        }
        line.push_str(&format!("  {}", p.muted(&task.id)));
        line
    }

    pub fn goals(&self, goals: &[Goal]) -> String {
        self.listing(goals, "No goals yet", |g| self.goal(g))
    }

    pub fn goal(&self, goal: &Goal) -> String {
        let p = &self.palette;
        let bar = progress_bar(goal.progress, 10);
        let bar = if goal.completed { p.done(&bar) } else { bar };
        let mut line = format!("{}  {} {:>3}%", self.title(&goal.title), bar, goal.progress);
        if let Some(ref category) = goal.category {
            line.push_str(&format!("  {}", p.accent(category)));
        }
        if let Some(target) = goal.target_date {
            line.push_str(&format!("  target {}", target));
        }
        line.push_str(&format!("  {}", p.muted(&goal.id)));
        line
    }

    pub fn journal(&self, entries: &[JournalEntry]) -> String {
        self.listing(entries, "No journal entries yet", |e| self.journal_entry(e))
    }

    pub fn journal_entry(&self, entry: &JournalEntry) -> String {
        let p = &self.palette;
        let mut header = format!(
            "{}  {}",
            p.accent(&entry.created_at.with_timezone(&Local).format("%Y-%m-%d").to_string()),
            p.heading(&self.title(&entry.title))
        );
        if let Some(mood) = entry.mood {
            header.push_str(&format!("  mood {}/5", mood));
        }
        header.push_str(&format!("  {}", p.muted(&entry.id)));
        let preview = entry.content.lines().next().unwrap_or_default();
        if preview.is_empty() {
            header
        } else {
            format!("{}\n    {}", header, ellipsis(preview, 72))
        }
    }

    fn listing<T>(&self, items: &[T], empty: &str, line: impl Fn(&T) -> String) -> String {
        if items.is_empty() {
            return self.palette.muted(empty);
        }
        items.iter().map(line).collect::<Vec<_>>().join("\n")
    }
}

/// Truncates to `max_len` characters, ending in `...` when cut.
pub fn ellipsis(s: &str, max_len: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_len {
        return Cow::Borrowed(s);
    }
    if max_len <= 3 {
        return Cow::Owned(".".repeat(max_len));
    }
    let truncated: String = s.chars().take(max_len - 3).collect();
    Cow::Owned(format!("{}...", truncated))
}

/// One `• item` line per entry.
pub fn bulletize(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn progress_bar(progress: u8, width: usize) -> String {
    let filled = (usize::from(progress.min(100)) * width) / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}
