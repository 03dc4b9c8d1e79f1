//! Command-line interface definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use daybook_core::{HabitFrequency, Priority, RecordKind};

use crate::output::Theme;

/// daybook - habits, tasks, goals, journal and today's meetings
#[derive(Debug, Parser)]
#[command(name = "daybook")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "DAYBOOK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Colour theme (overrides [display] theme)
    #[arg(long, value_enum, global = true)]
    pub theme: Option<Theme>,

    /// Keep records in a local file instead of Supabase
    #[arg(long, global = true)]
    pub offline: bool,

    /// Supabase project URL
    #[cfg(feature = "supabase")]
    #[arg(long, env = "SUPABASE_URL", global = true, hide_env_values = true)]
    pub supabase_url: Option<String>,

    /// Supabase anon key
    #[cfg(feature = "supabase")]
    #[arg(long, env = "SUPABASE_ANON_KEY", global = true, hide_env_values = true)]
    pub supabase_anon_key: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calendar authentication
    Auth {
        #[command(subcommand)]
        provider: AuthProvider,
    },

    /// Sign up, sign in and manage your daybook account
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Show a day's meetings with preparation checklists
    Meetings {
        /// Day to show (YYYY-MM-DD), today by default
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Also show key topics, questions and success criteria
        #[arg(long)]
        details: bool,
    },

    /// Manage habits
    Habits {
        #[command(subcommand)]
        action: HabitAction,
    },

    /// Manage tasks
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Manage goals
    Goals {
        #[command(subcommand)]
        action: GoalAction,
    },

    /// Manage journal entries
    Journal {
        #[command(subcommand)]
        action: JournalAction,
    },

    /// Follow a list live until Ctrl-C (Supabase backend only)
    Watch {
        #[arg(value_enum)]
        list: WatchList,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Calendar providers.
#[derive(Debug, Subcommand)]
pub enum AuthProvider {
    /// Authorize read access to Google Calendar
    #[cfg(feature = "google")]
    Google {
        /// OAuth client ID (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_ID")]
        client_id: Option<String>,

        /// OAuth client secret (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,

        /// Path to the OAuth client JSON downloaded from Google Cloud Console
        #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
        credentials_file: Option<PathBuf>,

        /// Re-authenticate even if a valid token is stored
        #[arg(long, short)]
        force: bool,
    },

    /// Forget the stored Google Calendar token
    #[cfg(feature = "google")]
    GoogleSignout,
}

/// Account actions.
#[derive(Debug, Subcommand)]
pub enum AccountAction {
    /// Create an account
    Signup {
        email: String,

        /// Display name stored on the profile
        #[arg(long)]
        name: Option<String>,

        /// Password (prompted for when omitted)
        #[arg(long, env = "DAYBOOK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign in with email and password
    Signin {
        email: String,

        /// Password (prompted for when omitted)
        #[arg(long, env = "DAYBOOK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign in through an OAuth provider in the browser
    SigninOauth {
        /// Provider name as configured in Supabase
        #[arg(default_value = "google")]
        provider: String,
    },

    /// Sign out and forget the stored session
    Signout,

    /// Show the signed-in user
    Whoami,

    /// Email a password reset link
    ResetPassword { email: String },

    /// Change the password of the signed-in user
    UpdatePassword {
        /// New password (prompted for when omitted)
        #[arg(long, env = "DAYBOOK_NEW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum HabitAction {
    /// List habits, newest first
    List,

    /// Add a habit
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "daily")]
        frequency: HabitFrequency,
    },

    /// Change a habit
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        frequency: Option<HabitFrequency>,
    },

    /// Mark a habit done for today
    Done {
        id: String,
        /// Mark as not done instead
        #[arg(long)]
        undo: bool,
    },

    /// Delete a habit
    Rm { id: String },
}

#[derive(Debug, Subcommand)]
pub enum TaskAction {
    /// List tasks, newest first
    List {
        /// Hide completed tasks
        #[arg(long)]
        open: bool,
    },

    /// Add a task
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Change a task
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Mark a task done
    Done {
        id: String,
        #[arg(long)]
        undo: bool,
    },

    /// Delete a task
    Rm { id: String },
}

#[derive(Debug, Subcommand)]
pub enum GoalAction {
    /// List goals, newest first
    List,

    /// Add a goal
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        target: Option<NaiveDate>,
    },

    /// Change a goal
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        target: Option<NaiveDate>,
        /// Progress in percent; 100 completes the goal
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        progress: Option<u8>,
    },

    /// Mark a goal completed (progress 100)
    Done {
        id: String,
        #[arg(long)]
        undo: bool,
    },

    /// Delete a goal
    Rm { id: String },
}

#[derive(Debug, Subcommand)]
pub enum JournalAction {
    /// List entries, newest first
    List,

    /// Write an entry
    Add {
        title: String,
        /// Entry text; read from stdin when omitted
        #[arg(long)]
        content: Option<String>,
        /// Mood from 1 to 5
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        mood: Option<u8>,
    },

    /// Change an entry
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        mood: Option<u8>,
    },

    /// Delete an entry
    Rm { id: String },
}

/// Lists that can be followed with `daybook watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WatchList {
    Habits,
    Tasks,
    Goals,
    Journal,
}

impl From<WatchList> for RecordKind {
    fn from(list: WatchList) -> Self {
        match list {
            WatchList::Habits => RecordKind::Habit,
            WatchList::Tasks => RecordKind::Task,
            WatchList::Goals => RecordKind::Goal,
            WatchList::Journal => RecordKind::JournalEntry,
        }
    }
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets masked)
    Dump,

    /// Check that configured credentials resolve
    Validate,

    /// Show configuration and data file paths
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("daybook").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn meetings_with_date_and_json() {
        let cli = parse(&["meetings", "--date", "2024-03-11", "--json"]);
        assert!(cli.json);
        let Some(Command::Meetings { date, details }) = cli.command else {
            panic!("expected meetings");
        };
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 11));
        assert!(!details);
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["daybook", "meetings", "--date", "11/03/2024"]).is_err());
    }

    #[test]
    fn task_add_parses_priority() {
        let cli = parse(&["--offline", "tasks", "add", "Ship it", "--priority", "high"]);
        assert!(cli.offline);
        let Some(Command::Tasks {
            action: TaskAction::Add { title, priority, due, .. },
        }) = cli.command
        else {
            panic!("expected tasks add");
        };
        assert_eq!(title, "Ship it");
        assert_eq!(priority, Priority::High);
        assert!(due.is_none());
    }

    #[test]
    fn goal_progress_is_bounded() {
        let args = ["daybook", "goals", "update", "g1", "--progress", "120"];
        assert!(Cli::try_parse_from(args).is_err());
        let cli = parse(&["goals", "update", "g1", "--progress", "100"]);
        assert!(matches!(
            cli.command,
            Some(Command::Goals {
                action: GoalAction::Update { progress: Some(100), .. }
            })
        ));
    }

    #[test]
    fn watch_maps_to_record_kind() {
        let cli = parse(&["watch", "journal"]);
        let Some(Command::Watch { list }) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(RecordKind::from(list), RecordKind::JournalEntry);
    }

    #[test]
    fn theme_flag() {
        let cli = parse(&["--theme", "light", "habits", "list"]);
        assert_eq!(cli.theme, Some(Theme::Light));
    }

    #[test]
    fn oauth_provider_defaults_to_google() {
        let cli = parse(&["account", "signin-oauth"]);
        assert!(matches!(
            cli.command,
            Some(Command::Account {
                action: AccountAction::SigninOauth { ref provider }
            }) if provider == "google"
        ));
    }
}
