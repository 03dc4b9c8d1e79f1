//! daybook CLI entry point.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;

use daybook_client::backend::BackendOptions;
use daybook_client::cli::{AuthProvider, Cli, Command};
use daybook_client::commands::{self, Context};
use daybook_client::config::ClientConfig;
use daybook_client::error::ClientResult;
use daybook_client::output::RenderOptions;
use daybook_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path)
    } else {
        ClientConfig::load()
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    if let Err(e) = init_tracing(TracingConfig::for_cli(cli.debug || config.debug)) {
        eprintln!("warning: logging disabled: {}", e);
    }

    match run(cli, config, config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli, config: ClientConfig, config_path: PathBuf) -> ClientResult<()> {
    let render_options = RenderOptions {
        theme: cli
            .theme
            .unwrap_or(config.display.theme)
            .for_terminal(std::io::stdout().is_terminal()),
        max_title_length: config.display.max_title_length,
        no_meeting_text: config.display.no_meeting_text.clone(),
        details: matches!(cli.command, Some(Command::Meetings { details: true, .. })),
        today: Local::now().date_naive(),
    };

    #[allow(unused_mut)]
    let mut backend_options = BackendOptions {
        offline: cli.offline,
        ..Default::default()
    };
    #[cfg(feature = "supabase")]
    {
        backend_options.supabase_url = cli.supabase_url;
        backend_options.supabase_anon_key = cli.supabase_anon_key;
    }

    let ctx = Context::new(config, config_path, cli.json, render_options, backend_options);

    match cli.command {
        Some(Command::Auth { provider }) => auth(&ctx, provider).await,
        Some(Command::Account { action }) => commands::account::run(&ctx, action).await,
        Some(Command::Meetings { date, .. }) => commands::meetings::run(&ctx, date).await,
        Some(Command::Habits { action }) => commands::records::habits(&ctx, action).await,
        Some(Command::Tasks { action }) => commands::records::tasks(&ctx, action).await,
        Some(Command::Goals { action }) => commands::records::goals(&ctx, action).await,
        Some(Command::Journal { action }) => commands::records::journal(&ctx, action).await,
        Some(Command::Watch { list }) => commands::watch::run(&ctx, list).await,
        Some(Command::Config { action }) => commands::config::run(&ctx, action),
        None => {
            println!("daybook - habits, tasks, goals, journal and today's meetings");
            println!();
            println!("Run 'daybook --help' for usage information.");
            println!();
            println!("Quick start:");
            println!("  1. Create an account:      daybook account signup <EMAIL>");
            println!("     (or keep everything local by adding --offline to each command)");
            println!("  2. Add a habit:            daybook habits add \"Read 20 pages\"");
            println!("  3. Connect your calendar:  daybook auth google --credentials-file <PATH>");
            println!("  4. See today's meetings:   daybook meetings");
            Ok(())
        }
    }
}

async fn auth(ctx: &Context, provider: AuthProvider) -> ClientResult<()> {
    match provider {
        #[cfg(feature = "google")]
        AuthProvider::Google {
            client_id,
            client_secret,
            credentials_file,
            force,
        } => commands::auth::google(ctx, client_id, client_secret, credentials_file, force).await,
        #[cfg(feature = "google")]
        AuthProvider::GoogleSignout => commands::auth::google_signout(ctx),
    }
}
