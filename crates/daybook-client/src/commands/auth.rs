//! Calendar authentication commands.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use daybook_providers::CalendarProvider;
use daybook_providers::google::{GoogleConfig, GoogleProvider, OAuthCredentials};

use crate::commands::Context;
use crate::config::{GoogleSettings, update_section};
use crate::error::{ClientError, ClientResult};

/// Runs the Google OAuth flow.
///
/// Credentials come from the flags, a `--credentials-file`, or `[google]` in
/// the config file. Credentials given on the command line are written to
/// the config file so `daybook meetings` finds them later.
pub async fn google(
    ctx: &Context,
    client_id: Option<String>,
    client_secret: Option<String>,
    credentials_file: Option<PathBuf>,
    force: bool,
) -> ClientResult<()> {
    let settings = ctx.config.google.clone().unwrap_or_default();
    let resolved =
        resolve_google_credentials(client_id, client_secret, credentials_file, &settings)?;

    let credentials = OAuthCredentials::new(&resolved.client_id, &resolved.client_secret);
    credentials
        .validate()
        .map_err(|e| ClientError::Config(format!("invalid Google credentials: {}", e)))?;

    let mut google_config =
        GoogleConfig::new(credentials).with_calendar_ids(settings.calendar_ids.clone());
    if let Some(ref path) = settings.token_path {
        google_config = google_config.with_token_path(path);
    }
    let provider = GoogleProvider::new(google_config)?;

    if provider.is_authenticated() && !force {
        persist_credentials(&ctx.config_path, &resolved);
        println!("Already authenticated with Google Calendar.");
        println!("Use --force to re-authenticate.");
        return Ok(());
    }

    println!("Starting Google Calendar authentication...");
    println!();
    println!("A browser window will open for you to authorize read access to your calendar.");
    println!("If it does not, copy the URL printed below into your browser.");
    println!();

    provider.authenticate().await?;
    persist_credentials(&ctx.config_path, &resolved);

    info!("Google authentication successful");
    println!();
    println!("Authentication successful. Run 'daybook meetings' to see today's meetings.");
    Ok(())
}

/// Deletes the stored Google token.
pub fn google_signout(ctx: &Context) -> ClientResult<()> {
    let settings = ctx.config.google.clone().unwrap_or_default();
    let google_config = settings.to_provider_config().map_err(ClientError::Config)?;
    let provider = GoogleProvider::new(google_config)?;
    provider.sign_out()?;
    println!("Google Calendar token removed.");
    Ok(())
}

/// Where the credentials were found.
#[derive(Debug, PartialEq)]
enum CredentialSource {
    /// `--client-id`/`--client-secret` or `--credentials-file`.
    Cli,
    /// Already in the config file.
    Config,
}

#[derive(Debug)]
struct ResolvedCredentials {
    client_id: String,
    client_secret: String,
    source: CredentialSource,
}

/// Resolves credentials, highest priority first:
/// 1. `--client-id` with `--client-secret`
/// 2. `--credentials-file`
/// 3. `[google]` in the config file
fn resolve_google_credentials(
    cli_client_id: Option<String>,
    cli_client_secret: Option<String>,
    cli_credentials_file: Option<PathBuf>,
    settings: &GoogleSettings,
) -> ClientResult<ResolvedCredentials> {
    match (cli_client_id, cli_client_secret) {
        (Some(client_id), Some(client_secret)) => {
            return Ok(ResolvedCredentials {
                client_id,
                client_secret,
                source: CredentialSource::Cli,
            });
        }
        (None, None) => {}
        _ => {
            return Err(ClientError::Input(
                "--client-id and --client-secret must be given together".to_string(),
            ));
        }
    }

    if let Some(path) = cli_credentials_file {
        let creds = OAuthCredentials::from_file(&path).map_err(|e| {
            ClientError::Config(format!(
                "failed to load credentials from {}: {}",
                path.display(),
                e
            ))
        })?;
        return Ok(ResolvedCredentials {
            client_id: creds.client_id,
            client_secret: creds.client_secret,
            source: CredentialSource::Cli,
        });
    }

    if settings.client_id.is_some() || settings.client_secret.is_some() {
        let creds = settings.resolve_credentials().map_err(ClientError::Config)?;
        return Ok(ResolvedCredentials {
            client_id: creds.client_id,
            client_secret: creds.client_secret,
            source: CredentialSource::Config,
        });
    }

    Err(ClientError::Config(
        "Google credentials are required. Provide them with:\n  \
         - --client-id and --client-secret (or GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET)\n  \
         - --credentials-file (the OAuth client JSON from Google Cloud Console)\n  \
         - client_id and client_secret under [google] in the config file"
            .to_string(),
    ))
}

/// Saves command-line credentials under `[google]`. A failure only warns:
/// the token is already stored and the user can add the section by hand.
fn persist_credentials(config_path: &Path, creds: &ResolvedCredentials) {
    if creds.source == CredentialSource::Config {
        return;
    }

    let mut calendars = toml_edit::Array::new();
    calendars.push("primary");
    let result = update_section(
        config_path,
        "google",
        &[
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
        ],
        &[("calendar_ids", toml_edit::value(calendars))],
    );
    match result {
        Ok(()) => println!("Credentials saved to {}", config_path.display()),
        Err(e) => warn!(
            path = %config_path.display(),
            error = %e,
            "could not save Google credentials"
        ),
    }
}
