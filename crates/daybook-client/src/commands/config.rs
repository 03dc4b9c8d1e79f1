//! `daybook config`: inspect the configuration file.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::ConfigAction;
use crate::commands::Context;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
#[cfg(any(feature = "google", feature = "supabase"))]
use crate::secret::SecretRef;

pub fn run(ctx: &Context, action: ConfigAction) -> ClientResult<()> {
    match action {
        ConfigAction::Dump => dump(ctx),
        ConfigAction::Validate => validate(ctx),
        ConfigAction::Path => path(ctx),
    }
}

/// Prints the effective configuration with plain secrets masked.
fn dump(ctx: &Context) -> ClientResult<()> {
    let config = redacted(&ctx.config);
    if ctx.json {
        return ctx.emit(&config, String::new);
    }
    let toml_str = toml::to_string_pretty(&config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# {}", ctx.config_path.display());
    println!("{}", toml_str);
    Ok(())
}

fn validate(ctx: &Context) -> ClientResult<()> {
    let checked = check(&ctx.config)?;
    for line in &checked {
        println!("{}", line);
    }
    println!("Configuration is valid.");
    Ok(())
}

fn path(ctx: &Context) -> ClientResult<()> {
    let paths = paths(ctx);
    if ctx.json {
        return ctx.emit(&paths, String::new);
    }
    for entry in &paths {
        println!("{:<8} {}", format!("{}:", entry.name), entry.path.display());
    }
    Ok(())
}

/// A copy of `config` that is safe to print.
fn redacted(config: &ClientConfig) -> ClientConfig {
    #[allow(unused_mut)]
    let mut config = config.clone();

    #[cfg(feature = "google")]
    if let Some(ref mut google) = config.google {
        google.client_secret = google
            .client_secret
            .as_deref()
            .map(|s| SecretRef::parse(s).redacted());
    }

    #[cfg(feature = "supabase")]
    if let Some(ref mut supabase) = config.supabase {
        supabase.anon_key = supabase
            .anon_key
            .as_deref()
            .map(|s| SecretRef::parse(s).redacted());
    }

    config
}

/// Checks every configured section, resolving secret references.
///
/// Returns one line per section that passed.
fn check(config: &ClientConfig) -> ClientResult<Vec<String>> {
    #[allow(unused_mut)]
    let mut passed = Vec::new();

    #[cfg(feature = "google")]
    if let Some(ref google) = config.google {
        if google.calendar_ids.is_empty() {
            return Err(ClientError::Config(
                "[google] calendar_ids must not be empty".to_string(),
            ));
        }
        if google.client_id.is_some() || google.client_secret.is_some() {
            google
                .to_provider_config()
                .map_err(|e| ClientError::Config(format!("invalid Google credentials: {}", e)))?;
            passed.push("Google credentials are valid.".to_string());
        }
    }

    #[cfg(feature = "supabase")]
    if let Some(ref supabase) = config.supabase
        && (supabase.url.is_some() || supabase.anon_key.is_some())
    {
        supabase
            .to_provider_config()
            .map_err(|e| ClientError::Config(format!("invalid Supabase settings: {}", e)))?;
        passed.push("Supabase settings are valid.".to_string());
    }

    if config.offline.enabled {
        passed.push(format!(
            "Offline mode is on; records are kept in {}.",
            config.offline.data_path().display()
        ));
    }

    Ok(passed)
}

#[derive(Debug, Serialize)]
struct PathEntry {
    name: &'static str,
    path: PathBuf,
}

/// Files daybook reads or writes.
fn paths(ctx: &Context) -> Vec<PathEntry> {
    let config = &ctx.config;
    #[allow(unused_mut)]
    let mut entries = vec![
        PathEntry {
            name: "config",
            path: ctx.config_path.clone(),
        },
        PathEntry {
            name: "data",
            path: ClientConfig::default_data_dir(),
        },
        PathEntry {
            name: "offline",
            path: config.offline.data_path(),
        },
    ];

    #[cfg(feature = "google")]
    entries.push(PathEntry {
        name: "token",
        path: config
            .google
            .as_ref()
            .and_then(|g| g.token_path.clone())
            .unwrap_or_else(|| {
                daybook_providers::google::GoogleConfig::default_token_path("default")
            }),
    });

    #[cfg(feature = "supabase")]
    entries.push(PathEntry {
        name: "session",
        path: config
            .supabase
            .as_ref()
            .and_then(|s| s.session_path.clone())
            .unwrap_or_else(daybook_providers::supabase::SupabaseConfig::default_session_path),
    });

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOptions;
    use crate::output::RenderOptions;

    fn context(config: ClientConfig) -> Context {
        Context::new(
            config,
            PathBuf::from("/tmp/daybook/config.toml"),
            false,
            RenderOptions::default(),
            BackendOptions::default(),
        )
    }

    #[cfg(all(feature = "google", feature = "supabase"))]
    mod dump {
        use super::*;

        #[test]
        fn plain_secrets_are_masked() {
            let config = ClientConfig::parse(
                r#"
[google]
client_id = "id.apps.googleusercontent.com"
client_secret = "GOCSPX-abcdef1234"

[supabase]
url = "https://abcd.supabase.co"
anon_key = "env::SUPABASE_ANON_KEY"
"#,
            )
            .unwrap();

            let shown = redacted(&config);
            let google = shown.google.unwrap();
            assert_eq!(google.client_id.as_deref(), Some("id.apps.googleusercontent.com"));
            assert_eq!(google.client_secret.as_deref(), Some("****1234"));
            assert_eq!(
                shown.supabase.unwrap().anon_key.as_deref(),
                Some("env::SUPABASE_ANON_KEY")
            );
        }
    }

    mod validate {
        use super::*;

        #[test]
        fn empty_config_is_valid() {
            assert!(check(&ClientConfig::default()).unwrap().is_empty());
        }

        #[cfg(feature = "google")]
        #[test]
        fn empty_calendar_list_is_rejected() {
            let config = ClientConfig::parse("[google]\ncalendar_ids = []\n").unwrap();
            let err = check(&config).unwrap_err();
            assert!(err.to_string().contains("calendar_ids"));
        }

        #[cfg(feature = "supabase")]
        #[test]
        fn bad_supabase_url_is_rejected() {
            let config =
                ClientConfig::parse("[supabase]\nurl = \"not a url\"\nanon_key = \"key\"\n")
                    .unwrap();
            assert!(matches!(check(&config), Err(ClientError::Config(_))));
        }

        #[test]
        fn offline_mode_is_reported() {
            let config =
                ClientConfig::parse("[offline]\nenabled = true\ndata_path = \"/tmp/x.json\"\n")
                    .unwrap();
            let lines = check(&config).unwrap();
            assert_eq!(
                lines,
                vec!["Offline mode is on; records are kept in /tmp/x.json.".to_string()]
            );
        }
    }

    #[test]
    fn path_listing_starts_with_config() {
        let ctx = context(ClientConfig::default());
        let entries = paths(&ctx);
        assert_eq!(entries[0].name, "config");
        assert_eq!(entries[0].path, PathBuf::from("/tmp/daybook/config.toml"));
        assert!(entries.iter().any(|e| e.name == "offline"));
    }
}
