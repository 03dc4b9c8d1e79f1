//! Command implementations.

pub mod account;
#[cfg(feature = "google")]
pub mod auth;
pub mod config;
pub mod meetings;
pub mod records;
pub mod watch;

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use serde::Serialize;

use crate::backend::{Backend, BackendOptions};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::output::{self, RenderOptions, Renderer};

/// Everything a command needs from the command line and config file.
#[derive(Debug)]
pub struct Context {
    pub config: ClientConfig,
    /// File the config was (or would be) loaded from.
    pub config_path: PathBuf,
    pub json: bool,
    pub renderer: Renderer,
    pub backend_options: BackendOptions,
}

impl Context {
    pub fn new(
        config: ClientConfig,
        config_path: PathBuf,
        json: bool,
        render_options: RenderOptions,
        backend_options: BackendOptions,
    ) -> Self {
        Self {
            config,
            config_path,
            json,
            renderer: Renderer::new(render_options),
            backend_options,
        }
    }

    pub fn backend(&self) -> ClientResult<Backend> {
        Backend::from_config(&self.config, self.backend_options.clone())
    }

    /// Prints `value` as JSON in `--json` mode, `text` otherwise.
    pub fn emit<T: Serialize + ?Sized>(
        &self,
        value: &T,
        text: impl FnOnce() -> String,
    ) -> ClientResult<()> {
        if self.json {
            println!("{}", output::to_json(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

/// Reads one line from stdin after printing `prompt` to stderr.
///
/// Used for passwords and journal text that were not given as flags.
pub(crate) fn read_line(prompt: &str) -> ClientResult<String> {
    if std::io::stdin().is_terminal() {
        eprint!("{}", prompt);
        std::io::stderr().flush()?;
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line.is_empty() {
        let name = prompt.trim_end_matches([':', ' ']);
        return Err(ClientError::Input(format!("{} was empty", name)));
    }
    Ok(line)
}

/// Takes the flag value, or asks for it on stdin.
pub(crate) fn value_or_prompt(value: Option<String>, prompt: &str) -> ClientResult<String> {
    match value {
        Some(v) => Ok(v),
        None => read_line(prompt),
    }
}
