//! CLI, configuration, backend selection and output rendering
//!
//! This crate provides the `daybook` command-line interface.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
