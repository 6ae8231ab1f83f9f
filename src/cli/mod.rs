//! cli
//!
//! Command-line interface layer for gitkv.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to a
//! [`crate::store::RefHolderPool`] opened for the one command. All state
//! changes flow through the pool's ref holders.

pub mod args;
pub mod commands;

pub use args::Cli;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::metadata::CommitMetaData;
use args::IdentityArgs;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Repository to operate on.
    pub repo: PathBuf,
    /// Ref given with `--ref`.
    pub refname: Option<String>,
    pub debug: bool,
    pub quiet: bool,
    pub identity: IdentityArgs,
}

impl Context {
    /// Commit metadata for a mutation, with `default_message` when no
    /// `--message` was given.
    pub fn commit(&self, default_message: &str) -> Result<CommitMetaData> {
        let author = self
            .identity
            .author
            .as_deref()
            .context("no author: pass --author or set GITKV_AUTHOR")?;
        let email = self
            .identity
            .email
            .as_deref()
            .context("no email: pass --email or set GITKV_EMAIL")?;
        let message = self.identity.message.as_deref().unwrap_or(default_message);

        let mut meta = CommitMetaData::new(author, email, message)?;
        if let Some(proxy) = &self.identity.proxy {
            meta = meta.with_proxy(proxy.clone());
        }
        Ok(meta)
    }
}

/// Install the log subscriber.
///
/// `GITKV_LOG` wins; otherwise `--debug` selects debug and the default is
/// warnings only.
fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("GITKV_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let ctx = Context {
        repo: cli.repo,
        refname: cli.refname,
        debug: cli.debug,
        quiet: cli.quiet,
        identity: cli.identity,
    };

    commands::dispatch(cli.command, &ctx)
}
