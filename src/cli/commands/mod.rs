//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Opens the store and picks the ref's holder
//! 3. Formats and displays output
//!
//! The store is async. Handlers are plain functions that build a tokio
//! runtime and block on the async part, so the dispatch stays synchronous.

mod branch;
mod check;
mod init;
mod key;
mod user;

pub use branch::{create as branch_create, delete as branch_delete};
pub use check::check;
pub use init::init;
pub use key::{delete, get, list, meta, put};
pub use user::{add as user_add, delete as user_delete, get as user_get, update as user_update};

use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};

use super::args::{BranchAction, Command, UserAction};
use super::Context;
use crate::core::config::Config;
use crate::git::Git;
use crate::store::{Outcome, RefHolder, RefHolderPool};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Init {
            default_branch,
            cache_capacity,
            test_ref,
        } => init::init(ctx, default_branch, cache_capacity, test_ref),
        Command::Get { key, info } => key::get(ctx, &key, info),
        Command::Put {
            key,
            file,
            data,
            content_type,
            version,
        } => key::put(
            ctx,
            &key,
            file.as_deref(),
            data.as_deref(),
            content_type.as_deref(),
            version.as_deref(),
        ),
        Command::Delete { key, version } => key::delete(ctx, &key, &version),
        Command::List { prefix, recursive } => key::list(ctx, &prefix, recursive),
        Command::Meta {
            key,
            content_type,
            hidden,
            protected,
            version,
        } => key::meta(
            ctx,
            &key,
            content_type.as_deref(),
            hidden,
            protected,
            version.as_deref(),
        ),
        Command::Branch { action } => match action {
            BranchAction::Create { name, from } => branch::create(ctx, &name, from.as_deref()),
            BranchAction::Delete { names } => branch::delete(ctx, &names),
        },
        Command::User { action } => match action {
            UserAction::Add {
                name,
                password,
                roles,
            } => user::add(ctx, &name, &password, roles),
            UserAction::Get { name } => user::get(ctx, &name),
            UserAction::Update {
                name,
                roles,
                password,
                version,
            } => user::update(ctx, &name, roles, password.as_deref(), &version),
            UserAction::Delete { name, version } => user::delete(ctx, &name, &version),
        },
        Command::Check { all, test } => check::check(ctx, all, test),
    }
}

/// Run an async block to completion on a fresh runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    Ok(rt.block_on(future))
}

/// Open the store named by `--repo` with its layered config.
fn open_pool(ctx: &Context) -> Result<RefHolderPool> {
    let git = Git::open(&ctx.repo)
        .with_context(|| format!("no repository at {}", ctx.repo.display()))?;
    let config = Config::load(Some(git.git_dir())).context("failed to load config")?;
    RefHolderPool::open(git.git_dir(), &config).context("failed to open store")
}

/// Holder of the ref named by `--ref`, or of the default branch.
fn ref_holder(ctx: &Context, pool: &RefHolderPool) -> Result<Arc<dyn RefHolder>> {
    let name = match &ctx.refname {
        Some(name) => name.clone(),
        None => pool.default_ref()?.to_string(),
    };
    Ok(pool.holder(&name)?)
}

/// Unwrap a claimed operation or fail with a retry hint.
fn claimed<T>(outcome: Outcome<T>, what: &str) -> Result<T> {
    match outcome {
        Outcome::Done(value) => Ok(value),
        Outcome::FailedToLock => {
            bail!("{what} is being modified by another operation; retry")
        }
    }
}
