//! init command - Create a gitkv store

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::config::{CheckSection, Config, ConfigFile, StoreSection};
use crate::core::paths::StorePaths;
use crate::git::Git;
use crate::store::RefHolderPool;

/// Create a bare repository at `--repo` and write its config.
///
/// Values given here are merged into an existing repository config.
///
/// # Arguments
///
/// * `ctx` - Execution context
/// * `default_branch` - Branch used when no `--ref` is given
/// * `cache_capacity` - Per-ref cache size
/// * `test_ref` - Ref validated by `gitkv check --test`
pub fn init(
    ctx: &Context,
    default_branch: Option<String>,
    cache_capacity: Option<usize>,
    test_ref: Option<String>,
) -> Result<()> {
    let git = Git::init_bare(&ctx.repo)
        .with_context(|| format!("failed to create repository at {}", ctx.repo.display()))?;
    let git_dir = git.git_dir().to_path_buf();
    let config_path = StorePaths::new(&git_dir).repo_config_path();
    let already_initialized = config_path.exists();

    let mut file = Config::load_from(None, Some(&git_dir))
        .context("failed to read existing config")?
        .repo
        .unwrap_or_default();

    if default_branch.is_some() || cache_capacity.is_some() {
        let store = file.store.get_or_insert_with(StoreSection::default);
        if default_branch.is_some() {
            store.default_branch = default_branch;
        }
        if cache_capacity.is_some() {
            store.cache_capacity = cache_capacity;
        }
    }
    if test_ref.is_some() {
        file.check = Some(CheckSection { test_ref });
    }

    if !already_initialized || file != ConfigFile::default() {
        Config::write_repo(&git_dir, &file).context("failed to write config")?;
    }

    // Fails if another process is serving the store.
    let config = Config::load(Some(&git_dir))?;
    RefHolderPool::open(&git_dir, &config).context("failed to open store")?;

    if !ctx.quiet {
        if already_initialized {
            println!("Updated gitkv store at {}", git_dir.display());
        } else {
            println!("Initialized gitkv store at {}", git_dir.display());
        }
    }
    Ok(())
}
