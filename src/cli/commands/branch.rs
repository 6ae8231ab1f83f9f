//! Branch commands.

use anyhow::Result;

use super::{block_on, open_pool};
use crate::cli::Context;

/// Create `name` at the current commit of `from` (default branch if unset).
///
/// Creating a branch that exists is not an error; it stays where it is.
pub fn create(ctx: &Context, name: &str, from: Option<&str>) -> Result<()> {
    let pool = open_pool(ctx)?;
    let base = match from {
        Some(base) => base.to_string(),
        None => pool.default_ref()?.to_string(),
    };

    let created = block_on(pool.create_branch(name, &base))??;
    if !ctx.quiet {
        if created {
            println!("Created branch {name} from {base}");
        } else {
            println!("Branch {name} already exists");
        }
    }
    Ok(())
}

/// Force-delete branches.
pub fn delete(ctx: &Context, names: &[String]) -> Result<()> {
    let pool = open_pool(ctx)?;
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let deleted = block_on(pool.delete_refs(&names))??;

    if !ctx.quiet {
        for refname in &deleted {
            println!("Deleted {}", refname.short_name());
        }
        let missing = names.len() - deleted.len();
        if missing > 0 {
            println!("{missing} ref(s) did not exist");
        }
    }
    Ok(())
}
