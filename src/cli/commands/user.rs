//! User commands.

use anyhow::{bail, Result};

use super::{block_on, claimed, open_pool, ref_holder};
use crate::cli::Context;
use crate::core::types::Oid;

pub fn add(ctx: &Context, name: &str, password: &str, roles: Vec<String>) -> Result<()> {
    let commit = ctx.commit(&format!("gitkv user add {name}"))?;
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;

    let version = block_on(async {
        let outcome = holder
            .add_user(name, password, roles.into_iter().collect(), commit)
            .await?;
        claimed(outcome, &format!("user '{name}'"))
    })??;
    report(ctx, "Added", name, &version);
    Ok(())
}

pub fn get(ctx: &Context, name: &str) -> Result<()> {
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;

    let Some((version, user)) = block_on(holder.get_user(name))?? else {
        bail!("user '{name}' not found");
    };
    println!("name: {}", user.name);
    println!("version: {version}");
    let roles: Vec<&str> = user.roles.iter().map(String::as_str).collect();
    println!("roles: {}", roles.join(", "));
    Ok(())
}

/// Replace a user's roles; the password changes only if one is given.
pub fn update(
    ctx: &Context,
    name: &str,
    roles: Vec<String>,
    password: Option<&str>,
    version: &str,
) -> Result<()> {
    let old_version = Oid::new(version)?;
    let commit = ctx.commit(&format!("gitkv user update {name}"))?;
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;

    let version = block_on(async {
        let outcome = holder
            .update_user(name, roles.into_iter().collect(), password, &old_version, commit)
            .await?;
        claimed(outcome, &format!("user '{name}'"))
    })??;
    report(ctx, "Updated", name, &version);
    Ok(())
}

pub fn delete(ctx: &Context, name: &str, version: &str) -> Result<()> {
    let old_version = Oid::new(version)?;
    let commit = ctx.commit(&format!("gitkv user delete {name}"))?;
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;

    let commit_id = block_on(async {
        let outcome = holder.delete_user(name, &old_version, commit).await?;
        claimed(outcome, &format!("user '{name}'"))
    })??;
    report(ctx, "Deleted", name, &commit_id);
    Ok(())
}

fn report(ctx: &Context, action: &str, name: &str, version: &Oid) {
    if ctx.quiet {
        println!("{version}");
    } else {
        println!("{action} user {name} at {version}");
    }
}
