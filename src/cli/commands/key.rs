//! Key commands: get, put, delete, list, meta.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context as _, Result};

use super::{block_on, claimed, open_pool, ref_holder};
use crate::cli::Context;
use crate::core::metadata::MetaData;
use crate::core::types::{Oid, StoreKey};
use crate::store::StoreError;

/// Print a key's data, or its versions and metadata with `info`.
pub fn get(ctx: &Context, key: &str, info: bool) -> Result<()> {
    let key = StoreKey::new(key)?;
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;

    block_on(async {
        let Some(found) = holder.read_key(&key).await? else {
            bail!("key '{key}' not found");
        };

        if info {
            if let Some(version) = found.data_version() {
                println!("version: {version}");
            }
            match found.metadata_version() {
                Some(version) => println!("metadata-version: {version}"),
                None => println!("metadata-version: (default)"),
            }
            let meta = found.metadata();
            println!("content-type: {}", meta.content_type);
            println!("protected: {}", meta.protected);
            for header in &meta.headers {
                println!("header: {}: {}", header.name, header.value);
            }
            if !meta.read_roles.is_empty() {
                println!("read-roles: {}", join(&meta.read_roles));
            }
            if !meta.write_roles.is_empty() {
                println!("write-roles: {}", join(&meta.write_roles));
            }
            return Ok(());
        }

        let Some(source) = found.data_source() else {
            bail!("'{key}' is a directory key; use --info to see its metadata");
        };
        let bytes = source.fetch().await?;
        let mut out = std::io::stdout().lock();
        out.write_all(&bytes)?;
        out.flush()?;
        Ok::<(), anyhow::Error>(())
    })?
}

/// Create a key, or update it when `version` is given.
pub fn put(
    ctx: &Context,
    key: &str,
    file: Option<&Path>,
    data: Option<&str>,
    content_type: Option<&str>,
    version: Option<&str>,
) -> Result<()> {
    let key = StoreKey::new(key)?;
    let bytes = match (file, data) {
        (Some(path), _) => std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, Some(data)) => data.as_bytes().to_vec(),
        (None, None) => bail!("pass --file or --data"),
    };
    let old_version = version.map(Oid::new).transpose()?;
    if old_version.is_some() && content_type.is_some() {
        bail!("--content-type only applies to new keys; use `gitkv meta` to change it");
    }
    let commit = ctx.commit(&format!("gitkv put {key}"))?;
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;

    let new_version = block_on(async {
        let outcome = match &old_version {
            Some(old) => holder.update_key(&key, bytes, old, commit).await?,
            None => {
                let metadata = content_type.map(MetaData::new);
                holder.add_key(&key, bytes, metadata, commit).await?
            }
        };
        claimed(outcome, &format!("key '{key}'"))
    })??;

    if ctx.quiet {
        println!("{new_version}");
    } else if old_version.is_some() {
        println!("Updated {key} at {new_version}");
    } else {
        println!("Created {key} at {new_version}");
    }
    Ok(())
}

/// Delete a key at a known version.
pub fn delete(ctx: &Context, key: &str, version: &str) -> Result<()> {
    let key = StoreKey::new(key)?;
    let old_version = Oid::new(version)?;
    let commit = ctx.commit(&format!("gitkv delete {key}"))?;
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;

    let commit_id = block_on(async {
        let outcome = holder.delete_key(&key, &old_version, commit).await?;
        claimed(outcome, &format!("key '{key}'"))
    })??;

    if ctx.quiet {
        println!("{commit_id}");
    } else {
        println!("Deleted {key} in commit {}", commit_id.short(8));
    }
    Ok(())
}

/// List visible keys below a directory.
pub fn list(ctx: &Context, prefix: &str, recursive: bool) -> Result<()> {
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;
    let keys = block_on(holder.get_list(prefix, recursive))??;
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

/// Write a key's own metadata, starting from what readers currently see.
pub fn meta(
    ctx: &Context,
    key: &str,
    content_type: Option<&str>,
    hidden: Option<bool>,
    protected: Option<bool>,
    version: Option<&str>,
) -> Result<()> {
    let key = StoreKey::new(key)?;
    let old_version = version.map(Oid::new).transpose()?;
    let commit = ctx.commit(&format!("gitkv meta {key}"))?;
    let pool = open_pool(ctx)?;
    let holder = ref_holder(ctx, &pool)?;

    let new_version = block_on(async {
        let current = match holder.read_key(&key).await {
            Ok(found) => found.map(|info| info.metadata().clone()),
            // Metadata may be the first thing written to a new ref.
            Err(StoreError::Load { .. }) => None,
            Err(err) => return Err(err.into()),
        };

        let mut metadata = current.unwrap_or_default();
        if let Some(content_type) = content_type {
            metadata.content_type = content_type.to_string();
        }
        if let Some(hidden) = hidden {
            metadata.hidden = hidden;
        }
        if let Some(protected) = protected {
            metadata.protected = protected;
        }

        let outcome = holder
            .update_metadata(&key, metadata, old_version.as_ref(), commit)
            .await?;
        claimed(outcome, &format!("key '{key}'"))
    })??;

    if ctx.quiet {
        println!("{new_version}");
    } else {
        println!("Wrote metadata of {key} at {new_version}");
    }
    Ok(())
}

fn join(roles: &std::collections::BTreeSet<String>) -> String {
    roles.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
