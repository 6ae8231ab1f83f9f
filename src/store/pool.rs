//! store::pool
//!
//! Owner of every [`RefHolder`] of a repository.
//!
//! Holders are created on first access and reused after that. Branches get a
//! [`BranchRefHolder`]; tags get a [`TagRefHolder`]. The pool also holds the
//! repository's process lock, so only one pool per repository can exist
//! across all processes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::config::Config;
use crate::core::ops::lock::RepoLock;
use crate::core::paths::StorePaths;
use crate::core::types::RefName;
use crate::git::{Git, RepoHandle};

use super::checker::SourceChecker;
use super::error::StoreResult;
use super::holder::{BranchRefHolder, RefHolder, TagRefHolder};
use super::lock_service::{EngineSettings, LockService};
use super::updater;
use super::writer::run_blocking;

/// Pooled holders of one repository.
pub struct RefHolderPool {
    handle: RepoHandle,
    settings: EngineSettings,
    default_branch: String,
    test_ref: Option<String>,
    holders: Mutex<HashMap<RefName, Arc<dyn RefHolder>>>,
    _lock: RepoLock,
}

impl std::fmt::Debug for RefHolderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefHolderPool")
            .field("git_dir", &self.handle.git_dir())
            .field("holders", &self.holders.lock().len())
            .finish()
    }
}

impl RefHolderPool {
    /// Open an existing repository.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`](super::StoreError::Io) if there is no repository
    /// - [`StoreError::Lock`](super::StoreError::Lock) if another process
    ///   has it open
    pub fn open(git_dir: &Path, config: &Config) -> StoreResult<Self> {
        let git = Git::open(git_dir)?;
        let lock = RepoLock::acquire(&StorePaths::new(git.git_dir()))?;
        info!(git_dir = %git.git_dir().display(), "opened store");

        Ok(Self {
            handle: git.handle(),
            settings: EngineSettings::from_config(config),
            default_branch: config.default_branch(),
            test_ref: config.test_ref(),
            holders: Mutex::new(HashMap::new()),
            _lock: lock,
        })
    }

    /// Create a bare repository (if needed) and open it.
    pub fn init(git_dir: &Path, config: &Config) -> StoreResult<Self> {
        if Git::open(git_dir).is_err() {
            Git::init_bare(git_dir)?;
            info!(git_dir = %git_dir.display(), "initialized repository");
        }
        Self::open(git_dir, config)
    }

    pub fn git_dir(&self) -> &Path {
        self.handle.git_dir()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Full ref of the configured default branch.
    pub fn default_ref(&self) -> StoreResult<RefName> {
        Ok(RefName::parse(&self.default_branch)?)
    }

    /// Holder of a ref, created on first use.
    ///
    /// Short names are branches; pass `refs/tags/<name>` for a tag.
    pub fn holder(&self, name: &str) -> StoreResult<Arc<dyn RefHolder>> {
        let refname = RefName::parse(name)?;
        let mut holders = self.holders.lock();
        if let Some(holder) = holders.get(&refname) {
            return Ok(Arc::clone(holder));
        }

        let service = LockService::new(self.handle.clone(), refname.clone(), self.settings.clone())?;
        let holder: Arc<dyn RefHolder> = if refname.is_tag_ref() {
            Arc::new(TagRefHolder::new(service))
        } else {
            Arc::new(BranchRefHolder::new(service))
        };
        debug!(refname = %refname, read_only = holder.is_read_only(), "created holder");
        holders.insert(refname, Arc::clone(&holder));
        Ok(holder)
    }

    /// Refs that currently have a holder.
    pub fn open_refs(&self) -> Vec<RefName> {
        let mut refs: Vec<_> = self.holders.lock().keys().cloned().collect();
        refs.sort();
        refs
    }

    /// Point a new branch at the current commit of `base`.
    ///
    /// Returns `false` if the branch already existed; it is left where it
    /// was.
    pub async fn create_branch(&self, name: &str, base: &str) -> StoreResult<bool> {
        let name = RefName::parse(name)?;
        let base = RefName::parse(base)?;
        run_blocking(self.handle.clone(), move |git| {
            updater::create_ref(git, &name, &base)
        })
        .await
    }

    /// Force-delete refs and shut down their holders.
    ///
    /// Returns the refs that existed.
    pub async fn delete_refs(&self, names: &[&str]) -> StoreResult<Vec<RefName>> {
        let refs = names
            .iter()
            .map(|name| RefName::parse(name))
            .collect::<Result<Vec<_>, _>>()?;

        {
            let mut holders = self.holders.lock();
            for refname in &refs {
                if let Some(holder) = holders.remove(refname) {
                    holder.close();
                }
            }
        }

        run_blocking(self.handle.clone(), move |git| updater::delete_refs(git, &refs)).await
    }

    /// Tell the holder of a ref that the ref moved outside the store.
    ///
    /// `None` if the ref has no holder; it will read fresh state when one
    /// is created.
    pub fn reload(&self, name: &str) -> StoreResult<Option<JoinHandle<()>>> {
        let refname = RefName::parse(name)?;
        let holder = self.holders.lock().get(&refname).cloned();
        Ok(holder.map(|holder| holder.reload()))
    }

    /// A checker over this repository.
    pub fn checker(&self) -> StoreResult<SourceChecker> {
        let test_ref = self.test_ref.as_deref().map(RefName::parse).transpose()?;
        Ok(SourceChecker::new(self.handle.clone(), test_ref))
    }

    /// Shut down every holder.
    pub fn close(&self) {
        let holders: Vec<_> = self.holders.lock().drain().collect();
        for (refname, holder) in holders {
            debug!(refname = %refname, "closing holder");
            holder.close();
        }
    }
}

impl Drop for RefHolderPool {
    fn drop(&mut self) {
        self.close();
    }
}
