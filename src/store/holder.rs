//! store::holder
//!
//! The per-ref entry points callers use.
//!
//! A [`RefHolder`] turns each call into an [`ActionData`] for mutations or a
//! cached lookup for reads. Branch holders do both; tag holders only read.
//!
//! # Example
//!
//! ```ignore
//! let holder = pool.holder("main")?;
//! let key = StoreKey::new("settings/theme")?;
//! let commit = CommitMetaData::new("Ada", "ada@example.com", "set theme")?;
//!
//! match holder.add_key(&key, b"dark".to_vec(), None, commit).await? {
//!     Outcome::Done(version) => println!("stored at {version}"),
//!     Outcome::FailedToLock => println!("busy, retry"),
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::core::metadata::{CommitMetaData, MetaData};
use crate::core::paths::user_path;
use crate::core::types::{Oid, RefName, StoreKey};
use crate::core::user::UserData;

use super::action::ActionData;
use super::error::{Outcome, StoreError, StoreResult};
use super::info::StoreInfo;
use super::lock_service::{GlobalScope, LockService, ReadScope};

/// Pre-check or post-step of a global block.
pub type GlobalCheck = Box<dyn FnOnce(&GlobalScope<'_>) -> StoreResult<()> + Send>;

/// Body of a global block; returns the versions it produced.
pub type GlobalAction = Box<dyn FnOnce(&GlobalScope<'_>) -> StoreResult<Vec<Oid>> + Send>;

/// A read ordered with the ref's writes.
pub type ReadAction = Box<dyn FnOnce(&ReadScope<'_>) -> StoreResult<Vec<Option<StoreInfo>>> + Send>;

/// Operations on one ref.
#[async_trait]
pub trait RefHolder: Send + Sync {
    fn refname(&self) -> &RefName;

    /// Whether every mutation is refused.
    fn is_read_only(&self) -> bool;

    /// Create a data key. `metadata = None` inherits from the enclosing
    /// directories. Resolves to the data version.
    async fn add_key(
        &self,
        key: &StoreKey,
        data: Vec<u8>,
        metadata: Option<MetaData>,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>>;

    /// Replace a key's data. Resolves to the new data version.
    async fn update_key(
        &self,
        key: &StoreKey,
        data: Vec<u8>,
        old_version: &Oid,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>>;

    /// Remove a key. Resolves to the id of the commit that removed it.
    async fn delete_key(
        &self,
        key: &StoreKey,
        old_version: &Oid,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>>;

    /// Write a key's own metadata (a directory's master metadata for `dir/`
    /// keys). Resolves to the new metadata version.
    async fn update_metadata(
        &self,
        key: &StoreKey,
        metadata: MetaData,
        old_version: Option<&Oid>,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>>;

    async fn add_user(
        &self,
        name: &str,
        password: &str,
        roles: BTreeSet<String>,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>>;

    /// Replace a user's roles and, if given, password.
    async fn update_user(
        &self,
        name: &str,
        roles: BTreeSet<String>,
        password: Option<&str>,
        old_version: &Oid,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>>;

    async fn delete_user(
        &self,
        name: &str,
        old_version: &Oid,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>>;

    async fn get_user(&self, name: &str) -> StoreResult<Option<(Oid, UserData)>>;

    async fn read_key(&self, key: &StoreKey) -> StoreResult<Option<StoreInfo>>;

    /// Visible keys below a directory (`""` for the root).
    async fn get_list(&self, prefix: &str, recursive: bool) -> StoreResult<Vec<String>>;

    /// Drop cached state after the ref moved outside this holder.
    fn reload(&self) -> JoinHandle<()>;

    async fn is_empty(&self) -> StoreResult<bool>;

    /// Run `pre`, `action` and `post` while holding the whole ref.
    async fn enqueue_and_block(
        &self,
        pre: GlobalCheck,
        action: GlobalAction,
        post: GlobalCheck,
    ) -> StoreResult<Outcome<Vec<Oid>>>;

    /// Run a read ordered with the ref's writes.
    async fn enqueue_and_read_block(&self, read: ReadAction) -> StoreResult<Vec<Option<StoreInfo>>>;

    /// Stop the ref's writer.
    fn close(&self);
}

fn list_prefix(prefix: &str) -> StoreResult<String> {
    if prefix.is_empty() {
        return Ok(String::new());
    }
    let dir = if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    };
    StoreKey::new(dir.as_str())?;
    Ok(dir)
}

/// Holder of a branch.
#[derive(Debug, Clone)]
pub struct BranchRefHolder {
    service: Arc<LockService>,
}

impl BranchRefHolder {
    pub fn new(service: Arc<LockService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<LockService> {
        &self.service
    }
}

#[async_trait]
impl RefHolder for BranchRefHolder {
    fn refname(&self) -> &RefName {
        self.service.refname()
    }

    fn is_read_only(&self) -> bool {
        false
    }

    async fn add_key(
        &self,
        key: &StoreKey,
        data: Vec<u8>,
        metadata: Option<MetaData>,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.service
            .fire_event(ActionData::AddKey {
                key: key.clone(),
                data,
                metadata,
                commit,
            })
            .await
    }

    async fn update_key(
        &self,
        key: &StoreKey,
        data: Vec<u8>,
        old_version: &Oid,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.service
            .fire_event(ActionData::UpdateKey {
                key: key.clone(),
                data,
                old_version: old_version.clone(),
                commit,
            })
            .await
    }

    async fn delete_key(
        &self,
        key: &StoreKey,
        old_version: &Oid,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.service
            .fire_event(ActionData::DeleteKey {
                key: key.clone(),
                old_version: old_version.clone(),
                commit,
            })
            .await
    }

    async fn update_metadata(
        &self,
        key: &StoreKey,
        metadata: MetaData,
        old_version: Option<&Oid>,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        metadata.validate().map_err(|source| StoreError::Metadata {
            path: key.to_string(),
            source,
        })?;
        self.service
            .fire_event(ActionData::UpdateMetaKey {
                key: key.clone(),
                metadata,
                old_version: old_version.cloned(),
                commit,
            })
            .await
    }

    async fn add_user(
        &self,
        name: &str,
        password: &str,
        roles: BTreeSet<String>,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        let user = UserData::new(name, password, roles)?;
        let existing = match self.service.get_user(name).await {
            Ok(existing) => existing,
            // The first write creates the ref.
            Err(StoreError::Load { .. }) => None,
            Err(err) => return Err(err),
        };
        if existing.is_some() {
            return Err(StoreError::KeyAlreadyExist {
                key: user_path(name),
            });
        }
        self.service
            .fire_event(ActionData::AddUser { user, commit })
            .await
    }

    async fn update_user(
        &self,
        name: &str,
        roles: BTreeSet<String>,
        password: Option<&str>,
        old_version: &Oid,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        let (current_version, current) =
            self.service
                .get_user(name)
                .await?
                .ok_or_else(|| StoreError::UserNotFound {
                    name: name.to_string(),
                })?;
        if &current_version != old_version {
            return Err(StoreError::VersionIsNotSame {
                key: user_path(name),
                expected: old_version.to_string(),
                actual: Some(current_version),
            });
        }
        let user = current.merged(roles, password);
        self.service
            .fire_event(ActionData::UpdateUser {
                user,
                old_version: old_version.clone(),
                commit,
            })
            .await
    }

    async fn delete_user(
        &self,
        name: &str,
        old_version: &Oid,
        commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.service
            .fire_event(ActionData::DeleteUser {
                name: name.to_string(),
                old_version: old_version.clone(),
                commit,
            })
            .await
    }

    async fn get_user(&self, name: &str) -> StoreResult<Option<(Oid, UserData)>> {
        self.service.get_user(name).await
    }

    async fn read_key(&self, key: &StoreKey) -> StoreResult<Option<StoreInfo>> {
        self.service.read_key(key).await
    }

    async fn get_list(&self, prefix: &str, recursive: bool) -> StoreResult<Vec<String>> {
        let prefix = list_prefix(prefix)?;
        self.service.get_list(&prefix, recursive).await
    }

    fn reload(&self) -> JoinHandle<()> {
        self.service.reload()
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        self.service.is_empty().await
    }

    async fn enqueue_and_block(
        &self,
        pre: GlobalCheck,
        action: GlobalAction,
        post: GlobalCheck,
    ) -> StoreResult<Outcome<Vec<Oid>>> {
        self.service
            .fire_global(pre, action, move |scope, _versions| post(scope))
            .await
    }

    async fn enqueue_and_read_block(&self, read: ReadAction) -> StoreResult<Vec<Option<StoreInfo>>> {
        self.service.fire_read(read).await
    }

    fn close(&self) {
        self.service.close();
    }
}

/// Holder of a tag. Reads like a branch; refuses every mutation.
#[derive(Debug, Clone)]
pub struct TagRefHolder {
    service: Arc<LockService>,
}

impl TagRefHolder {
    pub fn new(service: Arc<LockService>) -> Self {
        Self { service }
    }

    fn immutable<T>(&self) -> StoreResult<T> {
        Err(StoreError::TagImmutable {
            refname: self.service.refname().to_string(),
        })
    }
}

#[async_trait]
impl RefHolder for TagRefHolder {
    fn refname(&self) -> &RefName {
        self.service.refname()
    }

    fn is_read_only(&self) -> bool {
        true
    }

    async fn add_key(
        &self,
        _key: &StoreKey,
        _data: Vec<u8>,
        _metadata: Option<MetaData>,
        _commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.immutable()
    }

    async fn update_key(
        &self,
        _key: &StoreKey,
        _data: Vec<u8>,
        _old_version: &Oid,
        _commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.immutable()
    }

    async fn delete_key(
        &self,
        _key: &StoreKey,
        _old_version: &Oid,
        _commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.immutable()
    }

    async fn update_metadata(
        &self,
        _key: &StoreKey,
        _metadata: MetaData,
        _old_version: Option<&Oid>,
        _commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.immutable()
    }

    async fn add_user(
        &self,
        _name: &str,
        _password: &str,
        _roles: BTreeSet<String>,
        _commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.immutable()
    }

    async fn update_user(
        &self,
        _name: &str,
        _roles: BTreeSet<String>,
        _password: Option<&str>,
        _old_version: &Oid,
        _commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.immutable()
    }

    async fn delete_user(
        &self,
        _name: &str,
        _old_version: &Oid,
        _commit: CommitMetaData,
    ) -> StoreResult<Outcome<Oid>> {
        self.immutable()
    }

    async fn get_user(&self, name: &str) -> StoreResult<Option<(Oid, UserData)>> {
        self.service.get_user(name).await
    }

    async fn read_key(&self, key: &StoreKey) -> StoreResult<Option<StoreInfo>> {
        self.service.read_key(key).await
    }

    async fn get_list(&self, prefix: &str, recursive: bool) -> StoreResult<Vec<String>> {
        let prefix = list_prefix(prefix)?;
        self.service.get_list(&prefix, recursive).await
    }

    fn reload(&self) -> JoinHandle<()> {
        self.service.reload()
    }

    async fn is_empty(&self) -> StoreResult<bool> {
        self.service.is_empty().await
    }

    async fn enqueue_and_block(
        &self,
        _pre: GlobalCheck,
        _action: GlobalAction,
        _post: GlobalCheck,
    ) -> StoreResult<Outcome<Vec<Oid>>> {
        self.immutable()
    }

    async fn enqueue_and_read_block(&self, read: ReadAction) -> StoreResult<Vec<Option<StoreInfo>>> {
        self.service.fire_read(read).await
    }

    fn close(&self) {
        self.service.close();
    }
}
