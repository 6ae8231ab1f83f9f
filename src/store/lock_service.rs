//! store::lock_service
//!
//! Claims, cache and write dispatch of one ref.
//!
//! # Claims
//!
//! A claim marks an in-flight operation. Two families exist:
//!
//! - **Per-key** ([`LockService::fire_event`]): fails at once with
//!   [`Outcome::FailedToLock`] if the key or the whole ref is claimed.
//!   Otherwise the action is queued on the ref's writer and the claim is
//!   released when the writer finishes it, whether it succeeded or not.
//! - **Global** ([`LockService::fire_global`]): fails at once if any claim
//!   exists, then holds the ref for a pre-check, an action and a post-step.
//!
//! Claiming happens when `fire_*` is called, not when its future is first
//! polled, so two calls made back to back always contend.
//!
//! # Reads
//!
//! Reads consult the cache and fall back to the extractor on the blocking
//! pool. They never wait for the writer. A missing ref fails the read with
//! [`StoreError::Load`]; other object store failures surface as
//! [`StoreError::Io`]. Neither is cached.
//!
//! # Reload
//!
//! [`LockService::reload`] swaps in an empty cache and re-reads, in the
//! background, every key the old cache had found. Keys the old cache knew to
//! be absent are left to load lazily.

use std::collections::HashSet;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::core::config::Config;
use crate::core::types::{Oid, RefName, StoreKey};
use crate::core::user::UserData;
use crate::git::{Git, RepoHandle};

use super::action::{ActionData, ClaimKey};
use super::cache::{CacheKey, KeyCache};
use super::error::{Outcome, StoreError, StoreResult};
use super::extractor::{Head, SourceExtractor};
use super::info::StoreInfo;
use super::updater::{Committer, SourceUpdater};
use super::writer::{run_blocking, RepoWriter};

/// Engine settings shared by every ref of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub cache_capacity: usize,
    pub committer: Committer,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_capacity: config.cache_capacity(),
            committer: Committer::new(config.committer_name(), config.committer_email()),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Default)]
struct ClaimMap {
    held: Mutex<HashSet<ClaimKey>>,
}

impl ClaimMap {
    fn try_claim(self: &Arc<Self>, key: ClaimKey) -> Option<ClaimGuard> {
        let mut held = self.held.lock();
        let blocked = held.contains(&ClaimKey::Global)
            || held.contains(&key)
            || (key == ClaimKey::Global && !held.is_empty());
        if blocked {
            return None;
        }
        held.insert(key.clone());
        Some(ClaimGuard {
            map: Arc::clone(self),
            key,
        })
    }

    fn is_held(&self, key: &ClaimKey) -> bool {
        self.held.lock().contains(key)
    }
}

/// Releases its claim when dropped.
struct ClaimGuard {
    map: Arc<ClaimMap>,
    key: ClaimKey,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.map.held.lock().remove(&self.key);
        trace!(claim = %self.key, "released");
    }
}

/// Read access to a ref from inside its writer.
///
/// Lookups go straight to the head tree, so they see every commit queued
/// before the current job.
pub struct ReadScope<'a> {
    service: &'a LockService,
    git: &'a Git,
}

impl<'a> ReadScope<'a> {
    pub fn git(&self) -> &Git {
        self.git
    }

    pub fn refname(&self) -> &RefName {
        &self.service.refname
    }

    pub fn head(&self) -> StoreResult<Option<Head>> {
        SourceExtractor::new(self.git).head(&self.service.refname)
    }

    pub fn read_key(&self, key: &StoreKey) -> StoreResult<Option<StoreInfo>> {
        let head = self.head()?;
        SourceExtractor::new(self.git).resolve_key(head.as_ref().map(|h| &h.tree), key)
    }

    pub fn get_user(&self, name: &str) -> StoreResult<Option<(Oid, UserData)>> {
        let head = self.head()?;
        SourceExtractor::new(self.git).read_user(head.as_ref().map(|h| &h.tree), name)
    }
}

/// Access to a ref while holding its global claim.
///
/// Actions applied here skip the per-key claims; the global claim already
/// excludes every other writer.
pub struct GlobalScope<'a> {
    read: ReadScope<'a>,
}

impl GlobalScope<'_> {
    /// Run a mutation and return its version.
    pub fn apply(&self, action: ActionData) -> StoreResult<Oid> {
        self.read.service.invoke(self.read.git, action)
    }
}

impl<'a> Deref for GlobalScope<'a> {
    type Target = ReadScope<'a>;

    fn deref(&self) -> &Self::Target {
        &self.read
    }
}

/// Per-ref claims, cache and writer.
#[derive(Debug)]
pub struct LockService {
    refname: RefName,
    handle: RepoHandle,
    settings: EngineSettings,
    writer: RepoWriter,
    claims: Arc<ClaimMap>,
    cache: RwLock<Arc<KeyCache>>,
}

impl LockService {
    pub fn new(handle: RepoHandle, refname: RefName, settings: EngineSettings) -> StoreResult<Arc<Self>> {
        let writer = RepoWriter::spawn(&handle, refname.clone())?;
        let cache = Arc::new(KeyCache::new(settings.cache_capacity));
        Ok(Arc::new(Self {
            refname,
            handle,
            settings,
            writer,
            claims: Arc::new(ClaimMap::default()),
            cache: RwLock::new(cache),
        }))
    }

    pub fn refname(&self) -> &RefName {
        &self.refname
    }

    fn cache(&self) -> Arc<KeyCache> {
        Arc::clone(&self.cache.read())
    }

    /// Whether a claim is currently held.
    pub fn is_claimed(&self, key: &ClaimKey) -> bool {
        self.claims.is_held(key)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Claim the action's key and queue it on the writer.
    ///
    /// Resolves to the new version, or [`Outcome::FailedToLock`] without
    /// doing anything if the claim was taken.
    pub fn fire_event(
        self: &Arc<Self>,
        action: ActionData,
    ) -> impl Future<Output = StoreResult<Outcome<Oid>>> + Send + 'static {
        let claim = action.claim_key();
        let pending = match self.claims.try_claim(claim.clone()) {
            Some(guard) => {
                debug!(refname = %self.refname, %claim, operation = action.operation(), "claimed");
                let service = Arc::clone(self);
                Some(self.writer.submit(move |git| {
                    let _guard = guard;
                    service.invoke(git, action)
                }))
            }
            None => {
                debug!(refname = %self.refname, %claim, "failed to lock");
                None
            }
        };

        async move {
            match pending {
                Some(result) => result.await.map(Outcome::Done),
                None => Ok(Outcome::FailedToLock),
            }
        }
    }

    /// Hold the whole ref for `pre`, `action` and `post`, in that order.
    ///
    /// A failing step skips the rest; the claim is released either way.
    pub fn fire_global<T, P, A, Q>(
        self: &Arc<Self>,
        pre: P,
        action: A,
        post: Q,
    ) -> impl Future<Output = StoreResult<Outcome<T>>> + Send + 'static
    where
        T: Send + 'static,
        P: FnOnce(&GlobalScope<'_>) -> StoreResult<()> + Send + 'static,
        A: FnOnce(&GlobalScope<'_>) -> StoreResult<T> + Send + 'static,
        Q: FnOnce(&GlobalScope<'_>, &T) -> StoreResult<()> + Send + 'static,
    {
        let pending = match self.claims.try_claim(ClaimKey::Global) {
            Some(guard) => {
                debug!(refname = %self.refname, "claimed globally");
                let service = Arc::clone(self);
                Some(self.writer.submit(move |git| {
                    let _guard = guard;
                    let scope = GlobalScope {
                        read: ReadScope {
                            service: service.as_ref(),
                            git,
                        },
                    };
                    pre(&scope)?;
                    let value = action(&scope)?;
                    post(&scope, &value)?;
                    Ok(value)
                }))
            }
            None => {
                debug!(refname = %self.refname, "failed to lock globally");
                None
            }
        };

        async move {
            match pending {
                Some(result) => result.await.map(Outcome::Done),
                None => Ok(Outcome::FailedToLock),
            }
        }
    }

    /// Run a read on the writer, ordered with the ref's writes, without
    /// taking any claim.
    pub fn fire_read<T, F>(self: &Arc<Self>, read: F) -> impl Future<Output = StoreResult<T>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce(&ReadScope<'_>) -> StoreResult<T> + Send + 'static,
    {
        let service = Arc::clone(self);
        self.writer.submit(move |git| {
            read(&ReadScope {
                service: service.as_ref(),
                git,
            })
        })
    }

    /// Dispatch an action to its mutation and keep the cache in step.
    ///
    /// The cache is looked up only after the commit lands, so a reload that
    /// swapped caches meanwhile receives the write and never warms over it
    /// with the older head.
    fn invoke(&self, git: &Git, action: ActionData) -> StoreResult<Oid> {
        let updater = SourceUpdater::new(git, &self.refname, &self.settings.committer);

        match action {
            ActionData::AddKey {
                key,
                data,
                metadata,
                commit,
            } => {
                let applied = updater.add_key(&key, data, metadata.as_ref(), &commit)?;
                let cache = self.cache();
                self.refresh_key(git, &cache, &applied.head, &key);
                Ok(applied.version)
            }
            ActionData::UpdateKey {
                key,
                data,
                old_version,
                commit,
            } => {
                let applied = updater.update_key(&key, data, &old_version, &commit)?;
                let cache = self.cache();
                self.refresh_key(git, &cache, &applied.head, &key);
                Ok(applied.version)
            }
            ActionData::DeleteKey {
                key,
                old_version,
                commit,
            } => {
                let applied = updater.delete_key(&key, &old_version, &commit)?;
                let cache = self.cache();
                if key.is_directory() {
                    cache.invalidate_prefix(key.as_str());
                }
                cache.put_key(key.as_str(), None);
                Ok(applied.version)
            }
            ActionData::UpdateMetaKey {
                key,
                metadata,
                old_version,
                commit,
            } => {
                let applied =
                    updater.update_metadata(&key, &metadata, old_version.as_ref(), &commit)?;
                let cache = self.cache();
                if key.is_directory() {
                    cache.invalidate_prefix(key.as_str());
                }
                self.refresh_key(git, &cache, &applied.head, &key);
                Ok(applied.version)
            }
            ActionData::AddUser { user, commit } => {
                let applied = updater.add_user(&user, &commit)?;
                let cache = self.cache();
                let name = user.name.clone();
                cache.put_user(&name, Some((applied.version.clone(), user)));
                Ok(applied.version)
            }
            ActionData::UpdateUser {
                user,
                old_version,
                commit,
            } => {
                let applied = updater.update_user(&user, &old_version, &commit)?;
                let cache = self.cache();
                let name = user.name.clone();
                cache.put_user(&name, Some((applied.version.clone(), user)));
                Ok(applied.version)
            }
            ActionData::DeleteUser {
                name,
                old_version,
                commit,
            } => {
                let applied = updater.delete_user(&name, &old_version, &commit)?;
                let cache = self.cache();
                cache.put_user(&name, None);
                Ok(applied.version)
            }
        }
    }

    fn refresh_key(&self, git: &Git, cache: &KeyCache, head: &Head, key: &StoreKey) {
        match SourceExtractor::new(git).resolve_key(Some(&head.tree), key) {
            Ok(info) => cache.put_key(key.as_str(), info),
            Err(err) => {
                warn!(refname = %self.refname, %key, error = %err, "could not refresh cached key");
                cache.invalidate(&CacheKey::Key(key.as_str().to_string()));
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Visible value of a key.
    pub async fn read_key(&self, key: &StoreKey) -> StoreResult<Option<StoreInfo>> {
        let cache = self.cache();
        if let Some(info) = cache.key_entry(key.as_str()) {
            trace!(refname = %self.refname, %key, "cache hit");
            return Ok(info);
        }

        debug!(refname = %self.refname, %key, "cache miss");
        let refname = self.refname.clone();
        let lookup = key.clone();
        let loaded = run_blocking(self.handle.clone(), move |git| {
            let extractor = SourceExtractor::new(git);
            let head = extractor.head_for_read(&refname)?;
            extractor.resolve_key(head.as_ref().map(|h| &h.tree), &lookup)
        })
        .await?;
        Ok(cache.load_key(key.as_str(), loaded))
    }

    /// A user record and its version.
    pub async fn get_user(&self, name: &str) -> StoreResult<Option<(Oid, UserData)>> {
        let cache = self.cache();
        if let Some(user) = cache.user_entry(name) {
            trace!(refname = %self.refname, user = name, "cache hit");
            return Ok(user);
        }

        debug!(refname = %self.refname, user = name, "cache miss");
        let refname = self.refname.clone();
        let lookup = name.to_string();
        let loaded = run_blocking(self.handle.clone(), move |git| {
            let extractor = SourceExtractor::new(git);
            let head = extractor.head_for_read(&refname)?;
            extractor.read_user(head.as_ref().map(|h| &h.tree), &lookup)
        })
        .await?;
        Ok(cache.load_user(name, loaded))
    }

    /// Visible keys below a directory prefix (`""` is the root).
    pub async fn get_list(&self, prefix: &str, recursive: bool) -> StoreResult<Vec<String>> {
        let refname = self.refname.clone();
        let prefix = prefix.to_string();
        run_blocking(self.handle.clone(), move |git| {
            let extractor = SourceExtractor::new(git);
            match extractor.head_for_read(&refname)? {
                Some(head) => Ok(extractor.extract_all(&head.tree)?.list(&prefix, recursive)),
                None => Ok(Vec::new()),
            }
        })
        .await
    }

    /// Whether the ref is missing or holds no data keys.
    pub async fn is_empty(&self) -> StoreResult<bool> {
        let refname = self.refname.clone();
        run_blocking(self.handle.clone(), move |git| {
            let extractor = SourceExtractor::new(git);
            match extractor.head(&refname)? {
                Some(head) => Ok(!extractor.extract_all(&head.tree)?.has_data()),
                None => Ok(true),
            }
        })
        .await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Swap in a fresh cache and warm it with what the old one had found.
    ///
    /// Must be called from within a tokio runtime. The returned handle
    /// completes once warming is done; dropping it lets warming continue.
    pub fn reload(self: &Arc<Self>) -> JoinHandle<()> {
        let fresh = Arc::new(KeyCache::new(self.settings.cache_capacity));
        let old = std::mem::replace(&mut *self.cache.write(), fresh);
        let warm = old.present_keys();
        old.close();
        info!(refname = %self.refname, warming = warm.len(), "reloaded");

        let service = Arc::clone(self);
        tokio::spawn(async move {
            for slot in warm {
                let result = match &slot {
                    CacheKey::Key(path) => match StoreKey::new(path.as_str()) {
                        Ok(key) => service.read_key(&key).await.map(drop),
                        Err(err) => Err(err.into()),
                    },
                    CacheKey::User(name) => service.get_user(name).await.map(drop),
                };
                if let Err(err) = result {
                    debug!(refname = %service.refname, ?slot, error = %err, "warming failed");
                }
            }
        })
    }

    /// Stop the writer. Queued actions still run; new ones fail with
    /// [`StoreError::WriterClosed`].
    pub fn close(&self) {
        self.writer.close();
        self.cache().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{CommitMetaData, MetaData};
    use crate::core::user::UserData;
    use tempfile::TempDir;

    fn service() -> (TempDir, Arc<LockService>) {
        let temp = TempDir::new().unwrap();
        Git::init_bare(temp.path()).unwrap();
        let service = LockService::new(
            RepoHandle::new(temp.path()),
            RefName::new("refs/heads/main").unwrap(),
            EngineSettings::default(),
        )
        .unwrap();
        (temp, service)
    }

    fn commit() -> CommitMetaData {
        CommitMetaData::new("Ada", "ada@example.com", "change").unwrap()
    }

    fn add(key: &str, data: &str) -> ActionData {
        ActionData::AddKey {
            key: StoreKey::new(key).unwrap(),
            data: data.as_bytes().to_vec(),
            metadata: Some(MetaData::new("text/plain")),
            commit: commit(),
        }
    }

    #[test]
    fn claim_rules() {
        let map = Arc::new(ClaimMap::default());
        let a = map.try_claim(ClaimKey::Key("a".into())).unwrap();
        assert!(map.try_claim(ClaimKey::Key("a".into())).is_none());
        assert!(map.try_claim(ClaimKey::Global).is_none());
        let b = map.try_claim(ClaimKey::Key("b".into())).unwrap();
        drop(a);
        drop(b);

        let global = map.try_claim(ClaimKey::Global).unwrap();
        assert!(map.try_claim(ClaimKey::Key("a".into())).is_none());
        assert!(map.try_claim(ClaimKey::User("a".into())).is_none());
        drop(global);
        assert!(!map.is_held(&ClaimKey::Global));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn same_key_contends() {
        let (_temp, service) = service();
        let first = service.fire_event(add("k", "1"));
        let second = service.fire_event(add("k", "2"));

        assert!(second.await.unwrap().is_failed_to_lock());
        let version = first.await.unwrap().done().unwrap();
        assert!(!service.is_claimed(&ClaimKey::Key("k".into())));

        let info = service
            .read_key(&StoreKey::new("k").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.data_version(), Some(&version));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_action_releases_claim() {
        let (_temp, service) = service();
        let err = service
            .fire_event(ActionData::DeleteKey {
                key: StoreKey::new("missing").unwrap(),
                old_version: Oid::zero(),
                commit: commit(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyNotFound { .. }));
        assert!(!service.is_claimed(&ClaimKey::Key("missing".into())));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn global_excludes_keys() {
        let (_temp, service) = service();
        let (release, wait) = std::sync::mpsc::channel::<()>();

        let global = service.fire_global(
            move |_scope| {
                let _ = wait.recv();
                Ok(())
            },
            |scope| scope.apply(add("g", "1")),
            |_scope, _version| Ok(()),
        );
        assert!(service
            .fire_event(add("k", "1"))
            .await
            .unwrap()
            .is_failed_to_lock());
        assert!(service
            .fire_global(|_| Ok(()), |_| Ok(()), |_, _| Ok(()))
            .await
            .unwrap()
            .is_failed_to_lock());

        release.send(()).unwrap();
        assert!(global.await.unwrap().done().is_some());
        assert!(service.fire_event(add("k", "1")).await.unwrap().done().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn read_of_missing_ref_is_load_error() {
        let (_temp, service) = service();
        let err = service
            .read_key(&StoreKey::new("k").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Load { .. }));
        assert!(service.is_empty().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn directory_metadata_cascades_to_cached_children() {
        let (_temp, service) = service();
        service
            .fire_event(ActionData::AddKey {
                key: StoreKey::new("d/x").unwrap(),
                data: b"1".to_vec(),
                metadata: None,
                commit: commit(),
            })
            .await
            .unwrap();
        let child = StoreKey::new("d/x").unwrap();
        let before = service.read_key(&child).await.unwrap().unwrap();
        assert_eq!(before.metadata().content_type, "application/octet-stream");

        service
            .fire_event(ActionData::UpdateMetaKey {
                key: StoreKey::new("d/").unwrap(),
                metadata: MetaData::new("application/json"),
                old_version: None,
                commit: commit(),
            })
            .await
            .unwrap();
        let after = service.read_key(&child).await.unwrap().unwrap();
        assert_eq!(after.metadata().content_type, "application/json");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fire_read_sees_queued_writes() {
        let (_temp, service) = service();
        let write = service.fire_event(add("k", "1"));
        let read = service.fire_read(|scope| scope.read_key(&StoreKey::new("k").unwrap()));
        assert!(read.await.unwrap().is_some());
        write.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reload_warms_present_entries_only() {
        let (_temp, service) = service();
        service.fire_event(add("k", "1")).await.unwrap();
        service
            .fire_event(ActionData::AddUser {
                user: UserData::new("bob", "pw", ["reader"]).unwrap(),
                commit: commit(),
            })
            .await
            .unwrap();
        assert!(service
            .read_key(&StoreKey::new("missing").unwrap())
            .await
            .unwrap()
            .is_none());
        assert!(service.get_user("ghost").await.unwrap().is_none());

        let old = service.cache();
        assert!(matches!(old.key_entry("missing"), Some(None)));
        assert!(matches!(old.user_entry("ghost"), Some(None)));

        service.reload().await.unwrap();

        let fresh = service.cache();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(matches!(fresh.key_entry("k"), Some(Some(_))));
        assert!(matches!(fresh.user_entry("bob"), Some(Some(_))));
        assert!(fresh.key_entry("missing").is_none());
        assert!(fresh.user_entry("ghost").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_during_reload_lands_in_the_new_cache() {
        let (_temp, service) = service();
        let k = StoreKey::new("k").unwrap();
        let v1 = service.fire_event(add("k", "1")).await.unwrap().done().unwrap();
        assert!(service.read_key(&k).await.unwrap().is_some());

        // Reload from inside the ref's global hold, right before the write
        // commits, while warming re-reads `k` from the older head.
        let runtime = tokio::runtime::Handle::current();
        let reloading = Arc::clone(&service);
        let (warm_tx, warm_rx) = std::sync::mpsc::channel();
        let v2 = service
            .fire_global(
                move |_: &GlobalScope<'_>| {
                    let _entered = runtime.enter();
                    let _ = warm_tx.send(reloading.reload());
                    Ok(())
                },
                move |scope: &GlobalScope<'_>| {
                    scope.apply(ActionData::UpdateKey {
                        key: StoreKey::new("k").unwrap(),
                        data: b"2".to_vec(),
                        old_version: v1,
                        commit: commit(),
                    })
                },
                |_: &GlobalScope<'_>, _: &Oid| Ok(()),
            )
            .await
            .unwrap()
            .done()
            .unwrap();
        warm_rx.recv().unwrap().await.unwrap();

        let cached = service.cache().key_entry("k").unwrap().unwrap();
        assert_eq!(cached.data_version(), Some(&v2));
        let read = service.read_key(&k).await.unwrap().unwrap();
        assert_eq!(read.data_version(), Some(&v2));
    }
}
