//! store::updater
//!
//! Builds commits against a ref.
//!
//! # Algorithm
//!
//! Every mutation is a batch of `path -> Some(content)` (write) or
//! `path -> None` (delete) changes:
//!
//! 1. Each written path gets a fresh blob and an index entry.
//! 2. Each deleted path is marked handled and gets nothing.
//! 3. Every blob of the current head tree whose path was not handled is
//!    copied into the index unchanged.
//! 4. The index is written as a tree and committed on top of the head.
//! 5. The ref moves by compare-and-swap from the head it was built on.
//!
//! A CAS outcome outside fast-forward, forced, new and no-change means the
//! ref moved underneath the writer. That is reported as
//! [`StoreError::UpdateFailed`] and never retried.
//!
//! The key-level operations (`add_key`, `update_key`, ...) check their
//! preconditions against the head they are about to build on, so a check
//! and its commit always see the same tree.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use crate::core::metadata::{CommitMetaData, MetaData};
use crate::core::paths::{ancestor_dirs, data_path, metadata_path, user_path};
use crate::core::types::{Oid, RefName, StoreKey, UtcTimestamp};
use crate::core::user::UserData;
use crate::git::{EntryKind, Git, Identity, IndexItem, FILE_MODE};

use super::error::{StoreError, StoreResult};
use super::extractor::{Head, SourceExtractor};

/// The synthetic identity that commits on behalf of callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Committer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Committer signature naming the operation, e.g. `gitkv addKey`.
    pub fn identity(&self, operation: &str) -> Identity {
        Identity {
            name: format!("{} {}", self.name, operation),
            email: self.email.clone(),
            time: UtcTimestamp::now(),
        }
    }
}

/// A successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The version handed back to the caller.
    pub version: Oid,
    /// The ref's head after the commit.
    pub head: Head,
}

/// One path of a change batch; `None` deletes.
pub type Change = (String, Option<Vec<u8>>);

/// Commits changes to one ref.
pub struct SourceUpdater<'a> {
    git: &'a Git,
    refname: &'a RefName,
    committer: &'a Committer,
}

impl<'a> SourceUpdater<'a> {
    pub fn new(git: &'a Git, refname: &'a RefName, committer: &'a Committer) -> Self {
        Self {
            git,
            refname,
            committer,
        }
    }

    fn extractor(&self) -> SourceExtractor<'a> {
        SourceExtractor::new(self.git)
    }

    /// Current head, `None` for a ref that does not exist yet.
    pub fn head(&self) -> StoreResult<Option<Head>> {
        self.extractor().head(self.refname)
    }

    /// Commit a change batch on top of `parent` and move the ref.
    ///
    /// Returns the new head and the blob written for each path.
    pub fn commit(
        &self,
        parent: Option<&Head>,
        changes: Vec<Change>,
        meta: &CommitMetaData,
        operation: &str,
    ) -> StoreResult<(Head, HashMap<String, Oid>)> {
        let mtime = meta.timestamp().epoch_seconds();
        let mut entries = Vec::new();
        let mut handled = HashSet::new();
        let mut blobs = HashMap::new();

        for (path, content) in changes {
            if let Some(bytes) = content {
                let oid = self.git.write_blob(&bytes)?;
                entries.push(IndexItem {
                    path: path.clone(),
                    oid: oid.clone(),
                    mode: FILE_MODE,
                    size: u32::try_from(bytes.len()).unwrap_or(u32::MAX),
                    mtime,
                });
                blobs.insert(path.clone(), oid);
            }
            handled.insert(path);
        }

        if let Some(head) = parent {
            for item in self.git.walk_tree(&head.tree)? {
                if handled.contains(&item.path) {
                    continue;
                }
                entries.push(IndexItem {
                    path: item.path,
                    oid: item.oid,
                    mode: item.mode as u32,
                    size: 0,
                    mtime: 0,
                });
            }
        }

        let tree = self.git.write_tree_from_entries(&entries)?;
        let author = Identity {
            name: meta.user().to_string(),
            email: meta.mail().to_string(),
            time: meta.timestamp(),
        };
        let committer = self.committer.identity(operation);
        let parents: Vec<&Oid> = parent.map(|head| &head.commit).into_iter().collect();
        let commit =
            self.git
                .write_commit(&tree, &parents, &author, &committer, &meta.full_message())?;

        let outcome = self.git.update_ref_cas(
            self.refname.as_str(),
            &commit,
            parent.map(|head| &head.commit),
            &format!("gitkv: {operation}"),
        );
        if !outcome.is_accepted() {
            error!(
                refname = %self.refname,
                %outcome,
                operation,
                "ref moved outside the writer"
            );
            return Err(StoreError::UpdateFailed {
                refname: self.refname.to_string(),
                outcome,
            });
        }

        debug!(
            refname = %self.refname,
            commit = %commit.short(8),
            %outcome,
            operation,
            "committed"
        );
        Ok((Head { commit, tree }, blobs))
    }

    /// Reject keys whose path would collide with an existing blob or subtree.
    ///
    /// A tree cannot hold `a` as both a blob and a directory, so a plain
    /// key blocks every key below it and a non-empty directory blocks the
    /// plain key of the same name.
    fn check_placement(&self, head: Option<&Head>, key: &StoreKey) -> StoreResult<()> {
        let Some(head) = head else {
            return Ok(());
        };
        let plain = key.plain_name();
        for dir in ancestor_dirs(plain) {
            let Some(dir) = dir.strip_suffix('/') else {
                continue;
            };
            if self.git.path_kind(&head.tree, dir)? == Some(EntryKind::Blob) {
                return Err(StoreError::KeyAlreadyExist {
                    key: dir.to_string(),
                });
            }
        }

        let clash = if key.is_directory() {
            EntryKind::Blob
        } else {
            EntryKind::Tree
        };
        if self.git.path_kind(&head.tree, plain)? == Some(clash) {
            return Err(StoreError::KeyAlreadyExist {
                key: key.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn metadata_json(metadata: &MetaData, key: &StoreKey) -> StoreResult<Vec<u8>> {
        metadata
            .to_canonical_json()
            .map(String::into_bytes)
            .map_err(|source| StoreError::Metadata {
                path: metadata_path(key),
                source,
            })
    }

    fn written(blobs: &HashMap<String, Oid>, path: &str) -> StoreResult<Oid> {
        blobs.get(path).cloned().ok_or_else(|| StoreError::KeyNotFound {
            key: path.to_string(),
        })
    }

    // =========================================================================
    // Key mutations
    // =========================================================================

    /// Create a data key. Returns its data version.
    ///
    /// A hidden key counts as absent and is overwritten, metadata included.
    pub fn add_key(
        &self,
        key: &StoreKey,
        data: Vec<u8>,
        metadata: Option<&MetaData>,
        meta: &CommitMetaData,
    ) -> StoreResult<Applied> {
        if key.is_directory() {
            return Err(StoreError::InvalidKey(crate::core::types::TypeError::InvalidKey(
                format!("'{key}' is a directory key and cannot hold data"),
            )));
        }

        let head = self.head()?;
        let tree = head.as_ref().map(|h| &h.tree);
        if self.extractor().resolve_key(tree, key)?.is_some() {
            return Err(StoreError::KeyAlreadyExist {
                key: key.to_string(),
            });
        }
        self.check_placement(head.as_ref(), key)?;

        let path = data_path(key);
        let mut changes: Vec<Change> = vec![(path.clone(), Some(data))];
        // Without metadata of its own the key inherits, so a stale sidecar
        // left by a hidden or orphaned predecessor must go.
        let sidecar = match metadata {
            Some(metadata) => Some(Self::metadata_json(metadata, key)?),
            None => None,
        };
        changes.push((metadata_path(key), sidecar));

        let (head, blobs) = self.commit(head.as_ref(), changes, meta, "addKey")?;
        Ok(Applied {
            version: Self::written(&blobs, &path)?,
            head,
        })
    }

    /// Replace a key's data. Returns the new data version.
    pub fn update_key(
        &self,
        key: &StoreKey,
        data: Vec<u8>,
        old_version: &Oid,
        meta: &CommitMetaData,
    ) -> StoreResult<Applied> {
        let head = self.head()?;
        self.check_writable(head.as_ref(), key, old_version)?;

        let path = data_path(key);
        let (head, blobs) =
            self.commit(head.as_ref(), vec![(path.clone(), Some(data))], meta, "updateKey")?;
        Ok(Applied {
            version: Self::written(&blobs, &path)?,
            head,
        })
    }

    /// Remove a key's data and its own metadata. Returns the new commit id.
    pub fn delete_key(
        &self,
        key: &StoreKey,
        old_version: &Oid,
        meta: &CommitMetaData,
    ) -> StoreResult<Applied> {
        let head = self.head()?;
        self.check_writable(head.as_ref(), key, old_version)?;

        let mut changes: Vec<Change> = vec![(metadata_path(key), None)];
        if !key.is_directory() {
            changes.push((data_path(key), None));
        }
        let (head, _) = self.commit(head.as_ref(), changes, meta, "deleteKey")?;
        Ok(Applied {
            version: head.commit.clone(),
            head,
        })
    }

    fn check_writable(&self, head: Option<&Head>, key: &StoreKey, old_version: &Oid) -> StoreResult<()> {
        let current = self
            .extractor()
            .resolve_key(head.map(|h| &h.tree), key)?
            .ok_or_else(|| StoreError::KeyNotFound {
                key: key.to_string(),
            })?;
        if current.metadata().protected {
            return Err(StoreError::KeyProtected {
                key: key.to_string(),
            });
        }
        if current.version() != Some(old_version) {
            return Err(StoreError::VersionIsNotSame {
                key: key.to_string(),
                expected: old_version.to_string(),
                actual: current.version().cloned(),
            });
        }
        Ok(())
    }

    /// Write a key's own metadata. Returns the new metadata version.
    ///
    /// On a directory key this writes its master metadata, creating the
    /// directory key if needed. `old_version` must match the key's own
    /// metadata blob (`None` when it has none).
    pub fn update_metadata(
        &self,
        key: &StoreKey,
        metadata: &MetaData,
        old_version: Option<&Oid>,
        meta: &CommitMetaData,
    ) -> StoreResult<Applied> {
        let head = self.head()?;
        self.check_placement(head.as_ref(), key)?;

        let pair = match &head {
            Some(h) => self.extractor().extract_key(&h.tree, key)?,
            None => None,
        };
        if !key.is_directory() && pair.as_ref().and_then(|p| p.data.as_ref()).is_none() {
            return Err(StoreError::KeyNotFound {
                key: key.to_string(),
            });
        }
        let current = pair
            .as_ref()
            .and_then(|p| p.own_metadata())
            .map(|blob| blob.oid.clone());
        if current.as_ref() != old_version {
            return Err(StoreError::VersionIsNotSame {
                key: key.to_string(),
                expected: old_version.map(Oid::to_string).unwrap_or_default(),
                actual: current,
            });
        }

        let path = metadata_path(key);
        let json = Self::metadata_json(metadata, key)?;
        let (head, blobs) =
            self.commit(head.as_ref(), vec![(path.clone(), Some(json))], meta, "updateMetadata")?;
        Ok(Applied {
            version: Self::written(&blobs, &path)?,
            head,
        })
    }

    // =========================================================================
    // User mutations
    // =========================================================================

    fn user_version(&self, head: Option<&Head>, name: &str) -> StoreResult<Option<Oid>> {
        Ok(self
            .extractor()
            .read_user(head.map(|h| &h.tree), name)?
            .map(|(version, _)| version))
    }

    fn check_user_version(&self, head: Option<&Head>, name: &str, old_version: &Oid) -> StoreResult<()> {
        match self.user_version(head, name)? {
            None => Err(StoreError::UserNotFound {
                name: name.to_string(),
            }),
            Some(current) if &current != old_version => Err(StoreError::VersionIsNotSame {
                key: user_path(name),
                expected: old_version.to_string(),
                actual: Some(current),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Store a new user record. Returns its version.
    pub fn add_user(&self, user: &UserData, meta: &CommitMetaData) -> StoreResult<Applied> {
        let head = self.head()?;
        if self.user_version(head.as_ref(), &user.name)?.is_some() {
            return Err(StoreError::KeyAlreadyExist {
                key: user_path(&user.name),
            });
        }
        self.write_user(head.as_ref(), user, meta, "addUser")
    }

    /// Replace a user record. Returns its new version.
    pub fn update_user(
        &self,
        user: &UserData,
        old_version: &Oid,
        meta: &CommitMetaData,
    ) -> StoreResult<Applied> {
        let head = self.head()?;
        self.check_user_version(head.as_ref(), &user.name, old_version)?;
        self.write_user(head.as_ref(), user, meta, "updateUser")
    }

    /// Remove a user record. Returns the new commit id.
    pub fn delete_user(&self, name: &str, old_version: &Oid, meta: &CommitMetaData) -> StoreResult<Applied> {
        let head = self.head()?;
        self.check_user_version(head.as_ref(), name, old_version)?;
        let (head, _) = self.commit(head.as_ref(), vec![(user_path(name), None)], meta, "deleteUser")?;
        Ok(Applied {
            version: head.commit.clone(),
            head,
        })
    }

    fn write_user(
        &self,
        head: Option<&Head>,
        user: &UserData,
        meta: &CommitMetaData,
        operation: &str,
    ) -> StoreResult<Applied> {
        let path = user_path(&user.name);
        let json = user.to_json()?.into_bytes();
        let (head, blobs) = self.commit(head, vec![(path.clone(), Some(json))], meta, operation)?;
        Ok(Applied {
            version: Self::written(&blobs, &path)?,
            head,
        })
    }
}

// =============================================================================
// Ref management
// =============================================================================

/// Point `name` at the current target of `base`.
///
/// Returns `false` without moving anything if `name` already exists.
///
/// # Errors
///
/// [`StoreError::RefNotFound`] if `base` does not exist.
pub fn create_ref(git: &Git, name: &RefName, base: &RefName) -> StoreResult<bool> {
    if git.ref_exists(name.as_str()) {
        debug!(refname = %name, "ref already exists");
        return Ok(false);
    }
    let target = git
        .try_resolve_ref(base.as_str())?
        .ok_or_else(|| StoreError::RefNotFound {
            refname: base.to_string(),
        })?;
    let created = git.create_ref(name.as_str(), &target, &format!("gitkv: create from {base}"))?;
    if created {
        info!(refname = %name, base = %base, target = %target.short(8), "created ref");
    }
    Ok(created)
}

/// Force-delete refs. Returns the ones that existed.
pub fn delete_refs(git: &Git, names: &[RefName]) -> StoreResult<Vec<RefName>> {
    let mut deleted = Vec::new();
    for name in names {
        if git.delete_ref(name.as_str())? {
            info!(refname = %name, "deleted ref");
            deleted.push(name.clone());
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        git: Git,
        refname: RefName,
        committer: Committer,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let git = Git::init_bare(temp.path()).unwrap();
            Self {
                _temp: temp,
                git,
                refname: RefName::new("refs/heads/main").unwrap(),
                committer: Committer::new("gitkv", "gitkv@localhost"),
            }
        }

        fn updater(&self) -> SourceUpdater<'_> {
            SourceUpdater::new(&self.git, &self.refname, &self.committer)
        }
    }

    fn meta() -> CommitMetaData {
        CommitMetaData::new("Ada", "ada@example.com", "change").unwrap()
    }

    fn key(k: &str) -> StoreKey {
        StoreKey::new(k).unwrap()
    }

    mod commit {
        use super::*;

        #[test]
        fn first_commit_creates_ref() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let (head, blobs) = updater
                .commit(None, vec![("a".into(), Some(b"1".to_vec()))], &meta(), "addKey")
                .unwrap();
            assert_eq!(fx.git.resolve_ref("refs/heads/main").unwrap(), head.commit);
            assert!(blobs.contains_key("a"));
            assert!(fx.git.commit_parents(&head.commit).unwrap().is_empty());
        }

        #[test]
        fn untouched_entries_carry_over() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let (first, _) = updater
                .commit(
                    None,
                    vec![
                        ("x/y".into(), Some(b"keep".to_vec())),
                        ("z".into(), Some(b"drop".to_vec())),
                    ],
                    &meta(),
                    "addKey",
                )
                .unwrap();
            let kept = fx.git.tree_entry_at(&first.tree, "x/y").unwrap().unwrap();

            let (second, _) = updater
                .commit(Some(&first), vec![("z".into(), None)], &meta(), "deleteKey")
                .unwrap();
            let after = fx.git.tree_entry_at(&second.tree, "x/y").unwrap().unwrap();
            assert_eq!(after.oid, kept.oid);
            assert_eq!(after.mode, kept.mode);
            assert!(fx.git.tree_entry_at(&second.tree, "z").unwrap().is_none());
            assert_eq!(fx.git.commit_parents(&second.commit).unwrap(), vec![first.commit]);
        }

        #[test]
        fn gitlinks_survive_rebuilds() {
            use crate::git::GITLINK_MODE;

            let fx = Fixture::new();
            let updater = fx.updater();
            let (first, _) = updater
                .commit(None, vec![("a".into(), Some(b"1".to_vec()))], &meta(), "addKey")
                .unwrap();

            // A tree written by another tool, carrying a submodule entry.
            let blob = fx.git.write_blob(b"1").unwrap();
            let foreign_tree = fx
                .git
                .write_tree_from_entries(&[
                    IndexItem {
                        path: "a".into(),
                        oid: blob,
                        mode: FILE_MODE,
                        size: 1,
                        mtime: 0,
                    },
                    IndexItem {
                        path: "deps/lib".into(),
                        oid: first.commit.clone(),
                        mode: GITLINK_MODE,
                        size: 0,
                        mtime: 0,
                    },
                ])
                .unwrap();
            let foreign = Head {
                commit: first.commit.clone(),
                tree: foreign_tree,
            };

            let (second, _) = updater
                .commit(Some(&foreign), vec![("b".into(), Some(b"2".to_vec()))], &meta(), "addKey")
                .unwrap();
            let link = fx.git.tree_entry_at(&second.tree, "deps/lib").unwrap().unwrap();
            assert_eq!(link.oid, first.commit);
            assert_eq!(link.mode as u32, GITLINK_MODE);

            let extraction = updater.extractor().extract_all(&second.tree).unwrap();
            let keys: Vec<&str> = extraction.pairs.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["a", "b"]);
        }

        #[test]
        fn stale_parent_is_update_failed() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let (first, _) = updater
                .commit(None, vec![("a".into(), Some(b"1".to_vec()))], &meta(), "addKey")
                .unwrap();
            updater
                .commit(Some(&first), vec![("a".into(), Some(b"2".to_vec()))], &meta(), "updateKey")
                .unwrap();

            let err = updater
                .commit(Some(&first), vec![("a".into(), Some(b"3".to_vec()))], &meta(), "updateKey")
                .unwrap_err();
            assert!(matches!(err, StoreError::UpdateFailed { .. }));
        }

        #[test]
        fn audit_identities() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let meta = meta().with_proxy("bot@example.com");
            let (head, _) = updater
                .commit(None, vec![("a".into(), Some(b"1".to_vec()))], &meta, "addKey")
                .unwrap();
            let info = fx.git.commit_info(&head.commit).unwrap();
            assert_eq!(info.author_name, "Ada");
            assert_eq!(info.author_email, "ada@example.com");
            assert_eq!(info.committer_name, "gitkv addKey");
            assert_eq!(info.committer_email, "gitkv@localhost");
            assert!(info.message.contains("Proxied-by: bot@example.com"));
        }
    }

    mod keys {
        use super::*;

        #[test]
        fn add_then_duplicate() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let applied = updater
                .add_key(&key("k"), b"v".to_vec(), Some(&MetaData::new("text/plain")), &meta())
                .unwrap();
            assert_eq!(applied.version, fx.git.write_blob(b"v").unwrap());

            let err = updater
                .add_key(&key("k"), b"w".to_vec(), None, &meta())
                .unwrap_err();
            assert!(matches!(err, StoreError::KeyAlreadyExist { .. }));
        }

        #[test]
        fn add_over_hidden_key() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let hidden = MetaData::new("text/plain").with_hidden(true);
            updater
                .add_key(&key("k"), b"v".to_vec(), Some(&hidden), &meta())
                .unwrap();
            updater
                .add_key(&key("k"), b"w".to_vec(), Some(&MetaData::new("text/plain")), &meta())
                .unwrap();
        }

        #[test]
        fn add_without_metadata_drops_stale_sidecar() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let hidden = MetaData::new("text/plain").with_hidden(true);
            updater
                .add_key(&key("k"), b"v".to_vec(), Some(&hidden), &meta())
                .unwrap();
            let applied = updater
                .add_key(&key("k"), b"w".to_vec(), None, &meta())
                .unwrap();

            assert!(fx
                .git
                .tree_entry_at(&applied.head.tree, "k.metadata")
                .unwrap()
                .is_none());
            let info = fx
                .updater()
                .extractor()
                .resolve_key(Some(&applied.head.tree), &key("k"))
                .unwrap()
                .unwrap();
            assert_eq!(info.data_version(), Some(&applied.version));
            assert!(!info.metadata().hidden);
        }

        #[test]
        fn directory_file_conflicts() {
            let fx = Fixture::new();
            let updater = fx.updater();
            updater.add_key(&key("a/b"), b"1".to_vec(), None, &meta()).unwrap();
            updater.add_key(&key("c"), b"1".to_vec(), None, &meta()).unwrap();

            assert!(matches!(
                updater.add_key(&key("a"), b"x".to_vec(), None, &meta()),
                Err(StoreError::KeyAlreadyExist { .. })
            ));
            assert!(matches!(
                updater.add_key(&key("c/d"), b"x".to_vec(), None, &meta()),
                Err(StoreError::KeyAlreadyExist { .. })
            ));
            assert!(matches!(
                updater.update_metadata(&key("c/"), &MetaData::default(), None, &meta()),
                Err(StoreError::KeyAlreadyExist { .. })
            ));
            updater
                .update_metadata(&key("a/"), &MetaData::default(), None, &meta())
                .unwrap();
        }

        #[test]
        fn update_checks_version_and_protection() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let v1 = updater
                .add_key(&key("k"), b"1".to_vec(), None, &meta())
                .unwrap()
                .version;
            let v2 = updater
                .update_key(&key("k"), b"2".to_vec(), &v1, &meta())
                .unwrap()
                .version;
            assert_ne!(v1, v2);
            assert!(matches!(
                updater.update_key(&key("k"), b"3".to_vec(), &v1, &meta()),
                Err(StoreError::VersionIsNotSame { .. })
            ));

            let protected = MetaData::default().with_protected(true);
            updater
                .update_metadata(&key("k"), &protected, None, &meta())
                .unwrap();
            assert!(matches!(
                updater.update_key(&key("k"), b"3".to_vec(), &v2, &meta()),
                Err(StoreError::KeyProtected { .. })
            ));
            assert!(matches!(
                updater.delete_key(&key("k"), &v2, &meta()),
                Err(StoreError::KeyProtected { .. })
            ));
        }

        #[test]
        fn delete_removes_metadata_too() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let v = updater
                .add_key(&key("k"), b"1".to_vec(), Some(&MetaData::new("text/plain")), &meta())
                .unwrap()
                .version;
            let applied = updater.delete_key(&key("k"), &v, &meta()).unwrap();
            assert!(fx.git.walk_tree(&applied.head.tree).unwrap().is_empty());
            assert!(matches!(
                updater.delete_key(&key("k"), &v, &meta()),
                Err(StoreError::KeyNotFound { .. })
            ));
        }

        #[test]
        fn metadata_version_is_checked() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let v = updater
                .update_metadata(&key("d/"), &MetaData::new("text/plain"), None, &meta())
                .unwrap()
                .version;
            assert!(matches!(
                updater.update_metadata(&key("d/"), &MetaData::default(), None, &meta()),
                Err(StoreError::VersionIsNotSame { .. })
            ));
            updater
                .update_metadata(&key("d/"), &MetaData::default(), Some(&v), &meta())
                .unwrap();
        }

        #[test]
        fn metadata_of_missing_plain_key() {
            let fx = Fixture::new();
            assert!(matches!(
                fx.updater()
                    .update_metadata(&key("nope"), &MetaData::default(), None, &meta()),
                Err(StoreError::KeyNotFound { .. })
            ));
        }
    }

    mod users {
        use super::*;

        #[test]
        fn lifecycle() {
            let fx = Fixture::new();
            let updater = fx.updater();
            let user = UserData::new("bob", "pw", ["reader"]).unwrap();
            let v1 = updater.add_user(&user, &meta()).unwrap().version;
            assert!(matches!(
                updater.add_user(&user, &meta()),
                Err(StoreError::KeyAlreadyExist { .. })
            ));

            let changed = user.merged(["writer"], None);
            let v2 = updater.update_user(&changed, &v1, &meta()).unwrap().version;
            assert!(matches!(
                updater.update_user(&changed, &v1, &meta()),
                Err(StoreError::VersionIsNotSame { .. })
            ));

            updater.delete_user("bob", &v2, &meta()).unwrap();
            assert!(matches!(
                updater.delete_user("bob", &v2, &meta()),
                Err(StoreError::UserNotFound { .. })
            ));
        }
    }

    mod refs {
        use super::*;

        #[test]
        fn create_is_idempotent() {
            let fx = Fixture::new();
            fx.updater().add_key(&key("k"), b"1".to_vec(), None, &meta()).unwrap();
            let feature = RefName::new("refs/heads/feature").unwrap();

            assert!(create_ref(&fx.git, &feature, &fx.refname).unwrap());
            let target = fx.git.resolve_ref(feature.as_str()).unwrap();

            fx.updater()
                .add_key(&key("k2"), b"2".to_vec(), None, &meta())
                .unwrap();
            assert!(!create_ref(&fx.git, &feature, &fx.refname).unwrap());
            assert_eq!(fx.git.resolve_ref(feature.as_str()).unwrap(), target);
        }

        #[test]
        fn create_from_missing_base() {
            let fx = Fixture::new();
            let feature = RefName::new("refs/heads/feature").unwrap();
            assert!(matches!(
                create_ref(&fx.git, &feature, &fx.refname),
                Err(StoreError::RefNotFound { .. })
            ));
        }

        #[test]
        fn delete_reports_existing() {
            let fx = Fixture::new();
            fx.updater().add_key(&key("k"), b"1".to_vec(), None, &meta()).unwrap();
            let ghost = RefName::new("refs/heads/ghost").unwrap();
            let deleted = delete_refs(&fx.git, &[fx.refname.clone(), ghost]).unwrap();
            assert_eq!(deleted, vec![fx.refname.clone()]);
        }
    }
}
