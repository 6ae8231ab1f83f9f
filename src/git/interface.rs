//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to the object store. All
//! blob, tree, commit and ref operations flow through [`Git`], which returns
//! strong types and normalizes errors into typed failure categories.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: No repository at the given path
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::ObjectNotFound`]: Requested object does not exist
//! - [`GitError::Internal`]: Anything else libgit2 reports
//!
//! Compare-and-swap ref updates do not fail with an error; they report a
//! [`RefUpdateOutcome`] and the caller decides which outcomes it accepts.
//!
//! # Example
//!
//! ```ignore
//! use gitkv::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("/srv/data.git"))?;
//! let head = git.try_resolve_ref("refs/heads/main")?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::types::{Oid, RefName, TypeError, UtcTimestamp};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// No repository at the given path.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// Blob content is not valid UTF-8.
    #[error("blob is not valid UTF-8: {oid}")]
    InvalidUtf8 {
        /// The OID of the blob
        oid: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context.contains("ref") {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ if err.class() == git2::ErrorClass::Os => GitError::AccessError {
                message: format!("{}: {}", context, err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    fn internal(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) | TypeError::InvalidBranchName(msg) => {
                GitError::InvalidRefName { message: msg }
            }
            TypeError::InvalidKey(msg) => GitError::Internal { message: msg },
        }
    }
}

/// A ref with its name and target OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// The full ref name
    pub name: RefName,
    /// The commit the ref points to
    pub oid: Oid,
}

/// Kind of object at a tree path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    /// Gitlink (submodule) entry.
    Commit,
    Other,
}

/// An entry found in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    /// Path relative to the tree that was read (just the name for one level).
    pub path: String,
    pub oid: Oid,
    pub mode: i32,
    pub kind: EntryKind,
}

/// An entry to place in a new tree.
///
/// Mirrors a git index entry; only `path`, `oid` and `mode` end up in the
/// written tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexItem {
    pub path: String,
    pub oid: Oid,
    pub mode: u32,
    pub size: u32,
    pub mtime: i64,
}

/// Regular, non-executable file mode.
pub const FILE_MODE: u32 = 0o100644;

/// Tree mode of a gitlink (submodule) entry.
pub const GITLINK_MODE: u32 = 0o160000;

/// A name/email/time triple for commit authorship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub time: UtcTimestamp,
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// The commit OID
    pub oid: Oid,
    /// Full commit message
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
}

/// Result of a compare-and-swap ref update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefUpdateOutcome {
    /// The ref moved to a descendant of its previous target.
    FastForward,
    /// The ref moved to a commit that does not descend from its previous target.
    Forced,
    /// The ref did not exist and was created.
    New,
    /// The ref already pointed at the new target.
    NoChange,
    /// The ref's current target did not match the expected one.
    Rejected,
    /// The ref is locked by someone else.
    LockFailure,
    /// Filesystem failure while writing the ref.
    IoFailure,
    /// The new target object does not exist.
    MissingObject,
    /// Any other failure.
    Other,
}

impl RefUpdateOutcome {
    /// Whether the ref now points at the requested target.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            RefUpdateOutcome::FastForward
                | RefUpdateOutcome::Forced
                | RefUpdateOutcome::New
                | RefUpdateOutcome::NoChange
        )
    }
}

impl std::fmt::Display for RefUpdateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefUpdateOutcome::FastForward => "fast-forward",
            RefUpdateOutcome::Forced => "forced",
            RefUpdateOutcome::New => "new",
            RefUpdateOutcome::NoChange => "no-change",
            RefUpdateOutcome::Rejected => "rejected",
            RefUpdateOutcome::LockFailure => "lock-failure",
            RefUpdateOutcome::IoFailure => "io-failure",
            RefUpdateOutcome::MissingObject => "missing-object",
            RefUpdateOutcome::Other => "other",
        };
        f.write_str(s)
    }
}

/// A cloneable, thread-safe way to reach a repository.
///
/// `git2::Repository` can move between threads but cannot be shared, so
/// every worker opens its own [`Git`] from the handle.
#[derive(Debug, Clone)]
pub struct RepoHandle {
    git_dir: Arc<PathBuf>,
}

impl RepoHandle {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: Arc::new(git_dir.into()),
        }
    }

    /// Open a fresh interface on the repository.
    pub fn open(&self) -> Result<Git, GitError> {
        Git::open(&self.git_dir)
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}

/// The Git interface.
///
/// This is the **single point of interaction** with the object store. No
/// other module imports `git2` directly.
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

fn from_git2(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::new(oid.to_string()).map_err(GitError::from)
}

fn signature(identity: &Identity) -> Result<git2::Signature<'static>, GitError> {
    let time = git2::Time::new(identity.time.epoch_seconds(), 0);
    git2::Signature::new(&identity.name, &identity.email, &time).map_err(GitError::internal)
}

impl Git {
    // =========================================================================
    // Repository Opening
    // =========================================================================

    /// Open the repository at exactly `path` (bare or not).
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Ok(Self { repo })
    }

    /// Create a bare repository at `path`, or open it if one exists.
    pub fn init_bare(path: &Path) -> Result<Self, GitError> {
        if let Ok(git) = Self::open(path) {
            return Ok(git);
        }
        let repo = git2::Repository::init_bare(path)
            .map_err(|e| GitError::from_git2(e, &path.display().to_string()))?;
        Ok(Self { repo })
    }

    /// Path to the git directory.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// A thread-safe handle for reopening this repository elsewhere.
    pub fn handle(&self) -> RepoHandle {
        RepoHandle::new(self.repo.path())
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let oid = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?
            .id();

        from_git2(oid)
    }

    /// Resolve a ref, returning `None` if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if a ref exists.
    pub fn ref_exists(&self, refname: &str) -> bool {
        self.repo.find_reference(refname).is_ok()
    }

    // =========================================================================
    // Ref Enumeration
    // =========================================================================

    /// List all refs matching a prefix, peeled to commits.
    ///
    /// Refs that do not point at a commit are skipped.
    pub fn list_refs_by_prefix(&self, prefix: &str) -> Result<Vec<RefEntry>, GitError> {
        let pattern = format!("{}*", prefix);
        let refs = self
            .repo
            .references_glob(&pattern)
            .map_err(GitError::internal)?;

        let mut entries = Vec::new();
        for reference in refs {
            let reference = reference.map_err(GitError::internal)?;

            let Some(name) = reference.name() else {
                continue; // Skip refs with non-UTF8 names
            };
            let Ok(ref_name) = RefName::new(name) else {
                continue;
            };
            let Ok(commit) = reference.peel_to_commit() else {
                continue;
            };

            entries.push(RefEntry {
                name: ref_name,
                oid: from_git2(commit.id())?,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// List every ref in the repository.
    pub fn list_all_refs(&self) -> Result<Vec<RefEntry>, GitError> {
        self.list_refs_by_prefix("refs/")
    }

    // =========================================================================
    // Ref Mutation
    // =========================================================================

    /// Move a ref with compare-and-swap semantics.
    ///
    /// With `expected_old = None` the ref must not exist yet. The swap is
    /// atomic in libgit2, so a concurrent writer turns into
    /// [`RefUpdateOutcome::Rejected`] rather than a lost update.
    pub fn update_ref_cas(
        &self,
        refname: &str,
        new_oid: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> RefUpdateOutcome {
        let Ok(new_git) = to_git2(new_oid) else {
            return RefUpdateOutcome::Other;
        };
        if self.repo.find_object(new_git, None).is_err() {
            return RefUpdateOutcome::MissingObject;
        }

        let current = match self.try_resolve_ref_raw(refname) {
            Ok(current) => current,
            Err(_) => return RefUpdateOutcome::IoFailure,
        };
        if current.as_deref() == Some(new_oid.as_str()) {
            return RefUpdateOutcome::NoChange;
        }

        let result = match (expected_old, current.as_deref()) {
            (None, Some(_)) | (Some(_), None) => return RefUpdateOutcome::Rejected,
            (Some(expected), Some(actual)) if expected.as_str() != actual => {
                return RefUpdateOutcome::Rejected
            }
            (None, None) => self
                .repo
                .reference(refname, new_git, false, message)
                .map(|_| RefUpdateOutcome::New),
            (Some(expected), Some(_)) => {
                let Ok(old_git) = to_git2(expected) else {
                    return RefUpdateOutcome::Other;
                };
                self.repo
                    .reference_matching(refname, new_git, true, old_git, message)
                    .map(|_| {
                        if self.repo.graph_descendant_of(new_git, old_git).unwrap_or(false) {
                            RefUpdateOutcome::FastForward
                        } else {
                            RefUpdateOutcome::Forced
                        }
                    })
            }
        };

        result.unwrap_or_else(|err| match err.code() {
            git2::ErrorCode::Modified | git2::ErrorCode::Exists => RefUpdateOutcome::Rejected,
            git2::ErrorCode::Locked => RefUpdateOutcome::LockFailure,
            _ if err.class() == git2::ErrorClass::Os => RefUpdateOutcome::IoFailure,
            _ if err.class() == git2::ErrorClass::Odb => RefUpdateOutcome::MissingObject,
            _ => RefUpdateOutcome::Other,
        })
    }

    /// Create a ref pointing at `target` unless it already exists.
    ///
    /// Returns `false` (and leaves the ref alone) if it exists.
    pub fn create_ref(&self, refname: &str, target: &Oid, message: &str) -> Result<bool, GitError> {
        if self.ref_exists(refname) {
            return Ok(false);
        }
        let oid = to_git2(target)?;
        match self.repo.reference(refname, oid, false, message) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == git2::ErrorCode::Exists => Ok(false),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    /// Delete a ref regardless of its target.
    ///
    /// Returns `false` if the ref did not exist.
    pub fn delete_ref(&self, refname: &str) -> Result<bool, GitError> {
        let mut reference = match self.repo.find_reference(refname) {
            Ok(reference) => reference,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(false),
            Err(e) => return Err(GitError::from_git2(e, refname)),
        };
        reference
            .delete()
            .map_err(|e| GitError::from_git2(e, refname))?;
        Ok(true)
    }

    fn try_resolve_ref_raw(&self, refname: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let resolved = reference.resolve().unwrap_or(reference);
                let oid = resolved.target().ok_or_else(|| GitError::Internal {
                    message: format!("ref {} has no target", refname),
                })?;
                Ok(Some(oid.to_string()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    // =========================================================================
    // Tree Operations
    // =========================================================================

    /// The root tree of a commit.
    pub fn commit_tree(&self, commit: &Oid) -> Result<Oid, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(commit)?)
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        from_git2(commit.tree_id())
    }

    /// Entries directly inside a tree.
    pub fn tree_entries(&self, tree: &Oid) -> Result<Vec<TreeItem>, GitError> {
        let tree_obj = self
            .repo
            .find_tree(to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;

        let mut items = Vec::with_capacity(tree_obj.len());
        for entry in tree_obj.iter() {
            let Some(name) = entry.name() else {
                continue;
            };
            items.push(TreeItem {
                path: name.to_string(),
                oid: from_git2(entry.id())?,
                mode: entry.filemode(),
                kind: entry_kind(entry.kind()),
            });
        }
        Ok(items)
    }

    /// Every blob and gitlink reachable from a tree, with full paths, in
    /// pre-order.
    pub fn walk_tree(&self, tree: &Oid) -> Result<Vec<TreeItem>, GitError> {
        let tree_obj = self
            .repo
            .find_tree(to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;

        let mut items = Vec::new();
        let mut bad_oid = None;
        tree_obj
            .walk(git2::TreeWalkMode::PreOrder, |root, entry| {
                let kind = entry_kind(entry.kind());
                if !matches!(kind, EntryKind::Blob | EntryKind::Commit) {
                    return git2::TreeWalkResult::Ok;
                }
                let Some(name) = entry.name() else {
                    return git2::TreeWalkResult::Ok;
                };
                match from_git2(entry.id()) {
                    Ok(oid) => {
                        items.push(TreeItem {
                            path: format!("{root}{name}"),
                            oid,
                            mode: entry.filemode(),
                            kind,
                        });
                        git2::TreeWalkResult::Ok
                    }
                    Err(e) => {
                        bad_oid = Some(e);
                        git2::TreeWalkResult::Abort
                    }
                }
            })
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;

        match bad_oid {
            Some(e) => Err(e),
            None => Ok(items),
        }
    }

    /// The entry at `path` inside a tree, if any.
    pub fn tree_entry_at(&self, tree: &Oid, path: &str) -> Result<Option<TreeItem>, GitError> {
        let tree_obj = self
            .repo
            .find_tree(to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;
        match tree_obj.get_path(Path::new(path)) {
            Ok(entry) => Ok(Some(TreeItem {
                path: path.to_string(),
                oid: from_git2(entry.id())?,
                mode: entry.filemode(),
                kind: entry_kind(entry.kind()),
            })),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, path)),
        }
    }

    /// What, if anything, lives at `path` inside a tree.
    pub fn path_kind(&self, tree: &Oid, path: &str) -> Result<Option<EntryKind>, GitError> {
        Ok(self.tree_entry_at(tree, path)?.map(|item| item.kind))
    }

    /// Build and write a tree from a flat list of entries.
    ///
    /// The entries are staged into an in-memory index, so nested paths
    /// produce the intermediate subtrees.
    pub fn write_tree_from_entries(&self, entries: &[IndexItem]) -> Result<Oid, GitError> {
        let mut index = git2::Index::new().map_err(GitError::internal)?;

        for item in entries {
            let path = item.path.as_bytes().to_vec();
            let entry = git2::IndexEntry {
                ctime: git2::IndexTime::new(0, 0),
                mtime: git2::IndexTime::new(index_seconds(item.mtime), 0),
                dev: 0,
                ino: 0,
                mode: item.mode,
                uid: 0,
                gid: 0,
                file_size: item.size,
                id: to_git2(&item.oid)?,
                flags: path.len().min(0xfff) as u16,
                flags_extended: 0,
                path,
            };
            index
                .add(&entry)
                .map_err(|e| GitError::from_git2(e, &item.path))?;
        }

        let tree = index
            .write_tree_to(&self.repo)
            .map_err(GitError::internal)?;
        from_git2(tree)
    }

    // =========================================================================
    // Blob Operations
    // =========================================================================

    /// Write content as a blob and return its OID.
    pub fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError> {
        let oid = self.repo.blob(content).map_err(GitError::internal)?;
        from_git2(oid)
    }

    /// Read a blob by OID.
    ///
    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if the blob doesn't exist
    pub fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitError> {
        let blob = self
            .repo
            .find_blob(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        Ok(blob.content().to_vec())
    }

    /// Read a blob as UTF-8 string.
    pub fn read_blob_as_string(&self, oid: &Oid) -> Result<String, GitError> {
        let content = self.read_blob(oid)?;
        String::from_utf8(content).map_err(|_| GitError::InvalidUtf8 {
            oid: oid.to_string(),
        })
    }

    // =========================================================================
    // Commit Operations
    // =========================================================================

    /// Create a commit without moving any ref.
    pub fn write_commit(
        &self,
        tree: &Oid,
        parents: &[&Oid],
        author: &Identity,
        committer: &Identity,
        message: &str,
    ) -> Result<Oid, GitError> {
        let tree_obj = self
            .repo
            .find_tree(to_git2(tree)?)
            .map_err(|e| GitError::from_git2(e, tree.as_str()))?;

        let mut parent_commits = Vec::with_capacity(parents.len());
        for parent in parents {
            let commit = self
                .repo
                .find_commit(to_git2(parent)?)
                .map_err(|e| GitError::from_git2(e, parent.as_str()))?;
            parent_commits.push(commit);
        }
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self
            .repo
            .commit(
                None,
                &signature(author)?,
                &signature(committer)?,
                message,
                &tree_obj,
                &parent_refs,
            )
            .map_err(GitError::internal)?;

        from_git2(oid)
    }

    /// Get information about a commit.
    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        let author = commit.author();
        let committer = commit.committer();

        Ok(CommitInfo {
            oid: oid.clone(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            committer_name: committer.name().unwrap_or("").to_string(),
            committer_email: committer.email().unwrap_or("").to_string(),
        })
    }

    /// Get the parent OIDs of a commit.
    pub fn commit_parents(&self, oid: &Oid) -> Result<Vec<Oid>, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        commit.parent_ids().map(from_git2).collect()
    }
}

/// Index timestamps are 32-bit; later times clamp instead of wrapping.
fn index_seconds(mtime: i64) -> i32 {
    i32::try_from(mtime).unwrap_or(if mtime < 0 { 0 } else { i32::MAX })
}

fn entry_kind(kind: Option<git2::ObjectType>) -> EntryKind {
    match kind {
        Some(git2::ObjectType::Blob) => EntryKind::Blob,
        Some(git2::ObjectType::Tree) => EntryKind::Tree,
        Some(git2::ObjectType::Commit) => EntryKind::Commit,
        _ => EntryKind::Other,
    }
}
