//! git
//!
//! Single interface for all object store operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. All blob, tree, commit and
//! ref reads and writes flow through this interface. No other module should
//! import `git2`.
//!
//! # Responsibilities
//!
//! - Repository creation and opening (bare repositories are the norm)
//! - Ref operations (resolve, CAS update, create, delete, enumerate)
//! - Object operations (read/write blobs, build trees, write commits)
//! - Tree inspection (one level, recursive walk, path lookup)
//!
//! # Invariants
//!
//! - All ref moves made by the store use CAS (compare-and-swap) semantics
//! - No other module calls git2 directly
//! - All operations return strong types (Oid, RefName)
//!
//! # Example
//!
//! ```ignore
//! use gitkv::git::{Git, RefUpdateOutcome};
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("/srv/data.git"))?;
//! let old = git.resolve_ref("refs/heads/main")?;
//!
//! // CAS update (rejected if the ref moved since it was read)
//! let outcome = git.update_ref_cas("refs/heads/main", &new_oid, Some(&old), "gitkv: addKey");
//! assert!(outcome.is_accepted());
//! ```

mod interface;

pub use interface::{
    CommitInfo, EntryKind, Git, GitError, Identity, IndexItem, RefEntry, RefUpdateOutcome,
    RepoHandle, TreeItem, FILE_MODE, GITLINK_MODE,
};
