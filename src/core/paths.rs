//! core::paths
//!
//! Path routing for the store: where keys, metadata and user records live
//! inside a ref's tree, and where gitkv keeps its own files in the git dir.
//!
//! # Tree Layout
//!
//! - `a/b` - data blob of key `a/b`
//! - `a/b.metadata` - metadata of key `a/b`
//! - `a/.metadata` - master metadata of directory key `a/`
//! - `.metadata` - master metadata of the root (inherited by everything)
//! - `.users/<name>` - user record
//!
//! # Git Dir Layout
//!
//! All gitkv data is stored under `<git_dir>/gitkv/`:
//! - `config.toml` - Repository configuration
//! - `lock` - Exclusive process lock file
//!
//! # Example
//!
//! ```
//! use gitkv::core::paths::{classify, TreePath};
//!
//! assert_eq!(classify("a/b"), TreePath::Data("a/b".into()));
//! assert_eq!(classify("a/b.metadata"), TreePath::Metadata("a/b".into()));
//! assert_eq!(classify("a/.metadata"), TreePath::Master("a/".into()));
//! assert_eq!(classify(".users/bob"), TreePath::User("bob".into()));
//! ```

use std::path::{Path, PathBuf};

use super::types::StoreKey;

/// Reserved suffix that marks metadata blobs.
pub const METADATA_SUFFIX: &str = ".metadata";

/// Reserved subtree holding per-ref user records.
pub const USERS_PREFIX: &str = ".users/";

/// What a blob path in a ref's tree stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreePath {
    /// Data blob; holds the key path.
    Data(String),
    /// Metadata of a plain key; holds the key path.
    Metadata(String),
    /// Master metadata of a directory; holds the directory path with a
    /// trailing `/`, or `""` for the root.
    Master(String),
    /// User record; holds the user name.
    User(String),
}

/// Classify a blob path found while walking a tree.
pub fn classify(path: &str) -> TreePath {
    if let Some(name) = path.strip_prefix(USERS_PREFIX) {
        return TreePath::User(name.to_string());
    }

    let (dir, file) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };

    if file == METADATA_SUFFIX {
        TreePath::Master(dir.to_string())
    } else if let Some(owner) = path.strip_suffix(METADATA_SUFFIX) {
        TreePath::Metadata(owner.to_string())
    } else {
        TreePath::Data(path.to_string())
    }
}

/// Tree path of a key's data blob.
pub fn data_path(key: &StoreKey) -> String {
    key.plain_name().to_string()
}

/// Tree path of a key's metadata blob.
///
/// For directory keys this is the master metadata path.
///
/// ```
/// use gitkv::core::paths::metadata_path;
/// use gitkv::core::types::StoreKey;
///
/// assert_eq!(metadata_path(&StoreKey::new("a/b").unwrap()), "a/b.metadata");
/// assert_eq!(metadata_path(&StoreKey::new("a/").unwrap()), "a/.metadata");
/// ```
pub fn metadata_path(key: &StoreKey) -> String {
    if key.is_directory() {
        master_path(key.as_str())
    } else {
        format!("{}{METADATA_SUFFIX}", key.as_str())
    }
}

/// Tree path of the master metadata of a directory (`""` is the root).
pub fn master_path(dir: &str) -> String {
    format!("{dir}{METADATA_SUFFIX}")
}

/// Tree path of a user record.
pub fn user_path(name: &str) -> String {
    format!("{USERS_PREFIX}{name}")
}

/// Directories enclosing a path, nearest first, ending with the root `""`.
///
/// ```
/// use gitkv::core::paths::ancestor_dirs;
///
/// assert_eq!(ancestor_dirs("a/b/c"), vec!["a/b/", "a/", ""]);
/// assert_eq!(ancestor_dirs("a/b/"), vec!["a/", ""]);
/// assert_eq!(ancestor_dirs("top"), vec![""]);
/// ```
pub fn ancestor_dirs(path: &str) -> Vec<&str> {
    let body = path.strip_suffix('/').unwrap_or(path);
    let mut dirs: Vec<&str> = body
        .match_indices('/')
        .map(|(idx, _)| &body[..=idx])
        .collect();
    dirs.reverse();
    dirs.push("");
    dirs
}

/// Location of gitkv's own files inside a repository's git dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// Path to the git directory (the repository itself when bare).
    pub git_dir: PathBuf,
}

impl StorePaths {
    /// Create paths rooted at a git dir.
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    /// Root gitkv directory (`<git_dir>/gitkv`).
    pub fn store_dir(&self) -> PathBuf {
        self.git_dir.join("gitkv")
    }

    /// Repository-scoped configuration file.
    pub fn repo_config_path(&self) -> PathBuf {
        self.store_dir().join("config.toml")
    }

    /// Exclusive process lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.store_dir().join("lock")
    }

    /// The git dir these paths are rooted at.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}
