//! store::checker
//!
//! Read-only validation of refs before they are served.
//!
//! Every metadata blob, master metadata blob and user record of a ref is
//! parsed. Unparseable blobs are errors. Metadata of a plain key that has no
//! data is a warning. Nothing is ever written.

use std::fmt;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::core::metadata::parse_metadata;
use crate::core::paths::{classify, TreePath};
use crate::core::types::{Oid, RefName};
use crate::core::user::UserData;
use crate::git::{EntryKind, Git, GitError, RepoHandle};

use super::error::{StoreError, StoreResult};
use super::extractor::SourceExtractor;

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIssue {
    /// Tree path of the offending blob.
    pub path: String,
    pub blob: Oid,
    pub message: String,
}

impl fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path, self.blob.short(8), self.message)
    }
}

/// Result of checking one ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchStatus {
    Checked {
        errors: Vec<CheckIssue>,
        warnings: Vec<CheckIssue>,
    },
    /// The ref does not exist or has no commit.
    RefNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReport {
    pub refname: RefName,
    pub status: BranchStatus,
}

impl BranchReport {
    /// Checked, with no errors. Warnings do not count.
    pub fn is_clean(&self) -> bool {
        matches!(&self.status, BranchStatus::Checked { errors, .. } if errors.is_empty())
    }

    pub fn errors(&self) -> &[CheckIssue] {
        match &self.status {
            BranchStatus::Checked { errors, .. } => errors,
            BranchStatus::RefNotFound => &[],
        }
    }

    pub fn warnings(&self) -> &[CheckIssue] {
        match &self.status {
            BranchStatus::Checked { warnings, .. } => warnings,
            BranchStatus::RefNotFound => &[],
        }
    }
}

/// Reports of several refs, ordered by ref name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub branches: Vec<BranchReport>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.branches.iter().all(BranchReport::is_clean)
    }

    pub fn error_count(&self) -> usize {
        self.branches.iter().map(|b| b.errors().len()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.branches.iter().map(|b| b.warnings().len()).sum()
    }
}

/// Validates refs of one repository.
#[derive(Debug, Clone)]
pub struct SourceChecker {
    handle: RepoHandle,
    test_ref: Option<RefName>,
}

impl SourceChecker {
    pub fn new(handle: RepoHandle, test_ref: Option<RefName>) -> Self {
        Self { handle, test_ref }
    }

    pub fn test_ref(&self) -> Option<&RefName> {
        self.test_ref.as_ref()
    }

    /// Check one ref.
    pub async fn check_ref(&self, refname: &RefName) -> StoreResult<BranchReport> {
        let handle = self.handle.clone();
        let refname = refname.clone();
        join_blocking(tokio::task::spawn_blocking(move || {
            check_blocking(&handle.open()?, &refname)
        }))
        .await
    }

    /// Check the designated test ref.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoTestRef`] if none is configured.
    pub async fn check_test_ref(&self) -> StoreResult<BranchReport> {
        let refname = self.test_ref.clone().ok_or(StoreError::NoTestRef)?;
        self.check_ref(&refname).await
    }

    /// Check every branch in parallel.
    pub async fn check_all_heads(&self) -> StoreResult<CheckReport> {
        let heads = self.handle.open()?.list_refs_by_prefix("refs/heads/")?;
        debug!(branches = heads.len(), "checking all heads");

        let mut tasks = JoinSet::new();
        for head in heads {
            let handle = self.handle.clone();
            tasks.spawn_blocking(move || check_blocking(&handle.open()?, &head.name));
        }

        let mut branches = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            branches.push(unwrap_join(joined)?);
        }
        branches.sort_by(|a, b| a.refname.cmp(&b.refname));
        Ok(CheckReport { branches })
    }
}

async fn join_blocking<T>(task: tokio::task::JoinHandle<StoreResult<T>>) -> StoreResult<T> {
    unwrap_join(task.await)
}

fn unwrap_join<T>(joined: Result<StoreResult<T>, tokio::task::JoinError>) -> StoreResult<T> {
    match joined {
        Ok(result) => result,
        Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
        Err(join) => Err(StoreError::Io(GitError::Internal {
            message: format!("check task failed: {join}"),
        })),
    }
}

/// Check one ref on the current thread.
pub fn check_blocking(git: &Git, refname: &RefName) -> StoreResult<BranchReport> {
    let Some(head) = SourceExtractor::new(git).head(refname)? else {
        warn!(refname = %refname, "ref not found");
        return Ok(BranchReport {
            refname: refname.clone(),
            status: BranchStatus::RefNotFound,
        });
    };

    let items: Vec<_> = git
        .walk_tree(&head.tree)?
        .into_iter()
        .filter(|item| item.kind == EntryKind::Blob)
        .collect();
    let data: std::collections::HashSet<String> = items
        .iter()
        .filter_map(|item| match classify(&item.path) {
            TreePath::Data(key) => Some(key),
            _ => None,
        })
        .collect();

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for item in items {
        let issue = |message: String| CheckIssue {
            path: item.path.clone(),
            blob: item.oid.clone(),
            message,
        };
        match classify(&item.path) {
            TreePath::Data(_) => {}
            TreePath::Metadata(owner) => {
                if let Err(message) = parse_blob(git, &item.oid, |json| {
                    parse_metadata(json).map(drop).map_err(|e| e.to_string())
                }) {
                    errors.push(issue(message));
                } else if !data.contains(&owner) {
                    warnings.push(issue(format!("metadata of '{owner}' has no data")));
                }
            }
            TreePath::Master(_) => {
                if let Err(message) = parse_blob(git, &item.oid, |json| {
                    parse_metadata(json).map(drop).map_err(|e| e.to_string())
                }) {
                    errors.push(issue(message));
                }
            }
            TreePath::User(name) => {
                let parsed = parse_blob(git, &item.oid, |json| {
                    let user = UserData::from_json(json).map_err(|e| e.to_string())?;
                    if user.name == name {
                        Ok(())
                    } else {
                        Err(format!("record names user '{}'", user.name))
                    }
                });
                if let Err(message) = parsed {
                    errors.push(issue(message));
                }
            }
        }
    }

    for finding in &errors {
        warn!(refname = %refname, issue = %finding, "check error");
    }
    for finding in &warnings {
        warn!(refname = %refname, issue = %finding, "check warning");
    }
    debug!(
        refname = %refname,
        errors = errors.len(),
        warnings = warnings.len(),
        "checked ref"
    );

    Ok(BranchReport {
        refname: refname.clone(),
        status: BranchStatus::Checked { errors, warnings },
    })
}

fn parse_blob<F>(git: &Git, oid: &Oid, parse: F) -> Result<(), String>
where
    F: FnOnce(&str) -> Result<(), String>,
{
    let json = git.read_blob_as_string(oid).map_err(|e| e.to_string())?;
    parse(&json)
}
