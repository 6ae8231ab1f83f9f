//! store::error
//!
//! Error taxonomy of the storage engine.
//!
//! Contention is not an error: a mutation that could not claim its key
//! resolves to [`Outcome::FailedToLock`] and the caller retries. Everything
//! else that can go wrong is a [`StoreError`].

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::metadata::{CommitMetaDataError, MetadataError};
use crate::core::ops::lock::LockError;
use crate::core::types::{Oid, TypeError};
use crate::core::user::UserError;
use crate::git::{GitError, RefUpdateOutcome};

/// Errors from the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller's version token is stale; re-read and retry.
    #[error("version mismatch for '{key}': expected {expected}, found {}", found_label(.actual))]
    VersionIsNotSame {
        key: String,
        expected: String,
        actual: Option<Oid>,
    },

    #[error("key already exists: {key}")]
    KeyAlreadyExist { key: String },

    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("key is protected: {key}")]
    KeyProtected { key: String },

    #[error("user not found: {name}")]
    UserNotFound { name: String },

    #[error("ref not found: {refname}")]
    RefNotFound { refname: String },

    /// A read could not resolve the ref it was bound to.
    #[error("failed to load from {refname}: ref does not exist")]
    Load { refname: String },

    /// The ref did not move the way the writer expected. Something wrote
    /// to it without going through this engine.
    #[error("update of {refname} failed: {outcome}")]
    UpdateFailed {
        refname: String,
        outcome: RefUpdateOutcome,
    },

    #[error("tags cannot be modified: {refname}")]
    TagImmutable { refname: String },

    #[error("no test ref configured (set check.test_ref)")]
    NoTestRef,

    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypeError),

    #[error("invalid commit metadata: {0}")]
    InvalidCommitMetaData(#[from] CommitMetaDataError),

    #[error("bad metadata at '{path}': {source}")]
    Metadata {
        path: String,
        #[source]
        source: MetadataError,
    },

    #[error(transparent)]
    User(#[from] UserError),

    #[error("writer for {refname} is closed")]
    WriterClosed { refname: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Object store failure.
    #[error("i/o failure: {0}")]
    Io(#[from] GitError),
}

fn found_label(actual: &Option<Oid>) -> String {
    match actual {
        Some(oid) => oid.to_string(),
        None => "nothing".to_string(),
    }
}

impl StoreError {
    /// Whether retrying after a fresh read can succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::VersionIsNotSame { .. } | StoreError::KeyAlreadyExist { .. }
        )
    }
}

/// Convenient result alias for engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an operation that needs a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T> {
    /// The operation ran.
    Done(T),
    /// The claim was held by someone else; nothing happened.
    FailedToLock,
}

impl<T> Outcome<T> {
    pub fn is_failed_to_lock(&self) -> bool {
        matches!(self, Outcome::FailedToLock)
    }

    /// The value, if the operation ran.
    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::FailedToLock => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(value) => Outcome::Done(f(value)),
            Outcome::FailedToLock => Outcome::FailedToLock,
        }
    }
}
