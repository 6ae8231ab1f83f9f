//! store
//!
//! The ref-scoped storage engine.
//!
//! # Architecture
//!
//! ```text
//! RefHolderPool ── RefHolder (branch | tag)
//!                     │
//!                 LockService ── claims, KeyCache
//!                     │
//!         RepoWriter (one thread per ref)    blocking pool (reads)
//!                     │                            │
//!               SourceUpdater                SourceExtractor
//!                     └──────────── git ───────────┘
//! ```
//!
//! Writes are turned into an [`ActionData`], claimed per key and committed
//! one at a time by the ref's writer. Reads go through the cache and never
//! wait for the writer.
//!
//! # Invariants
//!
//! - A hidden key is never visible through a read
//! - At most one action holds a key's claim at any time
//! - Every commit on a ref has the previous head as its parent
//! - Tree entries a mutation does not touch are carried over unchanged

pub mod action;
pub mod cache;
pub mod checker;
pub mod error;
pub mod extractor;
pub mod holder;
pub mod info;
pub mod lock_service;
pub mod pool;
pub mod updater;
pub mod writer;

pub use action::{ActionData, ClaimKey};
pub use checker::{BranchReport, BranchStatus, CheckIssue, CheckReport, SourceChecker};
pub use error::{Outcome, StoreError, StoreResult};
pub use holder::{BranchRefHolder, GlobalAction, GlobalCheck, ReadAction, RefHolder, TagRefHolder};
pub use info::{DataSource, StoreInfo};
pub use lock_service::{EngineSettings, GlobalScope, LockService, ReadScope};
pub use pool::RefHolderPool;
pub use updater::Committer;
