//! core::ops
//!
//! Process-level coordination.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive repository lock
//!
//! # Architecture
//!
//! Inside one process, every mutation of a ref is serialized by that ref's
//! writer. The repository lock extends that guarantee across processes:
//! only the process holding it may open a writing pool on the repository.

pub mod lock;
