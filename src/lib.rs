//! gitkv - A versioned key-value store backed by a git commit graph
//!
//! Every key is a blob in a ref's tree, next to an optional metadata blob.
//! Every mutation is a commit. Versions are blob ids, so a stale writer is
//! detected by comparing the version it read against the current one.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to the store)
//! - [`store`] - Per-ref holders, claims, caching and commit building
//! - [`core`] - Domain types, schemas, configuration and the process lock
//! - [`git`] - Single interface for all object store operations
//!
//! # Correctness Invariants
//!
//! 1. Commits on one ref are built by a single writer
//! 2. Every ref move is a compare-and-swap against the previous head
//! 3. Untouched tree entries survive every commit byte for byte
//! 4. Contention is reported as a value and never blocks

pub mod cli;
pub mod core;
pub mod git;
pub mod store;
