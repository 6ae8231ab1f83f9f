//! core
//!
//! Core domain types, schemas, and configuration for gitkv.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, RefName, StoreKey, etc.
//! - [`paths`] - Tree layout of keys, metadata and users; gitkv's files in the git dir
//! - [`metadata`] - Key metadata and commit metadata
//! - [`user`] - Per-ref user records
//! - [`config`] - Configuration schema and loading
//! - [`ops`] - Process-level repository lock
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict (unknown fields rejected)

pub mod config;
pub mod metadata;
pub mod ops;
pub mod paths;
pub mod types;
pub mod user;
