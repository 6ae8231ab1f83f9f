//! core::metadata
//!
//! Key metadata and commit metadata.
//!
//! # Modules
//!
//! - [`schema`] - Per-key metadata stored next to the data blob
//! - [`commit`] - Who/why of a mutation, recorded on the commit
//!
//! # Schema Design
//!
//! - Strict parsing: unknown fields are rejected
//! - Metadata blobs are compact JSON, one per key or per directory
//!
//! # Example
//!
//! ```
//! use gitkv::core::metadata::{parse_metadata, MetaData};
//!
//! let meta = MetaData::new("application/json").with_hidden(true);
//! let json = meta.to_canonical_json().unwrap();
//! let parsed = parse_metadata(&json).unwrap();
//! assert!(parsed.hidden);
//! ```

pub mod commit;
pub mod schema;

pub use commit::{CommitMetaData, CommitMetaDataError};
pub use schema::{parse_metadata, Header, MetaData, MetadataError, DEFAULT_CONTENT_TYPE};
