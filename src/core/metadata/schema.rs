//! core::metadata::schema
//!
//! Per-key metadata.
//!
//! # Visibility and Mutation Flags
//!
//! - `hidden`: the key is never returned by reads, even if a blob exists
//! - `protected`: the key's data cannot be updated or deleted
//!
//! # Equality
//!
//! Two [`MetaData`] values compare equal when their content type and legacy
//! user set match. Role sets and flags do not take part in equality; stored
//! data relies on that comparison, so it is kept as-is.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type given to keys with no metadata anywhere on their path.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors from metadata parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("failed to parse metadata: {0}")]
    ParseError(String),

    #[error("failed to serialize metadata: {0}")]
    SerializeError(String),

    #[error("invalid metadata value: {0}")]
    InvalidValue(String),
}

/// A response header attached to a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Metadata of a key or, as master metadata, of a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaData {
    /// MIME type of the data blob.
    pub content_type: String,

    /// Blocks updates and deletes of the data.
    #[serde(default)]
    pub protected: bool,

    /// Blocks every read of the key.
    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub headers: Vec<Header>,

    /// Roles allowed to read the key.
    #[serde(default)]
    pub read_roles: BTreeSet<String>,

    /// Roles allowed to modify the key.
    #[serde(default)]
    pub write_roles: BTreeSet<String>,

    /// Legacy per-user access list, predates role sets.
    #[serde(default)]
    pub users: BTreeSet<String>,
}

impl MetaData {
    /// Metadata with the given content type and nothing else set.
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            protected: false,
            hidden: false,
            headers: Vec::new(),
            read_roles: BTreeSet::new(),
            write_roles: BTreeSet::new(),
            users: BTreeSet::new(),
        }
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_read_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_write_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Validate field values.
    ///
    /// Content type and header names must be non-empty; role names may not
    /// be blank.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.content_type.trim().is_empty() {
            return Err(MetadataError::InvalidValue(
                "content_type cannot be empty".into(),
            ));
        }
        if self.headers.iter().any(|h| h.name.trim().is_empty()) {
            return Err(MetadataError::InvalidValue(
                "header name cannot be empty".into(),
            ));
        }
        let mut roles = self.read_roles.iter().chain(self.write_roles.iter());
        if roles.any(|r| r.trim().is_empty()) {
            return Err(MetadataError::InvalidValue("role cannot be blank".into()));
        }
        Ok(())
    }

    /// Serialize to canonical JSON (compact, deterministic).
    ///
    /// Identical metadata always yields an identical blob, and so the same
    /// metadata version.
    pub fn to_canonical_json(&self) -> Result<String, MetadataError> {
        serde_json::to_string(self).map_err(|e| MetadataError::SerializeError(e.to_string()))
    }
}

impl Default for MetaData {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_TYPE)
    }
}

// Only content type and the legacy user set count; see module docs.
impl PartialEq for MetaData {
    fn eq(&self, other: &Self) -> bool {
        self.content_type == other.content_type && self.users == other.users
    }
}

impl Eq for MetaData {}

/// Parse a metadata blob with validation.
///
/// # Errors
///
/// Returns an error if the JSON is malformed, has unknown fields, or fails
/// [`MetaData::validate`].
///
/// # Example
///
/// ```
/// use gitkv::core::metadata::parse_metadata;
///
/// let meta = parse_metadata(r#"{"content_type":"text/plain","hidden":true}"#).unwrap();
/// assert!(meta.hidden);
/// assert!(!meta.protected);
///
/// assert!(parse_metadata(r#"{"content_type":"text/plain","bogus":1}"#).is_err());
/// ```
pub fn parse_metadata(json: &str) -> Result<MetaData, MetadataError> {
    let meta: MetaData =
        serde_json::from_str(json).map_err(|e| MetadataError::ParseError(e.to_string()))?;
    meta.validate()?;
    Ok(meta)
}
