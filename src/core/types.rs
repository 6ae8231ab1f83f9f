//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`BranchName`] - Validated short name of a branch or tag
//! - [`Oid`] - Git object identifier, also the public version token
//! - [`RefName`] - Validated full Git reference name
//! - [`StoreKey`] - Validated key path inside a ref's tree
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use gitkv::core::types::{BranchName, Oid, RefName, StoreKey};
//!
//! let branch = BranchName::new("main").unwrap();
//! let refname = RefName::for_branch(&branch);
//! assert_eq!(refname.as_str(), "refs/heads/main");
//!
//! let key = StoreKey::new("config/app.json").unwrap();
//! assert!(!key.is_directory());
//!
//! assert!(StoreKey::new("../escape").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::paths::{METADATA_SUFFIX, USERS_PREFIX};

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// A validated short branch or tag name.
///
/// Names must conform to Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
/// - Cannot be exactly `@`
///
/// # Example
///
/// ```
/// use gitkv::core::types::BranchName;
///
/// let name = BranchName::new("release/2024").unwrap();
/// assert_eq!(name.as_str(), "release/2024");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new(".hidden").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        if name.ends_with('/') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot end with '/'".into(),
            ));
        }
        check_ref_components(name).map_err(TypeError::InvalidBranchName)
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Shared refname rules for both short and full names.
fn check_ref_components(name: &str) -> Result<(), String> {
    for bad in ["..", "@{", "//"] {
        if name.contains(bad) {
            return Err(format!("name cannot contain '{bad}'"));
        }
    }

    const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    for c in INVALID_CHARS {
        if name.contains(c) {
            return Err(format!("name cannot contain '{c}'"));
        }
    }

    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("name cannot contain control characters".into());
    }

    for component in name.split('/').filter(|c| !c.is_empty()) {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }

    Ok(())
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase for consistency. The string form of a
/// blob's OID is the version token handed out to callers.
///
/// # Example
///
/// ```
/// use gitkv::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
///
/// assert!(Oid::zero().is_zero());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    const ZERO_SHA1: &'static str = "0000000000000000000000000000000000000000";

    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a valid hex OID.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        Self::validate(&oid)?;
        Ok(Self(oid))
    }

    /// Create the zero/null OID (40 zeros).
    pub fn zero() -> Self {
        Self(Self::ZERO_SHA1.to_string())
    }

    /// Check if this is the zero/null OID.
    pub fn is_zero(&self) -> bool {
        self.0.chars().all(|c| c == '0')
    }

    /// Get an abbreviated form of the OID.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(oid: &str) -> Result<(), TypeError> {
        // SHA-1 is 40 hex chars, SHA-256 is 64
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Prefix of branch refs.
pub const HEADS_PREFIX: &str = "refs/heads/";

/// Prefix of tag refs.
pub const TAGS_PREFIX: &str = "refs/tags/";

/// A validated full Git reference name.
///
/// # Example
///
/// ```
/// use gitkv::core::types::{BranchName, RefName};
///
/// let branch = BranchName::new("main").unwrap();
/// let refname = RefName::for_branch(&branch);
/// assert_eq!(refname.as_str(), "refs/heads/main");
/// assert!(!refname.is_tag_ref());
///
/// let tag = RefName::for_tag(&BranchName::new("v1").unwrap());
/// assert!(tag.is_tag_ref());
/// assert_eq!(tag.short_name(), "v1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Resolve a user-supplied name to a full ref.
    ///
    /// Full names (`refs/...`) are taken as-is; anything else is treated
    /// as a branch name.
    pub fn parse(name: &str) -> Result<Self, TypeError> {
        if name.starts_with("refs/") {
            Self::new(name)
        } else {
            Ok(Self::for_branch(&BranchName::new(name)?))
        }
    }

    /// Create a ref name for a branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("{HEADS_PREFIX}{}", branch.as_str()))
    }

    /// Create a ref name for a tag (`refs/tags/<tag>`).
    pub fn for_tag(tag: &BranchName) -> Self {
        Self(format!("{TAGS_PREFIX}{}", tag.as_str()))
    }

    /// Strip a prefix from the ref name.
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// Check if this ref is a tag ref.
    pub fn is_tag_ref(&self) -> bool {
        self.0.starts_with(TAGS_PREFIX)
    }

    /// The name without its `refs/heads/` or `refs/tags/` prefix.
    pub fn short_name(&self) -> &str {
        self.strip_prefix(HEADS_PREFIX)
            .or_else(|| self.strip_prefix(TAGS_PREFIX))
            .unwrap_or(&self.0)
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidRefName("ref name cannot be empty".into()));
        }
        if name.starts_with('/') {
            return Err(TypeError::InvalidRefName(
                "ref name cannot start with '/'".into(),
            ));
        }
        if name.ends_with('/') {
            return Err(TypeError::InvalidRefName(
                "ref name cannot end with '/'".into(),
            ));
        }
        check_ref_components(name).map_err(TypeError::InvalidRefName)
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated key path.
///
/// Keys are `/`-separated paths relative to the root of a ref's tree. A
/// trailing `/` marks a directory key, which addresses the directory's
/// master metadata rather than a data blob.
///
/// Rules:
/// - Cannot be empty or start with `/`
/// - No empty, `.` or `..` components
/// - Cannot live under the reserved `.users/` subtree
/// - No component may end with the reserved metadata suffix
///
/// # Example
///
/// ```
/// use gitkv::core::types::StoreKey;
///
/// let dir = StoreKey::new("settings/").unwrap();
/// assert!(dir.is_directory());
/// assert_eq!(dir.plain_name(), "settings");
///
/// assert!(StoreKey::new(".users/alice").is_err());
/// assert!(StoreKey::new("a//b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreKey(String);

impl StoreKey {
    /// Create a new validated key.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidKey` if the path breaks the key rules.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    fn validate(key: &str) -> Result<(), TypeError> {
        if key.is_empty() {
            return Err(TypeError::InvalidKey("key cannot be empty".into()));
        }
        if key.starts_with('/') {
            return Err(TypeError::InvalidKey("key cannot start with '/'".into()));
        }
        if key.starts_with(USERS_PREFIX) || key == USERS_PREFIX.trim_end_matches('/') {
            return Err(TypeError::InvalidKey(format!(
                "'{USERS_PREFIX}' is reserved for user records"
            )));
        }
        if key.chars().any(|c| c.is_ascii_control()) {
            return Err(TypeError::InvalidKey(
                "key cannot contain control characters".into(),
            ));
        }

        let body = key.strip_suffix('/').unwrap_or(key);
        for component in body.split('/') {
            match component {
                "" => return Err(TypeError::InvalidKey("key has an empty component".into())),
                "." | ".." => {
                    return Err(TypeError::InvalidKey(
                        "key cannot contain '.' or '..' components".into(),
                    ))
                }
                c if c.ends_with(METADATA_SUFFIX) => {
                    return Err(TypeError::InvalidKey(format!(
                        "key components cannot end with '{METADATA_SUFFIX}'"
                    )))
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Whether this key addresses a directory's master metadata.
    pub fn is_directory(&self) -> bool {
        self.0.ends_with('/')
    }

    /// The key without a trailing `/`.
    ///
    /// For `a/b/` this is `a/b`, the plain key that shadows the directory.
    pub fn plain_name(&self) -> &str {
        self.0.strip_suffix('/').unwrap_or(&self.0)
    }

    /// The directory key this key lives in, or `None` at the root.
    ///
    /// ```
    /// use gitkv::core::types::StoreKey;
    ///
    /// let key = StoreKey::new("a/b/c").unwrap();
    /// assert_eq!(key.parent().unwrap().as_str(), "a/b/");
    /// let dir = StoreKey::new("a/b/").unwrap();
    /// assert_eq!(dir.parent().unwrap().as_str(), "a/");
    /// assert!(StoreKey::new("top").unwrap().parent().is_none());
    /// ```
    pub fn parent(&self) -> Option<StoreKey> {
        let plain = self.plain_name();
        plain
            .rfind('/')
            .map(|idx| StoreKey(plain[..=idx].to_string()))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StoreKey {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<StoreKey> for String {
    fn from(key: StoreKey) -> Self {
        key.0
    }
}

impl AsRef<str> for StoreKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UTC timestamp in RFC3339 format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Seconds since the Unix epoch.
    pub fn epoch_seconds(&self) -> i64 {
        self.0.timestamp()
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
