//! core::config::schema
//!
//! Configuration schema types.
//!
//! The same file shape is used at global and repository scope; a value set
//! in the repository file wins over the global one.
//!
//! # Validation
//!
//! Config values are validated after parsing (e.g., the default branch
//! must be a valid branch name, the cache capacity must be positive).

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// A configuration file.
///
/// # Example
///
/// ```toml
/// [store]
/// cache_capacity = 10000
/// committer_name = "gitkv"
/// committer_email = "gitkv@localhost"
/// default_branch = "main"
///
/// [check]
/// test_ref = "staging"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Engine settings
    pub store: Option<StoreSection>,

    /// Source checker settings
    pub check: Option<CheckSection>,
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    /// Per-ref cache size
    pub cache_capacity: Option<usize>,

    /// Synthetic committer name; the operation name is appended
    pub committer_name: Option<String>,

    /// Synthetic committer email
    pub committer_email: Option<String>,

    /// Branch used when no ref is given
    pub default_branch: Option<String>,
}

/// `[check]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CheckSection {
    /// Branch validated by `check --test`
    pub test_ref: Option<String>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(store) = &self.store {
            if store.cache_capacity == Some(0) {
                return Err(ConfigError::InvalidValue(
                    "store.cache_capacity must be greater than zero".into(),
                ));
            }
            for (field, value) in [
                ("committer_name", &store.committer_name),
                ("committer_email", &store.committer_email),
            ] {
                if matches!(value, Some(v) if v.trim().is_empty()) {
                    return Err(ConfigError::InvalidValue(format!(
                        "store.{field} cannot be empty"
                    )));
                }
            }
            if let Some(branch) = &store.default_branch {
                BranchName::new(branch).map_err(|e| {
                    ConfigError::InvalidValue(format!("store.default_branch: {e}"))
                })?;
            }
        }

        if let Some(test_ref) = self.check.as_ref().and_then(|c| c.test_ref.as_ref()) {
            crate::core::types::RefName::parse(test_ref)
                .map_err(|e| ConfigError::InvalidValue(format!("check.test_ref: {e}")))?;
        }

        Ok(())
    }
}
