//! core::user
//!
//! Per-ref user records.
//!
//! Users live under `.users/<name>` in the ref's tree as JSON blobs. The
//! password is never stored; only a salted SHA-256 digest is.
//!
//! # Example
//!
//! ```
//! use gitkv::core::user::UserData;
//!
//! let user = UserData::new("alice", "s3cret", ["admin"]).unwrap();
//! assert!(user.verify_password("s3cret"));
//! assert!(!user.verify_password("guess"));
//!
//! // Keep the hash, change the roles
//! let updated = user.merged(["reader"], None);
//! assert!(updated.verify_password("s3cret"));
//! assert!(updated.roles.contains("reader"));
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from user record handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("invalid user name: {0}")]
    InvalidName(String),

    #[error("password cannot be empty")]
    EmptyPassword,

    #[error("failed to parse user record: {0}")]
    ParseError(String),

    #[error("failed to serialize user record: {0}")]
    SerializeError(String),
}

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserData {
    pub name: String,
    pub salt: String,
    /// Hex SHA-256 of `salt || password`.
    pub password_hash: String,
    pub roles: BTreeSet<String>,
}

impl UserData {
    /// Create a user with a freshly salted password hash.
    pub fn new<I, S>(name: impl Into<String>, password: &str, roles: I) -> Result<Self, UserError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        validate_name(&name)?;
        if password.is_empty() {
            return Err(UserError::EmptyPassword);
        }
        let salt = uuid::Uuid::new_v4().simple().to_string();
        let password_hash = hash_password(&salt, password);
        Ok(Self {
            name,
            salt,
            password_hash,
            roles: roles.into_iter().map(Into::into).collect(),
        })
    }

    /// Build the record that replaces `self` on update.
    ///
    /// Roles are replaced. The salt and hash carry over unchanged unless a
    /// new password is supplied.
    pub fn merged<I, S>(&self, roles: I, password: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (salt, password_hash) = match password.filter(|p| !p.is_empty()) {
            Some(password) => {
                let salt = uuid::Uuid::new_v4().simple().to_string();
                let hash = hash_password(&salt, password);
                (salt, hash)
            }
            None => (self.salt.clone(), self.password_hash.clone()),
        };
        Self {
            name: self.name.clone(),
            salt,
            password_hash,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Check a candidate password against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }

    pub fn to_json(&self) -> Result<String, UserError> {
        serde_json::to_string(self).map_err(|e| UserError::SerializeError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, UserError> {
        let user: Self =
            serde_json::from_str(json).map_err(|e| UserError::ParseError(e.to_string()))?;
        validate_name(&user.name).map_err(|e| UserError::ParseError(e.to_string()))?;
        Ok(user)
    }
}

/// User names become a single tree entry under `.users/`.
pub fn validate_name(name: &str) -> Result<(), UserError> {
    if name.is_empty() {
        return Err(UserError::InvalidName("name cannot be empty".into()));
    }
    if name == "." || name == ".." {
        return Err(UserError::InvalidName(format!("'{name}' is reserved")));
    }
    if name.contains('/') || name.chars().any(|c| c.is_ascii_control()) {
        return Err(UserError::InvalidName(
            "name cannot contain '/' or control characters".into(),
        ));
    }
    Ok(())
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salts_differ_between_users() {
        let a = UserData::new("a", "pw", Vec::<String>::new()).unwrap();
        let b = UserData::new("b", "pw", Vec::<String>::new()).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn merged_with_new_password_rehashes() {
        let user = UserData::new("a", "old", ["r"]).unwrap();
        let updated = user.merged(["r", "w"], Some("new"));
        assert!(updated.verify_password("new"));
        assert!(!updated.verify_password("old"));
        assert_eq!(updated.roles.len(), 2);
    }

    #[test]
    fn merged_with_empty_password_keeps_hash() {
        let user = UserData::new("a", "old", ["r"]).unwrap();
        let updated = user.merged(Vec::<String>::new(), Some(""));
        assert_eq!(updated.password_hash, user.password_hash);
        assert!(updated.roles.is_empty());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("bob").is_ok());
    }

    #[test]
    fn empty_password_rejected() {
        assert_eq!(
            UserData::new("a", "", Vec::<String>::new()).unwrap_err(),
            UserError::EmptyPassword
        );
    }

    #[test]
    fn json_roundtrip_preserves_hash() {
        let user = UserData::new("carol", "pw", ["admin"]).unwrap();
        let parsed = UserData::from_json(&user.to_json().unwrap()).unwrap();
        assert_eq!(parsed, user);
        assert!(parsed.verify_password("pw"));
    }
}
