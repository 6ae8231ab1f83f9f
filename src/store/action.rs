//! store::action
//!
//! Pending mutations and the claims they take.

use crate::core::metadata::{CommitMetaData, MetaData};
use crate::core::types::{Oid, StoreKey};
use crate::core::user::UserData;

/// What a claim protects.
///
/// Keys and users live in separate namespaces, so a key named like a user
/// never contends with that user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClaimKey {
    Key(String),
    User(String),
    /// The whole ref.
    Global,
}

impl std::fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimKey::Key(key) => write!(f, "key:{key}"),
            ClaimKey::User(name) => write!(f, "user:{name}"),
            ClaimKey::Global => f.write_str("global"),
        }
    }
}

/// A mutation waiting for its ref's writer.
#[derive(Debug, Clone)]
pub enum ActionData {
    AddKey {
        key: StoreKey,
        data: Vec<u8>,
        /// `None` inherits the nearest directory metadata.
        metadata: Option<MetaData>,
        commit: CommitMetaData,
    },
    UpdateKey {
        key: StoreKey,
        data: Vec<u8>,
        old_version: Oid,
        commit: CommitMetaData,
    },
    DeleteKey {
        key: StoreKey,
        old_version: Oid,
        commit: CommitMetaData,
    },
    UpdateMetaKey {
        key: StoreKey,
        metadata: MetaData,
        /// Version of the key's own metadata blob; `None` when it has none yet.
        old_version: Option<Oid>,
        commit: CommitMetaData,
    },
    AddUser {
        user: UserData,
        commit: CommitMetaData,
    },
    UpdateUser {
        user: UserData,
        old_version: Oid,
        commit: CommitMetaData,
    },
    DeleteUser {
        name: String,
        old_version: Oid,
        commit: CommitMetaData,
    },
}

impl ActionData {
    /// The claim this action must hold while it runs.
    pub fn claim_key(&self) -> ClaimKey {
        match self {
            ActionData::AddKey { key, .. }
            | ActionData::UpdateKey { key, .. }
            | ActionData::DeleteKey { key, .. }
            | ActionData::UpdateMetaKey { key, .. } => ClaimKey::Key(key.as_str().to_string()),
            ActionData::AddUser { user, .. } | ActionData::UpdateUser { user, .. } => {
                ClaimKey::User(user.name.clone())
            }
            ActionData::DeleteUser { name, .. } => ClaimKey::User(name.clone()),
        }
    }

    /// Operation name recorded in the committer identity.
    pub fn operation(&self) -> &'static str {
        match self {
            ActionData::AddKey { .. } => "addKey",
            ActionData::UpdateKey { .. } => "updateKey",
            ActionData::DeleteKey { .. } => "deleteKey",
            ActionData::UpdateMetaKey { .. } => "updateMetadata",
            ActionData::AddUser { .. } => "addUser",
            ActionData::UpdateUser { .. } => "updateUser",
            ActionData::DeleteUser { .. } => "deleteUser",
        }
    }

    pub fn commit(&self) -> &CommitMetaData {
        match self {
            ActionData::AddKey { commit, .. }
            | ActionData::UpdateKey { commit, .. }
            | ActionData::DeleteKey { commit, .. }
            | ActionData::UpdateMetaKey { commit, .. }
            | ActionData::AddUser { commit, .. }
            | ActionData::UpdateUser { commit, .. }
            | ActionData::DeleteUser { commit, .. } => commit,
        }
    }
}
