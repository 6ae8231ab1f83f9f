//! store::extractor
//!
//! Resolves (data, metadata) pairs from a ref's tree.
//!
//! # Pairing
//!
//! A data blob pairs with the metadata blob next to it (`key.metadata`). A
//! data blob without one inherits the master metadata of the nearest
//! enclosing directory (`dir/.metadata`, up to the root `.metadata`). A
//! master metadata blob on its own is the value of a directory key.
//!
//! # Errors
//!
//! Blob failures never abort a walk. A metadata blob that cannot be read or
//! parsed is carried in its pair as an error and surfaces only when that
//! pair is turned into a [`StoreInfo`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::metadata::{parse_metadata, MetaData, MetadataError};
use crate::core::paths::{
    ancestor_dirs, classify, master_path, user_path, TreePath, METADATA_SUFFIX,
};
use crate::core::types::{Oid, RefName, StoreKey};
use crate::core::user::UserData;
use crate::git::{EntryKind, Git};

use super::error::{StoreError, StoreResult};
use super::info::{DataSource, StoreInfo};

/// The commit a ref points at and its root tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub commit: Oid,
    pub tree: Oid,
}

/// A metadata blob and the result of parsing it.
#[derive(Debug, Clone)]
pub struct MetaBlob {
    pub path: String,
    pub oid: Oid,
    pub parsed: Result<MetaData, MetadataError>,
}

/// What the tree holds for one key.
#[derive(Debug, Clone)]
pub struct SourcePair {
    pub key: String,
    pub data: Option<Oid>,
    pub metadata: Option<MetaBlob>,
    /// The metadata came from an enclosing directory.
    pub inherited: bool,
}

impl SourcePair {
    /// The key's own metadata blob, ignoring inherited masters.
    pub fn own_metadata(&self) -> Option<&MetaBlob> {
        self.metadata.as_ref().filter(|_| !self.inherited)
    }

    /// Apply visibility rules and build the reader-facing value.
    ///
    /// Hidden keys, directory keys without their own master and plain keys
    /// without data all resolve to `None`.
    pub fn into_store_info(self, git: &Git) -> StoreResult<Option<StoreInfo>> {
        let is_directory = self.key.ends_with('/');
        let (metadata, version) = match &self.metadata {
            Some(blob) => {
                let meta = blob.parsed.clone().map_err(|source| StoreError::Metadata {
                    path: blob.path.clone(),
                    source,
                })?;
                (meta, Some(blob.oid.clone()))
            }
            None => (MetaData::default(), None),
        };

        if metadata.hidden {
            return Ok(None);
        }

        if is_directory {
            return Ok(match (self.inherited, version) {
                (false, Some(version)) => Some(StoreInfo::master(metadata, version)),
                _ => None,
            });
        }

        Ok(self.data.map(|oid| {
            StoreInfo::data(DataSource::new(git.handle(), oid), metadata, version)
        }))
    }

    /// Whether readers can see this pair.
    pub fn is_visible(&self) -> bool {
        let hidden = match &self.metadata {
            Some(MetaBlob { parsed: Ok(meta), .. }) => meta.hidden,
            Some(MetaBlob { parsed: Err(_), .. }) => return false,
            None => false,
        };
        if hidden {
            return false;
        }
        if self.key.ends_with('/') {
            !self.inherited && self.metadata.is_some()
        } else {
            self.data.is_some()
        }
    }
}

/// Everything a full walk found.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Pairs keyed by key path (directory keys end in `/`).
    pub pairs: BTreeMap<String, SourcePair>,
    /// Metadata blobs of plain keys that have no data.
    pub orphans: Vec<MetaBlob>,
    /// User records by name.
    pub users: BTreeMap<String, Oid>,
}

impl Extraction {
    /// Visible keys below `prefix` (`""` is the root).
    ///
    /// A recursive listing returns every visible key. A flat listing returns
    /// direct data children and the direct child directories (`name/`) that
    /// contain something visible.
    pub fn list(&self, prefix: &str, recursive: bool) -> Vec<String> {
        let mut out = std::collections::BTreeSet::new();
        for (key, pair) in self.pairs.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            if rest.is_empty() || !pair.is_visible() {
                continue;
            }
            if recursive {
                out.insert(key.clone());
                continue;
            }
            match rest.find('/') {
                Some(idx) => {
                    out.insert(format!("{prefix}{}", &rest[..=idx]));
                }
                None => {
                    out.insert(key.clone());
                }
            }
        }
        out.into_iter().collect()
    }

    /// Whether the tree holds any data key.
    pub fn has_data(&self) -> bool {
        self.pairs.values().any(|pair| pair.data.is_some())
    }
}

/// Reads pairs out of trees.
pub struct SourceExtractor<'a> {
    git: &'a Git,
}

impl<'a> SourceExtractor<'a> {
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// Current head of a ref.
    ///
    /// `None` if the ref does not exist or points at the zero id.
    pub fn head(&self, refname: &RefName) -> StoreResult<Option<Head>> {
        let Some(commit) = self.git.try_resolve_ref(refname.as_str())? else {
            return Ok(None);
        };
        if commit.is_zero() {
            return Ok(None);
        }
        let tree = self.git.commit_tree(&commit)?;
        Ok(Some(Head { commit, tree }))
    }

    /// Head of a ref that readers expect to exist.
    ///
    /// # Errors
    ///
    /// [`StoreError::Load`] if the ref is missing.
    pub fn head_for_read(&self, refname: &RefName) -> StoreResult<Option<Head>> {
        if !self.git.ref_exists(refname.as_str()) {
            return Err(StoreError::Load {
                refname: refname.to_string(),
            });
        }
        self.head(refname)
    }

    fn meta_blob(&self, path: String, oid: Oid) -> MetaBlob {
        let parsed = self
            .git
            .read_blob_as_string(&oid)
            .map_err(|e| MetadataError::ParseError(e.to_string()))
            .and_then(|json| parse_metadata(&json));
        MetaBlob { path, oid, parsed }
    }

    /// Walk the whole tree.
    pub fn extract_all(&self, tree: &Oid) -> StoreResult<Extraction> {
        let mut data = BTreeMap::new();
        let mut metas = BTreeMap::new();
        let mut masters = BTreeMap::new();
        let mut users = BTreeMap::new();

        for item in self.git.walk_tree(tree)? {
            if item.kind != EntryKind::Blob {
                continue;
            }
            match classify(&item.path) {
                TreePath::User(name) => {
                    users.insert(name, item.oid);
                }
                TreePath::Data(key) => {
                    data.insert(key, item.oid);
                }
                TreePath::Metadata(owner) => {
                    metas.insert(owner, (item.path, item.oid));
                }
                TreePath::Master(dir) => {
                    masters.insert(dir, self.meta_blob(item.path, item.oid));
                }
            }
        }

        let mut extraction = Extraction {
            users,
            ..Default::default()
        };

        for (key, oid) in data {
            let (metadata, inherited) = match metas.remove(&key) {
                Some((path, meta_oid)) => (Some(self.meta_blob(path, meta_oid)), false),
                None => {
                    let master = ancestor_dirs(&key)
                        .into_iter()
                        .find_map(|dir| masters.get(dir))
                        .cloned();
                    let inherited = master.is_some();
                    (master, inherited)
                }
            };
            extraction.pairs.insert(
                key.clone(),
                SourcePair {
                    key,
                    data: Some(oid),
                    metadata,
                    inherited,
                },
            );
        }

        for (_, (path, oid)) in metas {
            extraction.orphans.push(self.meta_blob(path, oid));
        }

        for (dir, blob) in masters {
            if dir.is_empty() {
                continue;
            }
            extraction.pairs.insert(
                dir.clone(),
                SourcePair {
                    key: dir,
                    data: None,
                    metadata: Some(blob),
                    inherited: false,
                },
            );
        }

        debug!(
            tree = %tree.short(8),
            keys = extraction.pairs.len(),
            users = extraction.users.len(),
            "extracted tree"
        );
        Ok(extraction)
    }

    /// Resolve one key without walking unrelated subtrees.
    ///
    /// Only the key's ancestors are descended into. Along the way every
    /// ancestor's master metadata is noted so the nearest one can be
    /// inherited.
    pub fn extract_key(&self, tree: &Oid, key: &StoreKey) -> StoreResult<Option<SourcePair>> {
        let plain = key.plain_name();
        let components: Vec<&str> = plain.split('/').collect();
        let (descend, leaf): (&[&str], Option<&str>) = if key.is_directory() {
            (&components[..], None)
        } else {
            match components.split_last() {
                Some((last, parents)) => (parents, Some(*last)),
                None => (&components[..0], None),
            }
        };

        let mut current = tree.clone();
        let mut dir = String::new();
        let mut nearest_master: Option<(String, Oid)> = None;

        for component in descend {
            let entries = self.git.tree_entries(&current)?;
            if let Some(master) = entries
                .iter()
                .find(|e| e.path == METADATA_SUFFIX && e.kind == EntryKind::Blob)
            {
                nearest_master = Some((master_path(&dir), master.oid.clone()));
            }
            match entries
                .into_iter()
                .find(|e| e.path == *component && e.kind == EntryKind::Tree)
            {
                Some(subtree) => {
                    current = subtree.oid;
                    dir.push_str(component);
                    dir.push('/');
                }
                None => return Ok(None),
            }
        }

        let entries = self.git.tree_entries(&current)?;
        let blob = |name: &str| {
            entries
                .iter()
                .find(|e| e.path == name && e.kind == EntryKind::Blob)
                .map(|e| e.oid.clone())
        };

        let Some(leaf) = leaf else {
            // Directory key: its own master sits inside the directory.
            return Ok(blob(METADATA_SUFFIX).map(|oid| SourcePair {
                key: key.as_str().to_string(),
                data: None,
                metadata: Some(self.meta_blob(master_path(&dir), oid)),
                inherited: false,
            }));
        };

        let Some(data) = blob(leaf) else {
            return Ok(None);
        };

        let own = format!("{leaf}{METADATA_SUFFIX}");
        let (metadata, inherited) = match blob(&own) {
            Some(oid) => (Some(self.meta_blob(format!("{dir}{own}"), oid)), false),
            None => {
                if let Some(oid) = blob(METADATA_SUFFIX) {
                    nearest_master = Some((master_path(&dir), oid));
                }
                let inherited = nearest_master.is_some();
                (
                    nearest_master.map(|(path, oid)| self.meta_blob(path, oid)),
                    inherited,
                )
            }
        };

        Ok(Some(SourcePair {
            key: key.as_str().to_string(),
            data: Some(data),
            metadata,
            inherited,
        }))
    }

    /// Resolve a key and apply visibility rules.
    pub fn resolve_key(&self, tree: Option<&Oid>, key: &StoreKey) -> StoreResult<Option<StoreInfo>> {
        let Some(tree) = tree else {
            return Ok(None);
        };
        match self.extract_key(tree, key)? {
            Some(pair) => pair.into_store_info(self.git),
            None => Ok(None),
        }
    }

    /// Read a user record and its version.
    pub fn read_user(&self, tree: Option<&Oid>, name: &str) -> StoreResult<Option<(Oid, UserData)>> {
        let Some(tree) = tree else {
            return Ok(None);
        };
        let Some(entry) = self.git.tree_entry_at(tree, &user_path(name))? else {
            return Ok(None);
        };
        if entry.kind != EntryKind::Blob {
            return Ok(None);
        }
        let json = self.git.read_blob_as_string(&entry.oid)?;
        let user = UserData::from_json(&json)?;
        Ok(Some((entry.oid, user)))
    }
}
