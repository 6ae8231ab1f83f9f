//! Property-based tests for keys, tree paths and metadata.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use proptest::prelude::*;

use gitkv::core::metadata::{parse_metadata, MetaData};
use gitkv::core::paths::{
    ancestor_dirs, classify, data_path, metadata_path, user_path, TreePath, METADATA_SUFFIX,
};
use gitkv::core::types::{Oid, RefName, StoreKey};

/// Strategy for a single key component.
fn component() -> impl Strategy<Value = String> {
    "[a-z0-9_-][a-z0-9_.-]{0,10}"
}

/// Strategy for the components of a key path.
fn components() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(component(), 1..6)
}

/// Strategy for generating valid hex OIDs.
fn valid_oid_string() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
        ]),
        40,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn role() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

prop_compose! {
    fn metadata()(
        content_type in "(text|application)/[a-z]{1,10}",
        protected in any::<bool>(),
        hidden in any::<bool>(),
        headers in prop::collection::vec(("[A-Za-z-]{1,12}", "[ -~]{0,16}"), 0..3),
        read_roles in prop::collection::btree_set(role(), 0..4),
        write_roles in prop::collection::btree_set(role(), 0..4),
        users in prop::collection::btree_set(role(), 0..3),
    ) -> MetaData {
        let mut meta = MetaData::new(content_type)
            .with_protected(protected)
            .with_hidden(hidden)
            .with_read_roles(read_roles)
            .with_write_roles(write_roles);
        for (name, value) in headers {
            meta = meta.with_header(name, value);
        }
        meta.users = users;
        meta
    }
}

proptest! {
    /// Joined components always form a valid plain key and a valid directory key.
    #[test]
    fn generated_paths_are_valid_keys(parts in components()) {
        let plain = parts.join("/");
        prop_assume!(!parts.iter().any(|c| c.ends_with(METADATA_SUFFIX)));

        let key = StoreKey::new(plain.clone()).unwrap();
        prop_assert!(!key.is_directory());
        let dir = StoreKey::new(format!("{plain}/")).unwrap();
        prop_assert!(dir.is_directory());
        prop_assert_eq!(dir.plain_name(), key.as_str());
    }

    /// A reserved suffix on any component is rejected.
    #[test]
    fn metadata_suffix_is_reserved(parts in components(), at in any::<prop::sample::Index>()) {
        let mut parts = parts;
        let idx = at.index(parts.len());
        parts[idx].push_str(METADATA_SUFFIX);
        prop_assert!(StoreKey::new(parts.join("/")).is_err());
    }

    /// Empty components never make it into a key.
    #[test]
    fn empty_components_are_rejected(parts in components(), at in any::<prop::sample::Index>()) {
        let mut parts = parts;
        // Never at the end: a trailing empty component is a directory key.
        parts.insert(at.index(parts.len()), String::new());
        prop_assert!(StoreKey::new(parts.join("/")).is_err());
    }

    /// Data and metadata paths classify back to the key that produced them.
    #[test]
    fn tree_paths_classify_back(parts in components()) {
        prop_assume!(!parts.iter().any(|c| c.ends_with(METADATA_SUFFIX)));
        let plain = parts.join("/");
        let key = StoreKey::new(plain.clone()).unwrap();
        let dir = StoreKey::new(format!("{plain}/")).unwrap();

        prop_assert_eq!(classify(&data_path(&key)), TreePath::Data(plain.clone()));
        prop_assert_eq!(classify(&metadata_path(&key)), TreePath::Metadata(plain.clone()));
        prop_assert_eq!(classify(&metadata_path(&dir)), TreePath::Master(format!("{plain}/")));
    }

    /// The parent chain of a key visits exactly its ancestor directories.
    #[test]
    fn parent_chain_matches_ancestor_dirs(parts in components(), directory in any::<bool>()) {
        prop_assume!(!parts.iter().any(|c| c.ends_with(METADATA_SUFFIX)));
        let mut path = parts.join("/");
        if directory {
            path.push('/');
        }
        let key = StoreKey::new(path.clone()).unwrap();

        let mut chain = Vec::new();
        let mut current = key.parent();
        while let Some(parent) = current {
            prop_assert!(parent.is_directory());
            prop_assert!(path.starts_with(parent.as_str()));
            chain.push(parent.as_str().to_string());
            current = parent.parent();
        }
        chain.push(String::new());

        prop_assert_eq!(chain.len(), parts.len());
        prop_assert_eq!(ancestor_dirs(&path), chain);
    }

    /// User records live outside the key space.
    #[test]
    fn user_paths_are_not_keys(name in "[a-z][a-z0-9_]{0,12}") {
        let path = user_path(&name);
        prop_assert_eq!(classify(&path), TreePath::User(name));
        prop_assert!(StoreKey::new(path).is_err());
    }

    /// Canonical JSON keeps every field and is stable across a reparse.
    #[test]
    fn metadata_canonical_json_is_stable(meta in metadata()) {
        let json = meta.to_canonical_json().unwrap();
        let parsed = parse_metadata(&json).unwrap();

        prop_assert_eq!(&parsed.content_type, &meta.content_type);
        prop_assert_eq!(parsed.protected, meta.protected);
        prop_assert_eq!(parsed.hidden, meta.hidden);
        prop_assert_eq!(&parsed.headers, &meta.headers);
        prop_assert_eq!(&parsed.read_roles, &meta.read_roles);
        prop_assert_eq!(&parsed.write_roles, &meta.write_roles);
        prop_assert_eq!(parsed.to_canonical_json().unwrap(), json);
    }

    /// Metadata equality only looks at the content type and the user set.
    #[test]
    fn metadata_equality_ignores_flags_and_roles(meta in metadata(), other in metadata()) {
        let mut twin = other.clone();
        twin.content_type = meta.content_type.clone();
        twin.users = meta.users.clone();
        prop_assert_eq!(&twin, &meta);

        let mut changed = meta.clone();
        changed.content_type.push_str("x");
        prop_assert_ne!(changed, meta);
    }

    /// Short ref names resolve under refs/heads/.
    #[test]
    fn short_names_resolve_to_branches(parts in prop::collection::vec("[a-z][a-z0-9_-]{0,8}", 1..4)) {
        let name = parts.join("/");
        let refname = RefName::parse(&name).unwrap();
        prop_assert_eq!(refname.as_str(), format!("refs/heads/{name}"));
        prop_assert_eq!(refname.short_name(), name.as_str());
        prop_assert_eq!(RefName::parse(refname.as_str()).unwrap(), refname);
    }

    /// OIDs are normalized to lowercase.
    #[test]
    fn oid_normalized_to_lowercase(oid_str in valid_oid_string()) {
        let upper = oid_str.to_uppercase();
        let oid = Oid::new(&upper).unwrap();
        prop_assert_eq!(oid.as_str(), oid_str.to_lowercase());
    }
}
