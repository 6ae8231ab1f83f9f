//! store::cache
//!
//! Read-through cache of one ref.
//!
//! Entries remember confirmed absence (`Key(None)`) as well as values, so a
//! miss on a key that does not exist is paid once. Loads only fill empty
//! slots; writes overwrite. A load that raced with a write therefore never
//! replaces the write's result.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use crate::core::types::Oid;
use crate::core::user::UserData;

use super::info::StoreInfo;

/// Where an entry lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Key(String),
    User(String),
}

/// A cached lookup result.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Key(Option<StoreInfo>),
    User(Option<(Oid, UserData)>),
}

impl CacheEntry {
    /// Whether the lookup found something.
    pub fn is_present(&self) -> bool {
        match self {
            CacheEntry::Key(info) => info.is_some(),
            CacheEntry::User(user) => user.is_some(),
        }
    }
}

/// Bounded map of lookup results.
#[derive(Debug)]
pub struct KeyCache {
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl KeyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    /// Store a loaded entry unless the slot is already filled.
    ///
    /// Returns whatever the slot holds afterwards.
    pub fn insert_if_absent(&self, key: CacheKey, entry: CacheEntry) -> CacheEntry {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            return existing.clone();
        }
        Self::make_room(&mut entries, self.capacity);
        entries.insert(key, entry.clone());
        entry
    }

    /// Store the result of a write.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) {
            Self::make_room(&mut entries, self.capacity);
        }
        entries.insert(key, entry);
    }

    /// Cached lookup of a key; `None` if never looked up.
    pub fn key_entry(&self, path: &str) -> Option<Option<StoreInfo>> {
        match self.get(&CacheKey::Key(path.to_string()))? {
            CacheEntry::Key(info) => Some(info),
            CacheEntry::User(_) => None,
        }
    }

    /// Cached lookup of a user; `None` if never looked up.
    pub fn user_entry(&self, name: &str) -> Option<Option<(Oid, UserData)>> {
        match self.get(&CacheKey::User(name.to_string()))? {
            CacheEntry::User(user) => Some(user),
            CacheEntry::Key(_) => None,
        }
    }

    /// Record a loaded key and return the value the cache settled on.
    pub fn load_key(&self, path: &str, loaded: Option<StoreInfo>) -> Option<StoreInfo> {
        let slot = CacheKey::Key(path.to_string());
        match self.insert_if_absent(slot, CacheEntry::Key(loaded.clone())) {
            CacheEntry::Key(info) => info,
            CacheEntry::User(_) => loaded,
        }
    }

    /// Record a loaded user and return the value the cache settled on.
    pub fn load_user(&self, name: &str, loaded: Option<(Oid, UserData)>) -> Option<(Oid, UserData)> {
        let slot = CacheKey::User(name.to_string());
        match self.insert_if_absent(slot, CacheEntry::User(loaded.clone())) {
            CacheEntry::User(user) => user,
            CacheEntry::Key(_) => loaded,
        }
    }

    pub fn put_key(&self, path: &str, info: Option<StoreInfo>) {
        self.put(CacheKey::Key(path.to_string()), CacheEntry::Key(info));
    }

    pub fn put_user(&self, name: &str, user: Option<(Oid, UserData)>) {
        self.put(CacheKey::User(name.to_string()), CacheEntry::User(user));
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.lock().remove(key);
    }

    /// Drop every key entry at or below a directory path.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !matches!(key, CacheKey::Key(path) if path.starts_with(prefix)));
        trace!(prefix, dropped = before - entries.len(), "invalidated prefix");
    }

    /// Keys whose cached lookup found something.
    pub fn present_keys(&self) -> Vec<CacheKey> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.is_present())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drop everything.
    pub fn close(&self) {
        self.entries.lock().clear();
    }

    // Absent entries are the cheapest to lose, so they go first.
    fn make_room(entries: &mut HashMap<CacheKey, CacheEntry>, capacity: usize) {
        if entries.len() < capacity {
            return;
        }
        let victim = entries
            .iter()
            .find(|(_, entry)| !entry.is_present())
            .or_else(|| entries.iter().next())
            .map(|(key, _)| key.clone());
        if let Some(victim) = victim {
            entries.remove(&victim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::MetaData;

    fn key(k: &str) -> CacheKey {
        CacheKey::Key(k.to_string())
    }

    fn present() -> CacheEntry {
        let oid = Oid::new("a".repeat(40)).unwrap();
        CacheEntry::Key(Some(StoreInfo::master(MetaData::default(), oid)))
    }

    #[test]
    fn load_does_not_clobber_write() {
        let cache = KeyCache::new(10);
        cache.put(key("a"), present());
        let kept = cache.insert_if_absent(key("a"), CacheEntry::Key(None));
        assert!(kept.is_present());
        assert!(cache.get(&key("a")).unwrap().is_present());
    }

    #[test]
    fn typed_accessors() {
        let cache = KeyCache::new(10);
        assert!(cache.key_entry("a").is_none());
        assert!(cache.load_key("a", None).is_none());
        assert!(matches!(cache.key_entry("a"), Some(None)));

        let user = UserData::new("bob", "pw", ["r"]).unwrap();
        let version = Oid::new("b".repeat(40)).unwrap();
        cache.put_user("bob", Some((version.clone(), user)));
        let loaded = cache.load_user("bob", None);
        assert_eq!(loaded.unwrap().0, version);
        assert!(cache.user_entry("a").is_none());
    }

    #[test]
    fn absence_is_cached() {
        let cache = KeyCache::new(10);
        cache.insert_if_absent(key("a"), CacheEntry::Key(None));
        assert!(matches!(cache.get(&key("a")), Some(CacheEntry::Key(None))));
        assert!(cache.present_keys().is_empty());
    }

    #[test]
    fn namespaces_are_separate() {
        let cache = KeyCache::new(10);
        cache.put(key("bob"), present());
        assert!(cache.get(&CacheKey::User("bob".into())).is_none());
    }

    #[test]
    fn prefix_invalidation_spares_users_and_siblings() {
        let cache = KeyCache::new(10);
        cache.put(key("d/"), present());
        cache.put(key("d/x"), present());
        cache.put(key("e"), present());
        cache.put(CacheKey::User("d/".into()), CacheEntry::User(None));

        cache.invalidate_prefix("d/");
        assert!(cache.get(&key("d/")).is_none());
        assert!(cache.get(&key("d/x")).is_none());
        assert!(cache.get(&key("e")).is_some());
        assert!(cache.get(&CacheKey::User("d/".into())).is_some());
    }

    #[test]
    fn bounded_and_prefers_evicting_absent() {
        let cache = KeyCache::new(2);
        cache.put(key("a"), present());
        cache.put(key("gone"), CacheEntry::Key(None));
        cache.put(key("b"), present());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("gone")).is_none());
        assert!(cache.get(&key("a")).is_some());
    }

    #[test]
    fn close_empties() {
        let cache = KeyCache::new(2);
        cache.put(key("a"), present());
        cache.close();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 2);
    }
}
