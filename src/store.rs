use bytes::Bytes;
use glob_match::glob_match;
use std::collections::HashMap;
use std::ops::Deref;
use std::str;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// The Store is responsible for managing key-value pairs, with an optional expiration time for
/// each key. Expired keys are removed lazily: a key is dropped the first time it is accessed after
/// its deadline, and it is never handed out once the deadline has passed.
///
/// The store is thread-safe and cheap to clone; all clones share the same table behind a single
/// lock.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        Self::default()
    }
}

#[derive(Default)]
pub struct InnerStore {
    state: Mutex<State>,
}

pub struct InnerStoreLocked<'a> {
    state: MutexGuard<'a, State>,
}

impl<'a> InnerStoreLocked<'a> {
    pub fn set(&mut self, key: Key, data: Bytes) {
        let value = Value {
            data,
            expires_at: None,
        };
        self.state.keys.insert(key, value);
    }

    pub fn set_with_expiry(&mut self, key: Key, data: Bytes, expires_at: SystemTime) {
        let value = Value {
            data,
            expires_at: Some(expires_at),
        };
        self.state.keys.insert(key, value);
    }

    pub fn insert(&mut self, key: Key, value: Value) {
        self.state.keys.insert(key, value);
    }

    /// Returns the live value for `key`. An expired entry is removed as a side effect.
    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        let expired = self.state.keys.get(key)?.is_expired(SystemTime::now());
        if expired {
            self.state.keys.remove(key);
            return None;
        }

        self.state.keys.get(key).map(|value| value.data.clone())
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        let now = SystemTime::now();
        match self.state.keys.remove(key) {
            Some(value) => !value.is_expired(now),
            None => false,
        }
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Number of live keys. Expired entries found along the way are purged.
    pub fn size(&mut self) -> usize {
        self.remove_expired_keys();
        self.state.keys.len()
    }

    /// Live keys matching a glob `pattern`; `*` matches every key.
    pub fn keys(&mut self, pattern: &str) -> Vec<Key> {
        self.remove_expired_keys();

        self.state
            .keys
            .keys()
            .filter(|key| matches_pattern(pattern, key))
            .cloned()
            .collect()
    }

    fn remove_expired_keys(&mut self) {
        let now = SystemTime::now();
        self.state.keys.retain(|_, value| !value.is_expired(now));
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl InnerStore {
    pub fn lock(&self) -> InnerStoreLocked<'_> {
        // A panic while holding the lock cannot leave the map half-updated: every operation is a
        // single `HashMap` call.
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        InnerStoreLocked { state }
    }
}

impl FromIterator<(Key, Value)> for Store {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(entries: I) -> Self {
        let store = Store::new();
        {
            let mut state = store.lock();
            for (key, value) in entries {
                state.insert(key, value);
            }
        }
        store
    }
}

pub type Key = Bytes;

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub data: Bytes,
    pub expires_at: Option<SystemTime>,
}

impl Value {
    /// Only a deadline strictly in the past counts as expired.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

#[derive(Default)]
pub struct State {
    keys: HashMap<Key, Value>,
}

fn matches_pattern(pattern: &str, key: &[u8]) -> bool {
    if pattern == "*" {
        return true;
    }

    // Keys that are not valid UTF-8 can only be listed through the match-all pattern.
    str::from_utf8(key).is_ok_and(|key| glob_match(pattern, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(s: &'static str) -> Key {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn set_then_get() {
        let store = Store::new();
        let mut state = store.lock();

        state.set(key("key1"), Bytes::from("value1"));

        assert_eq!(state.get(b"key1"), Some(Bytes::from("value1")));
        assert_eq!(state.get(b"missing"), None);
    }

    #[test]
    fn binary_values_are_kept_intact() {
        let store = Store::new();
        let mut state = store.lock();
        let value = Bytes::from_static(b"\x00\xff\r\n\xc3\x28");

        state.set(key("bin"), value.clone());

        assert_eq!(state.get(b"bin"), Some(value));
    }

    #[test]
    fn overwrite_replaces_value_and_expiry() {
        let store = Store::new();
        let mut state = store.lock();
        let past = SystemTime::now() - Duration::from_secs(1);

        state.set_with_expiry(key("key1"), Bytes::from("old"), past);
        state.set(key("key1"), Bytes::from("new"));

        assert_eq!(state.get(b"key1"), Some(Bytes::from("new")));
    }

    #[test]
    fn expired_key_is_absent_and_removed() {
        let store = Store::new();
        let mut state = store.lock();
        let past = SystemTime::now() - Duration::from_millis(1);

        state.set_with_expiry(key("key1"), Bytes::from("value1"), past);

        assert_eq!(state.get(b"key1"), None);
        assert!(state.keys("*").is_empty());
        assert_eq!(state.size(), 0);
    }

    #[test]
    fn future_expiry_is_live() {
        let store = Store::new();
        let mut state = store.lock();
        let future = SystemTime::now() + Duration::from_secs(60);

        state.set_with_expiry(key("key1"), Bytes::from("value1"), future);

        assert_eq!(state.get(b"key1"), Some(Bytes::from("value1")));
        assert!(state.exists(b"key1"));
    }

    #[test]
    fn keys_skips_expired_entries() {
        let store = Store::new();
        let mut state = store.lock();
        let past = SystemTime::now() - Duration::from_secs(1);

        state.set(key("live"), Bytes::from("1"));
        state.set_with_expiry(key("dead"), Bytes::from("2"), past);

        assert_eq!(state.keys("*"), vec![key("live")]);
    }

    #[test]
    fn keys_with_glob_pattern() {
        let store = Store::new();
        let mut state = store.lock();

        state.set(key("keys_key_1"), Bytes::from("Argentina"));
        state.set(key("keys_key_2"), Bytes::from("Spain"));
        state.set(key("other"), Bytes::from("Netherlands"));

        let mut keys = state.keys("*key*");
        keys.sort();
        assert_eq!(keys, vec![key("keys_key_1"), key("keys_key_2")]);

        assert_eq!(state.keys("*2"), vec![key("keys_key_2")]);
        assert_eq!(state.keys("other"), vec![key("other")]);
    }

    #[test]
    fn remove_reports_whether_key_existed() {
        let store = Store::new();
        let mut state = store.lock();
        let past = SystemTime::now() - Duration::from_secs(1);

        state.set(key("key1"), Bytes::from("1"));
        state.set_with_expiry(key("key2"), Bytes::from("2"), past);

        assert!(state.remove(b"key1"));
        assert!(!state.remove(b"key1"));
        assert!(!state.remove(b"key2"));
        assert_eq!(state.get(b"key1"), None);
    }

    #[test]
    fn clones_share_the_same_table() {
        let store = Store::new();
        let other = store.clone();

        store.lock().set(key("shared"), Bytes::from("yes"));

        assert_eq!(other.lock().get(b"shared"), Some(Bytes::from("yes")));
    }

    #[test]
    fn collect_from_entries() {
        let entries = vec![(
            key("loaded"),
            Value {
                data: Bytes::from("v"),
                expires_at: None,
            },
        )];

        let store: Store = entries.into_iter().collect();

        assert_eq!(store.lock().get(b"loaded"), Some(Bytes::from("v")));
    }
}
