use super::{Key, KeySet};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// In-memory holder of the currently trusted [`KeySet`].
///
/// Reads never block: a lookup loads the current set pointer and indexes it. Writers build
/// a complete new set and swap the pointer, so readers observe either the previous set or
/// the next one, never a mix.
#[derive(Debug, Default)]
pub struct KeySetCache {
    current: ArcSwap<KeySet>,
}

impl KeySetCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache holding `key_set`.
    pub fn with_key_set(key_set: KeySet) -> Self {
        Self {
            current: ArcSwap::from_pointee(key_set),
        }
    }

    /// Returns the key with the given key ID, if it is currently trusted.
    pub fn lookup(&self, key_id: &str) -> Option<Arc<Key>> {
        self.current.load().get(key_id).cloned()
    }

    /// Atomically replaces the whole key set.
    pub fn replace(&self, key_set: KeySet) {
        self.current.store(Arc::new(key_set));
    }

    /// Adds or overwrites a single key without touching the rest of the set.
    ///
    /// Concurrent inserts and replaces are linearized; none of them is lost half-way.
    pub fn insert(&self, key: Key) {
        let key = Arc::new(key);
        self.current.rcu(|current| {
            let mut next = KeySet::clone(current);
            next.insert_shared(Arc::clone(&key));
            next
        });
    }

    /// Returns the current key set.
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Returns the number of keys currently trusted.
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// Returns `true` if no keys are currently trusted.
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}
