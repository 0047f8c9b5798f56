//! Snapshot-based concurrent wrapper around the trie.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::trie::Trie;

/// A read result that keeps its snapshot alive.
///
/// The guard holds a strong reference to the snapshot root it was resolved
/// against, so the value's whole path stays alive no matter how many
/// writes land after the lookup.
pub struct ValueGuard<T> {
    /// The snapshot the value was found in.
    _root: Trie<T>,
    value: Arc<T>,
}

impl<T> Deref for ValueGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ValueGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ValueGuard").field(&self.value).finish()
    }
}

/// A concurrent key-value store over snapshots of a copy-on-write trie.
///
/// Readers take the root lock only long enough to clone the current
/// snapshot and then search with no lock at all, so lookups never block
/// writers and writers never block lookups. Writers serialize among
/// themselves on a separate write lock, build the new root without
/// holding the root lock, and swap it in under a second short critical
/// section.
pub struct TrieStore<T> {
    /// Guards the current root snapshot; held only to clone or swap it.
    root: Mutex<Trie<T>>,
    /// Serializes writers; never held while a reader is resolving.
    write_lock: Mutex<()>,
}

impl<T> Default for TrieStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TrieStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Trie::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Looks up `key` in the current snapshot.
    pub fn get(&self, key: &str) -> Option<ValueGuard<T>> {
        let snapshot = self.root.lock().clone();
        let value = snapshot.get_shared(key)?;
        Some(ValueGuard {
            _root: snapshot,
            value,
        })
    }

    /// Maps `key` to `value`.
    pub fn put(&self, key: &str, value: T) {
        let _writer = self.write_lock.lock();
        // Only writers replace the root, and we are the only writer, so
        // the snapshot cannot go stale between here and the swap.
        let snapshot = self.root.lock().clone();
        let new_root = snapshot.put(key, value);
        *self.root.lock() = new_root;
    }

    /// Removes `key`.
    pub fn remove(&self, key: &str) {
        let _writer = self.write_lock.lock();
        let snapshot = self.root.lock().clone();
        let new_root = snapshot.remove(key);
        *self.root.lock() = new_root;
    }
}

impl<T> std::fmt::Debug for TrieStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrieStore")
            .field("empty", &self.root.lock().is_empty())
            .finish()
    }
}
