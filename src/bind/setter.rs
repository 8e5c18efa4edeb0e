use std::fmt;
use std::sync::Arc;

use crate::store::{KeyedStore, StoreKey, StoreValue, Update};

struct Target<K, V> {
    store: Option<KeyedStore<K, V>>,
    key: K,
}

/// A write-only handle to one key.
///
/// Clones are the same setter, so a setter can be handed out freely and still
/// be recognised with [`KeySetter::ptr_eq`]. Without a store every write is
/// dropped.
pub struct KeySetter<K, V> {
    target: Arc<Target<K, V>>,
}

/// Build a setter for `key` on `store`.
///
/// ```
/// use keyed_store::{bind::key_setter, KeyedStore, Update};
///
/// let store = KeyedStore::new([("count", 0)]);
/// let set_count = key_setter(Some(&store), "count");
/// set_count.set(Update::updater(|c: Option<&i32>| c.map_or(1, |c| c + 1)));
/// assert_eq!(store.get(&"count"), Some(1));
/// ```
pub fn key_setter<K: StoreKey, V: StoreValue>(
    store: Option<&KeyedStore<K, V>>,
    key: K,
) -> KeySetter<K, V> {
    KeySetter {
        target: Arc::new(Target {
            store: store.cloned(),
            key,
        }),
    }
}

impl<K: StoreKey, V: StoreValue> KeySetter<K, V> {
    pub fn set(&self, update: Update<V>) {
        if let Some(store) = &self.target.store {
            store.set(self.target.key.clone(), update);
        }
    }

    pub fn set_value(&self, value: V) {
        self.set(Update::Value(value));
    }

    /// See [`KeyedStore::update`].
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&V) -> V + 'static,
    {
        if let Some(store) = &self.target.store {
            store.update(self.target.key.clone(), f);
        }
    }

    /// Point the setter at `store` and `key`.
    ///
    /// Keeps the current identity when neither changed.
    pub fn rebind(&mut self, store: Option<&KeyedStore<K, V>>, key: K) {
        let same_store = match (&self.target.store, store) {
            (Some(current), Some(next)) => current.ptr_eq(next),
            (None, None) => true,
            _ => false,
        };
        if !same_store || self.target.key != key {
            *self = key_setter(store, key);
        }
    }

    pub fn key(&self) -> &K {
        &self.target.key
    }

    /// Whether both setters are the same handle.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.target, &other.target)
    }
}

impl<K, V> Clone for KeySetter<K, V> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
        }
    }
}

impl<K: fmt::Debug, V> fmt::Debug for KeySetter<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySetter")
            .field("key", &self.target.key)
            .field("has_store", &self.target.store.is_some())
            .finish()
    }
}
