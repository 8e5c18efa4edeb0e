//! Adapters that tie a store key to a view's lifetime.
//!
//! - [`watch_key`] mirrors a key into local state for as long as the returned
//!   [`KeyWatch`] lives.
//! - [`key_setter`] hands out a write-only [`KeySetter`].
//! - [`key_state`] returns both.

mod setter;
mod watch;

pub use setter::{key_setter, KeySetter};
pub use watch::{watch_key, KeyWatch};

use crate::store::{KeyedStore, StoreKey, StoreValue};

/// Watch `key` and get a setter for it in one call.
///
/// ```
/// use keyed_store::{bind::key_state, KeyedStore};
///
/// let store = KeyedStore::new([("count", 0)]);
/// let (count, set_count) = key_state(Some(&store), "count");
/// set_count.update(|c: &i32| c + 1);
/// assert_eq!(count.get(), Some(1));
/// ```
pub fn key_state<K: StoreKey, V: StoreValue>(
    store: Option<&KeyedStore<K, V>>,
    key: K,
) -> (KeyWatch<K, V>, KeySetter<K, V>) {
    (watch_key(store, key.clone()), key_setter(store, key))
}
