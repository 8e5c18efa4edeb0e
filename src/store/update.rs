use std::fmt;

/// The argument to [`KeyedStore::set`](crate::KeyedStore::set).
///
/// A write is either a literal value or an updater computed from the current
/// logical value of the key. The two cases are distinct variants, so a value
/// that is itself a function is stored with `Update::Value` and is never
/// mistaken for an updater.
///
/// ```
/// use keyed_store::{KeyedStore, Update};
///
/// let store = KeyedStore::new([("count", 0)]);
/// store.set("count", Update::Value(5));
/// store.set("count", Update::updater(|c: Option<&i32>| c.map_or(0, |c| c * 2)));
/// assert_eq!(store.get(&"count"), Some(10));
///
/// // An updater also runs for a key that has no value yet.
/// store.set("total", Update::updater(|t: Option<&i32>| t.copied().unwrap_or(1)));
/// assert_eq!(store.get(&"total"), Some(1));
/// ```
pub enum Update<V> {
    /// Store this value as is.
    Value(V),
    /// Derive the new value from the current one, `None` if the key has none.
    Updater(Box<dyn FnOnce(Option<&V>) -> V>),
}

impl<V> Update<V> {
    pub fn updater<F>(f: F) -> Self
    where
        F: FnOnce(Option<&V>) -> V + 'static,
    {
        Update::Updater(Box::new(f))
    }
}

impl<V: fmt::Debug> fmt::Debug for Update<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Update::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}
