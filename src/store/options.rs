use std::fmt;
use std::sync::Arc;

use crate::runtime::Runtime;

/// Decides whether a write is an observable change: `equal(old, new, key)`.
pub type EqualityFn<K, V> = Arc<dyn Fn(&V, &V, &K) -> bool + Send + Sync>;

/// Construction options for a [`KeyedStore`](crate::KeyedStore).
///
/// ```
/// use keyed_store::{KeyedStore, StoreOptions};
///
/// let options = StoreOptions::new()
///     .batch_updates(true)
///     .equality(|old: &f64, new: &f64, _key: &&str| (old - new).abs() < 0.01);
/// let store = KeyedStore::with_options([("volume", 0.5)], options);
/// assert!(store.is_batched());
/// ```
pub struct StoreOptions<K, V> {
    pub(crate) equality: EqualityFn<K, V>,
    pub(crate) batch_updates: bool,
    pub(crate) runtime: Option<Arc<Runtime>>,
}

impl<K, V: PartialEq> StoreOptions<K, V> {
    /// Immediate mode with `==` as the change test.
    pub fn new() -> Self {
        Self::with_equality(|old: &V, new: &V, _: &K| old == new)
    }
}

impl<K, V> StoreOptions<K, V> {
    /// Immediate mode with a custom change test, for values without `PartialEq`.
    pub fn with_equality<F>(equality: F) -> Self
    where
        F: Fn(&V, &V, &K) -> bool + Send + Sync + 'static,
    {
        Self {
            equality: Arc::new(equality),
            batch_updates: false,
            runtime: None,
        }
    }

    /// Replace the change test.
    pub fn equality<F>(mut self, equality: F) -> Self
    where
        F: Fn(&V, &V, &K) -> bool + Send + Sync + 'static,
    {
        self.equality = Arc::new(equality);
        self
    }

    /// Defer commits to the end of the tick, coalescing writes per key.
    pub fn batch_updates(mut self, enabled: bool) -> Self {
        self.batch_updates = enabled;
        self
    }

    /// Queue flushes on `runtime` instead of the runtime current at construction.
    pub fn runtime(mut self, runtime: Arc<Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

impl<K, V: PartialEq> Default for StoreOptions<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for StoreOptions<K, V> {
    fn clone(&self) -> Self {
        Self {
            equality: Arc::clone(&self.equality),
            batch_updates: self.batch_updates,
            runtime: self.runtime.clone(),
        }
    }
}

impl<K, V> fmt::Debug for StoreOptions<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("batch_updates", &self.batch_updates)
            .field("custom_runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}
