use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use super::{EqualityFn, Listener, StoreOptions, Update};
use crate::runtime::Runtime;

/// Bounds required of store keys.
pub trait StoreKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> StoreKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bounds required of store values.
pub trait StoreValue: Clone + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Send + Sync + 'static {}

/// Writes staged in batch mode, waiting for the end of the tick.
struct Batch<K, V> {
    pending: IndexMap<K, V>,
    scheduled: bool,
}

struct Inner<K, V> {
    state: RwLock<HashMap<K, V>>,
    listeners: RwLock<HashMap<K, IndexSet<Listener<V>>>>,
    batch: Mutex<Batch<K, V>>,
    equality: EqualityFn<K, V>,
    batch_updates: bool,
    runtime: Arc<Runtime>,
}

/// An observable key-value state container.
///
/// Each key holds an independent slot of state with its own listeners, so a
/// write to one key only reaches the observers of that key. Cloning a store
/// gives another handle to the same state.
///
/// No lock is held while listeners or updaters run, so they may read, write
/// and (un)subscribe on the same store.
///
/// # Examples
///
/// ```
/// use keyed_store::{KeyedStore, Listener};
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
///
/// let store = KeyedStore::new([("count", 0), ("total", 0)]);
/// let seen = Arc::new(AtomicI32::new(-1));
/// let seen_clone = seen.clone();
///
/// let sub = store.subscribe("count", Listener::new(move |v: &i32| {
///     seen_clone.store(*v, Ordering::SeqCst);
/// }));
///
/// store.set_value("count", 5);
/// assert_eq!(store.get(&"count"), Some(5));
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
///
/// sub.unsubscribe();
/// store.set_value("count", 6);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
pub struct KeyedStore<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K: StoreKey, V: StoreValue + PartialEq> KeyedStore<K, V> {
    /// Create an immediate-mode store that compares values with `==`.
    pub fn new<I>(initial: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Self::with_options(initial, StoreOptions::new())
    }
}

impl<K: StoreKey, V: StoreValue> KeyedStore<K, V> {
    /// Create a store with explicit options.
    ///
    /// Flushes are queued on `options.runtime`, or on [`Runtime::current`] at
    /// the time of this call.
    pub fn with_options<I>(initial: I, options: StoreOptions<K, V>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let state: HashMap<K, V> = initial.into_iter().collect();
        debug!(
            keys = state.len(),
            batch_updates = options.batch_updates,
            "store created"
        );

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                listeners: RwLock::new(HashMap::new()),
                batch: Mutex::new(Batch {
                    pending: IndexMap::new(),
                    scheduled: false,
                }),
                equality: options.equality,
                batch_updates: options.batch_updates,
                runtime: options.runtime.unwrap_or_else(Runtime::current),
            }),
        }
    }

    /// Get the current logical value of `key`.
    ///
    /// In batch mode a staged write is visible here before it is committed.
    pub fn get(&self, key: &K) -> Option<V> {
        self.with(key, |value| value.cloned())
    }

    /// Read the current logical value of `key` without cloning it.
    ///
    /// `f` runs while the store is locked for reading; do not write to the
    /// store from inside it.
    pub fn with<R>(&self, key: &K, f: impl FnOnce(Option<&V>) -> R) -> R {
        if self.inner.batch_updates {
            let batch = self.inner.lock_batch();
            if let Some(value) = batch.pending.get(key) {
                return f(Some(value));
            }
        }
        let state = self.inner.read_state();
        f(state.get(key))
    }

    /// Write to `key`.
    ///
    /// An updater is called with the current logical value (see
    /// [`KeyedStore::get`]), which is `None` for a key that has no value. In
    /// immediate mode the write is committed and listeners run before this
    /// returns; in batch mode it is staged until the next flush.
    pub fn set(&self, key: K, update: Update<V>) {
        let value = match update {
            Update::Value(value) => value,
            Update::Updater(f) => f(self.get(&key).as_ref()),
        };

        if self.inner.batch_updates {
            self.stage(key, value);
        } else {
            self.inner.commit(&key, value);
        }
    }

    /// Shorthand for `set(key, Update::Value(value))`.
    pub fn set_value(&self, key: K, value: V) {
        self.set(key, Update::Value(value));
    }

    /// Derive the new value of `key` from its current value.
    ///
    /// Unlike [`Update::updater`], `f` only sees present values: when `key`
    /// has no value the call does nothing.
    pub fn update<F>(&self, key: K, f: F)
    where
        F: FnOnce(&V) -> V + 'static,
    {
        let Some(current) = self.get(&key) else {
            debug!(key = ?key, "update skipped: key has no value");
            return;
        };
        self.set(key, Update::Value(f(&current)));
    }

    /// Register `listener` for changes to `key`.
    ///
    /// Registering a listener that is already present keeps the existing entry.
    pub fn on(&self, key: K, listener: Listener<V>) {
        let mut listeners = self.inner.write_listeners();
        let set = listeners.entry(key.clone()).or_default();
        if set.insert(listener) {
            debug!(key = ?key, listeners = set.len(), "listener added");
        }
    }

    /// Remove `listener` from `key`. Unknown listeners are ignored.
    pub fn off(&self, key: &K, listener: &Listener<V>) {
        self.inner.off(key, listener);
    }

    /// Register `listener` and return a handle that removes it again.
    pub fn subscribe(&self, key: K, listener: Listener<V>) -> Subscription<K, V> {
        self.on(key.clone(), listener.clone());
        Subscription {
            store: Arc::downgrade(&self.inner),
            key,
            listener,
            active: AtomicBool::new(true),
        }
    }

    /// Commit every staged write now instead of waiting for the tick to end.
    ///
    /// Returns the number of writes processed. A no-op in immediate mode.
    pub fn flush(&self) -> usize {
        self.inner.flush()
    }

    /// Whether staged writes are waiting for a flush.
    pub fn has_pending(&self) -> bool {
        !self.inner.lock_batch().pending.is_empty()
    }

    pub fn is_batched(&self) -> bool {
        self.inner.batch_updates
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.with(key, |value| value.is_some())
    }

    /// Keys with a committed or staged value, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.inner.read_state().keys().cloned().collect();
        if self.inner.batch_updates {
            let batch = self.inner.lock_batch();
            let state = self.inner.read_state();
            keys.extend(batch.pending.keys().filter(|k| !state.contains_key(*k)).cloned());
        }
        keys
    }

    pub fn listener_count(&self, key: &K) -> usize {
        self.inner.read_listeners().get(key).map_or(0, IndexSet::len)
    }

    /// Whether both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn stage(&self, key: K, value: V) {
        let schedule = {
            let mut batch = self.inner.lock_batch();
            trace!(key = ?key, "write staged");
            batch.pending.insert(key, value);
            !std::mem::replace(&mut batch.scheduled, true)
        };

        if schedule {
            trace!("flush scheduled");
            let store = Arc::downgrade(&self.inner);
            self.inner.runtime.queue_microtask(move || {
                if let Some(inner) = store.upgrade() {
                    inner.flush();
                }
            });
        }
    }
}

impl<K: StoreKey, V: StoreValue> Inner<K, V> {
    /// Commit `value` to `key` and notify listeners if it is a change.
    fn commit(&self, key: &K, value: V) {
        if self.store_if_changed(key, &value) {
            self.notify(key, &value);
        }
    }

    fn store_if_changed(&self, key: &K, value: &V) -> bool {
        let old = self.read_state().get(key).cloned();
        if let Some(old) = old {
            if (self.equality)(&old, value, key) {
                debug!(key = ?key, "write ignored: value unchanged");
                return false;
            }
        }
        self.write_state().insert(key.clone(), value.clone());
        true
    }

    fn notify(&self, key: &K, value: &V) {
        // Snapshot so listeners can (un)subscribe while being notified.
        let listeners: Vec<Listener<V>> = self
            .read_listeners()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        debug!(key = ?key, listeners = listeners.len(), "value committed");
        for listener in &listeners {
            trace!(key = ?key, ?listener, "notifying listener");
            listener.call(value);
        }
    }

    /// Commit the writes staged when the flush starts, in first-write order.
    ///
    /// Each write leaves the pending map only once it is in `state`, so reads
    /// during the flush never fall back to a stale value. The scheduled flag
    /// is cleared up front: writes staged by listeners during the flush queue
    /// a fresh flush task instead of extending this one.
    fn flush(&self) -> usize {
        let keys: Vec<K> = {
            let mut batch = self.lock_batch();
            batch.scheduled = false;
            batch.pending.keys().cloned().collect()
        };

        let mut committed = 0;
        for key in keys {
            // A nested flush from a listener may already have committed it.
            let Some(value) = self.lock_batch().pending.get(&key).cloned() else {
                continue;
            };

            let changed = self.store_if_changed(&key, &value);
            self.lock_batch().pending.shift_remove(&key);
            if changed {
                self.notify(&key, &value);
            }
            committed += 1;
        }

        if committed > 0 {
            trace!(committed, "flush complete");
        }
        committed
    }

    fn off(&self, key: &K, listener: &Listener<V>) {
        let mut listeners = self.write_listeners();
        if let Some(set) = listeners.get_mut(key) {
            if set.shift_remove(listener) {
                debug!(key = ?key, listeners = set.len(), "listener removed");
            }
            if set.is_empty() {
                listeners.remove(key);
            }
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_listeners(&self) -> RwLockReadGuard<'_, HashMap<K, IndexSet<Listener<V>>>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_listeners(&self) -> RwLockWriteGuard<'_, HashMap<K, IndexSet<Listener<V>>>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_batch(&self) -> MutexGuard<'_, Batch<K, V>> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Clone for KeyedStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for KeyedStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStore")
            .field("batch_updates", &self.inner.batch_updates)
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`KeyedStore::subscribe`].
///
/// Dropping the handle leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it. For a registration that ends
/// with a scope, use [`crate::bind::watch_key`].
pub struct Subscription<K, V> {
    store: Weak<Inner<K, V>>,
    key: K,
    listener: Listener<V>,
    active: AtomicBool,
}

impl<K: StoreKey, V: StoreValue> Subscription<K, V> {
    /// Remove the listener. Calling this again does nothing.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            inner.off(&self.key, &self.listener);
        }
    }

    /// Whether [`Subscription::unsubscribe`] has not been called yet.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Debug, V> fmt::Debug for Subscription<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("listener", &self.listener)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish()
    }
}
