use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::store::{KeyedStore, Listener, StoreKey, StoreValue, Subscription};

type RenderHook = Arc<dyn Fn() + Send + Sync>;

/// A scoped, read-only view of one key.
///
/// Holds a local copy of the key's value that is kept current through a
/// subscription. The subscription is taken when the view is created and
/// released when it is dropped.
pub struct KeyWatch<K: StoreKey, V: StoreValue> {
    store: Option<KeyedStore<K, V>>,
    key: K,
    value: Arc<RwLock<Option<V>>>,
    version: Arc<AtomicU64>,
    render: Arc<RwLock<Option<RenderHook>>>,
    subscription: Option<Subscription<K, V>>,
}

/// Read `key` from `store` and follow its changes until the view is dropped.
///
/// With no store the view holds `None` forever.
///
/// ```
/// use keyed_store::{bind::watch_key, KeyedStore};
///
/// let store = KeyedStore::new([("name", String::from("ada"))]);
/// let name = watch_key(Some(&store), "name");
/// assert_eq!(name.get().as_deref(), Some("ada"));
///
/// store.set_value("name", "grace".to_string());
/// assert_eq!(name.get().as_deref(), Some("grace"));
/// assert_eq!(name.version(), 1);
/// ```
pub fn watch_key<K: StoreKey, V: StoreValue>(
    store: Option<&KeyedStore<K, V>>,
    key: K,
) -> KeyWatch<K, V> {
    let mut watch = KeyWatch {
        store: store.cloned(),
        key,
        value: Arc::new(RwLock::new(None)),
        version: Arc::new(AtomicU64::new(0)),
        render: Arc::new(RwLock::new(None)),
        subscription: None,
    };
    watch.acquire();
    watch
}

impl<K: StoreKey, V: StoreValue> KeyWatch<K, V> {
    /// Call `hook` after every change pushed into this view.
    pub fn on_render<F>(self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.render.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
        self
    }

    /// The locally mirrored value.
    pub fn get(&self) -> Option<V> {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of times the mirrored value has been replaced.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn store(&self) -> Option<&KeyedStore<K, V>> {
        self.store.as_ref()
    }

    /// Point the view at `store` and `key`.
    ///
    /// Nothing happens when both are unchanged. Otherwise the old
    /// subscription is released and the view is reseeded and resubscribed.
    pub fn rebind(&mut self, store: Option<&KeyedStore<K, V>>, key: K) {
        let same_store = match (&self.store, store) {
            (Some(current), Some(next)) => current.ptr_eq(next),
            (None, None) => true,
            _ => false,
        };
        if same_store && self.key == key {
            return;
        }

        debug!(from = ?self.key, to = ?key, "rebinding key watch");
        self.release();
        self.store = store.cloned();
        self.key = key;
        self.version.fetch_add(1, Ordering::SeqCst);
        self.acquire();
    }

    fn acquire(&mut self) {
        let seed = self.store.as_ref().and_then(|store| store.get(&self.key));
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = seed;

        let Some(store) = &self.store else {
            return;
        };

        let value = Arc::clone(&self.value);
        let version = Arc::clone(&self.version);
        let render = Arc::clone(&self.render);
        let listener = Listener::new(move |next: &V| {
            *value.write().unwrap_or_else(PoisonError::into_inner) = Some(next.clone());
            version.fetch_add(1, Ordering::SeqCst);
            let hook = render.read().unwrap_or_else(PoisonError::into_inner).clone();
            if let Some(hook) = hook {
                hook();
            }
        });
        self.subscription = Some(store.subscribe(self.key.clone(), listener));
    }

    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl<K: StoreKey, V: StoreValue> Drop for KeyWatch<K, V> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<K: StoreKey, V: StoreValue + fmt::Debug> fmt::Debug for KeyWatch<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyWatch")
            .field("key", &self.key)
            .field("value", &self.get())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
