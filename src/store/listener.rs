use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A change callback registered against one key.
///
/// Listeners compare by identity, not behaviour: clones of a listener are the
/// same listener, while two listeners built from identical closures are not.
/// Registering the same listener twice for a key keeps a single entry.
///
/// ```
/// use keyed_store::Listener;
///
/// let a = Listener::new(|v: &i32| println!("{v}"));
/// let b = Listener::new(|v: &i32| println!("{v}"));
/// assert_eq!(a, a.clone());
/// assert_ne!(a, b);
/// ```
pub struct Listener<V> {
    callback: Arc<dyn Fn(&V) + Send + Sync>,
}

impl<V> Listener<V> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Invoke the callback with a committed value.
    pub fn call(&self, value: &V) {
        (self.callback)(value);
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.callback).cast::<()>()
    }
}

impl<V> Clone for Listener<V> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<V> PartialEq for Listener<V> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<V> Eq for Listener<V> {}

impl<V> Hash for Listener<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<V> fmt::Debug for Listener<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.addr()).finish()
    }
}
