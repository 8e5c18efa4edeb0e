//! # Keyed Store
//!
//! An observable key-value state container for reactive views.
//!
//! Independent pieces of application state live side by side in one
//! [`KeyedStore`], can be read and written from anywhere, and are subscribed to
//! per key, so a change only reaches the observers of the key that changed.
//!
//! ## Store
//!
//! - `KeyedStore<K, V>` - per-key state with `get`, `set`, `on`, `off` and `subscribe`
//! - `Update<V>` - a write: either a literal value or an updater function
//! - `StoreOptions` - equality test and batch mode
//!
//! ## Batching
//!
//! In batch mode writes are staged and committed together at the end of the
//! tick. The tick is driven by a [`runtime::Runtime`]: call
//! [`Runtime::run_pending`](runtime::Runtime::run_pending) from your event loop.
//!
//! ## Binding
//!
//! The [`bind`] module ties a key to a view's lifetime: subscribe on creation,
//! mirror values locally, release on drop.

pub mod bind;
pub mod runtime;
pub mod store;

// Re-export main types for convenience
pub use bind::{key_setter, key_state, watch_key, KeySetter, KeyWatch};
pub use runtime::{Runtime, RuntimeError};
pub use store::{KeyedStore, Listener, StoreOptions, Subscription, Update};
