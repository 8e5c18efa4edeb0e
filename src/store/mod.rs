//! Keyed state with per-key subscriptions.
//!
//! A [`KeyedStore`] keeps one slot of state per key and notifies only the
//! listeners of the key that changed. Writes are either committed on the spot
//! or, in batch mode, staged and committed together at the end of the tick.

mod listener;
mod options;
mod store;
mod update;

pub use listener::Listener;
pub use options::{EqualityFn, StoreOptions};
pub use store::{KeyedStore, StoreKey, StoreValue, Subscription};
pub use update::Update;
