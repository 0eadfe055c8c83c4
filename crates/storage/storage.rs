//! Key/value stores and the journaled two-level state that sits on top of
//! them.
//!
//! The state is a trie of accounts whose leaves are storage-trie roots; all
//! intermediate execution metadata (gas used, logs, transaction index, …) is
//! placed into contracts at well-known addresses, which keeps the handling
//! code small. Contract code lives outside the tries, content-addressed in
//! the backing store.

pub mod code;
pub mod error;
pub mod state;
pub mod store;

pub use code::{get_code, put_code, put_hash_data, unhash};
pub use error::StateError;
pub use state::{State, StorageWord};
pub use store::{InMemoryStore, OverlayStore};
