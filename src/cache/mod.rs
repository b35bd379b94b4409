//! Durable local cache: a narrow key/value shim over local storage.
//!
//! Values are JSON `{data, timestamp}` envelopes under versioned string keys.
//! The store never raises: quota exhaustion drops the write, corrupt entries
//! read as misses. See [`KvStore`] for the contract.

pub mod keys;
mod store;

pub use store::{KvStore, MemoryStore, SqliteStore};
