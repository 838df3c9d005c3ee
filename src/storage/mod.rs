//! Storage layer for ledger-vault
//!
//! Provides the key-value substrate the key manager and secure storage
//! persist into, backed by JSON files written atomically.

pub mod file_io;
pub mod kv;

pub use file_io::{read_json_required, write_atomic, write_json_atomic};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
