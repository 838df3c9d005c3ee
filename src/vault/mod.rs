//! Secure storage of arbitrary payloads
//!
//! Serializes a payload to JSON, checksums it, optionally LZ4-compresses
//! it and stores it as an encrypted envelope with clear-text metadata.

mod item;
mod secure_storage;

pub use item::{
    is_valid_key, ItemMetadata, SecureStorageItem, StorageExport, StorageStats, StoreOptions,
    MAX_KEY_LENGTH, STORAGE_EXPORT_VERSION,
};
pub use secure_storage::{SecureStorage, StorageImportSummary};
