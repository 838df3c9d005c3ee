//! Password-protected storage of arbitrary serializable payloads
//!
//! Items live under `<namespace>storage.<key>` in the key-value store. The
//! checksum is taken over the serialized plaintext before compression and
//! re-verified after decryption and decompression on every retrieval.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::audit::{EventDetails, SecurityEvent};
use crate::crypto::{
    CryptoEngine, CryptoPrimitives, HashAlgorithm, NativePrimitives, SecureBytes,
};
use crate::error::{VaultError, VaultResult};
use crate::storage::KeyValueStore;

use super::item::{
    is_valid_key, ItemMetadata, SecureStorageItem, StorageExport, StorageStats, StoreOptions,
    STORAGE_EXPORT_VERSION,
};

/// Outcome of `import_data`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageImportSummary {
    pub imported: Vec<String>,
    pub skipped: Vec<String>,
}

/// Encrypted item store
pub struct SecureStorage<P: CryptoPrimitives = NativePrimitives> {
    engine: Arc<CryptoEngine<P>>,
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl<P: CryptoPrimitives> SecureStorage<P> {
    pub fn new(
        engine: Arc<CryptoEngine<P>>,
        store: Arc<dyn KeyValueStore>,
        namespace: &str,
    ) -> Self {
        Self {
            engine,
            store,
            prefix: format!("{}storage.", namespace),
        }
    }

    /// Encrypt and persist `data` under `key`, replacing any existing item
    ///
    /// Returns the new item's id.
    pub fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        password: &str,
        options: StoreOptions,
    ) -> VaultResult<String> {
        let compressed = options.compression;
        let result = check_key(key)
            .and_then(|_| {
                serde_json::to_vec(data)
                    .map_err(|e| VaultError::Json(format!("Failed to serialize payload: {}", e)))
            })
            .and_then(|payload| self.store_payload(key, &payload, password, options));

        self.engine.log().outcome(
            SecurityEvent::StorageStore,
            &format!("store {}", key),
            result,
            |(_, size)| EventDetails::Storage {
                storage_key: Some(key.to_string()),
                size: Some(*size),
                compressed: Some(compressed),
                count: None,
            },
        )
        .map(|(id, _)| id)
    }

    /// Decrypt, verify and deserialize the item under `key`
    ///
    /// An expired item is deleted and reported as `Expired`. A wrong password
    /// fails with `AuthenticationFailure`; an item that was altered after it
    /// was stored fails with `IntegrityFailure`.
    pub fn retrieve<T: DeserializeOwned>(&self, key: &str, password: &str) -> VaultResult<T> {
        let result = self.retrieve_payload(key, password).and_then(|(payload, _)| {
            serde_json::from_slice(payload.as_bytes())
                .map_err(|e| VaultError::Json(format!("Failed to parse payload: {}", e)))
        });

        self.engine.log().outcome(
            SecurityEvent::StorageRetrieve,
            &format!("retrieve {}", key),
            result,
            |_| EventDetails::storage(key),
        )
    }

    /// Delete the item under `key`, returning whether it existed
    pub fn remove(&self, key: &str) -> VaultResult<bool> {
        let result = check_key(key).and_then(|_| self.store.remove(&self.item_key(key)));
        self.engine.log().outcome(
            SecurityEvent::StorageRemove,
            &format!("remove {}", key),
            result,
            |_| EventDetails::storage(key),
        )
    }

    /// Whether an item is stored under `key` (expired or not)
    pub fn exists(&self, key: &str) -> VaultResult<bool> {
        let result = check_key(key)
            .and_then(|_| Ok(self.store.get(&self.item_key(key))?.is_some()));
        self.engine.log().outcome(
            SecurityEvent::StorageList,
            &format!("exists {}", key),
            result,
            |_| EventDetails::storage(key),
        )
    }

    /// Every storage key, sorted
    pub fn list_keys(&self) -> VaultResult<Vec<String>> {
        let result = self.item_keys();
        self.engine
            .log()
            .outcome(SecurityEvent::StorageList, "list_keys", result, |keys| {
                EventDetails::storage_count(keys.len())
            })
    }

    /// Remove every expired item, returning how many were removed
    pub fn cleanup_expired(&self) -> VaultResult<usize> {
        let result = self.cleanup_expired_at(Utc::now());
        self.engine.log().outcome(
            SecurityEvent::StorageCleanup,
            "cleanup_expired",
            result,
            |n| EventDetails::storage_count(*n),
        )
    }

    fn cleanup_expired_at(&self, now: DateTime<Utc>) -> VaultResult<usize> {
        let mut removed = 0;
        for key in self.item_keys()? {
            if let Some(item) = self.load_item(&key)? {
                if item.is_expired_at(now) && self.store.remove(&self.item_key(&key))? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Re-encrypt the item under `key` with a new password
    ///
    /// Expiry, compression and key association are preserved.
    pub fn update_password(
        &self,
        key: &str,
        old_password: &str,
        new_password: &str,
    ) -> VaultResult<()> {
        let result = self.retrieve_payload(key, old_password).and_then(|(payload, item)| {
            let options = StoreOptions {
                compression: item.metadata.compressed,
                expires_at: item.metadata.expires_at,
                key_id: item.metadata.key_id,
            };
            self.store_payload(key, payload.as_bytes(), new_password, options)
        });

        self.engine.log().outcome(
            SecurityEvent::StoragePasswordUpdate,
            &format!("update_password {}", key),
            result,
            |_| EventDetails::storage(key),
        )?;
        Ok(())
    }

    /// All items as versioned JSON; payloads stay encrypted
    pub fn export_data(&self) -> VaultResult<String> {
        let result = self.item_keys().and_then(|keys| {
            let mut items = BTreeMap::new();
            for key in keys {
                if let Some(item) = self.load_item(&key)? {
                    items.insert(key, item);
                }
            }
            let export = StorageExport {
                version: STORAGE_EXPORT_VERSION,
                exported_at: Utc::now(),
                items,
            };
            let count = export.items.len();
            serde_json::to_string_pretty(&export)
                .map(|json| (json, count))
                .map_err(|e| VaultError::Json(format!("Failed to serialize export: {}", e)))
        });

        self.engine
            .log()
            .outcome(SecurityEvent::StorageExport, "export_data", result, |(_, n)| {
                EventDetails::storage_count(*n)
            })
            .map(|(json, _)| json)
    }

    /// Add items from an export; keys already present are skipped
    pub fn import_data(&self, json: &str) -> VaultResult<StorageImportSummary> {
        let result = self.import_data_inner(json);
        self.engine
            .log()
            .outcome(SecurityEvent::StorageImport, "import_data", result, |s| {
                EventDetails::storage_count(s.imported.len())
            })
    }

    fn import_data_inner(&self, json: &str) -> VaultResult<StorageImportSummary> {
        let export: StorageExport = serde_json::from_str(json)
            .map_err(|e| VaultError::InvalidInput(format!("Invalid storage export: {}", e)))?;
        if export.version > STORAGE_EXPORT_VERSION {
            return Err(VaultError::InvalidInput(format!(
                "Unsupported storage export version: {}",
                export.version
            )));
        }
        // Reject the whole import before writing anything
        for key in export.items.keys() {
            check_key(key)?;
        }

        let mut summary = StorageImportSummary::default();
        for (key, item) in export.items {
            if self.store.get(&self.item_key(&key))?.is_some() {
                summary.skipped.push(key);
            } else {
                self.save_item(&key, &item)?;
                summary.imported.push(key);
            }
        }
        Ok(summary)
    }

    /// Counts and sizes over every stored item
    pub fn stats(&self) -> VaultResult<StorageStats> {
        let result = self.stats_inner();
        self.engine
            .log()
            .outcome(SecurityEvent::StorageStats, "stats", result, |stats| {
                EventDetails::storage_count(stats.item_count)
            })
    }

    fn stats_inner(&self) -> VaultResult<StorageStats> {
        let now = Utc::now();
        let mut stats = StorageStats::default();
        for key in self.item_keys()? {
            let Some(item) = self.load_item(&key)? else {
                continue;
            };
            stats.item_count += 1;
            stats.total_original_size += item.metadata.original_size;
            stats.total_encrypted_size += item.metadata.encrypted_size;
            if item.metadata.compressed {
                stats.compressed_count += 1;
            }
            if item.is_expired_at(now) {
                stats.expired_count += 1;
            }
        }
        Ok(stats)
    }

    // ----- internals ---------------------------------------------------------

    fn item_keys(&self) -> VaultResult<Vec<String>> {
        Ok(self
            .store
            .keys_with_prefix(&self.prefix)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_owned))
            .collect())
    }

    fn store_payload(
        &self,
        key: &str,
        payload: &[u8],
        password: &str,
        options: StoreOptions,
    ) -> VaultResult<(String, usize)> {
        if password.is_empty() {
            return Err(VaultError::empty("password"));
        }

        let checksum = hex::encode(self.engine.hash(HashAlgorithm::Sha256, payload));
        let sealed = if options.compression {
            let compressed = lz4_flex::compress_prepend_size(payload);
            self.engine.seal(password, key.as_bytes(), &compressed)?
        } else {
            self.engine.seal(password, key.as_bytes(), payload)?
        };

        let item = SecureStorageItem {
            id: Uuid::new_v4().to_string(),
            metadata: ItemMetadata {
                original_size: payload.len(),
                encrypted_size: sealed.ciphertext_len(),
                checksum,
                created_at: Utc::now(),
                expires_at: options.expires_at,
                compressed: options.compression,
                key_id: options.key_id,
            },
            encrypted_data: sealed,
        };
        self.save_item(key, &item)?;
        Ok((item.id, payload.len()))
    }

    fn retrieve_payload(
        &self,
        key: &str,
        password: &str,
    ) -> VaultResult<(SecureBytes, SecureStorageItem)> {
        check_key(key)?;
        if password.is_empty() {
            return Err(VaultError::empty("password"));
        }

        let item = self
            .load_item(key)?
            .ok_or_else(|| VaultError::NotFound(format!("No item stored under {}", key)))?;

        if item.is_expired_at(Utc::now()) {
            self.store.remove(&self.item_key(key))?;
            return Err(VaultError::Expired(key.to_string()));
        }

        let decrypted = self
            .engine
            .open(&item.encrypted_data, password, key.as_bytes())?;

        let payload = if item.metadata.compressed {
            let bytes = lz4_flex::decompress_size_prepended(decrypted.as_bytes())
                .map_err(|e| {
                    VaultError::IntegrityFailure(format!("Failed to decompress {}: {}", key, e))
                })?;
            SecureBytes::new(bytes)
        } else {
            decrypted
        };

        let checksum = hex::encode(self.engine.hash(HashAlgorithm::Sha256, payload.as_bytes()));
        if checksum != item.metadata.checksum {
            return Err(VaultError::IntegrityFailure(format!(
                "Checksum mismatch for {}",
                key
            )));
        }

        Ok((payload, item))
    }

    fn item_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn load_item(&self, key: &str) -> VaultResult<Option<SecureStorageItem>> {
        match self.store.get(&self.item_key(key))? {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                VaultError::Storage(format!("Failed to parse stored item {}: {}", key, e))
            }),
            None => Ok(None),
        }
    }

    fn save_item(&self, key: &str, item: &SecureStorageItem) -> VaultResult<()> {
        let json = serde_json::to_string(item)
            .map_err(|e| VaultError::Json(format!("Failed to serialize item: {}", e)))?;
        self.store.set(&self.item_key(key), &json)
    }
}

fn check_key(key: &str) -> VaultResult<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(VaultError::InvalidKey(format!(
            "Storage keys must be 1-100 characters of letters, digits, '_' or '-': {:?}",
            key
        )))
    }
}
