//! Master-password-protected key store
//!
//! The manager owns the in-memory key index and persists it, whole, as one
//! JSON array under `<namespace>keys` after every mutation. Key material is
//! sealed with the session's master password and the key id as associated
//! data, so an envelope cannot be moved onto another key's entry.
//!
//! Lifecycle: `initialize` checks the master-password policy, loads the
//! index and test-decrypts one existing key before handing out a
//! [`KeySession`]. Every other operation validates that session. `lock`
//! and `change_master_password` start a new epoch, which invalidates
//! sessions issued before it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{EventDetails, SecurityEvent};
use crate::crypto::password::validate_master_password;
use crate::crypto::{
    CryptoEngine, CryptoPrimitives, Curve, EncryptionResult, NativePrimitives, SecureString,
    DEFAULT_KEY_SIZE, ENVELOPE_ALGORITHM, SIGNATURE_ALGORITHM,
};
use crate::error::{VaultError, VaultResult};
use crate::storage::KeyValueStore;

use super::model::{KeyId, KeyInfo, KeyMetadata, KeyType, StoredKey};
use super::session::KeySession;

/// Symmetric keys are 256-bit
pub const SYMMETRIC_KEY_BYTES: usize = 32;

/// Random bytes in a key id suffix
const KEY_ID_RANDOM_BYTES: usize = 6;

/// Current key export format version
pub const KEY_EXPORT_VERSION: u32 = 1;

/// Default look-ahead for `get_expiring_keys`
pub const DEFAULT_EXPIRY_WINDOW_DAYS: u32 = 30;

/// Versioned whole-index export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub keys: Vec<StoredKey>,
}

/// Outcome of `import_keys`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Keys added to the index
    pub imported: Vec<KeyId>,
    /// Ids already present, left untouched
    pub skipped: Vec<KeyId>,
    /// Keys whose material does not open under the current master password
    pub rejected: Vec<KeyId>,
}

type KeyIndex = BTreeMap<KeyId, StoredKey>;

/// Named symmetric and asymmetric keys under one master password
pub struct KeyManager<P: CryptoPrimitives = NativePrimitives> {
    id: Uuid,
    engine: Arc<CryptoEngine<P>>,
    store: Arc<dyn KeyValueStore>,
    index_key: String,
    keys: RwLock<KeyIndex>,
    epoch: AtomicU64,
}

impl<P: CryptoPrimitives> KeyManager<P> {
    /// Create an uninitialized manager persisting under `namespace`
    pub fn new(
        engine: Arc<CryptoEngine<P>>,
        store: Arc<dyn KeyValueStore>,
        namespace: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine,
            store,
            index_key: format!("{}keys", namespace),
            keys: RwLock::new(BTreeMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Open a session with the master password
    ///
    /// Fails with `PolicyViolation` if the password is too weak and with
    /// `InvalidMasterPassword` if it does not open the existing keys. Any
    /// previously issued session is invalidated.
    pub fn initialize(&self, master_password: &str) -> VaultResult<KeySession> {
        let result = self.initialize_inner(master_password);
        self.engine
            .log()
            .outcome(SecurityEvent::KeyManagerInit, "initialize", result, |(_, count)| {
                EventDetails::audit_count(*count)
            })
            .map(|(session, _)| session)
    }

    fn initialize_inner(&self, master_password: &str) -> VaultResult<(KeySession, usize)> {
        validate_master_password(master_password)?;

        // Held across the reload so no persisted write lands in between
        let mut keys = self.write_index()?;
        let loaded = self.load_index()?;
        if let Some(sample) = loaded.values().next() {
            self.engine
                .open(&sample.key_data, master_password, sample.id.as_str().as_bytes())
                .map_err(|e| match e {
                    VaultError::AuthenticationFailure => VaultError::InvalidMasterPassword,
                    other => other,
                })?;
        }

        let count = loaded.len();
        *keys = loaded;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        Ok((
            KeySession::new(self.id, epoch, SecureString::new(master_password)),
            count,
        ))
    }

    /// Invalidate every session and drop the in-memory index
    pub fn lock(&self) {
        let mut keys = match self.keys.write() {
            Ok(keys) => keys,
            Err(poisoned) => {
                tracing::error!("key index lock poisoned during lock");
                poisoned.into_inner()
            }
        };
        self.epoch.fetch_add(1, Ordering::SeqCst);
        keys.clear();
        drop(keys);
        self.engine
            .log()
            .success(SecurityEvent::KeyManagerLock, EventDetails::audit(None));
    }

    /// Whether `session` is still valid for this manager
    pub fn is_session_valid(&self, session: &KeySession) -> bool {
        session.manager_id == self.id && session.epoch == self.epoch.load(Ordering::SeqCst)
    }

    // ----- generation -----------------------------------------------------

    /// Generate and store a random 256-bit key
    pub fn generate_symmetric_key(
        &self,
        session: &KeySession,
        name: &str,
        metadata: KeyMetadata,
        expiration_days: Option<u32>,
    ) -> VaultResult<KeyId> {
        let result = self.generate_symmetric_inner(session, name, metadata, expiration_days);
        self.log_generation(result, ENVELOPE_ALGORITHM, (SYMMETRIC_KEY_BYTES * 8) as u32)
    }

    fn generate_symmetric_inner(
        &self,
        session: &KeySession,
        name: &str,
        metadata: KeyMetadata,
        expiration_days: Option<u32>,
    ) -> VaultResult<KeyId> {
        self.check_session(session)?;
        require_name(name)?;

        let now = Utc::now();
        let expires_at = expires_in(now, expiration_days)?;
        let material = self.engine.random_key_hex(SYMMETRIC_KEY_BYTES)?;
        let key = self.build_key(
            session,
            name,
            KeyType::Symmetric,
            ENVELOPE_ALGORITHM,
            &material,
            None,
            Some((SYMMETRIC_KEY_BYTES * 8) as u32),
            now,
            expires_at,
            metadata,
        )?;
        self.insert_and_persist(session, key)
    }

    /// Generate and store a signing key pair
    ///
    /// Only the private key is sealed; the public key is kept in the clear.
    pub fn generate_asymmetric_key_pair(
        &self,
        session: &KeySession,
        name: &str,
        metadata: KeyMetadata,
        key_size: u32,
        expiration_days: Option<u32>,
    ) -> VaultResult<KeyId> {
        let result =
            self.generate_asymmetric_inner(session, name, metadata, key_size, expiration_days);
        let algorithm = Curve::for_strength(key_size).map_or(SIGNATURE_ALGORITHM, Curve::algorithm);
        self.log_generation(result, algorithm, key_size)
    }

    fn generate_asymmetric_inner(
        &self,
        session: &KeySession,
        name: &str,
        metadata: KeyMetadata,
        key_size: u32,
        expiration_days: Option<u32>,
    ) -> VaultResult<KeyId> {
        self.check_session(session)?;
        require_name(name)?;

        let now = Utc::now();
        let expires_at = expires_in(now, expiration_days)?;
        let pair = self.engine.generate_key_pair_unlogged(key_size)?;
        let key = self.build_key(
            session,
            name,
            KeyType::Asymmetric,
            pair.curve.algorithm(),
            &pair.private_key,
            Some(pair.public_key.clone()),
            Some(key_size),
            now,
            expires_at,
            metadata,
        )?;
        self.insert_and_persist(session, key)
    }

    // ----- access ----------------------------------------------------------

    /// Decrypt and return a key's material
    ///
    /// Symmetric keys are returned as hex, asymmetric keys as the private
    /// key PEM.
    pub fn get_key(&self, session: &KeySession, key_id: &KeyId) -> VaultResult<SecureString> {
        let result = self.get_key_inner(session, key_id);
        self.engine.log().outcome(
            SecurityEvent::KeyAccess,
            &format!("get_key {}", key_id),
            result,
            |_| EventDetails::audit(Some(key_id.to_string())),
        )
    }

    fn get_key_inner(&self, session: &KeySession, key_id: &KeyId) -> VaultResult<SecureString> {
        self.check_session(session)?;
        let key = self.live_key(key_id, Utc::now())?;
        self.open_key(&key, session.master_password())
    }

    /// Public key PEM of an asymmetric key
    pub fn get_public_key(&self, session: &KeySession, key_id: &KeyId) -> VaultResult<String> {
        let result = self.check_session(session).and_then(|_| {
            let key = self.live_key(key_id, Utc::now())?;
            match (key.key_type, key.public_key) {
                (KeyType::Asymmetric, Some(public_key)) => Ok(public_key),
                _ => Err(VaultError::InvalidInput(format!(
                    "Key {} is not an asymmetric key",
                    key_id
                ))),
            }
        });
        self.engine.log().outcome(
            SecurityEvent::KeyAccess,
            &format!("get_public_key {}", key_id),
            result,
            |_| EventDetails::audit(Some(key_id.to_string())),
        )
    }

    /// Metadata of one key, without key material
    pub fn get_key_info(&self, session: &KeySession, key_id: &KeyId) -> VaultResult<KeyInfo> {
        let result = self.check_session(session).and_then(|_| {
            self.read_index()?
                .get(key_id)
                .map(KeyInfo::from)
                .ok_or_else(|| VaultError::KeyNotFound(key_id.to_string()))
        });
        self.engine.log().outcome(
            SecurityEvent::KeyAccess,
            &format!("get_key_info {}", key_id),
            result,
            |_| EventDetails::audit(Some(key_id.to_string())),
        )
    }

    /// Every key, oldest first, without key material
    pub fn list_keys(&self, session: &KeySession) -> VaultResult<Vec<KeyInfo>> {
        let result = self.check_session(session).and_then(|_| {
            let keys = self.read_index()?;
            let mut infos: Vec<KeyInfo> = keys.values().map(KeyInfo::from).collect();
            infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(infos)
        });
        self.engine
            .log()
            .outcome(SecurityEvent::KeyList, "list_keys", result, |infos| {
                EventDetails::audit_count(infos.len())
            })
    }

    /// Keys expiring within `days_ahead` days, soonest first
    ///
    /// Already-expired keys are included.
    pub fn get_expiring_keys(
        &self,
        session: &KeySession,
        days_ahead: u32,
    ) -> VaultResult<Vec<KeyInfo>> {
        let result = self.expiring_keys_inner(session, days_ahead);
        self.engine.log().outcome(
            SecurityEvent::KeyList,
            &format!("get_expiring_keys {}", days_ahead),
            result,
            |infos| EventDetails::audit_count(infos.len()),
        )
    }

    fn expiring_keys_inner(
        &self,
        session: &KeySession,
        days_ahead: u32,
    ) -> VaultResult<Vec<KeyInfo>> {
        self.check_session(session)?;
        let cutoff = days_after(Utc::now(), days_ahead)?;
        let keys = self.read_index()?;
        let mut expiring: Vec<KeyInfo> = keys
            .values()
            .filter(|k| k.expires_at.map_or(false, |exp| exp <= cutoff))
            .map(KeyInfo::from)
            .collect();
        expiring.sort_by_key(|k| k.expires_at);
        Ok(expiring)
    }

    // ----- mutation ----------------------------------------------------------

    /// Remove a key; fails with `KeyNotFound` if it is absent
    pub fn delete_key(&self, session: &KeySession, key_id: &KeyId) -> VaultResult<()> {
        let result = self.delete_key_inner(session, key_id);
        self.engine.log().outcome(
            SecurityEvent::KeyDelete,
            &format!("delete_key {}", key_id),
            result,
            |_| EventDetails::audit(Some(key_id.to_string())),
        )
    }

    fn delete_key_inner(&self, session: &KeySession, key_id: &KeyId) -> VaultResult<()> {
        self.check_session(session)?;
        let mut keys = self.session_index(session)?;
        let removed = keys
            .remove(key_id)
            .ok_or_else(|| VaultError::KeyNotFound(key_id.to_string()))?;

        if let Err(e) = self.persist(&keys) {
            keys.insert(key_id.clone(), removed);
            return Err(e);
        }
        Ok(())
    }

    /// Replace a key with fresh material under a new id
    ///
    /// The replacement keeps the name, metadata and type, and expires at the
    /// same instant as the old key. The swap is one persisted write; if the
    /// old key disappeared meanwhile (a concurrent rotation or delete) the
    /// rotation fails with `KeyNotFound` and nothing is written.
    pub fn rotate_key(&self, session: &KeySession, key_id: &KeyId) -> VaultResult<KeyId> {
        let result = self.rotate_key_inner(session, key_id);
        self.engine.log().outcome(
            SecurityEvent::KeyRotate,
            &format!("rotate_key {}", key_id),
            result,
            |new_id| EventDetails::Audit {
                subject: Some(key_id.to_string()),
                count: None,
                note: Some(format!("replaced by {}", new_id)),
            },
        )
    }

    fn rotate_key_inner(&self, session: &KeySession, key_id: &KeyId) -> VaultResult<KeyId> {
        self.check_session(session)?;
        let now = Utc::now();
        let old = self.live_key(key_id, now)?;

        let (material, public_key, algorithm) = match old.key_type {
            KeyType::Symmetric => (
                self.engine.random_key_hex(SYMMETRIC_KEY_BYTES)?,
                None,
                old.algorithm.clone(),
            ),
            KeyType::Asymmetric => {
                let pair = self
                    .engine
                    .generate_key_pair_unlogged(old.key_size.unwrap_or(DEFAULT_KEY_SIZE))?;
                (
                    pair.private_key.clone(),
                    Some(pair.public_key.clone()),
                    pair.curve.algorithm().to_string(),
                )
            }
        };

        // Remaining lifetime carries over: same absolute expiry
        let expires_at = old
            .remaining_at(now)
            .map(|remaining| now + remaining);

        let replacement = self.build_key(
            session,
            &old.name,
            old.key_type,
            &algorithm,
            &material,
            public_key,
            old.key_size,
            now,
            expires_at,
            old.metadata.clone(),
        )?;
        let new_id = replacement.id.clone();

        let mut keys = self.session_index(session)?;
        let previous = keys
            .remove(key_id)
            .ok_or_else(|| VaultError::KeyNotFound(key_id.to_string()))?;
        keys.insert(new_id.clone(), replacement);

        if let Err(e) = self.persist(&keys) {
            keys.remove(&new_id);
            keys.insert(key_id.clone(), previous);
            return Err(e);
        }
        Ok(new_id)
    }

    /// Re-encrypt every key under a new master password
    ///
    /// `old_password` must match the session's master password. All keys are
    /// re-sealed before anything is replaced; a failure on any key leaves the
    /// index and the session unchanged. On success the session moves to the
    /// new password and every other session is invalidated.
    pub fn change_master_password(
        &self,
        session: &mut KeySession,
        old_password: &str,
        new_password: &str,
    ) -> VaultResult<()> {
        let result = self.change_master_inner(session, old_password, new_password);
        self.engine.log().outcome(
            SecurityEvent::MasterPasswordChange,
            "change_master_password",
            result,
            |count| EventDetails::audit_count(*count),
        )?;
        Ok(())
    }

    fn change_master_inner(
        &self,
        session: &mut KeySession,
        old_password: &str,
        new_password: &str,
    ) -> VaultResult<usize> {
        self.check_session(session)?;
        if old_password != session.master_password() {
            return Err(VaultError::InvalidMasterPassword);
        }
        validate_master_password(new_password)?;

        let mut keys = self.session_index(session)?;
        let mut resealed = BTreeMap::new();
        for (id, key) in keys.iter() {
            let material = self.open_key(key, old_password)?;
            let mut updated = key.clone();
            updated.key_data = self.seal_key(id, &material, new_password)?;
            resealed.insert(id.clone(), updated);
        }

        self.persist(&resealed)?;
        let count = resealed.len();
        *keys = resealed;

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        session.epoch = epoch;
        session.master_password = SecureString::new(new_password);
        Ok(count)
    }

    // ----- export / import -------------------------------------------------

    /// Whole index as versioned JSON; key material stays sealed
    pub fn export_keys(&self, session: &KeySession) -> VaultResult<String> {
        let result = self.check_session(session).and_then(|_| {
            let keys = self.read_index()?;
            let export = KeyExport {
                version: KEY_EXPORT_VERSION,
                exported_at: Utc::now(),
                keys: keys.values().cloned().collect(),
            };
            let json = serde_json::to_string_pretty(&export)
                .map_err(|e| VaultError::Json(format!("Failed to serialize keys: {}", e)))?;
            Ok((json, export.keys.len()))
        });
        self.engine
            .log()
            .outcome(SecurityEvent::KeyExport, "export_keys", result, |(_, n)| {
                EventDetails::audit_count(*n)
            })
            .map(|(json, _)| json)
    }

    /// Add keys from an export
    ///
    /// Strictly additive: ids already present are skipped, never
    /// overwritten. Keys that do not open under the current master password
    /// are rejected.
    pub fn import_keys(&self, session: &KeySession, json: &str) -> VaultResult<ImportSummary> {
        let result = self.import_keys_inner(session, json);
        self.engine
            .log()
            .outcome(SecurityEvent::KeyImport, "import_keys", result, |summary| {
                EventDetails::Audit {
                    subject: None,
                    count: Some(summary.imported.len()),
                    note: Some(format!(
                        "{} skipped, {} rejected",
                        summary.skipped.len(),
                        summary.rejected.len()
                    )),
                }
            })
    }

    fn import_keys_inner(&self, session: &KeySession, json: &str) -> VaultResult<ImportSummary> {
        self.check_session(session)?;
        let export: KeyExport = serde_json::from_str(json)
            .map_err(|e| VaultError::InvalidInput(format!("Invalid key export: {}", e)))?;
        if export.version > KEY_EXPORT_VERSION {
            return Err(VaultError::InvalidInput(format!(
                "Unsupported key export version: {}",
                export.version
            )));
        }

        let mut summary = ImportSummary::default();
        let mut keys = self.session_index(session)?;
        let mut additions = Vec::new();
        for key in export.keys {
            if keys.contains_key(&key.id) || additions.iter().any(|k: &StoredKey| k.id == key.id) {
                summary.skipped.push(key.id);
            } else if self.open_key(&key, session.master_password()).is_err() {
                summary.rejected.push(key.id);
            } else {
                summary.imported.push(key.id.clone());
                additions.push(key);
            }
        }

        if additions.is_empty() {
            return Ok(summary);
        }

        for key in &additions {
            keys.insert(key.id.clone(), key.clone());
        }
        if let Err(e) = self.persist(&keys) {
            for key in &additions {
                keys.remove(&key.id);
            }
            return Err(e);
        }
        Ok(summary)
    }

    // ----- internals ---------------------------------------------------------

    fn check_session(&self, session: &KeySession) -> VaultResult<()> {
        if self.is_session_valid(session) {
            Ok(())
        } else {
            Err(VaultError::NotInitialized)
        }
    }

    /// A key that exists and has not expired at `now`
    fn live_key(&self, key_id: &KeyId, now: DateTime<Utc>) -> VaultResult<StoredKey> {
        let key = self
            .read_index()?
            .get(key_id)
            .cloned()
            .ok_or_else(|| VaultError::KeyNotFound(key_id.to_string()))?;
        if key.is_expired_at(now) {
            return Err(VaultError::KeyExpired(key_id.to_string()));
        }
        Ok(key)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_key(
        &self,
        session: &KeySession,
        name: &str,
        key_type: KeyType,
        algorithm: &str,
        material: &str,
        public_key: Option<String>,
        key_size: Option<u32>,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        metadata: KeyMetadata,
    ) -> VaultResult<StoredKey> {
        let id = KeyId::from_parts(created_at, &self.engine.random_bytes(KEY_ID_RANDOM_BYTES)?);
        let key_data = self.seal_key(&id, material, session.master_password())?;
        Ok(StoredKey {
            id,
            name: name.to_string(),
            key_type,
            algorithm: algorithm.to_string(),
            key_data,
            public_key,
            key_size,
            created_at,
            expires_at,
            metadata,
        })
    }

    fn seal_key(&self, id: &KeyId, material: &str, password: &str) -> VaultResult<EncryptionResult> {
        self.engine
            .seal(password, id.as_str().as_bytes(), material.as_bytes())
    }

    fn open_key(&self, key: &StoredKey, password: &str) -> VaultResult<SecureString> {
        let bytes = self
            .engine
            .open(&key.key_data, password, key.id.as_str().as_bytes())?;
        SecureString::from_utf8(bytes)
            .ok_or_else(|| VaultError::IntegrityFailure(format!("Key {} is not valid text", key.id)))
    }

    fn insert_and_persist(&self, session: &KeySession, key: StoredKey) -> VaultResult<KeyId> {
        let id = key.id.clone();
        let mut keys = self.session_index(session)?;
        keys.insert(id.clone(), key);
        if let Err(e) = self.persist(&keys) {
            keys.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    fn log_generation(
        &self,
        result: VaultResult<KeyId>,
        algorithm: &str,
        key_size: u32,
    ) -> VaultResult<KeyId> {
        self.engine
            .log()
            .outcome(SecurityEvent::KeyGenerate, "generate_key", result, |id| {
                EventDetails::Generation {
                    algorithm: algorithm.to_string(),
                    key_size: Some(key_size),
                    key_id: Some(id.to_string()),
                }
            })
    }

    fn load_index(&self) -> VaultResult<KeyIndex> {
        let Some(json) = self.store.get(&self.index_key)? else {
            return Ok(BTreeMap::new());
        };
        let keys: Vec<StoredKey> = serde_json::from_str(&json)
            .map_err(|e| VaultError::Storage(format!("Failed to parse key index: {}", e)))?;
        Ok(keys.into_iter().map(|k| (k.id.clone(), k)).collect())
    }

    fn persist(&self, keys: &KeyIndex) -> VaultResult<()> {
        let list: Vec<&StoredKey> = keys.values().collect();
        let json = serde_json::to_string(&list)
            .map_err(|e| VaultError::Json(format!("Failed to serialize key index: {}", e)))?;
        self.store.set(&self.index_key, &json)
    }

    fn read_index(&self) -> VaultResult<std::sync::RwLockReadGuard<'_, KeyIndex>> {
        self.keys
            .read()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_index(&self) -> VaultResult<RwLockWriteGuard<'_, KeyIndex>> {
        self.keys
            .write()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire write lock: {}", e)))
    }

    /// Write access for a mutation under `session`
    ///
    /// The session is checked again once the lock is held. `lock`,
    /// `initialize` and `change_master_password` only move the epoch while
    /// holding it, so an index replaced since the caller's first check is
    /// never written back.
    fn session_index(&self, session: &KeySession) -> VaultResult<RwLockWriteGuard<'_, KeyIndex>> {
        let keys = self.write_index()?;
        self.check_session(session)?;
        Ok(keys)
    }
}

fn require_name(name: &str) -> VaultResult<()> {
    if name.trim().is_empty() {
        return Err(VaultError::empty("key name"));
    }
    Ok(())
}

fn days_after(now: DateTime<Utc>, days: u32) -> VaultResult<DateTime<Utc>> {
    Duration::try_days(i64::from(days))
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| VaultError::InvalidInput(format!("{} days is out of range", days)))
}

fn expires_in(now: DateTime<Utc>, days: Option<u32>) -> VaultResult<Option<DateTime<Utc>>> {
    days.map(|d| days_after(now, d)).transpose()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::{LogStatus, SecurityLog};
    use crate::crypto::encryption::Sealed;
    use crate::crypto::engine::tests::{fast_kdf, test_engine};
    use crate::crypto::{signing, HashAlgorithm, KdfParams, KeyPair, SecureBytes};
    use crate::storage::MemoryStore;

    const MASTER: &str = "Str0ng!Pass1234";
    const NS: &str = "ledger_vault.";

    fn setup() -> (KeyManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = KeyManager::new(Arc::new(test_engine()), store.clone(), NS);
        (manager, store)
    }

    fn meta() -> KeyMetadata {
        KeyMetadata::new("invoices", "billing")
    }

    fn set_expiry(manager: &KeyManager, id: &KeyId, expires_at: Option<DateTime<Utc>>) {
        manager
            .keys
            .write()
            .unwrap()
            .get_mut(id)
            .unwrap()
            .expires_at = expires_at;
    }

    fn log(manager: &KeyManager) -> &Arc<SecurityLog> {
        manager.engine.log()
    }

    fn persisted_ids(store: Arc<MemoryStore>) -> Vec<KeyId> {
        let reopened = KeyManager::new(Arc::new(test_engine()), store, NS);
        let session = reopened.initialize(MASTER).unwrap();
        let mut ids: Vec<KeyId> = reopened
            .list_keys(&session)
            .unwrap()
            .into_iter()
            .map(|k| k.id)
            .collect();
        ids.sort();
        ids
    }

    type Hook = Box<dyn FnOnce() + Send>;

    /// Native primitives that run a one-shot hook on the next random draw
    #[derive(Clone, Default)]
    struct HookedPrimitives {
        hook: Arc<Mutex<Option<Hook>>>,
    }

    impl HookedPrimitives {
        fn on_next_random(&self, hook: impl FnOnce() + Send + 'static) {
            *self.hook.lock().unwrap() = Some(Box::new(hook));
        }
    }

    impl CryptoPrimitives for HookedPrimitives {
        fn fill_random(&self, buf: &mut [u8]) -> VaultResult<()> {
            let hook = self.hook.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            NativePrimitives.fill_random(buf)
        }
        fn derive_key(
            &self,
            password: &[u8],
            salt: &[u8],
            params: &KdfParams,
            output_len: usize,
        ) -> VaultResult<SecureBytes> {
            NativePrimitives.derive_key(password, salt, params, output_len)
        }
        fn aead_seal(&self, key: &[u8], iv: &[u8], aad: &[u8], pt: &[u8]) -> VaultResult<Sealed> {
            NativePrimitives.aead_seal(key, iv, aad, pt)
        }
        fn aead_open(
            &self,
            key: &[u8],
            iv: &[u8],
            aad: &[u8],
            ct: &[u8],
            tag: &[u8],
        ) -> VaultResult<SecureBytes> {
            NativePrimitives.aead_open(key, iv, aad, ct, tag)
        }
        fn generate_key_pair(&self, key_size: u32) -> VaultResult<KeyPair> {
            NativePrimitives.generate_key_pair(key_size)
        }
        fn sign(&self, private_key: &str, data: &[u8]) -> VaultResult<Vec<u8>> {
            NativePrimitives.sign(private_key, data)
        }
        fn verify(&self, public_key: &str, data: &[u8], sig: &[u8]) -> VaultResult<bool> {
            NativePrimitives.verify(public_key, data, sig)
        }
        fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
            NativePrimitives.hash(algorithm, data)
        }
    }

    fn hooked_setup() -> (
        Arc<KeyManager<HookedPrimitives>>,
        HookedPrimitives,
        Arc<MemoryStore>,
    ) {
        let primitives = HookedPrimitives::default();
        let engine = CryptoEngine::with_primitives(
            primitives.clone(),
            fast_kdf(),
            Arc::new(SecurityLog::new()),
        );
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(KeyManager::new(Arc::new(engine), store.clone(), NS));
        (manager, primitives, store)
    }

    #[test]
    fn test_invoice_key_scenario() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();

        let id = manager
            .generate_symmetric_key(&session, "invoice-key", meta(), None)
            .unwrap();
        let key = manager.get_key(&session, &id).unwrap();
        assert_eq!(key.len(), SYMMETRIC_KEY_BYTES * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

        let listed = manager.list_keys(&session).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key_type, KeyType::Symmetric);
        assert_eq!(listed[0].name, "invoice-key");
        let json = serde_json::to_value(&listed[0]).unwrap();
        assert!(json.get("keyData").is_none());
    }

    #[test]
    fn test_operations_require_session() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        manager.lock();

        assert!(matches!(
            manager.generate_symmetric_key(&session, "k", meta(), None),
            Err(VaultError::NotInitialized)
        ));
        assert!(matches!(
            manager.list_keys(&session),
            Err(VaultError::NotInitialized)
        ));

        // A session from another manager is not accepted either
        let (other, _) = setup();
        let foreign = other.initialize(MASTER).unwrap();
        let session = manager.initialize(MASTER).unwrap();
        assert!(manager.list_keys(&session).is_ok());
        assert!(matches!(
            manager.list_keys(&foreign),
            Err(VaultError::NotInitialized)
        ));
    }

    #[test]
    fn test_lock_during_generate_keeps_persisted_keys() {
        let (manager, primitives, store) = hooked_setup();
        let session = manager.initialize(MASTER).unwrap();
        let mut existing = vec![
            manager
                .generate_symmetric_key(&session, "a", meta(), None)
                .unwrap(),
            manager
                .generate_symmetric_key(&session, "b", meta(), None)
                .unwrap(),
        ];
        existing.sort();

        // lock() lands after the session check but before the index write
        let target = Arc::downgrade(&manager);
        primitives.on_next_random(move || {
            if let Some(manager) = target.upgrade() {
                manager.lock();
            }
        });
        assert!(matches!(
            manager.generate_symmetric_key(&session, "late", meta(), None),
            Err(VaultError::NotInitialized)
        ));
        assert_eq!(persisted_ids(store.clone()), existing);

        // Same interleaving with a re-initialize instead of a lock
        let session = manager.initialize(MASTER).unwrap();
        let target = Arc::downgrade(&manager);
        primitives.on_next_random(move || {
            if let Some(manager) = target.upgrade() {
                manager.initialize(MASTER).unwrap();
            }
        });
        assert!(matches!(
            manager.generate_symmetric_key(&session, "late", meta(), None),
            Err(VaultError::NotInitialized)
        ));
        assert_eq!(persisted_ids(store), existing);
    }

    #[test]
    fn test_lock_during_rotate_keeps_old_key() {
        let (manager, primitives, store) = hooked_setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_symmetric_key(&session, "k", meta(), None)
            .unwrap();

        let target = Arc::downgrade(&manager);
        primitives.on_next_random(move || {
            if let Some(manager) = target.upgrade() {
                manager.lock();
            }
        });
        assert!(matches!(
            manager.rotate_key(&session, &id),
            Err(VaultError::NotInitialized)
        ));
        assert_eq!(persisted_ids(store), vec![id]);
    }

    #[test]
    fn test_parallel_rotations_of_one_key() {
        let (manager, store) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_symmetric_key(&session, "invoice-key", meta(), None)
            .unwrap();
        let bystander = manager
            .generate_symmetric_key(&session, "bystander", meta(), None)
            .unwrap();

        let (shared, session_ref, id_ref) = (&manager, &session, &id);
        let results: Vec<VaultResult<KeyId>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| scope.spawn(move || shared.rotate_key(session_ref, id_ref)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<&KeyId> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(VaultError::KeyNotFound(_)))));

        let mut expected = vec![winners[0].clone(), bystander];
        expected.sort();
        assert_eq!(persisted_ids(store), expected);
    }

    #[test]
    fn test_parallel_generation_persists_every_key() {
        let (manager, store) = setup();
        let session = manager.initialize(MASTER).unwrap();

        let (shared, session_ref) = (&manager, &session);
        let mut ids: Vec<KeyId> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["a", "b", "c", "d"]
                .into_iter()
                .map(|name| {
                    scope.spawn(move || shared.generate_symmetric_key(session_ref, name, meta(), None))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
        });
        ids.sort();

        assert_eq!(persisted_ids(store), ids);
    }

    #[test]
    fn test_out_of_range_days_rejected() {
        let (manager, store) = setup();
        let session = manager.initialize(MASTER).unwrap();

        assert!(matches!(
            manager.generate_symmetric_key(&session, "k", meta(), Some(u32::MAX)),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(matches!(
            manager.generate_asymmetric_key_pair(&session, "s", meta(), 2048, Some(u32::MAX)),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(matches!(
            manager.get_expiring_keys(&session, u32::MAX),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(store.get("ledger_vault.keys").unwrap().is_none());

        let id = manager
            .generate_symmetric_key(&session, "decade", meta(), Some(3650))
            .unwrap();
        let expiring = manager.get_expiring_keys(&session, 36500).unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, id);
    }

    #[test]
    fn test_master_password_policy() {
        let (manager, _) = setup();
        for weak in ["short1!A", "alllowercase123!", "NoDigitsHere!!", "NoSymbols12345"] {
            assert!(matches!(
                manager.initialize(weak),
                Err(VaultError::PolicyViolation(_))
            ));
        }
    }

    #[test]
    fn test_reinitialize_checks_existing_keys() {
        let (manager, store) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_symmetric_key(&session, "k", meta(), None)
            .unwrap();

        // Fresh manager over the same persisted index
        let reopened = KeyManager::new(Arc::new(test_engine()), store, NS);
        assert!(matches!(
            reopened.initialize("Other!Pass5678"),
            Err(VaultError::InvalidMasterPassword)
        ));
        let session = reopened.initialize(MASTER).unwrap();
        let original = manager.get_key(&manager.initialize(MASTER).unwrap(), &id).unwrap();
        assert_eq!(reopened.get_key(&session, &id).unwrap(), original);
    }

    #[test]
    fn test_asymmetric_keys() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_asymmetric_key_pair(&session, "signing", meta(), 2048, Some(30))
            .unwrap();

        let public_key = manager.get_public_key(&session, &id).unwrap();
        let private_key = manager.get_key(&session, &id).unwrap();
        let sig = signing::sign(&private_key, b"statement").unwrap();
        assert!(signing::verify(&public_key, b"statement", &sig).unwrap());

        let info = manager.get_key_info(&session, &id).unwrap();
        assert_eq!(info.key_type, KeyType::Asymmetric);
        assert!(info.expires_at.is_some());

        let sym = manager
            .generate_symmetric_key(&session, "sym", meta(), None)
            .unwrap();
        assert!(matches!(
            manager.get_public_key(&session, &sym),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(matches!(
            manager.generate_asymmetric_key_pair(&session, "weak", meta(), 1024, None),
            Err(VaultError::PolicyViolation(_))
        ));
    }

    #[test]
    fn test_expiration_boundary() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_symmetric_key(&session, "k", meta(), Some(1))
            .unwrap();

        set_expiry(&manager, &id, Some(Utc::now() - Duration::seconds(1)));
        assert!(matches!(
            manager.get_key(&session, &id),
            Err(VaultError::KeyExpired(_))
        ));

        set_expiry(&manager, &id, Some(Utc::now() + Duration::hours(1)));
        assert!(manager.get_key(&session, &id).is_ok());
    }

    #[test]
    fn test_missing_key() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let missing = KeyId::from("key_0_000000000000");
        assert!(matches!(
            manager.get_key(&session, &missing),
            Err(VaultError::KeyNotFound(_))
        ));
        assert!(matches!(
            manager.delete_key(&session, &missing),
            Err(VaultError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_delete_persists() {
        let (manager, store) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_symmetric_key(&session, "k", meta(), None)
            .unwrap();
        manager.delete_key(&session, &id).unwrap();

        assert!(matches!(
            manager.delete_key(&session, &id),
            Err(VaultError::KeyNotFound(_))
        ));
        let persisted = store.get("ledger_vault.keys").unwrap().unwrap();
        assert_eq!(persisted, "[]");
    }

    #[test]
    fn test_rotation_keeps_remaining_lifetime() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let old = manager
            .generate_symmetric_key(&session, "invoice-key", meta(), Some(90))
            .unwrap();
        let ten_days = Utc::now() + Duration::days(10);
        set_expiry(&manager, &old, Some(ten_days));
        let old_material = manager.get_key(&session, &old).unwrap();

        let new = manager.rotate_key(&session, &old).unwrap();
        assert_ne!(new, old);
        assert!(matches!(
            manager.get_key(&session, &old),
            Err(VaultError::KeyNotFound(_))
        ));

        let info = manager.get_key_info(&session, &new).unwrap();
        assert_eq!(info.name, "invoice-key");
        assert_eq!(info.metadata, meta());
        let drift = (info.expires_at.unwrap() - ten_days).num_seconds().abs();
        assert!(drift <= 1);
        assert_ne!(manager.get_key(&session, &new).unwrap(), old_material);
        assert_eq!(manager.list_keys(&session).unwrap().len(), 1);
    }

    #[test]
    fn test_rotate_expired_or_missing() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_symmetric_key(&session, "k", meta(), Some(1))
            .unwrap();
        set_expiry(&manager, &id, Some(Utc::now() - Duration::seconds(5)));
        assert!(matches!(
            manager.rotate_key(&session, &id),
            Err(VaultError::KeyExpired(_))
        ));

        let rotated_away = manager
            .generate_symmetric_key(&session, "r", meta(), None)
            .unwrap();
        manager.rotate_key(&session, &rotated_away).unwrap();
        assert!(matches!(
            manager.rotate_key(&session, &rotated_away),
            Err(VaultError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_rotate_asymmetric() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_asymmetric_key_pair(&session, "sig", meta(), 3072, None)
            .unwrap();
        let old_public = manager.get_public_key(&session, &id).unwrap();

        let new = manager.rotate_key(&session, &id).unwrap();
        let info = manager.get_key_info(&session, &new).unwrap();
        assert_eq!(info.key_size, Some(3072));
        assert!(info.expires_at.is_none());
        assert_ne!(manager.get_public_key(&session, &new).unwrap(), old_public);
    }

    #[test]
    fn test_stronger_asymmetric_keys_record_curve() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_asymmetric_key_pair(&session, "archive-signing", meta(), 4096, None)
            .unwrap();
        let info = manager.get_key_info(&session, &id).unwrap();
        assert_eq!(info.algorithm, "ECDSA-P384-SHA384");

        let private_key = manager.get_key(&session, &id).unwrap();
        let sig = signing::sign(&private_key, b"archive").unwrap();
        assert_eq!(sig.len(), 96);
        let public_key = manager.get_public_key(&session, &id).unwrap();
        assert!(signing::verify(&public_key, b"archive", &sig).unwrap());

        let rotated = manager.rotate_key(&session, &id).unwrap();
        let info = manager.get_key_info(&session, &rotated).unwrap();
        assert_eq!(info.algorithm, "ECDSA-P384-SHA384");
        assert_eq!(info.key_size, Some(4096));
    }

    #[test]
    fn test_change_master_password() {
        let (manager, store) = setup();
        let mut session = manager.initialize(MASTER).unwrap();
        let id = manager
            .generate_symmetric_key(&session, "k", meta(), None)
            .unwrap();
        let material = manager.get_key(&session, &id).unwrap();

        assert!(matches!(
            manager.change_master_password(&mut session, "Wrong!Pass1234", "N3w!Password99"),
            Err(VaultError::InvalidMasterPassword)
        ));
        assert!(matches!(
            manager.change_master_password(&mut session, MASTER, "weak"),
            Err(VaultError::PolicyViolation(_))
        ));

        manager
            .change_master_password(&mut session, MASTER, "N3w!Password99")
            .unwrap();
        assert_eq!(manager.get_key(&session, &id).unwrap(), material);

        let reopened = KeyManager::new(Arc::new(test_engine()), store, NS);
        assert!(matches!(
            reopened.initialize(MASTER),
            Err(VaultError::InvalidMasterPassword)
        ));
        assert!(reopened.initialize("N3w!Password99").is_ok());
    }

    #[test]
    fn test_change_master_password_invalidates_other_sessions() {
        let (manager, _) = setup();
        let mut session = manager.initialize(MASTER).unwrap();
        let other = KeySession::new(manager.id, session.epoch, SecureString::new(MASTER));

        manager
            .change_master_password(&mut session, MASTER, "N3w!Password99")
            .unwrap();
        assert!(manager.is_session_valid(&session));
        assert!(!manager.is_session_valid(&other));
    }

    #[test]
    fn test_change_master_password_aborts_on_failure() {
        let (manager, _) = setup();
        let mut session = manager.initialize(MASTER).unwrap();
        let good = manager
            .generate_symmetric_key(&session, "good", meta(), None)
            .unwrap();
        let bad = manager
            .generate_symmetric_key(&session, "bad", meta(), None)
            .unwrap();

        // Corrupt one key's envelope
        {
            let mut keys = manager.keys.write().unwrap();
            let key = keys.get_mut(&bad).unwrap();
            key.key_data = manager
                .engine
                .seal("Unrelated!Pass1", bad.as_str().as_bytes(), b"x")
                .unwrap();
        }

        assert!(manager
            .change_master_password(&mut session, MASTER, "N3w!Password99")
            .is_err());
        assert!(manager.is_session_valid(&session));
        assert_eq!(session.master_password(), MASTER);
        assert!(manager.get_key(&session, &good).is_ok());
    }

    #[test]
    fn test_expiring_keys() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let soon = manager
            .generate_symmetric_key(&session, "soon", meta(), Some(5))
            .unwrap();
        let sooner = manager
            .generate_symmetric_key(&session, "sooner", meta(), Some(2))
            .unwrap();
        manager
            .generate_symmetric_key(&session, "later", meta(), Some(90))
            .unwrap();
        manager
            .generate_symmetric_key(&session, "never", meta(), None)
            .unwrap();

        let expiring = manager
            .get_expiring_keys(&session, DEFAULT_EXPIRY_WINDOW_DAYS)
            .unwrap();
        let ids: Vec<_> = expiring.iter().map(|k| k.id.clone()).collect();
        assert_eq!(ids, vec![sooner, soon]);
    }

    #[test]
    fn test_export_import_additive() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        let a = manager
            .generate_symmetric_key(&session, "a", meta(), None)
            .unwrap();
        let export = manager.export_keys(&session).unwrap();
        assert!(export.contains("\"exportedAt\""));

        let (target, _) = setup();
        let target_session = target.initialize(MASTER).unwrap();
        let summary = target.import_keys(&target_session, &export).unwrap();
        assert_eq!(summary.imported, vec![a.clone()]);
        assert_eq!(
            target.get_key(&target_session, &a).unwrap(),
            manager.get_key(&session, &a).unwrap()
        );

        let again = target.import_keys(&target_session, &export).unwrap();
        assert!(again.imported.is_empty());
        assert_eq!(again.skipped, vec![a]);

        let (foreign, _) = setup();
        let foreign_session = foreign.initialize("Other!Pass5678").unwrap();
        let rejected = foreign.import_keys(&foreign_session, &export).unwrap();
        assert_eq!(rejected.rejected.len(), 1);
        assert!(foreign.list_keys(&foreign_session).unwrap().is_empty());

        assert!(matches!(
            target.import_keys(&target_session, "not json"),
            Err(VaultError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_each_operation_logs_once() {
        let (manager, _) = setup();
        let session = manager.initialize(MASTER).unwrap();
        log(&manager).clear();

        let id = manager
            .generate_symmetric_key(&session, "k", meta(), None)
            .unwrap();
        assert_eq!(log(&manager).len(), 1);

        manager.get_key(&session, &id).unwrap();
        assert_eq!(log(&manager).len(), 2);

        let _ = manager.get_key(&session, &KeyId::from("missing"));
        let entries = log(&manager).entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].status, LogStatus::Error);

        manager.get_key_info(&session, &id).unwrap();
        manager.list_keys(&session).unwrap();
        manager
            .get_expiring_keys(&session, DEFAULT_EXPIRY_WINDOW_DAYS)
            .unwrap();
        assert_eq!(log(&manager).len(), 6);

        manager.lock();
        let _ = manager.get_key_info(&session, &id);
        let _ = manager.list_keys(&session);
        let _ = manager.get_expiring_keys(&session, DEFAULT_EXPIRY_WINDOW_DAYS);
        let entries = log(&manager).entries();
        assert_eq!(entries.len(), 10);
        let events: Vec<_> = entries[7..].iter().map(|e| (e.event, e.status)).collect();
        assert_eq!(
            events,
            vec![
                (SecurityEvent::KeyAccess, LogStatus::Error),
                (SecurityEvent::KeyList, LogStatus::Error),
                (SecurityEvent::KeyList, LogStatus::Error),
            ]
        );

        let json = log(&manager).export_json().unwrap();
        assert!(!json.contains(MASTER));
    }
}
