//! Key manager session
//!
//! Returned by `KeyManager::initialize` and passed to every key operation.
//! Holds the master password for the lifetime of the session; it is never
//! persisted and is wiped when the session is dropped.

use std::fmt;

use uuid::Uuid;

use crate::crypto::SecureString;

/// Proof of a successful `initialize` on one key manager
pub struct KeySession {
    pub(crate) manager_id: Uuid,
    pub(crate) epoch: u64,
    pub(crate) master_password: SecureString,
}

impl KeySession {
    pub(crate) fn new(manager_id: Uuid, epoch: u64, master_password: SecureString) -> Self {
        Self {
            manager_id,
            epoch,
            master_password,
        }
    }

    /// Id of the manager that issued this session
    pub fn manager_id(&self) -> Uuid {
        self.manager_id
    }

    pub(crate) fn master_password(&self) -> &str {
        &self.master_password
    }
}

impl fmt::Debug for KeySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySession")
            .field("manager_id", &self.manager_id)
            .field("epoch", &self.epoch)
            .field("master_password", &"[REDACTED]")
            .finish()
    }
}
