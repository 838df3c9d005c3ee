//! Key lifecycle management
//!
//! Named symmetric keys and signing key pairs protected by a master
//! password, with rotation, expiration and export/import.

mod manager;
mod model;
mod session;

pub use manager::{
    ImportSummary, KeyExport, KeyManager, DEFAULT_EXPIRY_WINDOW_DAYS, KEY_EXPORT_VERSION,
    SYMMETRIC_KEY_BYTES,
};
pub use model::{KeyId, KeyInfo, KeyMetadata, KeyType, StoredKey};
pub use session::KeySession;
