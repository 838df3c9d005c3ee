//! File encryption
//!
//! Text files encrypted as a single envelope plus metadata, with batch
//! variants and on-disk bundles.

mod file_encryption;
mod mime;

pub use file_encryption::{
    load_encrypted_file, save_encrypted_file, BatchFailure, BatchResult, DecryptedFile,
    EncryptedFile, FileEncryption,
};
pub use mime::{mime_type_for, DEFAULT_MIME_TYPE};
