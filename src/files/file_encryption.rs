//! Whole-file encryption
//!
//! A file's text content is checksummed, encrypted under a password and
//! wrapped with its name, sizes and MIME type. Decryption re-verifies the
//! checksum. Batch variants process every file independently and report
//! per-file failures alongside the successes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{EventDetails, SecurityEvent};
use crate::crypto::engine::collapse_auth;
use crate::crypto::{
    CryptoEngine, CryptoPrimitives, EncryptionResult, HashAlgorithm, NativePrimitives,
    SecureString,
};
use crate::error::{VaultError, VaultResult};
use crate::storage::{read_json_required, write_atomic, write_json_atomic};

use super::mime::mime_type_for;

/// An encrypted file with its descriptive metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedFile {
    pub original_name: String,
    pub original_size: usize,
    pub encrypted_size: usize,
    pub mime_type: String,
    /// SHA-256 hex of the original content
    pub checksum: String,
    pub encrypted_at: DateTime<Utc>,
    pub envelope: EncryptionResult,
}

/// Decrypted file content
#[derive(Debug)]
pub struct DecryptedFile {
    pub name: String,
    pub mime_type: String,
    pub content: SecureString,
}

/// A file that failed inside a batch
#[derive(Debug)]
pub struct BatchFailure {
    pub name: String,
    pub error: VaultError,
}

/// Successes and failures of a batch run
#[derive(Debug)]
pub struct BatchResult<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn push(&mut self, name: String, result: VaultResult<T>) {
        match result {
            Ok(value) => self.succeeded.push(value),
            Err(error) => self.failed.push(BatchFailure { name, error }),
        }
    }
}

/// File-shaped front end to the crypto engine
pub struct FileEncryption<P: CryptoPrimitives = NativePrimitives> {
    engine: Arc<CryptoEngine<P>>,
}

impl<P: CryptoPrimitives> FileEncryption<P> {
    pub fn new(engine: Arc<CryptoEngine<P>>) -> Self {
        Self { engine }
    }

    /// Encrypt in-memory text as a file named `name`
    pub fn encrypt_content(
        &self,
        name: &str,
        content: &str,
        password: &str,
    ) -> VaultResult<EncryptedFile> {
        let result = self.encrypt_inner(name, content, password);
        self.engine.log().outcome(
            SecurityEvent::FileEncrypt,
            &format!("encrypt_file {}", name),
            result,
            |f| EventDetails::Storage {
                storage_key: Some(f.original_name.clone()),
                size: Some(f.original_size),
                compressed: None,
                count: None,
            },
        )
    }

    /// Read a text file from disk and encrypt it
    pub fn encrypt_file(&self, path: &Path, password: &str) -> VaultResult<EncryptedFile> {
        let name = file_name(path);
        match read_text(path) {
            Ok(content) => self.encrypt_content(&name, &content, password),
            Err(e) => {
                self.engine
                    .log()
                    .failure(SecurityEvent::FileEncrypt, &e, format!("encrypt_file {}", name));
                Err(e)
            }
        }
    }

    /// Decrypt and verify a file
    ///
    /// Wrong password or tampered ciphertext fails with
    /// `AuthenticationFailure`; a checksum mismatch with `CorruptedFile`.
    pub fn decrypt(&self, file: &EncryptedFile, password: &str) -> VaultResult<DecryptedFile> {
        let result = self.decrypt_inner(file, password);
        self.engine.log().outcome(
            SecurityEvent::FileDecrypt,
            &format!("decrypt_file {}", file.original_name),
            result,
            |d| EventDetails::Storage {
                storage_key: Some(d.name.clone()),
                size: Some(d.content.len()),
                compressed: None,
                count: None,
            },
        )
    }

    /// Decrypt a file and write its content to `output` atomically
    pub fn decrypt_to_path(
        &self,
        file: &EncryptedFile,
        password: &str,
        output: &Path,
    ) -> VaultResult<DecryptedFile> {
        let decrypted = self.decrypt(file, password)?;
        write_atomic(output, decrypted.content.as_bytes())?;
        Ok(decrypted)
    }

    /// Encrypt many in-memory files; one failure never stops the batch
    pub fn encrypt_batch(
        &self,
        files: &[(String, String)],
        password: &str,
    ) -> BatchResult<EncryptedFile> {
        let mut batch = BatchResult::default();
        for (name, content) in files {
            batch.push(name.clone(), self.encrypt_content(name, content, password));
        }
        batch
    }

    /// Encrypt many files from disk; one failure never stops the batch
    pub fn encrypt_files(&self, paths: &[PathBuf], password: &str) -> BatchResult<EncryptedFile> {
        let mut batch = BatchResult::default();
        for path in paths {
            batch.push(file_name(path), self.encrypt_file(path, password));
        }
        batch
    }

    /// Decrypt many files; one failure never stops the batch
    pub fn decrypt_batch(
        &self,
        files: &[EncryptedFile],
        password: &str,
    ) -> BatchResult<DecryptedFile> {
        let mut batch = BatchResult::default();
        for file in files {
            batch.push(file.original_name.clone(), self.decrypt(file, password));
        }
        batch
    }

    fn encrypt_inner(
        &self,
        name: &str,
        content: &str,
        password: &str,
    ) -> VaultResult<EncryptedFile> {
        if name.trim().is_empty() {
            return Err(VaultError::empty("file name"));
        }
        if content.is_empty() {
            return Err(VaultError::empty("file content"));
        }
        if password.is_empty() {
            return Err(VaultError::empty("password"));
        }

        let checksum = self.checksum(content);
        let envelope = self.engine.seal(password, &[], content.as_bytes())?;

        Ok(EncryptedFile {
            original_name: name.to_string(),
            original_size: content.len(),
            encrypted_size: envelope.ciphertext_len(),
            mime_type: mime_type_for(name).to_string(),
            checksum,
            encrypted_at: Utc::now(),
            envelope,
        })
    }

    fn decrypt_inner(&self, file: &EncryptedFile, password: &str) -> VaultResult<DecryptedFile> {
        if password.is_empty() {
            return Err(VaultError::empty("password"));
        }

        let bytes = self
            .engine
            .open(&file.envelope, password, &[])
            .map_err(collapse_auth)?;
        let content = SecureString::from_utf8(bytes).ok_or_else(|| {
            VaultError::CorruptedFile(format!("{} is not valid text", file.original_name))
        })?;

        if self.checksum(&content) != file.checksum {
            return Err(VaultError::CorruptedFile(format!(
                "Checksum mismatch for {}",
                file.original_name
            )));
        }

        Ok(DecryptedFile {
            name: file.original_name.clone(),
            mime_type: file.mime_type.clone(),
            content,
        })
    }

    fn checksum(&self, content: &str) -> String {
        hex::encode(self.engine.hash(HashAlgorithm::Sha256, content.as_bytes()))
    }
}

/// Write an encrypted file bundle as JSON, atomically
pub fn save_encrypted_file(path: &Path, file: &EncryptedFile) -> VaultResult<()> {
    write_json_atomic(path, file)
}

/// Read an encrypted file bundle written by `save_encrypted_file`
pub fn load_encrypted_file(path: &Path) -> VaultResult<EncryptedFile> {
    read_json_required(path).map_err(|e| match e {
        VaultError::Storage(msg) => VaultError::CorruptedFile(msg),
        other => other,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_text(path: &Path) -> VaultResult<String> {
    let bytes = fs::read(path)
        .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    String::from_utf8(bytes).map_err(|_| {
        VaultError::InvalidInput(format!("{} is not a UTF-8 text file", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LogStatus;
    use crate::crypto::engine::tests::test_engine;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use tempfile::TempDir;

    fn files() -> FileEncryption {
        FileEncryption::new(Arc::new(test_engine()))
    }

    #[test]
    fn test_round_trip() {
        let fe = files();
        let encrypted = fe
            .encrypt_content("bills.csv", "id,total\n1,42.50\n", "pw")
            .unwrap();
        assert_eq!(encrypted.original_name, "bills.csv");
        assert_eq!(encrypted.original_size, 17);
        assert_eq!(encrypted.mime_type, "text/csv");
        assert_eq!(encrypted.checksum.len(), 64);

        let decrypted = fe.decrypt(&encrypted, "pw").unwrap();
        assert_eq!(decrypted.content.as_str(), "id,total\n1,42.50\n");
        assert_eq!(decrypted.name, "bills.csv");
    }

    #[test]
    fn test_wrong_password_and_tamper() {
        let fe = files();
        let encrypted = fe.encrypt_content("a.txt", "hello", "pw").unwrap();
        assert!(matches!(
            fe.decrypt(&encrypted, "nope"),
            Err(VaultError::AuthenticationFailure)
        ));

        let mut tampered = encrypted.clone();
        let mut bytes = STANDARD.decode(&tampered.envelope.ciphertext).unwrap();
        bytes[0] ^= 1;
        tampered.envelope.ciphertext = STANDARD.encode(bytes);
        assert!(matches!(
            fe.decrypt(&tampered, "pw"),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_checksum_mismatch_is_corrupted_file() {
        let fe = files();
        let mut encrypted = fe.encrypt_content("a.txt", "hello", "pw").unwrap();
        encrypted.checksum = "0".repeat(64);
        assert!(matches!(
            fe.decrypt(&encrypted, "pw"),
            Err(VaultError::CorruptedFile(_))
        ));
        let last = fe.engine.log().recent(1).pop().unwrap();
        assert_eq!(last.status, LogStatus::Failure);
    }

    #[test]
    fn test_file_on_disk() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("notes.txt");
        let bundle = temp.path().join("notes.txt.enc");
        let output = temp.path().join("restored.txt");
        fs::write(&input, "meeting at noon").unwrap();

        let fe = files();
        let encrypted = fe.encrypt_file(&input, "pw").unwrap();
        save_encrypted_file(&bundle, &encrypted).unwrap();

        let loaded = load_encrypted_file(&bundle).unwrap();
        assert_eq!(loaded, encrypted);
        fe.decrypt_to_path(&loaded, "pw", &output).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "meeting at noon");
    }

    #[test]
    fn test_load_garbage_bundle() {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("bad.enc");
        fs::write(&bundle, "not json").unwrap();
        assert!(matches!(
            load_encrypted_file(&bundle),
            Err(VaultError::CorruptedFile(_))
        ));
    }

    #[test]
    fn test_batch_partial_success() {
        let fe = files();
        let batch = fe.encrypt_batch(
            &[
                ("one.txt".to_string(), "first".to_string()),
                ("empty.txt".to_string(), String::new()),
                ("two.json".to_string(), "{}".to_string()),
            ],
            "pw",
        );
        assert_eq!(batch.succeeded.len(), 2);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].name, "empty.txt");
        assert!(!batch.is_complete());

        let mut inputs = batch.succeeded.clone();
        inputs[1].checksum = "f".repeat(64);
        let decrypted = fe.decrypt_batch(&inputs, "pw");
        assert_eq!(decrypted.succeeded.len(), 1);
        assert_eq!(decrypted.succeeded[0].content.as_str(), "first");
        assert!(matches!(
            decrypted.failed[0].error,
            VaultError::CorruptedFile(_)
        ));
    }

    #[test]
    fn test_encrypt_files_continues_past_missing() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("here.txt");
        fs::write(&present, "content").unwrap();

        let batch = files().encrypt_files(&[temp.path().join("missing.txt"), present], "pw");
        assert_eq!(batch.succeeded.len(), 1);
        assert_eq!(batch.failed[0].name, "missing.txt");
        assert!(matches!(batch.failed[0].error, VaultError::Io(_)));
    }
}
