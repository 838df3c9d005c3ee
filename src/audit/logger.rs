//! Bounded, append-only security log
//!
//! Keeps the most recent entries in memory (oldest dropped first) and can
//! additionally append every entry to a JSONL file. Each entry is also
//! forwarded to `tracing`.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

use super::entry::{EventDetails, LogStatus, SecurityEvent, SecurityLogEntry};

/// Default number of entries retained in memory
pub const DEFAULT_CAPACITY: usize = 1000;

/// Filter for querying the in-memory log
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub event: Option<SecurityEvent>,
    pub status: Option<LogStatus>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl LogQuery {
    fn matches(&self, entry: &SecurityLogEntry) -> bool {
        self.event.map_or(true, |e| entry.event == e)
            && self.status.map_or(true, |s| entry.status == s)
            && self.since.map_or(true, |t| entry.timestamp >= t)
    }
}

/// Security log shared by the engine, key manager and secure storage
///
/// `session_id` is generated once per log instance and stamped on every
/// entry, so one run's entries can be correlated.
pub struct SecurityLog {
    session_id: Uuid,
    capacity: usize,
    entries: Mutex<VecDeque<SecurityLogEntry>>,
    sink: Option<PathBuf>,
}

impl Default for SecurityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
            sink: None,
        }
    }

    /// Also append every entry to a JSONL file
    pub fn with_sink(mut self, path: PathBuf) -> Self {
        self.sink = Some(path);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an entry
    ///
    /// Logging never fails the operation being logged: a poisoned lock or
    /// an unwritable sink is reported through `tracing` and otherwise
    /// ignored.
    pub fn record(&self, event: SecurityEvent, status: LogStatus, details: EventDetails) {
        let entry = SecurityLogEntry::new(self.session_id, event, status, details);
        trace_entry(&entry);

        if let Some(path) = &self.sink {
            if let Err(e) = append_line(path, &entry) {
                tracing::warn!(error = %e, "failed to append security log entry");
            }
        }

        match self.entries.lock() {
            Ok(mut entries) => {
                if entries.len() >= self.capacity {
                    entries.pop_front();
                }
                entries.push_back(entry);
            }
            Err(_) => tracing::error!("security log lock poisoned; entry dropped"),
        }
    }

    pub fn success(&self, event: SecurityEvent, details: EventDetails) {
        self.record(event, LogStatus::Success, details);
    }

    pub fn warning(&self, event: SecurityEvent, details: EventDetails) {
        self.record(event, LogStatus::Warning, details);
    }

    /// Record a failed operation with its classification
    pub fn failure(&self, event: SecurityEvent, err: &VaultError, context: impl Into<String>) {
        self.record(
            event,
            LogStatus::for_error(err),
            EventDetails::failure(err, context),
        );
    }

    /// Log the outcome of `result`, passing it through unchanged
    ///
    /// Exactly one entry is written per call, whichever way it went.
    pub fn outcome<T>(
        &self,
        event: SecurityEvent,
        context: &str,
        result: VaultResult<T>,
        details: impl FnOnce(&T) -> EventDetails,
    ) -> VaultResult<T> {
        match &result {
            Ok(value) => self.success(event, details(value)),
            Err(err) => self.failure(event, err, context),
        }
        result
    }

    /// All retained entries, oldest first
    pub fn entries(&self) -> Vec<SecurityLogEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The most recent `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Vec<SecurityLogEntry> {
        let all = self.entries();
        let start = all.len().saturating_sub(count);
        all[start..].to_vec()
    }

    /// Entries matching a query; `limit` keeps the most recent matches
    pub fn query(&self, query: &LogQuery) -> Vec<SecurityLogEntry> {
        let matching: Vec<_> = self
            .entries()
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();
        match query.limit {
            Some(limit) => {
                let start = matching.len().saturating_sub(limit);
                matching[start..].to_vec()
            }
            None => matching,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all in-memory entries (the JSONL sink is left untouched)
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Retained entries as a pretty JSON array
    pub fn export_json(&self) -> VaultResult<String> {
        serde_json::to_string_pretty(&self.entries())
            .map_err(|e| VaultError::Json(format!("Failed to serialize security log: {}", e)))
    }
}

fn trace_entry(entry: &SecurityLogEntry) {
    let event = entry.event.to_string();
    let session = entry.session_id.to_string();
    match entry.status {
        LogStatus::Success => {
            tracing::debug!(event = %event, session_id = %session, "security event")
        }
        LogStatus::Warning => {
            tracing::warn!(event = %event, session_id = %session, "security warning")
        }
        LogStatus::Error | LogStatus::Failure => {
            if let EventDetails::Failure { kind, context } = &entry.details {
                tracing::warn!(
                    event = %event,
                    status = %entry.status,
                    kind = %kind,
                    context = %context,
                    session_id = %session,
                    "security event failed"
                );
            }
        }
    }
}

fn append_line(path: &Path, entry: &SecurityLogEntry) -> VaultResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open security log: {}", e)))?;

    let json = serde_json::to_string(entry)
        .map_err(|e| VaultError::Json(format!("Failed to serialize log entry: {}", e)))?;

    writeln!(file, "{}", json)
        .map_err(|e| VaultError::Io(format!("Failed to write log entry: {}", e)))?;

    file.flush()
        .map_err(|e| VaultError::Io(format!("Failed to flush security log: {}", e)))?;

    Ok(())
}

/// Read every entry from a JSONL security log file, oldest first
pub fn read_log_file(path: &Path) -> VaultResult<Vec<SecurityLogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open security log: {}", e)))?;

    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| {
            VaultError::Io(format!("Failed to read log line {}: {}", line_num + 1, e))
        })?;

        if line.trim().is_empty() {
            continue;
        }

        let entry: SecurityLogEntry = serde_json::from_str(&line).map_err(|e| {
            VaultError::Json(format!(
                "Failed to parse log entry at line {}: {}",
                line_num + 1,
                e
            ))
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn note(i: usize) -> EventDetails {
        EventDetails::note(format!("entry {}", i))
    }

    #[test]
    fn test_record_and_read() {
        let log = SecurityLog::new();
        log.success(SecurityEvent::Hash, note(0));

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, SecurityEvent::Hash);
        assert_eq!(entries[0].session_id, log.session_id());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = SecurityLog::with_capacity(3);
        for i in 0..5 {
            log.success(SecurityEvent::Hash, note(i));
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].details, note(2));
        assert_eq!(entries[2].details, note(4));
    }

    #[test]
    fn test_default_capacity() {
        let log = SecurityLog::new();
        for i in 0..(DEFAULT_CAPACITY + 10) {
            log.success(SecurityEvent::Hash, note(i));
        }
        assert_eq!(log.len(), DEFAULT_CAPACITY);
        assert_eq!(log.entries()[0].details, note(10));
    }

    #[test]
    fn test_recent_and_query() {
        let log = SecurityLog::new();
        log.success(SecurityEvent::EncryptText, note(0));
        log.failure(SecurityEvent::DecryptText, &VaultError::AuthenticationFailure, "decrypt");
        log.warning(SecurityEvent::PasswordStrength, note(2));
        log.success(SecurityEvent::EncryptText, note(3));

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].details, note(3));

        let failures = log.query(&LogQuery {
            status: Some(LogStatus::Failure),
            ..Default::default()
        });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].event, SecurityEvent::DecryptText);

        let encrypts = log.query(&LogQuery {
            event: Some(SecurityEvent::EncryptText),
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(encrypts.len(), 1);
        assert_eq!(encrypts[0].details, note(3));
    }

    #[test]
    fn test_outcome_logs_once() {
        let log = SecurityLog::new();
        let ok: VaultResult<usize> = Ok(4);
        let value = log
            .outcome(SecurityEvent::Hash, "hash", ok, |n| EventDetails::audit_count(*n))
            .unwrap();
        assert_eq!(value, 4);

        let err: VaultResult<usize> = Err(VaultError::InvalidInput("empty".into()));
        assert!(log
            .outcome(SecurityEvent::Hash, "hash", err, |n| EventDetails::audit_count(*n))
            .is_err());

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, LogStatus::Success);
        assert_eq!(entries[1].status, LogStatus::Error);
    }

    #[test]
    fn test_sink_survives_restart() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("security.log");

        let log = SecurityLog::new().with_sink(path.clone());
        log.success(SecurityEvent::KeyGenerate, note(0));
        log.failure(SecurityEvent::KeyAccess, &VaultError::NotInitialized, "get_key");

        let from_disk = read_log_file(&path).unwrap();
        assert_eq!(from_disk.len(), 2);
        assert_eq!(from_disk[1].status, LogStatus::Error);
    }

    #[test]
    fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(read_log_file(&temp.path().join("none.log")).unwrap().is_empty());
    }

    #[test]
    fn test_clear_and_export() {
        let log = SecurityLog::new();
        log.success(SecurityEvent::Hash, note(0));
        let json = log.export_json().unwrap();
        assert!(json.contains("\"hash\""));

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_sessions_differ() {
        assert_ne!(SecurityLog::new().session_id(), SecurityLog::new().session_id());
    }
}
