//! Structured logging (C13): `tracing` subscriber setup, plus an optional
//! append-only JSON audit log for beacon accept/reject events.
//!
//! The audit log's integrity field reuses the crate's existing BLAKE3
//! hasher rather than pulling in a second MAC primitive for one log file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::error::{BeaconError, Result};
use crate::hash::Hasher;

/// Installs a `tracing-subscriber` formatter reading its filter from
/// `MESHBEACON_LOG` (falling back to `info`), matching the env-var-driven
/// verbosity convention used across the `nonosctl` CLI surface.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("MESHBEACON_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// One outcome of processing a beacon pair, for the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Accepted,
    RejectedChecksum,
    RejectedStructural,
    RejectedTiming,
}

impl AuditOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Accepted => "accepted",
            AuditOutcome::RejectedChecksum => "rejected_checksum",
            AuditOutcome::RejectedStructural => "rejected_structural",
            AuditOutcome::RejectedTiming => "rejected_timing",
        }
    }
}

#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    timestamp: DateTime<Utc>,
    source: &'a str,
    outcome: &'static str,
    challenge: Option<u64>,
    /// BLAKE3 digest of the preceding fields, truncated to 16 bytes, chained
    /// from the previous record's integrity field. Tamper-evidence, not
    /// tamper-proofing: a rewritten log can still be truncated from the
    /// tail, just not edited in the middle without breaking the chain.
    integrity: String,
    prev_integrity: String,
}

/// An append-only, hash-chained JSON Lines audit log of beacon accept/reject
/// decisions. One line per record.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<std::fs::File>,
    last_integrity: Mutex<String>,
}

const GENESIS_INTEGRITY: &str = "0000000000000000000000000000000000";

impl AuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| BeaconError::KeystoreIo {
                path: path.display().to_string(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| BeaconError::KeystoreIo {
                path: path.display().to_string(),
                source,
            })?;

        let last_integrity = last_line_integrity(&path).unwrap_or_else(|| GENESIS_INTEGRITY.to_string());

        Ok(AuditLog {
            path,
            file: Mutex::new(file),
            last_integrity: Mutex::new(last_integrity),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, chaining its integrity field onto the previous
    /// record's.
    pub fn record(
        &self,
        hasher: &dyn Hasher,
        source: &str,
        outcome: AuditOutcome,
        challenge: Option<u64>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let mut prev = self.last_integrity.lock().unwrap();

        let body = format!(
            "{}|{}|{}|{:?}|{}",
            timestamp.to_rfc3339(),
            source,
            outcome.as_str(),
            challenge,
            prev
        );
        let digest = hasher.digest(&[body.as_bytes()], 16);
        let integrity = hex::encode(digest);

        let record = AuditRecord {
            timestamp,
            source,
            outcome: outcome.as_str(),
            challenge,
            integrity: integrity.clone(),
            prev_integrity: prev.clone(),
        };

        let line = serde_json::to_string(&record).expect("AuditRecord serialization is infallible");
        let mut file = self.file.lock().unwrap();
        writeln!(file, "{line}").map_err(|source| BeaconError::KeystoreIo {
            path: self.path.display().to_string(),
            source,
        })?;
        file.flush().map_err(|source| BeaconError::KeystoreIo {
            path: self.path.display().to_string(),
            source,
        })?;

        *prev = integrity;
        Ok(())
    }
}

fn last_line_integrity(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let last = content.lines().last()?;
    let record: serde_json::Value = serde_json::from_str(last).ok()?;
    record
        .get("integrity")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
