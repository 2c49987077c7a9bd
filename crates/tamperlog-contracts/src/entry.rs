//! Persisted chain entries.
//!
//! An `AuditEntry` wraps the delivered `AuditEvent` with its commit-order
//! `sequence` and the two hashes that make tampering detectable. Entries are
//! immutable once committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::AuditEvent;

/// `previous_hash` of the entry at sequence 0: 64 hex zeros.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// A committed link in the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Contiguous commit position, starting at 0.
    pub sequence: u64,

    /// Every field of the delivered event, stored verbatim.
    pub event: AuditEvent,

    /// `hash` of the entry at `sequence - 1`, or `GENESIS_HASH` at 0.
    pub previous_hash: String,

    /// Lowercase hex SHA-256 over the canonical encoding followed by
    /// `previous_hash`.
    pub hash: String,
}

impl AuditEntry {
    pub fn is_genesis(&self) -> bool {
        self.sequence == 0
    }
}

/// The current end of the chain, as seen by the append engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTail {
    pub sequence: u64,
    pub hash: String,
}

impl ChainTail {
    /// Sequence and previous hash for the entry that would follow `tail`.
    pub fn next_link(tail: Option<&ChainTail>) -> (u64, String) {
        match tail {
            Some(t) => (t.sequence + 1, t.hash.clone()),
            None => (0, GENESIS_HASH.to_string()),
        }
    }
}

impl From<&AuditEntry> for ChainTail {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            sequence: entry.sequence,
            hash: entry.hash.clone(),
        }
    }
}

/// An exported, self-contained slice of the chain.
///
/// Produced by the query facade for offline verification or archival hand-off.
/// `terminal_hash` is the `hash` of the last entry and commits to the whole
/// slice; it is empty when the slice is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Entries in ascending sequence order.
    pub entries: Vec<AuditEntry>,

    /// Wall-clock time (UTC) the snapshot was taken.
    pub exported_at: DateTime<Utc>,

    pub terminal_hash: String,
}
