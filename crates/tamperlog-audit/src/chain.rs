//! Hash-chain primitives.
//!
//! `hash = SHA-256(canonical encoding || previous_hash)`, lowercase hex.
//! `previous_hash` is fed in as its 64 ASCII hex characters.

use sha2::{Digest, Sha256};

use tamperlog_contracts::{entry::AuditEntry, event::AuditEvent};

use crate::canonical;

/// Compute the chain hash for `event` committed at `sequence` after an entry
/// whose hash is `previous_hash`.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_entry(sequence: u64, event: &AuditEvent, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical::encode(sequence, event));
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute the hash of a stored entry from its own fields.
pub fn recompute(entry: &AuditEntry) -> String {
    hash_entry(entry.sequence, &entry.event, &entry.previous_hash)
}

/// Build the entry for `event` at the given link position.
pub fn seal(sequence: u64, event: AuditEvent, previous_hash: String) -> AuditEntry {
    let hash = hash_entry(sequence, &event, &previous_hash);
    AuditEntry {
        sequence,
        event,
        previous_hash,
        hash,
    }
}

/// First eight hex characters, for log lines.
pub(crate) fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
