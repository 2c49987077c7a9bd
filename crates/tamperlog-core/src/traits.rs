//! The durable append-only store contract.
//!
//! Implementations are **trusted** to enforce two uniqueness constraints
//! atomically inside `insert`: at most one entry per `sequence` and at most
//! one entry per `dedup_key`. Everything else about the chain (linking,
//! hashing, retrying) is the append engine's job.

use tamperlog_contracts::{
    entry::{AuditEntry, ChainTail},
    error::StoreResult,
    event::DedupKey,
};

/// A newest-first slice of entries together with the entry count observed
/// in the same read.
#[derive(Debug, Clone, Default)]
pub struct EntrySlice {
    pub items: Vec<AuditEntry>,
    pub total: u64,
}

/// An append-only audit store.
///
/// No method updates or deletes an entry. Reads may run concurrently with
/// inserts and must only ever observe committed entries.
pub trait AuditStore: Send + Sync {
    /// Look up the entry committed for `key`, if any.
    fn find_by_dedup_key(&self, key: &DedupKey) -> StoreResult<Option<AuditEntry>>;

    /// The entry with the greatest sequence, or `None` for an empty chain.
    fn tail(&self) -> StoreResult<Option<ChainTail>>;

    /// Insert `entry` atomically.
    ///
    /// Must fail with `StoreError::UniqueViolation` when another entry already
    /// holds the same `sequence` or `dedup_key`, leaving the store unchanged.
    fn insert(&self, entry: &AuditEntry) -> StoreResult<()>;

    /// Entries with `from <= sequence <= to`, ascending, at most `limit` of them.
    fn range(&self, from: u64, to: u64, limit: usize) -> StoreResult<Vec<AuditEntry>>;

    /// Fetch a single entry by sequence.
    fn get(&self, sequence: u64) -> StoreResult<Option<AuditEntry>> {
        Ok(self.range(sequence, sequence, 1)?.into_iter().next())
    }

    /// Skip `offset` entries from the newest and return up to `limit`,
    /// descending by sequence, alongside the total entry count.
    fn latest(&self, offset: u64, limit: usize) -> StoreResult<EntrySlice>;

    fn count(&self) -> StoreResult<u64>;
}
