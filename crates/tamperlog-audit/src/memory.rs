//! In-memory implementation of `AuditStore`.
//!
//! `InMemoryAuditStore` keeps the chain in a `BTreeMap` keyed by sequence,
//! with a side index on `dedup_key`, all behind one `RwLock`. Both
//! uniqueness constraints are checked and the entry inserted while the write
//! lock is held, so an insert is atomic with respect to every other call.
//!
//! Readers take the read lock only for the duration of a copy, so the
//! verifier and query facade never hold up an append for long.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use tamperlog_contracts::{
    entry::{AuditEntry, ChainTail},
    error::{StoreError, StoreResult, UniqueConstraint},
    event::DedupKey,
};
use tamperlog_core::traits::{AuditStore, EntrySlice};

// ── Internal state ────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MemoryLog {
    /// Committed entries keyed by sequence.
    pub(crate) entries: BTreeMap<u64, AuditEntry>,

    /// `dedup_key` → sequence of the entry that claimed it.
    pub(crate) by_dedup_key: HashMap<DedupKey, u64>,
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An append-only audit store held entirely in process memory.
#[derive(Default)]
pub struct InMemoryAuditStore {
    pub(crate) log: RwLock<MemoryLog>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load entries verbatim, without checking links or hashes.
    ///
    /// Used to restore an exported `ChainSnapshot` for offline verification.
    /// A later entry with a sequence or key already loaded replaces it.
    pub fn from_entries(entries: impl IntoIterator<Item = AuditEntry>) -> Self {
        let mut log = MemoryLog::default();
        for entry in entries {
            let sequence = entry.sequence;
            let key = entry.event.dedup_key.clone();
            if let Some(replaced) = log.entries.insert(sequence, entry) {
                if log.by_dedup_key.get(&replaced.event.dedup_key) == Some(&sequence) {
                    log.by_dedup_key.remove(&replaced.event.dedup_key);
                }
            }
            log.by_dedup_key.insert(key, sequence);
        }
        Self {
            log: RwLock::new(log),
        }
    }

    /// Copy of every entry in ascending sequence order.
    pub fn snapshot(&self) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.read()?.entries.values().cloned().collect())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryLog>> {
        self.log.read().map_err(|e| StoreError::Backend {
            reason: format!("audit log lock poisoned: {}", e),
        })
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryLog>> {
        self.log.write().map_err(|e| StoreError::Backend {
            reason: format!("audit log lock poisoned: {}", e),
        })
    }
}

// ── AuditStore impl ───────────────────────────────────────────────────────────

impl AuditStore for InMemoryAuditStore {
    fn find_by_dedup_key(&self, key: &DedupKey) -> StoreResult<Option<AuditEntry>> {
        let log = self.read()?;
        Ok(log
            .by_dedup_key
            .get(key)
            .and_then(|sequence| log.entries.get(sequence))
            .cloned())
    }

    fn tail(&self) -> StoreResult<Option<ChainTail>> {
        Ok(self
            .read()?
            .entries
            .values()
            .next_back()
            .map(ChainTail::from))
    }

    fn insert(&self, entry: &AuditEntry) -> StoreResult<()> {
        let mut log = self.write()?;

        if log.entries.contains_key(&entry.sequence) {
            return Err(StoreError::UniqueViolation {
                constraint: UniqueConstraint::Sequence,
            });
        }
        if log.by_dedup_key.contains_key(&entry.event.dedup_key) {
            return Err(StoreError::UniqueViolation {
                constraint: UniqueConstraint::DedupKey,
            });
        }

        log.by_dedup_key
            .insert(entry.event.dedup_key.clone(), entry.sequence);
        log.entries.insert(entry.sequence, entry.clone());

        debug!(sequence = entry.sequence, total = log.entries.len(), "memory store insert");
        Ok(())
    }

    fn range(&self, from: u64, to: u64, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .read()?
            .entries
            .range(from..=to)
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn latest(&self, offset: u64, limit: usize) -> StoreResult<EntrySlice> {
        let log = self.read()?;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let items = log
            .entries
            .values()
            .rev()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect();
        Ok(EntrySlice {
            items,
            total: log.entries.len() as u64,
        })
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.read()?.entries.len() as u64)
    }
}
