//! Read-only access to the chain for API layers and operators.
//!
//! The facade performs no integrity checks; that is the verifier's job. It
//! takes no locks of its own and never blocks an in-flight append.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use tamperlog_contracts::{
    entry::{AuditEntry, ChainSnapshot},
    error::{AuditError, AuditResult},
    event::DedupKey,
    page::Page,
};
use tamperlog_core::traits::AuditStore;

/// Largest page a caller may request unless configured otherwise.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

/// Entries fetched per range read while exporting.
const EXPORT_BATCH: usize = 512;

/// Paginated, newest-first views over the audit chain.
pub struct AuditQuery {
    store: Arc<dyn AuditStore>,
    max_page_size: u64,
}

impl AuditQuery {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: u64) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Return page `page_number` (1-based) of `page_size` entries, ordered by
    /// sequence descending.
    ///
    /// A page past the end is empty but still reports `total_count`.
    pub fn list_page(&self, page_number: u64, page_size: u64) -> AuditResult<Page<AuditEntry>> {
        if page_number == 0 {
            return Err(AuditError::InvalidPage {
                reason: "page number starts at 1".to_string(),
            });
        }
        if page_size == 0 || page_size > self.max_page_size {
            return Err(AuditError::InvalidPage {
                reason: format!(
                    "page size {} is outside 1..={}",
                    page_size, self.max_page_size
                ),
            });
        }

        let offset = (page_number - 1)
            .checked_mul(page_size)
            .ok_or_else(|| AuditError::InvalidPage {
                reason: format!("page {} of size {} is out of range", page_number, page_size),
            })?;
        let limit = usize::try_from(page_size).unwrap_or(usize::MAX);

        let slice = self.store.latest(offset, limit)?;
        debug!(
            page_number,
            page_size,
            returned = slice.items.len(),
            total = slice.total,
            "audit page read"
        );

        Ok(Page {
            items: slice.items,
            total_count: slice.total,
            page_number,
            page_size,
        })
    }

    pub fn get(&self, sequence: u64) -> AuditResult<Option<AuditEntry>> {
        Ok(self.store.get(sequence)?)
    }

    pub fn find_by_dedup_key(&self, key: &DedupKey) -> AuditResult<Option<AuditEntry>> {
        Ok(self.store.find_by_dedup_key(key)?)
    }

    /// Export `from..=to` as a self-contained snapshot.
    ///
    /// Entries past the current tail are simply absent.
    pub fn export(&self, from: u64, to: u64) -> AuditResult<ChainSnapshot> {
        if from > to {
            return Err(AuditError::InvalidRange { from, to });
        }

        let mut entries = Vec::new();
        let mut next = from;
        loop {
            let batch = self.store.range(next, to, EXPORT_BATCH)?;
            let Some(last) = batch.last().map(|e| e.sequence) else {
                break;
            };
            let full = batch.len() == EXPORT_BATCH;
            entries.extend(batch);
            if !full || last >= to {
                break;
            }
            next = last + 1;
        }

        let terminal_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_default();

        debug!(from, to, exported = entries.len(), "audit range exported");

        Ok(ChainSnapshot {
            entries,
            exported_at: Utc::now(),
            terminal_hash,
        })
    }

    /// Export the whole chain as it stands.
    pub fn export_all(&self) -> AuditResult<ChainSnapshot> {
        self.export(0, u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use tamperlog_contracts::event::{AuditAction, AuditEvent};

    use super::*;
    use crate::engine::AppendEngine;
    use crate::memory::InMemoryAuditStore;

    fn filled(n: u64) -> (AppendEngine, AuditQuery) {
        let store: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::new());
        let engine = AppendEngine::new(Arc::clone(&store));
        for i in 0..n {
            let event = AuditEvent::new(
                format!("evt-{i}"),
                "Product",
                AuditAction::Created,
                i.to_string(),
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            );
            engine.append(&event).unwrap();
        }
        (engine, AuditQuery::new(store))
    }

    fn sequences(page: &Page<AuditEntry>) -> Vec<u64> {
        page.items.iter().map(|e| e.sequence).collect()
    }

    #[test]
    fn pages_are_newest_first() {
        let (_engine, query) = filled(25);

        let first = query.list_page(1, 10).unwrap();
        assert_eq!(sequences(&first), (15..25).rev().collect::<Vec<_>>());
        assert_eq!(first.total_count, 25);
        assert_eq!(first.total_pages(), 3);
        assert!(first.has_next_page());

        let last = query.list_page(3, 10).unwrap();
        assert_eq!(sequences(&last), (0..5).rev().collect::<Vec<_>>());
        assert!(!last.has_next_page());
        assert!(last.has_previous_page());
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let (_engine, query) = filled(3);
        let page = query.list_page(5, 10).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 3);
    }

    #[test]
    fn empty_chain_lists_nothing() {
        let query = AuditQuery::new(Arc::new(InMemoryAuditStore::new()));
        let page = query.list_page(1, 10).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn invalid_page_requests_are_rejected() {
        let (_engine, query) = filled(1);
        let query = query.with_max_page_size(50);
        assert!(matches!(query.list_page(0, 10), Err(AuditError::InvalidPage { .. })));
        assert!(matches!(query.list_page(1, 0), Err(AuditError::InvalidPage { .. })));
        assert!(matches!(query.list_page(1, 51), Err(AuditError::InvalidPage { .. })));
        assert!(matches!(
            query.list_page(u64::MAX, 50),
            Err(AuditError::InvalidPage { .. })
        ));
    }

    #[test]
    fn lookups_by_sequence_and_key() {
        let (_engine, query) = filled(3);
        let entry = query.get(1).unwrap().unwrap();
        assert_eq!(entry.event.dedup_key, DedupKey::from("evt-1"));
        assert_eq!(query.find_by_dedup_key(&"evt-2".into()).unwrap().unwrap().sequence, 2);
        assert!(query.get(9).unwrap().is_none());
    }

    #[test]
    fn export_spans_multiple_batches() {
        let (_engine, query) = filled(EXPORT_BATCH as u64 + 7);
        let snapshot = query.export_all().unwrap();

        assert_eq!(snapshot.entries.len(), EXPORT_BATCH + 7);
        assert_eq!(snapshot.entries[0].sequence, 0);
        assert_eq!(snapshot.terminal_hash, snapshot.entries.last().unwrap().hash);

        let partial = query.export(10, 12).unwrap();
        let seqs: Vec<u64> = partial.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![10, 11, 12]);
    }

    #[test]
    fn export_rejects_inverted_range() {
        let (_engine, query) = filled(1);
        assert!(matches!(query.export(3, 1), Err(AuditError::InvalidRange { from: 3, to: 1 })));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let (_engine, query) = filled(2);
        let snapshot = query.export_all().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: ChainSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.entries, snapshot.entries);
        assert_eq!(restored.terminal_hash, snapshot.terminal_hash);
    }
}
