//! The chain append engine.
//!
//! `AppendEngine::submit` runs the read-tail-then-insert sequence for one
//! delivered event:
//!
//!   dedup lookup → read tail → link → hash → insert
//!
//! Two mechanisms keep the chain from forking:
//!
//! - An in-process tail lock is held from the dedup lookup through the
//!   insert, so appends that share an engine never race each other.
//! - The store's uniqueness constraints on `sequence` and `dedup_key` reject
//!   the loser of any race with another engine or process. The loser starts
//!   over from the dedup lookup, up to `max_append_attempts` times.
//!
//! Transient store failures back off exponentially and give up after
//! `max_transient_retries`. Nothing is ever partially written: the insert is
//! the only write and it is atomic.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tamperlog_contracts::{
    entry::{AuditEntry, ChainTail},
    error::{AuditError, AuditResult, StoreError, StoreResult, UniqueConstraint},
    event::AuditEvent,
    retry::RetryPolicy,
};
use tamperlog_core::traits::AuditStore;

use crate::chain::{seal, short};

/// What `submit` did with a delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new entry was committed at the end of the chain.
    Appended(AuditEntry),
    /// The `dedup_key` was already committed; this is the stored entry.
    DuplicateIgnored(AuditEntry),
}

impl AppendOutcome {
    pub fn entry(&self) -> &AuditEntry {
        match self {
            AppendOutcome::Appended(entry) | AppendOutcome::DuplicateIgnored(entry) => entry,
        }
    }

    pub fn into_entry(self) -> AuditEntry {
        match self {
            AppendOutcome::Appended(entry) | AppendOutcome::DuplicateIgnored(entry) => entry,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppendOutcome::DuplicateIgnored(_))
    }
}

/// Result of one pass through the append sequence.
enum Attempt {
    Done(AppendOutcome),
    Cancelled,
}

/// Appends delivered events to the single global chain.
///
/// Cheap to share: wrap in an `Arc` and hand one clone to each consumer
/// worker.
pub struct AppendEngine {
    store: Arc<dyn AuditStore>,
    policy: RetryPolicy,
    tail_lock: Mutex<()>,
}

impl AppendEngine {
    /// Create an engine over `store` with the default retry policy.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn AuditStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            tail_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Append `event`, returning the committed entry.
    ///
    /// A redelivered `dedup_key` returns the entry committed the first time.
    pub fn append(&self, event: &AuditEvent) -> AuditResult<AuditEntry> {
        self.submit(event, &CancellationToken::new())
            .map(AppendOutcome::into_entry)
    }

    /// Append `event` unless `cancel` fires before the insert.
    ///
    /// # Errors
    ///
    /// - `Cancelled` when `cancel` fired first; nothing was written.
    /// - `TransientStorage` when the store stayed unavailable through every
    ///   retry; the message should be redelivered.
    /// - `ChainConflict` when every attempt lost a race for its sequence.
    /// - `Storage` for any other store failure.
    pub fn submit(
        &self,
        event: &AuditEvent,
        cancel: &CancellationToken,
    ) -> AuditResult<AppendOutcome> {
        let max_attempts = self.policy.max_append_attempts.max(1);
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut key_collisions = 0u32;

        loop {
            if cancel.is_cancelled() {
                debug!(dedup_key = %event.dedup_key, "append cancelled before attempt");
                return Err(AuditError::Cancelled);
            }

            attempts += 1;
            let result = {
                let _tail = self
                    .tail_lock
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                self.attempt(event, cancel)
            };

            match result {
                Ok(Attempt::Done(outcome)) => return Ok(outcome),

                Ok(Attempt::Cancelled) => {
                    debug!(dedup_key = %event.dedup_key, "append cancelled before commit");
                    return Err(AuditError::Cancelled);
                }

                Err(StoreError::UniqueViolation { constraint }) => {
                    // A key collision means the event is committed; the next
                    // lookup returns it, so it does not spend the budget.
                    if constraint == UniqueConstraint::DedupKey {
                        key_collisions += 1;
                        if key_collisions <= max_attempts {
                            attempts -= 1;
                        }
                    }
                    if attempts >= max_attempts {
                        if let Some(existing) = self.committed(event)? {
                            debug!(
                                dedup_key = %event.dedup_key,
                                sequence = existing.sequence,
                                "lost the race to a redelivery of the same event"
                            );
                            return Ok(AppendOutcome::DuplicateIgnored(existing));
                        }
                        error!(
                            dedup_key = %event.dedup_key,
                            attempts,
                            constraint = %constraint,
                            "chain conflict: retries exhausted"
                        );
                        return Err(AuditError::ChainConflict {
                            dedup_key: event.dedup_key.clone(),
                            attempts,
                        });
                    }
                    warn!(
                        dedup_key = %event.dedup_key,
                        attempt = attempts,
                        constraint = %constraint,
                        "lost race for chain tail; retrying"
                    );
                    // A dedup collision resolves on the next lookup; only
                    // sequence contention benefits from backing off.
                    if constraint == UniqueConstraint::Sequence {
                        self.pause(attempts, cancel)?;
                    }
                }

                Err(StoreError::Unavailable { reason }) => {
                    // The attempt never reached a verdict, so it does not count
                    // against the conflict budget.
                    attempts -= 1;
                    transient_failures += 1;
                    if transient_failures > self.policy.max_transient_retries {
                        warn!(
                            dedup_key = %event.dedup_key,
                            retries = transient_failures - 1,
                            reason = %reason,
                            "store unavailable; giving up for redelivery"
                        );
                        return Err(AuditError::TransientStorage { reason });
                    }
                    warn!(
                        dedup_key = %event.dedup_key,
                        retry = transient_failures,
                        reason = %reason,
                        "store unavailable; backing off"
                    );
                    self.pause(transient_failures, cancel)?;
                }

                Err(other) => {
                    error!(dedup_key = %event.dedup_key, error = %other, "append failed");
                    return Err(AuditError::Storage {
                        reason: other.to_string(),
                    });
                }
            }
        }
    }

    /// The entry already committed under `event`'s key, if any.
    fn committed(&self, event: &AuditEvent) -> AuditResult<Option<AuditEntry>> {
        let _tail = self
            .tail_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(self.store.find_by_dedup_key(&event.dedup_key)?)
    }

    /// One pass of the append sequence. Caller holds the tail lock.
    fn attempt(&self, event: &AuditEvent, cancel: &CancellationToken) -> StoreResult<Attempt> {
        if let Some(existing) = self.store.find_by_dedup_key(&event.dedup_key)? {
            if existing.event != *event {
                warn!(
                    dedup_key = %event.dedup_key,
                    sequence = existing.sequence,
                    "redelivered event differs from the committed entry; keeping the committed entry"
                );
            } else {
                debug!(
                    dedup_key = %event.dedup_key,
                    sequence = existing.sequence,
                    "duplicate delivery ignored"
                );
            }
            return Ok(Attempt::Done(AppendOutcome::DuplicateIgnored(existing)));
        }

        let tail = self.store.tail()?;
        let (sequence, previous_hash) = ChainTail::next_link(tail.as_ref());
        let entry = seal(sequence, event.clone(), previous_hash);

        if cancel.is_cancelled() {
            return Ok(Attempt::Cancelled);
        }

        self.store.insert(&entry)?;

        info!(
            sequence = entry.sequence,
            dedup_key = %event.dedup_key,
            entity = %event.entity_name,
            action = %event.action,
            hash = %short(&entry.hash),
            "audit entry committed"
        );

        Ok(Attempt::Done(AppendOutcome::Appended(entry)))
    }

    /// Sleep for the backoff of retry number `retry`, then re-check `cancel`.
    fn pause(&self, retry: u32, cancel: &CancellationToken) -> AuditResult<()> {
        let delay = self.policy.backoff(retry);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use tamperlog_contracts::{
        entry::GENESIS_HASH,
        event::{AuditAction, DedupKey},
    };
    use tamperlog_core::traits::EntrySlice;

    use super::*;
    use crate::chain::recompute;
    use crate::memory::InMemoryAuditStore;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn event(key: &str) -> AuditEvent {
        AuditEvent::new(
            key,
            "Product",
            AuditAction::Modified,
            "42",
            Utc.with_ymd_and_hms(2025, 2, 2, 10, 0, 0).unwrap(),
        )
    }

    fn fast_policy(max_append_attempts: u32, max_transient_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_append_attempts,
            max_transient_retries,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        }
    }

    /// Forwards reads to an in-memory store; each test double overrides `insert`.
    macro_rules! delegate_reads {
        () => {
            fn find_by_dedup_key(&self, key: &DedupKey) -> StoreResult<Option<AuditEntry>> {
                self.inner.find_by_dedup_key(key)
            }
            fn tail(&self) -> StoreResult<Option<ChainTail>> {
                self.inner.tail()
            }
            fn range(&self, from: u64, to: u64, limit: usize) -> StoreResult<Vec<AuditEntry>> {
                self.inner.range(from, to, limit)
            }
            fn latest(&self, offset: u64, limit: usize) -> StoreResult<EntrySlice> {
                self.inner.latest(offset, limit)
            }
            fn count(&self) -> StoreResult<u64> {
                self.inner.count()
            }
        };
    }

    /// Reports `Unavailable` for the first `failures` inserts.
    struct FlakyStore {
        inner: InMemoryAuditStore,
        failures: AtomicU32,
    }

    impl AuditStore for FlakyStore {
        delegate_reads!();

        fn insert(&self, entry: &AuditEntry) -> StoreResult<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable {
                    reason: "database is locked".to_string(),
                });
            }
            self.inner.insert(entry)
        }
    }

    /// Lets a rival writer commit at the tail just before each of the first
    /// `steals` inserts, the way a second process would.
    struct ContendedStore {
        inner: InMemoryAuditStore,
        steals: AtomicU32,
        rival_key: Option<DedupKey>,
        rivals: AtomicU32,
    }

    impl ContendedStore {
        fn new(steals: u32) -> Self {
            Self {
                inner: InMemoryAuditStore::new(),
                steals: AtomicU32::new(steals),
                rival_key: None,
                rivals: AtomicU32::new(0),
            }
        }
    }

    impl AuditStore for ContendedStore {
        delegate_reads!();

        fn insert(&self, entry: &AuditEntry) -> StoreResult<()> {
            if self
                .steals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                let n = self.rivals.fetch_add(1, Ordering::SeqCst);
                let key = self
                    .rival_key
                    .clone()
                    .unwrap_or_else(|| DedupKey(format!("rival-{n}")));
                let mut rival_event = entry.event.clone();
                rival_event.dedup_key = key;
                let (sequence, previous) = ChainTail::next_link(self.inner.tail()?.as_ref());
                self.inner.insert(&seal(sequence, rival_event, previous))?;
            }
            self.inner.insert(entry)
        }
    }

    /// Cancels the token on the first insert and reports the store unavailable.
    struct CancellingStore {
        inner: InMemoryAuditStore,
        token: CancellationToken,
    }

    impl AuditStore for CancellingStore {
        delegate_reads!();

        fn insert(&self, _entry: &AuditEntry) -> StoreResult<()> {
            self.token.cancel();
            Err(StoreError::Unavailable {
                reason: "connection reset".to_string(),
            })
        }
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[test]
    fn first_append_links_to_genesis() {
        let engine = AppendEngine::new(Arc::new(InMemoryAuditStore::new()));
        let entry = engine.append(&event("a")).unwrap();

        assert_eq!(entry.sequence, 0);
        assert_eq!(entry.previous_hash, GENESIS_HASH);
        assert_eq!(entry.hash, recompute(&entry));
        assert_eq!(entry.hash.len(), 64);
    }

    #[test]
    fn redelivery_returns_the_committed_entry() {
        let engine = AppendEngine::new(Arc::new(InMemoryAuditStore::new()));
        let first = engine.submit(&event("a"), &CancellationToken::new()).unwrap();
        let again = engine.submit(&event("a"), &CancellationToken::new()).unwrap();

        assert!(!first.is_duplicate());
        assert!(again.is_duplicate());
        assert_eq!(first.entry(), again.entry());
        assert_eq!(engine.store().count().unwrap(), 1);
    }

    #[test]
    fn redelivery_with_different_payload_keeps_original() {
        let engine = AppendEngine::new(Arc::new(InMemoryAuditStore::new()));
        let original = engine.append(&event("a")).unwrap();

        let mut altered = event("a");
        altered.entity_id = "99".to_string();
        let outcome = engine.submit(&altered, &CancellationToken::new()).unwrap();

        assert!(outcome.is_duplicate());
        assert_eq!(outcome.entry(), &original);
        assert_eq!(engine.store().count().unwrap(), 1);
    }

    #[test]
    fn transient_failures_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryAuditStore::new(),
            failures: AtomicU32::new(3),
        });
        let engine = AppendEngine::with_policy(store.clone(), fast_policy(2, 5));

        let entry = engine.append(&event("a")).unwrap();
        assert_eq!(entry.sequence, 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn persistent_unavailability_surfaces_transient_error() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryAuditStore::new(),
            failures: AtomicU32::new(100),
        });
        let engine = AppendEngine::with_policy(store.clone(), fast_policy(8, 2));

        let err = engine.append(&event("a")).unwrap_err();
        assert!(matches!(err, AuditError::TransientStorage { .. }), "got {:?}", err);
        assert_eq!(store.count().unwrap(), 0);
        // Initial try plus two retries.
        assert_eq!(store.failures.load(Ordering::SeqCst), 97);
    }

    #[test]
    fn lost_races_retry_onto_the_new_tail() {
        let store = Arc::new(ContendedStore::new(3));
        let engine = AppendEngine::with_policy(store.clone(), fast_policy(8, 0));

        let entry = engine.append(&event("a")).unwrap();
        assert_eq!(entry.sequence, 3);

        let chain = store.inner.snapshot().unwrap();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0].previous_hash, GENESIS_HASH);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].hash);
            assert_eq!(pair[1].hash, recompute(&pair[1]));
        }
    }

    #[test]
    fn exhausted_retries_surface_chain_conflict() {
        let store = Arc::new(ContendedStore::new(u32::MAX));
        let engine = AppendEngine::with_policy(store.clone(), fast_policy(4, 0));

        match engine.append(&event("a")).unwrap_err() {
            AuditError::ChainConflict { dedup_key, attempts } => {
                assert_eq!(dedup_key, DedupKey::from("a"));
                assert_eq!(attempts, 4);
            }
            other => panic!("expected ChainConflict, got {:?}", other),
        }
        assert!(store.find_by_dedup_key(&"a".into()).unwrap().is_none());
    }

    #[test]
    fn racing_same_key_resolves_to_duplicate() {
        let mut store = ContendedStore::new(1);
        store.rival_key = Some(DedupKey::from("a"));
        let store = Arc::new(store);
        let engine = AppendEngine::with_policy(store.clone(), fast_policy(8, 0));

        let outcome = engine.submit(&event("a"), &CancellationToken::new()).unwrap();
        assert!(outcome.is_duplicate());
        assert_eq!(outcome.entry().sequence, 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn same_key_race_on_last_attempt_is_still_a_duplicate() {
        let mut store = ContendedStore::new(1);
        store.rival_key = Some(DedupKey::from("a"));
        let store = Arc::new(store);
        let engine = AppendEngine::with_policy(store.clone(), fast_policy(1, 0));

        let outcome = engine.submit(&event("a"), &CancellationToken::new()).unwrap();
        assert!(outcome.is_duplicate());
        assert_eq!(outcome.entry().sequence, 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    /// Rejects every insert on `dedup_key` and commits the event as it does,
    /// so each attempt collides with an already-stored key.
    struct KeyTakenStore {
        inner: InMemoryAuditStore,
    }

    impl AuditStore for KeyTakenStore {
        delegate_reads!();

        fn insert(&self, entry: &AuditEntry) -> StoreResult<()> {
            self.inner.insert(entry)?;
            Err(StoreError::UniqueViolation {
                constraint: UniqueConstraint::DedupKey,
            })
        }
    }

    #[test]
    fn key_collision_does_not_spend_attempt_budget() {
        let store = Arc::new(KeyTakenStore {
            inner: InMemoryAuditStore::new(),
        });
        let engine = AppendEngine::with_policy(store.clone(), fast_policy(1, 0));

        let outcome = engine.submit(&event("a"), &CancellationToken::new()).unwrap();
        assert!(outcome.is_duplicate());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn cancelled_token_writes_nothing() {
        let engine = AppendEngine::new(Arc::new(InMemoryAuditStore::new()));
        let token = CancellationToken::new();
        token.cancel();

        let err = engine.submit(&event("a"), &token).unwrap_err();
        assert!(matches!(err, AuditError::Cancelled));
        assert_eq!(engine.store().count().unwrap(), 0);
    }

    #[test]
    fn cancellation_during_backoff_aborts() {
        let token = CancellationToken::new();
        let store = Arc::new(CancellingStore {
            inner: InMemoryAuditStore::new(),
            token: token.clone(),
        });
        let engine = AppendEngine::with_policy(store.clone(), fast_policy(8, 10));

        let err = engine.submit(&event("a"), &token).unwrap_err();
        assert!(matches!(err, AuditError::Cancelled));
        assert_eq!(store.count().unwrap(), 0);
    }
}
