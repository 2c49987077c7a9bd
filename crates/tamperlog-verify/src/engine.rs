//! Streaming chain verifier.
//!
//! `ChainVerifier` reads the range in `batch_size` chunks through ordered
//! range reads. Committed entries are immutable, so it takes no locks and
//! runs safely alongside any number of in-flight appends; it only ever sees
//! a committed prefix of the chain.
//!
//! The first entry of a range is anchored on its own `previous_hash`, or on
//! `GENESIS_HASH` when the range starts at 0. Entries past the current tail
//! are not a violation: they may simply not be committed yet.
//!
//! A stored row that can no longer be decoded was altered outside the store,
//! so it is reported as a `HashMismatch` at its sequence.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tamperlog_audit::chain::recompute;
use tamperlog_contracts::{
    entry::{AuditEntry, ChainSnapshot, GENESIS_HASH},
    error::{AuditError, AuditResult, StoreError},
    verify::{ChainViolation, VerificationOutcome, VerificationReport},
};
use tamperlog_core::traits::AuditStore;

/// Entries fetched per range read unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 256;

// ── Cursor ────────────────────────────────────────────────────────────────────

/// Per-entry integrity checks, carried from one entry to the next.
#[derive(Debug, Clone)]
pub struct ChainCursor {
    next_sequence: u64,
    /// `None` until the first entry of a range that does not start at 0.
    expected_previous: Option<String>,
}

impl ChainCursor {
    pub fn starting_at(from: u64) -> Self {
        Self {
            next_sequence: from,
            expected_previous: (from == 0).then(|| GENESIS_HASH.to_string()),
        }
    }

    /// Check `entry` against its predecessor and advance.
    ///
    /// On `Err` the cursor is left where it was.
    pub fn check(&mut self, entry: &AuditEntry) -> Result<(), ChainViolation> {
        let at = entry.sequence;

        if at != self.next_sequence {
            return Err(ChainViolation::SequenceGap { at });
        }

        let expected = self
            .expected_previous
            .as_deref()
            .unwrap_or(&entry.previous_hash);
        if entry.previous_hash != expected {
            return Err(ChainViolation::BrokenLink { at });
        }

        if recompute(entry) != entry.hash {
            return Err(ChainViolation::HashMismatch { at });
        }

        self.next_sequence = at.saturating_add(1);
        self.expected_previous = Some(entry.hash.clone());
        Ok(())
    }
}

// ── Walk state ────────────────────────────────────────────────────────────────

/// Accumulates a report while entries are fed in ascending order.
struct Walk {
    cursor: ChainCursor,
    from: u64,
    to: u64,
    checked: u64,
    last_verified: Option<u64>,
}

impl Walk {
    fn new(from: u64, to: u64) -> Self {
        Self {
            cursor: ChainCursor::starting_at(from),
            from,
            to,
            checked: 0,
            last_verified: None,
        }
    }

    fn feed(&mut self, entry: &AuditEntry) -> Result<(), ChainViolation> {
        self.cursor.check(entry)?;
        self.checked += 1;
        self.last_verified = Some(entry.sequence);
        Ok(())
    }

    fn finish(self, outcome: VerificationOutcome) -> VerificationReport {
        match outcome {
            VerificationOutcome::Intact => info!(
                from = self.from,
                to = self.to,
                checked = self.checked,
                "audit chain verified intact"
            ),
            VerificationOutcome::Violated(violation) => warn!(
                from = self.from,
                to = self.to,
                checked = self.checked,
                violation = %violation,
                "audit chain integrity violation"
            ),
        }
        VerificationReport {
            from: self.from,
            to: self.to,
            entries_checked: self.checked,
            last_verified: self.last_verified,
            outcome,
        }
    }
}

// ── Verifier ──────────────────────────────────────────────────────────────────

/// Certifies hash, link, and sequence integrity over committed ranges.
pub struct ChainVerifier {
    store: Arc<dyn AuditStore>,
    batch_size: usize,
}

impl ChainVerifier {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Read at most `batch_size` entries per range read. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Verify `from..=to`.
    ///
    /// # Errors
    ///
    /// `InvalidRange` when `from > to`; `TransientStorage` or `Storage` when
    /// the store cannot be read. Integrity violations are returned in the
    /// report, not as errors.
    pub fn verify(&self, from: u64, to: u64) -> AuditResult<VerificationReport> {
        if from > to {
            return Err(AuditError::InvalidRange { from, to });
        }

        let mut walk = Walk::new(from, to);
        let mut next = from;

        loop {
            let batch = match self.store.range(next, to, self.batch_size) {
                Ok(batch) => batch,
                Err(StoreError::Corrupt {
                    sequence: Some(at),
                    reason,
                }) if at >= next => {
                    warn!(sequence = at, reason = %reason, "stored entry cannot be decoded");
                    return self.stop_at_corrupt_row(walk, next, at);
                }
                Err(e) => return Err(e.into()),
            };
            let Some(last) = batch.last().map(|e| e.sequence) else {
                break;
            };
            debug!(next, fetched = batch.len(), "verifying batch");

            for entry in &batch {
                if let Err(violation) = walk.feed(entry) {
                    return Ok(walk.finish(VerificationOutcome::Violated(violation)));
                }
            }

            if batch.len() < self.batch_size || last >= to {
                break;
            }
            next = last + 1;
        }

        Ok(walk.finish(VerificationOutcome::Intact))
    }

    /// Check the decodable entries in `next..at`, then report the row at `at`.
    fn stop_at_corrupt_row(
        &self,
        mut walk: Walk,
        next: u64,
        at: u64,
    ) -> AuditResult<VerificationReport> {
        if at > next {
            for entry in &self.store.range(next, at - 1, self.batch_size)? {
                if let Err(violation) = walk.feed(entry) {
                    return Ok(walk.finish(VerificationOutcome::Violated(violation)));
                }
            }
        }
        let violation = if walk.cursor.next_sequence == at {
            ChainViolation::HashMismatch { at }
        } else {
            ChainViolation::SequenceGap { at }
        };
        Ok(walk.finish(VerificationOutcome::Violated(violation)))
    }

    /// Verify from sequence 0 through the current tail.
    pub fn verify_all(&self) -> AuditResult<VerificationReport> {
        let to = self.store.tail()?.map_or(0, |tail| tail.sequence);
        self.verify(0, to)
    }
}

/// Verify an exported snapshot offline, in the order its entries appear.
///
/// The range runs from the first entry's sequence to the last's; an empty
/// snapshot is intact.
pub fn verify_snapshot(snapshot: &ChainSnapshot) -> VerificationReport {
    let from = snapshot.entries.first().map_or(0, |e| e.sequence);
    let to = snapshot.entries.last().map_or(from, |e| e.sequence);

    let mut walk = Walk::new(from, to);
    for entry in &snapshot.entries {
        if let Err(violation) = walk.feed(entry) {
            return walk.finish(VerificationOutcome::Violated(violation));
        }
    }
    walk.finish(VerificationOutcome::Intact)
}
