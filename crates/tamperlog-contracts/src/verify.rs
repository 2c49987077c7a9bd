//! Chain verification findings.
//!
//! A tampered chain is a normal result, not an error: the verifier returns a
//! `VerificationReport` whose outcome names the first offending sequence.
//! Only storage I/O failures surface as `AuditError`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The first integrity violation found in a verified range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainViolation {
    /// The entry's sequence does not follow its predecessor (or the range start).
    SequenceGap { at: u64 },
    /// The entry's `previous_hash` does not equal its predecessor's `hash`.
    BrokenLink { at: u64 },
    /// The stored `hash` does not match the hash recomputed from the entry.
    HashMismatch { at: u64 },
}

impl ChainViolation {
    /// The sequence number the violation was detected at.
    pub fn at(&self) -> u64 {
        match *self {
            ChainViolation::SequenceGap { at }
            | ChainViolation::BrokenLink { at }
            | ChainViolation::HashMismatch { at } => at,
        }
    }
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainViolation::SequenceGap { at } => write!(f, "sequence gap at {}", at),
            ChainViolation::BrokenLink { at } => write!(f, "broken link at {}", at),
            ChainViolation::HashMismatch { at } => write!(f, "hash mismatch at {}", at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationOutcome {
    /// Every entry in the range passed all three checks.
    Intact,
    /// Verification stopped at the first violation.
    Violated(ChainViolation),
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::Intact => f.write_str("INTACT"),
            VerificationOutcome::Violated(v) => write!(f, "VIOLATED ({})", v),
        }
    }
}

/// The result of verifying `from..=to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub from: u64,
    pub to: u64,
    /// Entries that passed every check before verification finished or stopped.
    pub entries_checked: u64,
    /// Sequence of the last entry that passed, if any.
    pub last_verified: Option<u64>,
    pub outcome: VerificationOutcome,
}

impl VerificationReport {
    pub fn is_intact(&self) -> bool {
        self.outcome == VerificationOutcome::Intact
    }

    pub fn violation(&self) -> Option<ChainViolation> {
        match self.outcome {
            VerificationOutcome::Intact => None,
            VerificationOutcome::Violated(v) => Some(v),
        }
    }
}
