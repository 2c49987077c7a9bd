//! Error types for the tamperlog audit chain.
//!
//! `AuditError` is what callers of the engine, verifier, and query facade
//! see. `StoreError` is the narrower vocabulary storage backends speak; the
//! engine translates it according to the retry policy.

use std::fmt;

use thiserror::Error;

use crate::event::DedupKey;

/// The unified error type for tamperlog operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage was temporarily unavailable. The message must be redelivered,
    /// never acknowledged.
    #[error("transient storage failure: {reason}")]
    TransientStorage { reason: String },

    /// Retries were exhausted while contending for a sequence.
    ///
    /// Fatal for this message. Indicates pathological contention or a broken
    /// serialization strategy and must be alerted on.
    #[error("chain conflict: event '{dedup_key}' could not claim a sequence after {attempts} attempts")]
    ChainConflict { dedup_key: DedupKey, attempts: u32 },

    /// The caller cancelled before commit. Nothing was written.
    #[error("append cancelled before commit")]
    Cancelled,

    /// Non-transient storage failure, including undecodable rows.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("invalid range: from {from} is greater than to {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("invalid page request: {reason}")]
    InvalidPage { reason: String },

    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the tamperlog crates.
pub type AuditResult<T> = Result<T, AuditError>;

/// Which storage uniqueness constraint rejected an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraint {
    Sequence,
    DedupKey,
}

impl fmt::Display for UniqueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueConstraint::Sequence => f.write_str("sequence"),
            UniqueConstraint::DedupKey => f.write_str("dedup_key"),
        }
    }
}

/// Errors reported by `AuditStore` implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Busy, locked, or unreachable. Safe to retry.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// An insert collided with an existing entry.
    #[error("unique constraint violated on {constraint}")]
    UniqueViolation { constraint: UniqueConstraint },

    /// A stored row could not be decoded into an entry.
    ///
    /// `sequence` is set when the row's own sequence was readable.
    #[error("corrupt row: {reason}")]
    Corrupt { sequence: Option<u64>, reason: String },

    #[error("store backend failure: {reason}")]
    Backend { reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AuditError {
    /// Read paths (verify, query) have no retry loop: unavailability is
    /// reported as transient, everything else as a storage failure.
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable { reason } => AuditError::TransientStorage { reason },
            other => AuditError::Storage {
                reason: other.to_string(),
            },
        }
    }
}
