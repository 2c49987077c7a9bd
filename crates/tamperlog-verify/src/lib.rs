//! # tamperlog-verify
//!
//! Integrity verification for the tamperlog audit chain.
//!
//! This crate provides [`engine::ChainVerifier`], which walks a committed
//! range in ascending sequence order and checks, for every entry:
//!
//! 1. **Sequence**: it directly follows its predecessor (or the range start).
//! 2. **Link**: its `previous_hash` equals the predecessor's `hash`.
//! 3. **Hash**: its stored `hash` matches the hash recomputed from its fields.
//!
//! Verification stops at the first violation. A tampered chain is reported
//! as a [`VerificationReport`](tamperlog_contracts::verify::VerificationReport)
//! value, never as an error.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use tamperlog_verify::engine::ChainVerifier;
//!
//! let report = ChainVerifier::new(store).verify(0, 99)?;
//! if let Some(violation) = report.violation() {
//!     eprintln!("chain compromised: {violation}");
//! }
//! ```

pub mod engine;

pub use engine::{verify_snapshot, ChainCursor, ChainVerifier};
