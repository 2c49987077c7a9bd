//! # tamperlog-contracts
//!
//! Shared types, error taxonomy, and contracts for the tamperlog audit chain.
//!
//! All crates in the workspace import from here. No chain logic lives in
//! this crate, only data definitions and error types.

pub mod entry;
pub mod error;
pub mod event;
pub mod page;
pub mod retry;
pub mod verify;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use entry::{AuditEntry, ChainTail, GENESIS_HASH};
    use error::{AuditError, StoreError, UniqueConstraint};
    use event::{AuditAction, AuditEvent, DedupKey};
    use page::Page;
    use retry::RetryPolicy;
    use verify::{ChainViolation, VerificationOutcome, VerificationReport};

    fn sample_event() -> AuditEvent {
        AuditEvent::new(
            "evt-1",
            "Product",
            AuditAction::Created,
            "42",
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    // ── Event ────────────────────────────────────────────────────────────────

    #[test]
    fn dedup_key_new_produces_unique_values() {
        let keys: std::collections::HashSet<DedupKey> = (0..100).map(|_| DedupKey::new()).collect();
        assert_eq!(keys.len(), 100);
    }

    #[test]
    fn audit_action_parses_its_own_display() {
        for action in [AuditAction::Created, AuditAction::Modified, AuditAction::Deleted] {
            let parsed: AuditAction = action.to_string().parse().unwrap();
            assert_eq!(parsed, action);
        }
        assert_eq!("deleted".parse::<AuditAction>(), Ok(AuditAction::Deleted));
        assert!("Added".parse::<AuditAction>().is_err());
    }

    #[test]
    fn audit_action_canonical_decoding_is_exact() {
        assert_eq!(AuditAction::from_canonical("Deleted"), Some(AuditAction::Deleted));
        assert_eq!(AuditAction::from_canonical("deleted"), None);
        assert_eq!(AuditAction::from_canonical("Archived"), None);
    }

    #[test]
    fn event_builders_fill_optional_fields() {
        let event = sample_event()
            .with_values(None, Some(r#"{"price":100}"#.to_string()))
            .with_user("u-1", "admin@test.com")
            .with_request_context(Some("corr-9".to_string()), None, Some("curl/8".to_string()));

        assert_eq!(event.old_values, None);
        assert_eq!(event.new_values.as_deref(), Some(r#"{"price":100}"#));
        assert_eq!(event.user_email.as_deref(), Some("admin@test.com"));
        assert_eq!(event.correlation_id.as_deref(), Some("corr-9"));
        assert_eq!(event.remote_ip, None);
    }

    #[test]
    fn event_serde_keeps_none_and_empty_distinct() {
        let mut with_empty = sample_event();
        with_empty.user_id = Some(String::new());
        let json = serde_json::to_string(&with_empty).unwrap();
        let decoded: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.user_id, Some(String::new()));
        assert_ne!(decoded, sample_event());
    }

    // ── Chain tail ───────────────────────────────────────────────────────────

    #[test]
    fn next_link_of_empty_chain_is_genesis() {
        let (sequence, previous) = ChainTail::next_link(None);
        assert_eq!(sequence, 0);
        assert_eq!(previous, GENESIS_HASH);
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn next_link_follows_tail() {
        let entry = AuditEntry {
            sequence: 6,
            event: sample_event(),
            previous_hash: "aa".repeat(32),
            hash: "bb".repeat(32),
        };
        let tail = ChainTail::from(&entry);
        let (sequence, previous) = ChainTail::next_link(Some(&tail));
        assert_eq!(sequence, 7);
        assert_eq!(previous, "bb".repeat(32));
        assert!(!entry.is_genesis());
    }

    // ── Page ─────────────────────────────────────────────────────────────────

    #[test]
    fn page_navigation_flags() {
        let page: Page<u64> = Page {
            items: vec![24, 23, 22, 21, 20],
            total_count: 25,
            page_number: 1,
            page_size: 10,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(!page.has_previous_page());
        assert!(page.has_next_page());

        let last = Page { page_number: 3, ..page };
        assert!(last.has_previous_page());
        assert!(!last.has_next_page());
    }

    #[test]
    fn empty_page_has_no_pages() {
        let page: Page<u64> = Page {
            items: vec![],
            total_count: 0,
            page_number: 1,
            page_size: 10,
        };
        assert_eq!(page.total_pages(), 0);
        assert!(!page.has_next_page());
    }

    // ── Retry policy ─────────────────────────────────────────────────────────

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_append_attempts: 8,
            max_transient_retries: 5,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(4), Duration::from_millis(50));
        assert_eq!(policy.backoff(200), Duration::from_millis(50));
    }

    // ── Verification report ──────────────────────────────────────────────────

    #[test]
    fn report_exposes_first_violation() {
        let report = VerificationReport {
            from: 0,
            to: 9,
            entries_checked: 3,
            last_verified: Some(2),
            outcome: VerificationOutcome::Violated(ChainViolation::HashMismatch { at: 3 }),
        };
        assert!(!report.is_intact());
        assert_eq!(report.violation().map(|v| v.at()), Some(3));
        assert_eq!(report.violation().unwrap().to_string(), "hash mismatch at 3");
        assert_eq!(report.outcome.to_string(), "VIOLATED (hash mismatch at 3)");
        assert_eq!(VerificationOutcome::Intact.to_string(), "INTACT");
    }

    // ── Errors ───────────────────────────────────────────────────────────────

    #[test]
    fn error_chain_conflict_display() {
        let err = AuditError::ChainConflict {
            dedup_key: DedupKey::from("evt-9"),
            attempts: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("chain conflict"));
        assert!(msg.contains("evt-9"));
        assert!(msg.contains("8 attempts"));
    }

    #[test]
    fn store_unavailable_maps_to_transient() {
        let err: AuditError = StoreError::Unavailable {
            reason: "database is locked".to_string(),
        }
        .into();
        assert!(matches!(err, AuditError::TransientStorage { .. }));
    }

    #[test]
    fn store_violation_maps_to_storage() {
        let err: AuditError = StoreError::UniqueViolation {
            constraint: UniqueConstraint::Sequence,
        }
        .into();
        match err {
            AuditError::Storage { reason } => assert!(reason.contains("sequence")),
            other => panic!("expected Storage, got {:?}", other),
        }
    }
}
