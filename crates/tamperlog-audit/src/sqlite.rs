//! SQLite-backed implementation of `AuditStore`.
//!
//! The chain lives in a single `audit_entries` table. `sequence` is the
//! primary key and `dedup_key` carries a `UNIQUE` constraint, so SQLite
//! itself rejects the loser of any race between writers, including writers
//! in other processes that opened the same file. Triggers refuse `UPDATE`
//! and `DELETE` so the table stays append-only through this schema.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info};

use tamperlog_contracts::{
    entry::{AuditEntry, ChainTail},
    error::{StoreError, StoreResult, UniqueConstraint},
    event::{AuditAction, AuditEvent, DedupKey},
};
use tamperlog_core::traits::{AuditStore, EntrySlice};

use crate::canonical::canonical_timestamp;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_entries (
    sequence INTEGER PRIMARY KEY,
    dedup_key TEXT NOT NULL UNIQUE,
    entity_name TEXT NOT NULL,
    action TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    old_values TEXT,
    new_values TEXT,
    user_id TEXT,
    user_email TEXT,
    occurred_at TEXT NOT NULL,
    correlation_id TEXT,
    remote_ip TEXT,
    user_agent TEXT,
    previous_hash TEXT NOT NULL,
    hash TEXT NOT NULL
);
CREATE TRIGGER IF NOT EXISTS audit_entries_no_update
    BEFORE UPDATE ON audit_entries
    BEGIN SELECT RAISE(ABORT, 'audit entries are append-only'); END;
CREATE TRIGGER IF NOT EXISTS audit_entries_no_delete
    BEFORE DELETE ON audit_entries
    BEGIN SELECT RAISE(ABORT, 'audit entries are append-only'); END;
";

const COLUMNS: &str = "sequence, dedup_key, entity_name, action, entity_id, old_values, new_values, \
     user_id, user_email, occurred_at, correlation_id, remote_ip, user_agent, previous_hash, hash";

/// Default time a connection waits on a locked database before reporting
/// `StoreError::Unavailable`.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// An append-only audit store backed by a SQLite file.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteAuditStore {
    /// Open (or create) the ledger at `path`.
    ///
    /// Enables WAL mode, applies `busy_timeout`, and creates the table and
    /// triggers if they do not exist.
    pub fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(map_sqlite_err)?;
        conn.busy_timeout(busy_timeout).map_err(map_sqlite_err)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(map_sqlite_err)?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_err)?;

        info!(path = %path.display(), journal_mode = %mode, "sqlite audit store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// A private, non-durable database. Useful for tests and demos.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// The backing file, or `None` for an in-memory database.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| StoreError::Backend {
            reason: format!("sqlite connection lock poisoned: {}", e),
        })
    }
}

impl AuditStore for SqliteAuditStore {
    fn find_by_dedup_key(&self, key: &DedupKey) -> StoreResult<Option<AuditEntry>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM audit_entries WHERE dedup_key = ?1"),
                params![key.as_str()],
                RawEntry::from_row,
            )
            .optional()
            .map_err(map_sqlite_err)?;
        raw.map(RawEntry::into_entry).transpose()
    }

    fn tail(&self) -> StoreResult<Option<ChainTail>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT sequence, hash FROM audit_entries ORDER BY sequence DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(map_sqlite_err)?;

        row.map(|(sequence, hash)| {
            Ok(ChainTail {
                sequence: from_db_sequence(sequence)?,
                hash,
            })
        })
        .transpose()
    }

    fn insert(&self, entry: &AuditEntry) -> StoreResult<()> {
        let conn = self.lock()?;
        let event = &entry.event;
        conn.execute(
            &format!(
                "INSERT INTO audit_entries ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                to_db_sequence(entry.sequence)?,
                event.dedup_key.as_str(),
                event.entity_name,
                event.action.as_str(),
                event.entity_id,
                event.old_values,
                event.new_values,
                event.user_id,
                event.user_email,
                canonical_timestamp(&event.occurred_at),
                event.correlation_id,
                event.remote_ip,
                event.user_agent,
                entry.previous_hash,
                entry.hash,
            ],
        )
        .map_err(map_sqlite_err)?;

        debug!(sequence = entry.sequence, "sqlite store insert");
        Ok(())
    }

    fn range(&self, from: u64, to: u64, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        if from > to {
            return Ok(Vec::new());
        }
        let from = to_db_sequence(from)?;
        let to = i64::try_from(to).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM audit_entries
                 WHERE sequence BETWEEN ?1 AND ?2 ORDER BY sequence ASC LIMIT ?3"
            ))
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map(params![from, to, limit], RawEntry::from_row)
            .map_err(map_sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;

        rows.into_iter().map(RawEntry::into_entry).collect()
    }

    fn latest(&self, offset: u64, limit: usize) -> StoreResult<EntrySlice> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut conn = self.lock()?;
        // Count and page inside one read transaction so both see the same snapshot.
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        let total: i64 = tx
            .query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))
            .map_err(map_sqlite_err)?;
        let rows = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {COLUMNS} FROM audit_entries
                     ORDER BY sequence DESC LIMIT ?1 OFFSET ?2"
                ))
                .map_err(map_sqlite_err)?;
            let rows = stmt
                .query_map(params![limit, offset], RawEntry::from_row)
                .map_err(map_sqlite_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_sqlite_err)?;
            rows
        };
        tx.commit().map_err(map_sqlite_err)?;

        Ok(EntrySlice {
            items: rows
                .into_iter()
                .map(RawEntry::into_entry)
                .collect::<StoreResult<Vec<_>>>()?,
            total: from_db_sequence(total)?,
        })
    }

    fn count(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))
            .map_err(map_sqlite_err)?;
        from_db_sequence(total)
    }
}

// ── Row decoding ──────────────────────────────────────────────────────────────

/// A row exactly as SQLite returned it, before domain validation.
struct RawEntry {
    sequence: i64,
    dedup_key: String,
    entity_name: String,
    action: String,
    entity_id: String,
    old_values: Option<String>,
    new_values: Option<String>,
    user_id: Option<String>,
    user_email: Option<String>,
    occurred_at: String,
    correlation_id: Option<String>,
    remote_ip: Option<String>,
    user_agent: Option<String>,
    previous_hash: String,
    hash: String,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            dedup_key: row.get(1)?,
            entity_name: row.get(2)?,
            action: row.get(3)?,
            entity_id: row.get(4)?,
            old_values: row.get(5)?,
            new_values: row.get(6)?,
            user_id: row.get(7)?,
            user_email: row.get(8)?,
            occurred_at: row.get(9)?,
            correlation_id: row.get(10)?,
            remote_ip: row.get(11)?,
            user_agent: row.get(12)?,
            previous_hash: row.get(13)?,
            hash: row.get(14)?,
        })
    }

    fn into_entry(self) -> StoreResult<AuditEntry> {
        let sequence = from_db_sequence(self.sequence)?;
        let corrupt = |reason: String| StoreError::Corrupt {
            sequence: Some(sequence),
            reason: format!("entry {}: {}", sequence, reason),
        };
        let action = AuditAction::from_canonical(&self.action)
            .ok_or_else(|| corrupt(format!("unknown audit action '{}'", self.action)))?;
        let occurred_at = DateTime::parse_from_rfc3339(&self.occurred_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("bad occurred_at '{}': {}", self.occurred_at, e)))?;
        if canonical_timestamp(&occurred_at) != self.occurred_at {
            return Err(corrupt(format!(
                "non-canonical occurred_at '{}'",
                self.occurred_at
            )));
        }

        Ok(AuditEntry {
            sequence,
            event: AuditEvent {
                dedup_key: DedupKey(self.dedup_key),
                entity_name: self.entity_name,
                action,
                entity_id: self.entity_id,
                old_values: self.old_values,
                new_values: self.new_values,
                user_id: self.user_id,
                user_email: self.user_email,
                occurred_at,
                correlation_id: self.correlation_id,
                remote_ip: self.remote_ip,
                user_agent: self.user_agent,
            },
            previous_hash: self.previous_hash,
            hash: self.hash,
        })
    }
}

fn to_db_sequence(sequence: u64) -> StoreResult<i64> {
    i64::try_from(sequence).map_err(|_| StoreError::Backend {
        reason: format!("sequence {} exceeds the SQLite integer range", sequence),
    })
}

fn from_db_sequence(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt {
        sequence: None,
        reason: format!("negative sequence {}", value),
    })
}

/// Translate SQLite failures into the store vocabulary the engine retries on.
fn map_sqlite_err(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, ref message) = e {
        match failure.code {
            ErrorCode::ConstraintViolation => {
                let text = message.as_deref().unwrap_or_default();
                if text.contains("audit_entries.dedup_key") {
                    return StoreError::UniqueViolation {
                        constraint: UniqueConstraint::DedupKey,
                    };
                }
                if text.contains("audit_entries.sequence") {
                    return StoreError::UniqueViolation {
                        constraint: UniqueConstraint::Sequence,
                    };
                }
            }
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                return StoreError::Unavailable {
                    reason: e.to_string(),
                };
            }
            _ => {}
        }
    }
    StoreError::Backend {
        reason: e.to_string(),
    }
}
