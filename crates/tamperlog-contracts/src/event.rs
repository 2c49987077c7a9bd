//! Inbound audit event types.
//!
//! An `AuditEvent` is what producers publish after a domain mutation. The
//! transport delivers it at least once; the `dedup_key` is the only thing
//! that lets the append engine collapse redeliveries into a single entry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Producer-assigned idempotency key, stable across redeliveries of the
/// same logical event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(pub String);

impl DedupKey {
    /// Create a fresh random key. Producers call this once per logical event.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DedupKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for DedupKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DedupKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of mutation an audit event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Created,
    Modified,
    Deleted,
}

impl AuditAction {
    /// The stable string form used in canonical encoding and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "Created",
            AuditAction::Modified => "Modified",
            AuditAction::Deleted => "Deleted",
        }
    }
}

impl AuditAction {
    /// Exact inverse of `as_str`. Storage decoding uses this; `FromStr`
    /// also accepts other casings for human input.
    pub fn from_canonical(s: &str) -> Option<Self> {
        [AuditAction::Created, AuditAction::Modified, AuditAction::Deleted]
            .into_iter()
            .find(|action| action.as_str() == s)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(AuditAction::Created),
            "modified" => Ok(AuditAction::Modified),
            "deleted" => Ok(AuditAction::Deleted),
            other => Err(format!("unknown audit action '{}'", other)),
        }
    }
}

/// A domain-mutation notification delivered to the append engine.
///
/// Optional fields stay `None` when the producer had nothing to record;
/// `None` and `Some("")` are distinct and hash differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub dedup_key: DedupKey,
    pub entity_name: String,
    pub action: AuditAction,
    pub entity_id: String,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    /// When the mutation happened. Descriptive only, never used for ordering.
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEvent {
    /// Build an event with only the required fields set.
    pub fn new(
        dedup_key: impl Into<DedupKey>,
        entity_name: impl Into<String>,
        action: AuditAction,
        entity_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            dedup_key: dedup_key.into(),
            entity_name: entity_name.into(),
            action,
            entity_id: entity_id.into(),
            old_values: None,
            new_values: None,
            user_id: None,
            user_email: None,
            occurred_at,
            correlation_id: None,
            remote_ip: None,
            user_agent: None,
        }
    }

    pub fn with_values(mut self, old_values: Option<String>, new_values: Option<String>) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>, user_email: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.user_email = Some(user_email.into());
        self
    }

    /// Attach request-context metadata captured by the producer.
    pub fn with_request_context(
        mut self,
        correlation_id: Option<String>,
        remote_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.correlation_id = correlation_id;
        self.remote_ip = remote_ip;
        self.user_agent = user_agent;
        self
    }
}
