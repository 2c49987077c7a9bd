//! Configuration schema.
//!
//! Every section and key has a default, so an empty TOML document is a
//! valid configuration.
//!
//! Example:
//! ```toml
//! [engine]
//! max_append_attempts = 8
//! max_transient_retries = 5
//! backoff_base_ms = 5
//! backoff_max_ms = 500
//!
//! [query]
//! default_page_size = 10
//! max_page_size = 100
//!
//! [verify]
//! batch_size = 256
//!
//! [store]
//! backend = "sqlite"
//! path = "var/audit.db"
//! busy_timeout_ms = 5000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tamperlog_contracts::retry::RetryPolicy;

/// Append engine retry bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Attempts per event before a lost sequence race becomes `ChainConflict`.
    pub max_append_attempts: u32,

    /// Retries on an unavailable store before reporting `TransientStorage`.
    pub max_transient_retries: u32,

    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl EngineSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_append_attempts: self.max_append_attempts,
            max_transient_retries: self.max_transient_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_append_attempts: policy.max_append_attempts,
            max_transient_retries: policy.max_transient_retries,
            backoff_base_ms: policy.backoff_base.as_millis() as u64,
            backoff_max_ms: policy.backoff_max.as_millis() as u64,
        }
    }
}

/// Paging limits for the query facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySettings {
    /// Page size used when a caller does not ask for one.
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifySettings {
    /// Entries streamed per range read.
    pub batch_size: usize,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self { batch_size: 256 }
    }
}

/// Which `AuditStore` implementation backs the chain.
///
/// Expressed in TOML as `"memory"` or `"sqlite"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub backend: StoreBackend,

    /// Mandatory when `backend = "sqlite"`.
    pub path: Option<PathBuf>,

    /// How long a SQLite connection waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl StoreSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            busy_timeout_ms: 5_000,
        }
    }
}

/// The top-level structure deserialized from a tamperlog TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TamperlogConfig {
    pub engine: EngineSettings,
    pub query: QuerySettings,
    pub verify: VerifySettings,
    pub store: StoreSettings,
}
