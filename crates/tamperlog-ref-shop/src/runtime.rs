//! Wiring a store, engine, verifier, and query facade from configuration.

use std::fs;
use std::sync::Arc;

use tamperlog_audit::{AppendEngine, AuditQuery, InMemoryAuditStore, SqliteAuditStore};
use tamperlog_config::{StoreBackend, StoreSettings, TamperlogConfig};
use tamperlog_contracts::error::{AuditError, AuditResult};
use tamperlog_core::traits::AuditStore;
use tamperlog_verify::ChainVerifier;

/// Settings the shop scenarios run with.
pub const SHOP_CONFIG: &str = include_str!("../config/shop.toml");

/// Load the embedded shop configuration.
pub fn shop_config() -> AuditResult<TamperlogConfig> {
    TamperlogConfig::from_toml_str(SHOP_CONFIG)
}

/// Open the store described by `settings`.
pub fn open_store(settings: &StoreSettings) -> AuditResult<Arc<dyn AuditStore>> {
    match settings.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryAuditStore::new())),
        StoreBackend::Sqlite => {
            let path = settings
                .path
                .as_deref()
                .ok_or_else(|| AuditError::ConfigError {
                    reason: "store.path is required when store.backend = \"sqlite\"".to_string(),
                })?;
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|e| AuditError::Storage {
                    reason: format!("cannot create ledger directory '{}': {}", dir.display(), e),
                })?;
            }
            Ok(Arc::new(SqliteAuditStore::open(path, settings.busy_timeout())?))
        }
    }
}

/// Every component needed to append, verify, and read one chain.
pub struct AuditRuntime {
    pub store: Arc<dyn AuditStore>,
    pub engine: Arc<AppendEngine>,
    pub verifier: ChainVerifier,
    pub query: AuditQuery,
    pub default_page_size: u64,
}

impl AuditRuntime {
    /// Build a runtime over the store the configuration names.
    pub fn open(config: &TamperlogConfig) -> AuditResult<Self> {
        let store = open_store(&config.store)?;
        Ok(Self::with_store(store, config))
    }

    /// Build a runtime over a fresh in-memory store, ignoring `[store]`.
    pub fn scratch(config: &TamperlogConfig) -> Self {
        Self::with_store(Arc::new(InMemoryAuditStore::new()), config)
    }

    pub fn with_store(store: Arc<dyn AuditStore>, config: &TamperlogConfig) -> Self {
        let engine = AppendEngine::with_policy(Arc::clone(&store), config.engine.retry_policy());
        let verifier =
            ChainVerifier::new(Arc::clone(&store)).with_batch_size(config.verify.batch_size);
        let query = AuditQuery::new(Arc::clone(&store)).with_max_page_size(config.query.max_page_size);
        Self {
            store,
            engine: Arc::new(engine),
            verifier,
            query,
            default_page_size: config.query.default_page_size,
        }
    }
}
