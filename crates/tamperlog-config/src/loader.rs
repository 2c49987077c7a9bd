//! Loading and validating configuration.
//!
//! `TamperlogConfig::from_toml_str` and `from_file` parse TOML and then run
//! `validate`, so a config that loads is one the runtime can use.

use std::path::Path;

use tracing::debug;

use tamperlog_contracts::error::{AuditError, AuditResult};

use crate::settings::{StoreBackend, TamperlogConfig};

impl TamperlogConfig {
    /// Parse `s` as TOML and validate it.
    ///
    /// Returns `AuditError::ConfigError` if the TOML is malformed, names an
    /// unknown key, or fails validation.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        let config: TamperlogConfig = toml::from_str(s).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to parse tamperlog TOML: {}", e),
        })?;
        config.validate()?;
        debug!(?config, "tamperlog configuration loaded");
        Ok(config)
    }

    /// Read the file at `path` and parse it as tamperlog configuration.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject settings the engine, verifier, or query facade cannot honour.
    pub fn validate(&self) -> AuditResult<()> {
        let engine = &self.engine;
        if engine.max_append_attempts == 0 {
            return Err(invalid("engine.max_append_attempts must be at least 1"));
        }
        if engine.backoff_base_ms > engine.backoff_max_ms {
            return Err(invalid(format!(
                "engine.backoff_base_ms ({}) exceeds engine.backoff_max_ms ({})",
                engine.backoff_base_ms, engine.backoff_max_ms
            )));
        }

        let query = &self.query;
        if query.default_page_size == 0 || query.max_page_size == 0 {
            return Err(invalid("query page sizes must be at least 1"));
        }
        if query.default_page_size > query.max_page_size {
            return Err(invalid(format!(
                "query.default_page_size ({}) exceeds query.max_page_size ({})",
                query.default_page_size, query.max_page_size
            )));
        }

        if self.verify.batch_size == 0 {
            return Err(invalid("verify.batch_size must be at least 1"));
        }

        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return Err(invalid("store.path is required when store.backend = \"sqlite\""));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> AuditError {
    AuditError::ConfigError {
        reason: reason.into(),
    }
}
