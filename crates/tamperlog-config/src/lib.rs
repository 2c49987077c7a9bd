//! # tamperlog-config
//!
//! TOML configuration for the tamperlog runtime.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use tamperlog_config::TamperlogConfig;
//!
//! let config = TamperlogConfig::from_file(Path::new("config/tamperlog.toml"))?;
//! let engine = AppendEngine::with_policy(store, config.engine.retry_policy());
//! ```

pub mod loader;
pub mod settings;

pub use settings::{
    EngineSettings, QuerySettings, StoreBackend, StoreSettings, TamperlogConfig, VerifySettings,
};

// ── Tests ─────────────────────────────────────────────────────────────────────
