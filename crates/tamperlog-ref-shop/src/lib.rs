//! # tamperlog-ref-shop
//!
//! Shop reference harness for the tamperlog audit chain.
//!
//! Catalog and cart services publish audit events through an at-least-once
//! broker; a pool of consumers appends them to the chain. Four scenarios use
//! mock data:
//!
//! 1. **Product Lifecycle**: genesis, linking, and a redelivered create.
//! 2. **Redelivery Storm**: duplicate publishes and lost acks collapse to one
//!    entry per event.
//! 3. **Concurrent Writers**: many workers, two engines, one unforked chain.
//! 4. **Tamper Drill**: edited and re-hashed entries are caught by the
//!    verifier.
//!
//! All data is hardcoded and fictional.

pub mod consumer;
pub mod delivery;
pub mod mock_data;
pub mod runtime;
pub mod scenarios;

pub use consumer::{ConsumerPool, ConsumerReport};
pub use delivery::{BrokerStats, DeadLetter, Delivery, InMemoryBroker};
pub use runtime::{open_store, shop_config, AuditRuntime};

#[cfg(test)]
mod tests {
    use tamperlog_config::{StoreBackend, TamperlogConfig};
    use tamperlog_contracts::error::AuditError;
    use tamperlog_core::traits::AuditStore;

    use crate::mock_data::storefront_traffic;
    use crate::runtime::{open_store, shop_config, AuditRuntime};

    #[test]
    fn test_embedded_shop_config_is_valid() {
        let config = shop_config().unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.verify.batch_size, 64);
    }

    #[test]
    fn test_sqlite_runtime_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TamperlogConfig::default();
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = Some(dir.path().join("ledger").join("shop.db"));

        {
            let runtime = AuditRuntime::open(&config).unwrap();
            for event in storefront_traffic("persist", 3) {
                runtime.engine.append(&event).unwrap();
            }
        }

        let runtime = AuditRuntime::open(&config).unwrap();
        assert_eq!(runtime.store.count().unwrap(), 3);
        assert!(runtime.verifier.verify_all().unwrap().is_intact());
        let page = runtime.query.list_page(1, runtime.default_page_size).unwrap();
        assert_eq!(page.items[0].sequence, 2);
    }

    #[test]
    fn test_open_store_without_path_is_config_error() {
        let mut config = TamperlogConfig::default();
        config.store.backend = StoreBackend::Sqlite;
        assert!(matches!(
            open_store(&config.store),
            Err(AuditError::ConfigError { .. })
        ));
    }
}
