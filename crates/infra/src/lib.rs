//! Infrastructure layer: config, storage, application services.

pub mod config;
pub mod error;
pub mod postgres;
pub mod services;
pub mod store;


use std::sync::Arc;

pub use config::{AppConfig, DatabaseConfig, LedgerConfig, StorageBackend, StorageConfig};
pub use error::{ServiceError, ServiceResult, StoreError};
pub use postgres::PostgresLedger;
pub use services::Services;
pub use store::InMemoryStore;

/// Load configuration from `path`, install logging and wire the in-memory
/// services. The ledger backend is opened separately with [`open_ledger`].
pub fn bootstrap(path: &str) -> Result<(AppConfig, Services), ::config::ConfigError> {
    let cfg = AppConfig::load_from(path)?;
    buildtrack_observability::init(&cfg.log);
    tracing::info!(backend = ?cfg.storage.backend, "buildtrack starting");
    let services = Services::new(Arc::new(InMemoryStore::new()), &cfg.ledger);
    Ok((cfg, services))
}

/// Connect to and migrate the Postgres ledger when `storage.backend` is
/// `postgres`. `None` for the in-memory backend.
pub async fn open_ledger(cfg: &AppConfig) -> Result<Option<PostgresLedger>, StoreError> {
    match cfg.storage.backend {
        StorageBackend::Memory => Ok(None),
        StorageBackend::Postgres => {
            let ledger = PostgresLedger::connect(&cfg.database).await?;
            ledger.migrate().await?;
            tracing::info!(
                max_connections = cfg.database.max_connections,
                "postgres ledger ready"
            );
            Ok(Some(ledger))
        }
    }
}
