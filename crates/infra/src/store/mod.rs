//! Ledger persistence.
//!
//! `LedgerStore` is the only write path for stock levels, movements and sales. Writes are
//! expressed as a [`UnitOfWork`] and committed atomically.

use std::sync::Arc;

use tracing::info;

use crate::config::LedgerConfig;

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::{MAX_PAGE_SIZE, MovementFilter, MovementPage, Pagination, SaleFilter, SalePage};
pub use r#trait::{Change, ChangeKind, LedgerStore, StoreError, UnitOfWork};

/// Build the store selected by the configuration: Postgres when `database_url` is set,
/// in-memory otherwise. The Postgres schema is created if missing.
pub async fn open_store(config: &LedgerConfig) -> Result<Arc<dyn LedgerStore>, StoreError> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresLedgerStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            info!(max_connections = config.db_max_connections, "using postgres ledger store");
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory ledger store");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}
