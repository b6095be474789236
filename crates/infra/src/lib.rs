//! Infrastructure layer: persistence, configuration and the ledger services.
//!
//! - [`store`]: the `LedgerStore` boundary with in-memory and Postgres backends
//! - [`ledger`]: `StockLedger`, the sanctioned writer of stock quantities
//! - [`sales`]: `SaleComposer`, sale creation and maintenance

pub mod config;
pub mod error;
pub mod ledger;
pub mod retry;
pub mod sales;
pub mod store;


pub use config::{ConfigError, LedgerConfig};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{ReorderSuggestion, StockLedger};
pub use sales::SaleComposer;
pub use store::{
    InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError, UnitOfWork, open_store,
};
