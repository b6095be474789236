//! Inventory domain module: stock levels and their movement ledger.
//!
//! This crate contains business rules for on-hand quantities, implemented purely as
//! deterministic domain logic (no IO, no storage). Persisting a planned change is the
//! job of the infrastructure layer.

pub mod adjustment;
pub mod movement;
pub mod stock;
pub mod transaction_type;

pub use adjustment::{AdjustStock, NegativeStockPolicy, RecordTransaction, StockAdjustment, TransferStock};
pub use movement::{MovementParts, MovementRecord, MovementType};
pub use stock::{OpenStockLevel, StockLevel, StockLevelParts, StockThresholds};
pub use transaction_type::{Direction, TransactionType};
