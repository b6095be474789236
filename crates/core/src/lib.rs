//! `stockbook-core`: shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the domain error model and the optimistic concurrency token.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{
    CustomerId, ItemId, LocationId, MovementId, SaleId, SaleLineId, StockLevelId, UserId,
};
pub use version::{ExpectedVersion, Versioned};
