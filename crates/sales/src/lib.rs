//! Sales domain module: priced, multi-line sale transactions.
//!
//! This crate contains business rules for sales, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod pricing;
pub mod sale;

pub use pricing::{Percent, line_total, order_total};
pub use sale::{
    NewSale, NewSaleLine, PaymentMethod, SaleHeader, SaleLineItem, SaleStatus, SaleTransaction,
    SaleUpdate,
};
