//! The `LedgerStore` boundary and the unit of work it commits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockbook_core::{ExpectedVersion, ItemId, LocationId, SaleId, StockLevelId};
use stockbook_inventory::{MovementRecord, StockLevel};
use stockbook_sales::{SaleHeader, SaleLineItem, SaleTransaction};

use super::query::{MovementFilter, MovementPage, Pagination, SaleFilter, SalePage};

/// One write inside a [`UnitOfWork`].
///
/// There is intentionally no variant that edits or removes a movement: the movement
/// log can only grow.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    CreateStockLevel(StockLevel),
    SetQuantity {
        stock_level_id: StockLevelId,
        expected_version: ExpectedVersion,
        quantity: i64,
        updated_at: DateTime<Utc>,
    },
    AppendMovement(MovementRecord),
    InsertSaleHeader(SaleHeader),
    InsertSaleLine(SaleLineItem),
    UpdateSaleHeader {
        header: SaleHeader,
        expected_version: ExpectedVersion,
    },
    DeleteSaleLines(SaleId),
    DeleteSaleHeader(SaleId),
}

/// Discriminant of a [`Change`] (logging, fault injection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    CreateStockLevel,
    SetQuantity,
    AppendMovement,
    InsertSaleHeader,
    InsertSaleLine,
    UpdateSaleHeader,
    DeleteSaleLines,
    DeleteSaleHeader,
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::CreateStockLevel(_) => ChangeKind::CreateStockLevel,
            Change::SetQuantity { .. } => ChangeKind::SetQuantity,
            Change::AppendMovement(_) => ChangeKind::AppendMovement,
            Change::InsertSaleHeader(_) => ChangeKind::InsertSaleHeader,
            Change::InsertSaleLine(_) => ChangeKind::InsertSaleLine,
            Change::UpdateSaleHeader { .. } => ChangeKind::UpdateSaleHeader,
            Change::DeleteSaleLines(_) => ChangeKind::DeleteSaleLines,
            Change::DeleteSaleHeader(_) => ChangeKind::DeleteSaleHeader,
        }
    }
}

/// An ordered batch of writes committed all-or-nothing.
///
/// Changes are applied in insertion order, so a later change observes the effect of
/// an earlier one (e.g. two `SetQuantity` on the same row with consecutive versions).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    changes: Vec<Change>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_stock_level(&mut self, level: StockLevel) -> &mut Self {
        self.changes.push(Change::CreateStockLevel(level));
        self
    }

    /// Overwrite the on-hand quantity. Unconditional apart from the version guard; no
    /// sign check happens at this layer.
    pub fn set_quantity(
        &mut self,
        stock_level_id: StockLevelId,
        expected_version: ExpectedVersion,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> &mut Self {
        self.changes.push(Change::SetQuantity {
            stock_level_id,
            expected_version,
            quantity,
            updated_at,
        });
        self
    }

    pub fn append_movement(&mut self, movement: MovementRecord) -> &mut Self {
        self.changes.push(Change::AppendMovement(movement));
        self
    }

    pub fn insert_sale_header(&mut self, header: SaleHeader) -> &mut Self {
        self.changes.push(Change::InsertSaleHeader(header));
        self
    }

    pub fn insert_sale_line(&mut self, line: SaleLineItem) -> &mut Self {
        self.changes.push(Change::InsertSaleLine(line));
        self
    }

    /// Replace the mutable header fields. The stored version must match
    /// `expected_version`; the store bumps it by one.
    pub fn update_sale_header(
        &mut self,
        header: SaleHeader,
        expected_version: ExpectedVersion,
    ) -> &mut Self {
        self.changes.push(Change::UpdateSaleHeader {
            header,
            expected_version,
        });
        self
    }

    pub fn delete_sale_lines(&mut self, sale_id: SaleId) -> &mut Self {
        self.changes.push(Change::DeleteSaleLines(sale_id));
        self
    }

    pub fn delete_sale_header(&mut self, sale_id: SaleId) -> &mut Self {
        self.changes.push(Change::DeleteSaleHeader(sale_id));
        self
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Ledger storage operation error.
///
/// These are **infrastructure errors** (storage, concurrency, integrity) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A version-guarded write found a different version.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A uniqueness rule was violated (second stock level for a location/item, reused id).
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A write referenced a row that does not exist.
    #[error("missing row: {0}")]
    MissingRow(String),

    /// A write would break referential integrity (e.g. orphaning sale lines).
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// The backend failed; nothing from the unit of work was persisted.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Persistence boundary for stock levels, the movement log and sales.
///
/// ## Write Semantics
///
/// All writes go through [`LedgerStore::commit`]. Implementations must:
/// - apply the changes of one unit of work atomically (all or none are visible)
/// - enforce `ExpectedVersion` on every `SetQuantity` and bump the stored version by one
/// - keep `(location_id, item_id)` unique across stock levels
/// - refuse to delete a sale header while lines still reference it
///
/// ## Read Semantics
///
/// Movement and sale pages are ordered newest first.
pub trait LedgerStore: Send + Sync {
    fn stock_level(
        &self,
        location_id: LocationId,
        item_id: ItemId,
    ) -> Result<Option<StockLevel>, StoreError>;

    fn stock_level_by_id(&self, id: StockLevelId) -> Result<Option<StockLevel>, StoreError>;

    fn stock_levels_at(&self, location_id: LocationId) -> Result<Vec<StockLevel>, StoreError>;

    fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;

    fn sale(&self, id: SaleId) -> Result<Option<SaleTransaction>, StoreError>;

    fn sales(&self, filter: &SaleFilter, pagination: Pagination) -> Result<SalePage, StoreError>;

    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn stock_level(
        &self,
        location_id: LocationId,
        item_id: ItemId,
    ) -> Result<Option<StockLevel>, StoreError> {
        (**self).stock_level(location_id, item_id)
    }

    fn stock_level_by_id(&self, id: StockLevelId) -> Result<Option<StockLevel>, StoreError> {
        (**self).stock_level_by_id(id)
    }

    fn stock_levels_at(&self, location_id: LocationId) -> Result<Vec<StockLevel>, StoreError> {
        (**self).stock_levels_at(location_id)
    }

    fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).movements(filter, pagination)
    }

    fn sale(&self, id: SaleId) -> Result<Option<SaleTransaction>, StoreError> {
        (**self).sale(id)
    }

    fn sales(&self, filter: &SaleFilter, pagination: Pagination) -> Result<SalePage, StoreError> {
        (**self).sales(filter, pagination)
    }

    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError> {
        (**self).commit(work)
    }
}
