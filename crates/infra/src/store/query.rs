//! Read-side filters and pagination for movements and sales.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{CustomerId, ItemId, LocationId, StockLevelId, UserId};
use stockbook_inventory::{MovementRecord, MovementType};
use stockbook_sales::{SaleStatus, SaleTransaction};

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Pagination parameters for list queries.
///
/// Deserialization goes through [`Pagination::new`], so the page cap holds for
/// values read off the wire too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PaginationParams")]
pub struct Pagination {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }

    /// Effective page size, never above [`MAX_PAGE_SIZE`].
    pub fn limit(self) -> u32 {
        self.limit.min(MAX_PAGE_SIZE)
    }

    /// Slice an already-ordered result set, returning `(page, total, has_more)`.
    pub fn apply<T>(self, items: Vec<T>) -> (Vec<T>, u64, bool) {
        let total = items.len() as u64;
        let page: Vec<T> = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit() as usize)
            .collect();
        let has_more = u64::from(self.offset) + (page.len() as u64) < total;
        (page, total, has_more)
    }
}

#[derive(Deserialize)]
struct PaginationParams {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        Pagination::new(params.limit, params.offset)
    }
}

/// Filter criteria for movement queries. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub stock_level_id: Option<StockLevelId>,
    pub location_id: Option<LocationId>,
    pub item_id: Option<ItemId>,
    pub movement_type: Option<MovementType>,
    pub reference: Option<String>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_stock_level(id: StockLevelId) -> Self {
        Self {
            stock_level_id: Some(id),
            ..Default::default()
        }
    }

    pub fn for_location(id: LocationId) -> Self {
        Self {
            location_id: Some(id),
            ..Default::default()
        }
    }

    pub fn for_item(id: ItemId) -> Self {
        Self {
            item_id: Some(id),
            ..Default::default()
        }
    }

    pub fn matches(&self, m: &MovementRecord) -> bool {
        self.stock_level_id.is_none_or(|id| m.stock_level_id() == id)
            && self.location_id.is_none_or(|id| m.location_id() == id)
            && self.item_id.is_none_or(|id| m.item_id() == id)
            && self.movement_type.is_none_or(|t| m.movement_type() == t)
            && self
                .reference
                .as_deref()
                .is_none_or(|r| m.reference() == Some(r))
            && self.occurred_after.is_none_or(|at| m.occurred_at() > at)
            && self.occurred_before.is_none_or(|at| m.occurred_at() < at)
    }
}

/// Paginated movement query result (newest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<MovementRecord>,
    /// Total number of movements matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Filter criteria for sale queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleFilter {
    pub location_id: Option<LocationId>,
    pub cashier_id: Option<UserId>,
    pub customer_id: Option<CustomerId>,
    pub status: Option<SaleStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl SaleFilter {
    pub fn matches(&self, sale: &SaleTransaction) -> bool {
        let h = sale.header();
        self.location_id.is_none_or(|id| h.location_id == id)
            && self.cashier_id.is_none_or(|id| h.cashier_id == id)
            && self.customer_id.is_none_or(|id| h.customer_id == Some(id))
            && self.status.is_none_or(|s| h.status == s)
            && self.created_after.is_none_or(|at| h.created_at > at)
            && self.created_before.is_none_or(|at| h.created_at < at)
    }
}

/// Paginated sale query result (newest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalePage {
    pub sales: Vec<SaleTransaction>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}
