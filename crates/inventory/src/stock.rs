//! Per-location stock levels and their replenishment thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, ItemId, LocationId, StockLevelId, UserId, Versioned};

use crate::movement::{MovementRecord, MovementType};

/// Reference stamped on the movement that records a stock level's opening quantity.
pub const OPENING_REFERENCE: &str = "initial-stock";

/// Replenishment thresholds for one stock level.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockThresholds {
    pub minimum: i64,
    pub maximum: Option<i64>,
    /// Quantity at or below which the item should be reordered.
    pub reorder_point: i64,
    /// Preferred quantity per replenishment order (0 = not configured).
    pub reorder_quantity: i64,
}

impl StockThresholds {
    pub fn validate(&self) -> DomainResult<()> {
        if self.minimum < 0 || self.reorder_point < 0 || self.reorder_quantity < 0 {
            return Err(DomainError::validation("thresholds cannot be negative"));
        }
        if let Some(max) = self.maximum {
            if max < 0 {
                return Err(DomainError::validation("thresholds cannot be negative"));
            }
            if max < self.minimum {
                return Err(DomainError::validation("maximum must not be below minimum"));
            }
        }
        Ok(())
    }
}

/// Command: open the stock level for a (location, item) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStockLevel {
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub initial_quantity: i64,
    pub thresholds: StockThresholds,
    pub lot_number: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Reference for the opening movement; defaults to [`OPENING_REFERENCE`].
    pub reference: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl OpenStockLevel {
    /// An empty stock level with default thresholds (first receipt, transfer destination).
    pub fn empty(
        location_id: LocationId,
        item_id: ItemId,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            location_id,
            item_id,
            initial_quantity: 0,
            thresholds: StockThresholds::default(),
            lot_number: None,
            expires_at: None,
            reference: None,
            actor,
            occurred_at,
        }
    }
}

/// Every persisted field of a stock level, used to rehydrate it from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevelParts {
    pub id: StockLevelId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub thresholds: StockThresholds,
    pub lot_number: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Current on-hand quantity of one item at one location.
///
/// Fields are private: the quantity only changes through a planned adjustment
/// (see [`crate::adjustment`]), never by direct assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    id: StockLevelId,
    location_id: LocationId,
    item_id: ItemId,
    quantity: i64,
    thresholds: StockThresholds,
    lot_number: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StockLevel {
    /// Open a new stock level at version 1.
    ///
    /// Returns the opening movement as well when the initial quantity is positive, so the
    /// ledger accounts for every unit on hand.
    pub fn open(
        id: StockLevelId,
        cmd: &OpenStockLevel,
    ) -> DomainResult<(Self, Option<MovementRecord>)> {
        if cmd.initial_quantity < 0 {
            return Err(DomainError::validation("initial quantity cannot be negative"));
        }
        cmd.thresholds.validate()?;

        let level = Self {
            id,
            location_id: cmd.location_id,
            item_id: cmd.item_id,
            quantity: cmd.initial_quantity,
            thresholds: cmd.thresholds.clone(),
            lot_number: cmd.lot_number.clone(),
            expires_at: cmd.expires_at,
            version: 1,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        };

        let opening = (cmd.initial_quantity > 0).then(|| {
            MovementRecord::record(
                &level,
                cmd.initial_quantity.unsigned_abs(),
                MovementType::Inbound,
                Some(
                    cmd.reference
                        .clone()
                        .unwrap_or_else(|| OPENING_REFERENCE.to_string()),
                ),
                None,
                cmd.actor,
                cmd.occurred_at,
            )
        });

        Ok((level, opening))
    }

    pub fn restore(parts: StockLevelParts) -> Self {
        Self {
            id: parts.id,
            location_id: parts.location_id,
            item_id: parts.item_id,
            quantity: parts.quantity,
            thresholds: parts.thresholds,
            lot_number: parts.lot_number,
            expires_at: parts.expires_at,
            version: parts.version,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn id(&self) -> StockLevelId {
        self.id
    }

    pub fn location_id(&self) -> LocationId {
        self.location_id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn thresholds(&self) -> &StockThresholds {
        &self.thresholds
    }

    pub fn lot_number(&self) -> Option<&str> {
        self.lot_number.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_below_minimum(&self) -> bool {
        self.quantity < self.thresholds.minimum
    }

    pub fn is_above_maximum(&self) -> bool {
        self.thresholds.maximum.is_some_and(|max| self.quantity > max)
    }

    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.thresholds.reorder_point
    }

    /// How much to order to replenish this level.
    ///
    /// Uses the configured reorder quantity, otherwise tops up to the maximum, otherwise
    /// back up to the reorder point. Zero when no reorder is needed.
    pub fn suggested_reorder_quantity(&self) -> i64 {
        if !self.needs_reorder() {
            return 0;
        }
        if self.thresholds.reorder_quantity > 0 {
            return self.thresholds.reorder_quantity;
        }
        let target = self
            .thresholds
            .maximum
            .unwrap_or(self.thresholds.reorder_point.max(self.thresholds.minimum));
        (target - self.quantity).max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Next state after a committed quantity change (+1 version).
    pub(crate) fn with_quantity(&self, quantity: i64, at: DateTime<Utc>) -> Self {
        Self {
            quantity,
            version: self.version + 1,
            updated_at: at,
            ..self.clone()
        }
    }
}

impl Versioned for StockLevel {
    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_cmd(initial_quantity: i64) -> OpenStockLevel {
        OpenStockLevel {
            initial_quantity,
            thresholds: StockThresholds {
                minimum: 5,
                maximum: Some(50),
                reorder_point: 10,
                reorder_quantity: 0,
            },
            ..OpenStockLevel::empty(LocationId::new(), ItemId::new(), UserId::new(), Utc::now())
        }
    }

    #[test]
    fn open_logs_positive_initial_quantity() {
        let (level, movement) = StockLevel::open(StockLevelId::new(), &open_cmd(12)).unwrap();
        assert_eq!(level.quantity(), 12);
        assert_eq!(level.version(), 1);

        let movement = movement.expect("opening movement");
        assert_eq!(movement.quantity(), 12);
        assert_eq!(movement.movement_type(), MovementType::Inbound);
        assert_eq!(movement.reference(), Some(OPENING_REFERENCE));
        assert_eq!(movement.quantity_after(), 12);
        assert_eq!(movement.stock_level_id(), level.id());
    }

    #[test]
    fn open_with_zero_quantity_has_no_movement() {
        let (_, movement) = StockLevel::open(StockLevelId::new(), &open_cmd(0)).unwrap();
        assert!(movement.is_none());
    }

    #[test]
    fn open_rejects_negative_quantity_and_bad_thresholds() {
        let err = StockLevel::open(StockLevelId::new(), &open_cmd(-1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut cmd = open_cmd(1);
        cmd.thresholds.maximum = Some(2);
        let err = StockLevel::open(StockLevelId::new(), &cmd).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("maximum")));
    }

    #[test]
    fn reorder_suggestion_tops_up_to_maximum() {
        let (level, _) = StockLevel::open(StockLevelId::new(), &open_cmd(8)).unwrap();
        assert!(level.needs_reorder());
        assert_eq!(level.suggested_reorder_quantity(), 42);

        let (healthy, _) = StockLevel::open(StockLevelId::new(), &open_cmd(30)).unwrap();
        assert!(!healthy.needs_reorder());
        assert_eq!(healthy.suggested_reorder_quantity(), 0);
    }

    #[test]
    fn configured_reorder_quantity_wins() {
        let mut cmd = open_cmd(3);
        cmd.thresholds.reorder_quantity = 24;
        let (level, _) = StockLevel::open(StockLevelId::new(), &cmd).unwrap();
        assert!(level.is_below_minimum());
        assert_eq!(level.suggested_reorder_quantity(), 24);
    }

    #[test]
    fn above_maximum_only_when_a_maximum_is_set() {
        let (over, _) = StockLevel::open(StockLevelId::new(), &open_cmd(51)).unwrap();
        assert!(over.is_above_maximum());

        let (at_max, _) = StockLevel::open(StockLevelId::new(), &open_cmd(50)).unwrap();
        assert!(!at_max.is_above_maximum());

        let mut cmd = open_cmd(10_000);
        cmd.thresholds.maximum = None;
        let (unbounded, _) = StockLevel::open(StockLevelId::new(), &cmd).unwrap();
        assert!(!unbounded.is_above_maximum());
    }

    #[test]
    fn expiry_is_inclusive_and_optional() {
        let now = Utc::now();
        let mut cmd = open_cmd(1);
        cmd.expires_at = Some(now);
        let (level, _) = StockLevel::open(StockLevelId::new(), &cmd).unwrap();
        assert!(level.is_expired(now));
        assert!(!level.is_expired(now - chrono::Duration::days(1)));

        let (no_expiry, _) = StockLevel::open(StockLevelId::new(), &open_cmd(1)).unwrap();
        assert!(!no_expiry.is_expired(now));
    }

    #[test]
    fn with_quantity_bumps_version() {
        let (level, _) = StockLevel::open(StockLevelId::new(), &open_cmd(1)).unwrap();
        let next = level.with_quantity(7, Utc::now());
        assert_eq!(next.quantity(), 7);
        assert_eq!(next.version(), 2);
        assert_eq!(next.id(), level.id());
    }
}
