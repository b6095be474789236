//! The movement log entry and its classification.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, ItemId, LocationId, MovementId, StockLevelId, UserId};

use crate::stock::StockLevel;

/// Classification of a movement; determines how its unsigned quantity is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Inbound,
    Outbound,
    Transfer,
    Adjustment,
}

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::Inbound,
        MovementType::Outbound,
        MovementType::Transfer,
        MovementType::Adjustment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Inbound => "inbound",
            MovementType::Outbound => "outbound",
            MovementType::Transfer => "transfer",
            MovementType::Adjustment => "adjustment",
        }
    }

    /// Whether a signed delta is consistent with this movement type.
    ///
    /// Inbound only adds stock, outbound only removes it; transfers and adjustments
    /// go either way. Zero is never a movement.
    pub fn accepts(self, delta: i64) -> bool {
        match self {
            MovementType::Inbound => delta > 0,
            MovementType::Outbound => delta < 0,
            MovementType::Transfer | MovementType::Adjustment => delta != 0,
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inbound" | "in" => Ok(MovementType::Inbound),
            "outbound" | "out" => Ok(MovementType::Outbound),
            "transfer" => Ok(MovementType::Transfer),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}' (expected one of: inbound, outbound, transfer, adjustment)"
            ))),
        }
    }
}

/// Every persisted field of a movement, used to rehydrate it from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementParts {
    pub id: MovementId,
    pub stock_level_id: StockLevelId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub quantity: u64,
    pub movement_type: MovementType,
    pub quantity_after: i64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Immutable fact of a single quantity change.
///
/// There are no setters: once recorded, a movement is never altered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    id: MovementId,
    stock_level_id: StockLevelId,
    location_id: LocationId,
    item_id: ItemId,
    /// Magnitude of the change; direction comes from `movement_type`.
    quantity: u64,
    movement_type: MovementType,
    /// On-hand balance right after this movement.
    quantity_after: i64,
    reference: Option<String>,
    notes: Option<String>,
    actor: UserId,
    occurred_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Record a movement against the stock level state *after* the change.
    pub(crate) fn record(
        level_after: &StockLevel,
        quantity: u64,
        movement_type: MovementType,
        reference: Option<String>,
        notes: Option<String>,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            stock_level_id: level_after.id(),
            location_id: level_after.location_id(),
            item_id: level_after.item_id(),
            quantity,
            movement_type,
            quantity_after: level_after.quantity(),
            reference,
            notes,
            actor,
            occurred_at,
        }
    }

    pub fn restore(parts: MovementParts) -> Self {
        Self {
            id: parts.id,
            stock_level_id: parts.stock_level_id,
            location_id: parts.location_id,
            item_id: parts.item_id,
            quantity: parts.quantity,
            movement_type: parts.movement_type,
            quantity_after: parts.quantity_after,
            reference: parts.reference,
            notes: parts.notes,
            actor: parts.actor,
            occurred_at: parts.occurred_at,
        }
    }

    pub fn id(&self) -> MovementId {
        self.id
    }

    pub fn stock_level_id(&self) -> StockLevelId {
        self.stock_level_id
    }

    pub fn location_id(&self) -> LocationId {
        self.location_id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    pub fn quantity_after(&self) -> i64 {
        self.quantity_after
    }

    /// Balance right before this movement, derived from `quantity_after`.
    ///
    /// Only inbound/outbound movements carry their direction in the type, so for
    /// transfers and adjustments callers need the previous movement to tell the sign.
    /// Also `None` when the balance would not fit in an `i64` (corrupt row).
    pub fn quantity_before(&self) -> Option<i64> {
        let magnitude = i64::try_from(self.quantity).ok()?;
        match self.movement_type {
            MovementType::Inbound => self.quantity_after.checked_sub(magnitude),
            MovementType::Outbound => self.quantity_after.checked_add(magnitude),
            MovementType::Transfer | MovementType::Adjustment => None,
        }
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn actor(&self) -> UserId {
        self.actor
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names_and_legacy_aliases() {
        for t in MovementType::ALL {
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
        }
        assert_eq!("in".parse::<MovementType>().unwrap(), MovementType::Inbound);
        assert_eq!("OUT".parse::<MovementType>().unwrap(), MovementType::Outbound);
    }

    #[test]
    fn unknown_movement_type_is_a_validation_error() {
        let err = "shrinkage".parse::<MovementType>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("shrinkage")));
    }

    #[test]
    fn direction_constraints() {
        assert!(MovementType::Inbound.accepts(3));
        assert!(!MovementType::Inbound.accepts(-3));
        assert!(MovementType::Outbound.accepts(-3));
        assert!(!MovementType::Outbound.accepts(3));
        assert!(MovementType::Adjustment.accepts(-3));
        assert!(MovementType::Transfer.accepts(3));
        for t in MovementType::ALL {
            assert!(!t.accepts(0));
        }
    }

    fn restored(quantity: u64, movement_type: MovementType, quantity_after: i64) -> MovementRecord {
        MovementRecord::restore(MovementParts {
            id: MovementId::new(),
            stock_level_id: StockLevelId::new(),
            location_id: LocationId::new(),
            item_id: ItemId::new(),
            quantity,
            movement_type,
            quantity_after,
            reference: None,
            notes: None,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn quantity_before_stays_in_range() {
        assert_eq!(restored(4, MovementType::Outbound, 6).quantity_before(), Some(10));
        assert_eq!(restored(4, MovementType::Inbound, 6).quantity_before(), Some(2));
        assert_eq!(restored(4, MovementType::Adjustment, 6).quantity_before(), None);

        assert_eq!(restored(1 << 63, MovementType::Outbound, i64::MIN).quantity_before(), None);
        assert_eq!(restored(5, MovementType::Outbound, i64::MAX).quantity_before(), None);
        assert_eq!(restored(5, MovementType::Inbound, i64::MIN).quantity_before(), None);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_value(MovementType::Adjustment).unwrap();
        assert_eq!(json, serde_json::Value::String("adjustment".to_string()));
    }
}
