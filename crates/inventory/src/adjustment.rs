//! Pure planning of stock changes.
//!
//! Planning never mutates its input: it returns the next stock level state, the
//! version the writer must find in storage, and the movement to append. Committing
//! both together is the infrastructure layer's responsibility.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{
    DomainError, DomainResult, ExpectedVersion, ItemId, LocationId, UserId, Versioned,
};

use crate::movement::{MovementRecord, MovementType};
use crate::stock::StockLevel;
use crate::transaction_type::TransactionType;

/// What to do when an outbound change would take stock below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeStockPolicy {
    /// Accept the change; the quantity goes negative (backorder semantics).
    #[default]
    Allow,
    /// Refuse the change with an invariant violation.
    Reject,
}

impl FromStr for NegativeStockPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(NegativeStockPolicy::Allow),
            "reject" => Ok(NegativeStockPolicy::Reject),
            other => Err(DomainError::validation(format!(
                "unknown negative stock policy '{other}' (expected allow or reject)"
            ))),
        }
    }
}

/// Command: apply a signed delta to the stock level of (location, item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub delta: i64,
    pub movement_type: MovementType,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: record a business transaction; the sign comes from its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub location_id: LocationId,
    pub item_id: ItemId,
    /// Positive number of units moved.
    pub quantity: i64,
    pub transaction_type: TransactionType,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl RecordTransaction {
    pub fn to_adjustment(&self) -> DomainResult<AdjustStock> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("transaction quantity must be positive"));
        }
        let direction = self.transaction_type.direction();
        Ok(AdjustStock {
            location_id: self.location_id,
            item_id: self.item_id,
            delta: direction.signed(self.quantity),
            movement_type: direction.movement_type(),
            reference: self.reference.clone(),
            notes: self.notes.clone(),
            actor: self.actor,
            occurred_at: self.occurred_at,
        })
    }
}

/// Command: move units of one item between two locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub item_id: ItemId,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub quantity: i64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl TransferStock {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        if self.from_location == self.to_location {
            return Err(DomainError::validation(
                "transfer source and destination must differ",
            ));
        }
        Ok(())
    }

    pub fn outbound_leg(&self) -> AdjustStock {
        self.leg(self.from_location, -self.quantity)
    }

    pub fn inbound_leg(&self) -> AdjustStock {
        self.leg(self.to_location, self.quantity)
    }

    fn leg(&self, location_id: LocationId, delta: i64) -> AdjustStock {
        AdjustStock {
            location_id,
            item_id: self.item_id,
            delta,
            movement_type: MovementType::Transfer,
            reference: self.reference.clone(),
            notes: self.notes.clone(),
            actor: self.actor,
            occurred_at: self.occurred_at,
        }
    }
}

/// Planned outcome of one adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    /// Stock level state after the change (version + 1).
    pub stock_level: StockLevel,
    /// Version the stored row must still have for the write to apply.
    pub expected_version: ExpectedVersion,
    /// Movement to append, magnitude `|delta|`.
    pub movement: MovementRecord,
}

impl StockLevel {
    /// Decide the outcome of an adjustment against the current state.
    ///
    /// Does not mutate `self`; calling it twice with the same command yields the same
    /// quantities (movement ids differ).
    pub fn plan_adjustment(
        &self,
        cmd: &AdjustStock,
        policy: NegativeStockPolicy,
    ) -> DomainResult<StockAdjustment> {
        if cmd.location_id != self.location_id() || cmd.item_id != self.item_id() {
            return Err(DomainError::invariant(
                "adjustment targets a different location/item than the loaded stock level",
            ));
        }
        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        // The movement stores |delta|, which must stay representable as i64.
        if cmd.delta == i64::MIN {
            return Err(DomainError::validation("delta magnitude out of range"));
        }
        if !cmd.movement_type.accepts(cmd.delta) {
            return Err(DomainError::validation(format!(
                "{} movement cannot carry a delta of {}",
                cmd.movement_type, cmd.delta
            )));
        }

        let new_quantity = self
            .quantity()
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;

        if new_quantity < 0 && cmd.delta < 0 && policy == NegativeStockPolicy::Reject {
            return Err(DomainError::invariant(format!(
                "insufficient stock: {} on hand, {} requested",
                self.quantity(),
                cmd.delta.unsigned_abs()
            )));
        }

        let next = self.with_quantity(new_quantity, cmd.occurred_at);
        let movement = MovementRecord::record(
            &next,
            cmd.delta.unsigned_abs(),
            cmd.movement_type,
            cmd.reference.clone(),
            cmd.notes.clone(),
            cmd.actor,
            cmd.occurred_at,
        );

        Ok(StockAdjustment {
            stock_level: next,
            expected_version: self.expected_version(),
            movement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::OpenStockLevel;
    use proptest::prelude::*;
    use stockbook_core::StockLevelId;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn level_with(quantity: i64) -> StockLevel {
        let cmd = OpenStockLevel {
            initial_quantity: quantity,
            ..OpenStockLevel::empty(LocationId::new(), ItemId::new(), UserId::new(), test_time())
        };
        StockLevel::open(StockLevelId::new(), &cmd).unwrap().0
    }

    fn adjust(level: &StockLevel, delta: i64, movement_type: MovementType) -> AdjustStock {
        AdjustStock {
            location_id: level.location_id(),
            item_id: level.item_id(),
            delta,
            movement_type,
            reference: Some("PO-1".to_string()),
            notes: None,
            actor: UserId::new(),
            occurred_at: test_time(),
        }
    }

    #[test]
    fn plan_applies_delta_and_records_magnitude() {
        let level = level_with(10);
        let plan = level
            .plan_adjustment(&adjust(&level, -4, MovementType::Outbound), NegativeStockPolicy::Allow)
            .unwrap();

        assert_eq!(plan.stock_level.quantity(), 6);
        assert_eq!(plan.stock_level.version(), 2);
        assert_eq!(plan.expected_version, ExpectedVersion::Exact(1));
        assert_eq!(plan.movement.quantity(), 4);
        assert_eq!(plan.movement.movement_type(), MovementType::Outbound);
        assert_eq!(plan.movement.quantity_after(), 6);
        assert_eq!(plan.movement.quantity_before(), Some(10));
        assert_eq!(plan.movement.reference(), Some("PO-1"));
    }

    #[test]
    fn most_negative_delta_is_rejected() {
        let level = level_with(0);
        let err = level
            .plan_adjustment(
                &adjust(&level, i64::MIN, MovementType::Outbound),
                NegativeStockPolicy::Allow,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let plan = level
            .plan_adjustment(
                &adjust(&level, -i64::MAX, MovementType::Outbound),
                NegativeStockPolicy::Allow,
            )
            .unwrap();
        assert_eq!(plan.movement.quantity(), i64::MAX as u64);
        assert_eq!(plan.movement.quantity_before(), Some(0));
    }

    #[test]
    fn planning_does_not_mutate_state() {
        let level = level_with(10);
        let cmd = adjust(&level, 3, MovementType::Inbound);
        let first = level.plan_adjustment(&cmd, NegativeStockPolicy::Allow).unwrap();
        let second = level.plan_adjustment(&cmd, NegativeStockPolicy::Allow).unwrap();

        assert_eq!(level.quantity(), 10);
        assert_eq!(level.version(), 1);
        assert_eq!(first.stock_level, second.stock_level);
    }

    #[test]
    fn zero_delta_is_rejected() {
        let level = level_with(10);
        let err = level
            .plan_adjustment(&adjust(&level, 0, MovementType::Adjustment), NegativeStockPolicy::Allow)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("zero")));
    }

    #[test]
    fn movement_type_must_agree_with_sign() {
        let level = level_with(10);
        let err = level
            .plan_adjustment(&adjust(&level, -2, MovementType::Inbound), NegativeStockPolicy::Allow)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn allow_policy_lets_stock_go_negative() {
        let level = level_with(2);
        let plan = level
            .plan_adjustment(&adjust(&level, -5, MovementType::Outbound), NegativeStockPolicy::Allow)
            .unwrap();
        assert_eq!(plan.stock_level.quantity(), -3);
    }

    #[test]
    fn reject_policy_blocks_insufficient_stock() {
        let level = level_with(2);
        let err = level
            .plan_adjustment(&adjust(&level, -5, MovementType::Outbound), NegativeStockPolicy::Reject)
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) => assert!(msg.contains("insufficient stock")),
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_target_is_an_invariant_violation() {
        let level = level_with(2);
        let mut cmd = adjust(&level, 1, MovementType::Inbound);
        cmd.item_id = ItemId::new();
        let err = level.plan_adjustment(&cmd, NegativeStockPolicy::Allow).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn record_transaction_derives_sign_from_type() {
        let base = RecordTransaction {
            location_id: LocationId::new(),
            item_id: ItemId::new(),
            quantity: 5,
            transaction_type: TransactionType::Sale,
            reference: None,
            notes: None,
            actor: UserId::new(),
            occurred_at: test_time(),
        };
        let sale = base.to_adjustment().unwrap();
        assert_eq!(sale.delta, -5);
        assert_eq!(sale.movement_type, MovementType::Outbound);

        let purchase = RecordTransaction {
            transaction_type: TransactionType::Purchase,
            ..base.clone()
        }
        .to_adjustment()
        .unwrap();
        assert_eq!(purchase.delta, 5);
        assert_eq!(purchase.movement_type, MovementType::Inbound);

        let err = RecordTransaction { quantity: 0, ..base }.to_adjustment().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn transfer_legs_mirror_each_other() {
        let cmd = TransferStock {
            item_id: ItemId::new(),
            from_location: LocationId::new(),
            to_location: LocationId::new(),
            quantity: 7,
            reference: Some("TR-9".to_string()),
            notes: None,
            actor: UserId::new(),
            occurred_at: test_time(),
        };
        cmd.validate().unwrap();
        assert_eq!(cmd.outbound_leg().delta, -7);
        assert_eq!(cmd.inbound_leg().delta, 7);
        assert_eq!(cmd.outbound_leg().movement_type, MovementType::Transfer);
        assert_eq!(cmd.inbound_leg().location_id, cmd.to_location);

        let same = TransferStock {
            to_location: cmd.from_location,
            ..cmd
        };
        assert!(matches!(same.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn policy_parses() {
        assert_eq!("reject".parse::<NegativeStockPolicy>().unwrap(), NegativeStockPolicy::Reject);
        assert_eq!("Allow".parse::<NegativeStockPolicy>().unwrap(), NegativeStockPolicy::Allow);
        assert!("sometimes".parse::<NegativeStockPolicy>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: applying a sequence of adjustments leaves a movement trail whose
        /// balances chain together and end at the final quantity.
        #[test]
        fn movement_balances_chain_to_final_quantity(
            start in 0i64..1_000,
            deltas in prop::collection::vec((-500i64..500).prop_filter("non-zero", |d| *d != 0), 1..20)
        ) {
            let mut level = level_with(start);
            let mut previous_balance = start;

            for delta in deltas {
                let plan = level
                    .plan_adjustment(&adjust(&level, delta, MovementType::Adjustment), NegativeStockPolicy::Allow)
                    .unwrap();

                prop_assert_eq!(plan.movement.quantity(), delta.unsigned_abs());
                prop_assert_eq!(
                    (plan.movement.quantity_after() - previous_balance).unsigned_abs(),
                    plan.movement.quantity()
                );
                previous_balance = plan.movement.quantity_after();
                level = plan.stock_level;
            }

            prop_assert_eq!(level.quantity(), previous_balance);
        }
    }
}
