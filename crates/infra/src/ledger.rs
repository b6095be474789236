//! Stock ledger service: the only sanctioned mutator of on-hand quantities.
//!
//! Every write follows the same cycle:
//!
//! ```text
//! read stock level(s) ─► pure plan (stockbook-inventory) ─► UnitOfWork ─► commit
//!        ▲                                                                   │
//!        └──────────────── retry on version conflict ◄──────────────────────┘
//! ```
//!
//! The quantity update and its movement always travel in the same unit of work, so the
//! log and the current quantity cannot drift apart.

use serde::{Deserialize, Serialize};
use tracing::{Span, info, instrument, warn};

use stockbook_core::{ItemId, LocationId, StockLevelId, Versioned};
use stockbook_inventory::{
    AdjustStock, OpenStockLevel, RecordTransaction, StockAdjustment, StockLevel, TransferStock,
};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::retry::retry_on_conflict;
use crate::store::{LedgerStore, MovementFilter, MovementPage, Pagination, StoreError, UnitOfWork};

/// A stock level at or below its reorder point, with the quantity to order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderSuggestion {
    pub stock_level: StockLevel,
    pub suggested_quantity: i64,
}

#[derive(Debug)]
pub struct StockLedger<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> StockLedger<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }
}

impl<S: LedgerStore> StockLedger<S> {
    #[instrument(skip(self), fields(location_id = %location_id, item_id = %item_id), err)]
    pub fn stock_level(
        &self,
        location_id: LocationId,
        item_id: ItemId,
    ) -> LedgerResult<Option<StockLevel>> {
        Ok(self.store.stock_level(location_id, item_id)?)
    }

    /// Open the stock level for a (location, item) pair.
    ///
    /// Fails with `Conflict` if one already exists. A positive initial quantity is
    /// recorded as an inbound movement in the same unit of work.
    #[instrument(
        skip(self, cmd),
        fields(location_id = %cmd.location_id, item_id = %cmd.item_id, initial_quantity = cmd.initial_quantity),
        err
    )]
    pub fn create_stock_level(&self, cmd: OpenStockLevel) -> LedgerResult<StockLevel> {
        if self
            .store
            .stock_level(cmd.location_id, cmd.item_id)?
            .is_some()
        {
            return Err(LedgerError::Conflict(format!(
                "stock level already exists for location {} / item {}",
                cmd.location_id, cmd.item_id
            )));
        }

        let (level, opening) = StockLevel::open(StockLevelId::new(), &cmd)?;
        let mut work = UnitOfWork::new();
        work.create_stock_level(level.clone());
        if let Some(movement) = opening {
            work.append_movement(movement);
        }
        self.store.commit(work)?;

        info!(stock_level_id = %level.id(), quantity = level.quantity(), "stock level opened");
        Ok(level)
    }

    /// Apply a signed delta to an existing stock level and log one movement.
    ///
    /// Not idempotent: every call appends a movement.
    #[instrument(
        skip(self, cmd),
        fields(
            location_id = %cmd.location_id,
            item_id = %cmd.item_id,
            delta = cmd.delta,
            movement_type = %cmd.movement_type,
            stock_level_id = tracing::field::Empty
        ),
        err
    )]
    pub fn adjust(&self, cmd: AdjustStock) -> LedgerResult<StockLevel> {
        retry_on_conflict("adjust", self.config.max_conflict_retries, || {
            let current = self.require(cmd.location_id, cmd.item_id)?;
            let plan = current.plan_adjustment(&cmd, self.config.negative_stock)?;
            let mut work = UnitOfWork::new();
            stage(&mut work, &plan);
            self.store.commit(work)?;
            Ok(self.committed(plan))
        })
    }

    /// Adjust by a transaction type; the sign comes from the type.
    #[instrument(
        skip(self, cmd),
        fields(transaction_type = %cmd.transaction_type, quantity = cmd.quantity),
        err
    )]
    pub fn record_transaction(&self, cmd: RecordTransaction) -> LedgerResult<StockLevel> {
        let adjustment = cmd.to_adjustment()?;
        self.adjust(adjustment)
    }

    /// Inbound adjustment that opens the stock level on first receipt.
    ///
    /// Two first receipts racing on the same pair both succeed: the loser re-reads the
    /// level the winner opened and adjusts it.
    #[instrument(
        skip(self, cmd),
        fields(location_id = %cmd.location_id, item_id = %cmd.item_id, delta = cmd.delta),
        err
    )]
    pub fn receive(&self, cmd: AdjustStock) -> LedgerResult<StockLevel> {
        if cmd.delta <= 0 {
            return Err(LedgerError::Validation(
                "received quantity must be positive".to_string(),
            ));
        }

        retry_on_conflict("receive", self.config.max_conflict_retries, || {
            let mut work = UnitOfWork::new();
            let (plan, opened) = self.plan_receipt(&cmd, &mut work)?;
            self.commit_receipt(work, opened)?;
            Ok(self.committed(plan))
        })
    }

    /// Move stock between two locations in one unit of work.
    ///
    /// Returns `(source, destination)` after the move.
    #[instrument(
        skip(self, cmd),
        fields(
            item_id = %cmd.item_id,
            from_location = %cmd.from_location,
            to_location = %cmd.to_location,
            quantity = cmd.quantity
        ),
        err
    )]
    pub fn transfer(&self, cmd: TransferStock) -> LedgerResult<(StockLevel, StockLevel)> {
        cmd.validate()?;
        let outbound = cmd.outbound_leg();
        let inbound = cmd.inbound_leg();

        retry_on_conflict("transfer", self.config.max_conflict_retries, || {
            let source = self.require(cmd.from_location, cmd.item_id)?;
            let out_plan = source.plan_adjustment(&outbound, self.config.negative_stock)?;

            let mut work = UnitOfWork::new();
            stage(&mut work, &out_plan);
            let (in_plan, opened) = self.plan_receipt(&inbound, &mut work)?;
            self.commit_receipt(work, opened)?;

            Ok((self.committed(out_plan), self.committed(in_plan)))
        })
    }

    /// Movements matching `filter`, newest first.
    #[instrument(skip(self, filter), err)]
    pub fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Option<Pagination>,
    ) -> LedgerResult<MovementPage> {
        let pagination = pagination
            .unwrap_or_else(|| Pagination::new(Some(self.config.default_page_size), None));
        Ok(self.store.movements(filter, pagination)?)
    }

    /// Stock levels at `location_id` that sit at or below their reorder point.
    #[instrument(skip(self), fields(location_id = %location_id), err)]
    pub fn reorder_candidates(&self, location_id: LocationId) -> LedgerResult<Vec<ReorderSuggestion>> {
        Ok(self
            .store
            .stock_levels_at(location_id)?
            .into_iter()
            .filter(StockLevel::needs_reorder)
            .map(|level| ReorderSuggestion {
                suggested_quantity: level.suggested_reorder_quantity(),
                stock_level: level,
            })
            .collect())
    }

    fn require(&self, location_id: LocationId, item_id: ItemId) -> LedgerResult<StockLevel> {
        self.store.stock_level(location_id, item_id)?.ok_or_else(|| {
            LedgerError::not_found(format!(
                "stock level for location {location_id} / item {item_id}"
            ))
        })
    }

    /// Plan an inbound change, opening an empty stock level first when none exists.
    ///
    /// The flag is true when the plan stages the creation of the level.
    fn plan_receipt(
        &self,
        cmd: &AdjustStock,
        work: &mut UnitOfWork,
    ) -> LedgerResult<(StockAdjustment, bool)> {
        let (current, opened) = match self.store.stock_level(cmd.location_id, cmd.item_id)? {
            Some(level) => (level, false),
            None => {
                let open =
                    OpenStockLevel::empty(cmd.location_id, cmd.item_id, cmd.actor, cmd.occurred_at);
                let (level, _) = StockLevel::open(StockLevelId::new(), &open)?;
                work.create_stock_level(level.clone());
                (level, true)
            }
        };
        let plan = current.plan_adjustment(cmd, self.config.negative_stock)?;
        stage(work, &plan);
        Ok((plan, opened))
    }

    /// Commit a receipt. If the level was opened by someone else since it was read,
    /// the duplicate is a lost race, reported as `Concurrency` so the cycle re-runs.
    fn commit_receipt(&self, work: UnitOfWork, opened: bool) -> LedgerResult<()> {
        match self.store.commit(work) {
            Err(StoreError::Duplicate(msg)) if opened => Err(LedgerError::Concurrency(format!(
                "stock level opened concurrently: {msg}"
            ))),
            other => Ok(other?),
        }
    }

    fn committed(&self, plan: StockAdjustment) -> StockLevel {
        let level = plan.stock_level;
        Span::current().record("stock_level_id", tracing::field::display(level.id()));
        if level.quantity() < 0 {
            warn!(
                stock_level_id = %level.id(),
                quantity = level.quantity(),
                "stock level went negative"
            );
        }
        info!(
            stock_level_id = %level.id(),
            movement_id = %plan.movement.id(),
            movement_type = %plan.movement.movement_type(),
            quantity = level.quantity(),
            version = level.version(),
            "stock adjusted"
        );
        level
    }
}

/// Quantity write and movement append for one planned adjustment.
pub(crate) fn stage(work: &mut UnitOfWork, plan: &StockAdjustment) {
    work.set_quantity(
        plan.stock_level.id(),
        plan.expected_version,
        plan.stock_level.quantity(),
        plan.stock_level.updated_at(),
    )
    .append_movement(plan.movement.clone());
}
