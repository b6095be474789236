//! Sale composition and maintenance.
//!
//! `create_sale` records a sale and nothing else: stock is untouched. Callers that want
//! the sale and its stock decrement to land together use
//! `create_sale_with_stock_decrement`, which builds both into one unit of work.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use stockbook_core::{SaleId, Versioned};
use stockbook_inventory::{AdjustStock, MovementType, StockLevel};
use stockbook_sales::{NewSale, SaleHeader, SaleStatus, SaleTransaction, SaleUpdate};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::stage;
use crate::retry::retry_on_conflict;
use crate::store::{LedgerStore, Pagination, SaleFilter, SalePage, UnitOfWork};

#[derive(Debug)]
pub struct SaleComposer<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> SaleComposer<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: LedgerStore> SaleComposer<S> {
    /// Price and persist a sale with all of its lines. Stock levels are not touched.
    #[instrument(
        skip(self, new),
        fields(location_id = %new.location_id, line_count = new.lines.len()),
        err
    )]
    pub fn create_sale(&self, new: NewSale) -> LedgerResult<SaleTransaction> {
        let sale = SaleTransaction::compose(SaleId::new(), new)?;
        let mut work = UnitOfWork::new();
        stage_sale(&mut work, &sale);
        self.store.commit(work)?;

        info!(sale_id = %sale.id(), total = sale.total_amount(), "sale recorded");
        Ok(sale)
    }

    /// Persist a sale and decrement stock for every line in one unit of work.
    ///
    /// Each line appends an outbound movement referencing the sale id. Lines for the same
    /// item are applied in order against consecutive versions of that stock level. A line
    /// whose item has no stock level at the sale's location aborts the whole sale.
    #[instrument(
        skip(self, new),
        fields(location_id = %new.location_id, line_count = new.lines.len()),
        err
    )]
    pub fn create_sale_with_stock_decrement(
        &self,
        new: NewSale,
    ) -> LedgerResult<(SaleTransaction, Vec<StockLevel>)> {
        let sale = SaleTransaction::compose(SaleId::new(), new)?;
        let reference = sale.id().to_string();

        retry_on_conflict("create_sale_with_stock_decrement", self.config.max_conflict_retries, || {
            let header = sale.header();
            let mut work = UnitOfWork::new();
            stage_sale(&mut work, &sale);

            // Latest planned state per stock level, so repeated items chain their versions.
            let mut touched: Vec<StockLevel> = Vec::new();
            for line in sale.lines() {
                let current = match touched.iter().position(|l| l.item_id() == line.item_id) {
                    Some(idx) => touched.remove(idx),
                    None => self
                        .store
                        .stock_level(header.location_id, line.item_id)?
                        .ok_or_else(|| {
                            LedgerError::not_found(format!(
                                "stock level for location {} / item {} (sale line {})",
                                header.location_id, line.item_id, line.line_no
                            ))
                        })?,
                };

                let cmd = AdjustStock {
                    location_id: header.location_id,
                    item_id: line.item_id,
                    delta: -line.quantity,
                    movement_type: MovementType::Outbound,
                    reference: Some(reference.clone()),
                    notes: None,
                    actor: header.cashier_id,
                    occurred_at: header.created_at,
                };
                let plan = current.plan_adjustment(&cmd, self.config.negative_stock)?;
                stage(&mut work, &plan);
                touched.push(plan.stock_level);
            }

            self.store.commit(work)?;

            for level in touched.iter().filter(|l| l.quantity() < 0) {
                warn!(stock_level_id = %level.id(), quantity = level.quantity(), "stock level went negative");
            }
            info!(
                sale_id = %sale.id(),
                total = sale.total_amount(),
                levels_updated = touched.len(),
                "sale recorded with stock decrement"
            );
            Ok((sale.clone(), touched))
        })
    }

    #[instrument(skip(self), fields(sale_id = %id), err)]
    pub fn sale(&self, id: SaleId) -> LedgerResult<SaleTransaction> {
        self.store
            .sale(id)?
            .ok_or_else(|| LedgerError::not_found(format!("sale {id}")))
    }

    #[instrument(skip(self, filter), err)]
    pub fn sales(&self, filter: &SaleFilter, pagination: Option<Pagination>) -> LedgerResult<SalePage> {
        let pagination = pagination
            .unwrap_or_else(|| Pagination::new(Some(self.config.default_page_size), None));
        Ok(self.store.sales(filter, pagination)?)
    }

    /// Edit customer, payment method and notes. The stored total is left as is.
    ///
    /// The edit is applied to the latest header; a concurrent status change is kept.
    #[instrument(skip(self, update), fields(sale_id = %id), err)]
    pub fn update_sale(&self, id: SaleId, update: SaleUpdate) -> LedgerResult<SaleTransaction> {
        retry_on_conflict("update_sale", self.config.max_conflict_retries, || {
            let current = self.sale(id)?;
            let header = current.header().apply_update(&update);
            self.replace_header(current, header)
        })
    }

    #[instrument(skip(self), fields(sale_id = %id, to = %to), err)]
    pub fn change_status(
        &self,
        id: SaleId,
        to: SaleStatus,
        at: DateTime<Utc>,
    ) -> LedgerResult<SaleTransaction> {
        retry_on_conflict("change_status", self.config.max_conflict_retries, || {
            let current = self.sale(id)?;
            let header = current.header().transition(to, at)?;
            self.replace_header(current, header)
        })
    }

    /// Remove a sale: its lines first, then the header, in one unit of work.
    #[instrument(skip(self), fields(sale_id = %id), err)]
    pub fn delete_sale(&self, id: SaleId) -> LedgerResult<()> {
        let sale = self.sale(id)?;
        let mut work = UnitOfWork::new();
        work.delete_sale_lines(id).delete_sale_header(id);
        self.store.commit(work)?;

        info!(sale_id = %id, lines_removed = sale.lines().len(), "sale deleted");
        Ok(())
    }

    /// Write `header` over `current`, guarded by the version `current` was read at.
    fn replace_header(
        &self,
        current: SaleTransaction,
        header: SaleHeader,
    ) -> LedgerResult<SaleTransaction> {
        let mut work = UnitOfWork::new();
        work.update_sale_header(header.clone(), current.header().expected_version());
        self.store.commit(work)?;

        let (_, lines) = current.into_parts();
        info!(sale_id = %header.id, status = %header.status, "sale updated");
        Ok(SaleTransaction::from_parts(header, lines))
    }
}

/// Header first, then lines, so a line never precedes its owner.
fn stage_sale(work: &mut UnitOfWork, sale: &SaleTransaction) {
    work.insert_sale_header(sale.header().clone());
    for line in sale.lines() {
        work.insert_sale_line(line.clone());
    }
}
