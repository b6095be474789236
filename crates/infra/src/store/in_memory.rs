//! In-memory `LedgerStore` for tests and local development.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use stockbook_core::{ItemId, LocationId, SaleId, StockLevelId};
use stockbook_inventory::{MovementRecord, StockLevel, StockLevelParts};
use stockbook_sales::{SaleHeader, SaleLineItem, SaleTransaction};

use super::query::{MovementFilter, MovementPage, Pagination, SaleFilter, SalePage};
use super::r#trait::{Change, ChangeKind, LedgerStore, StoreError, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Tables {
    stock_levels: HashMap<StockLevelId, StockLevel>,
    stock_index: HashMap<(LocationId, ItemId), StockLevelId>,
    /// Insertion order doubles as the tie-breaker for equal timestamps.
    movements: Vec<MovementRecord>,
    sale_headers: HashMap<SaleId, SaleHeader>,
    sale_lines: HashMap<SaleId, Vec<SaleLineItem>>,
}

impl Tables {
    fn apply(&mut self, change: Change) -> Result<(), StoreError> {
        match change {
            Change::CreateStockLevel(level) => {
                let key = (level.location_id(), level.item_id());
                if self.stock_index.contains_key(&key) {
                    return Err(StoreError::Duplicate(format!(
                        "stock level already exists for location {} / item {}",
                        key.0, key.1
                    )));
                }
                if self.stock_levels.contains_key(&level.id()) {
                    return Err(StoreError::Duplicate(format!("stock level id {}", level.id())));
                }
                self.stock_index.insert(key, level.id());
                self.stock_levels.insert(level.id(), level);
            }
            Change::SetQuantity {
                stock_level_id,
                expected_version,
                quantity,
                updated_at,
            } => {
                let current = self.stock_levels.get(&stock_level_id).ok_or_else(|| {
                    StoreError::MissingRow(format!("stock level {stock_level_id}"))
                })?;
                let version = stockbook_core::Versioned::version(current);
                if !expected_version.matches(version) {
                    return Err(StoreError::Concurrency(format!(
                        "stock level {stock_level_id}: expected {expected_version:?}, found {version}"
                    )));
                }
                let next = StockLevel::restore(StockLevelParts {
                    id: current.id(),
                    location_id: current.location_id(),
                    item_id: current.item_id(),
                    quantity,
                    thresholds: current.thresholds().clone(),
                    lot_number: current.lot_number().map(str::to_string),
                    expires_at: current.expires_at(),
                    version: version + 1,
                    created_at: current.created_at(),
                    updated_at,
                });
                self.stock_levels.insert(stock_level_id, next);
            }
            Change::AppendMovement(movement) => {
                if !self.stock_levels.contains_key(&movement.stock_level_id()) {
                    return Err(StoreError::MissingRow(format!(
                        "movement references unknown stock level {}",
                        movement.stock_level_id()
                    )));
                }
                if self.movements.iter().any(|m| m.id() == movement.id()) {
                    return Err(StoreError::Duplicate(format!("movement id {}", movement.id())));
                }
                self.movements.push(movement);
            }
            Change::InsertSaleHeader(header) => {
                if self.sale_headers.contains_key(&header.id) {
                    return Err(StoreError::Duplicate(format!("sale {}", header.id)));
                }
                self.sale_headers.insert(header.id, header);
            }
            Change::InsertSaleLine(line) => {
                if !self.sale_headers.contains_key(&line.sale_id) {
                    return Err(StoreError::MissingRow(format!(
                        "line references unknown sale {}",
                        line.sale_id
                    )));
                }
                let lines = self.sale_lines.entry(line.sale_id).or_default();
                if lines.iter().any(|l| l.line_no == line.line_no || l.id == line.id) {
                    return Err(StoreError::Duplicate(format!(
                        "sale {} line {}",
                        line.sale_id, line.line_no
                    )));
                }
                lines.push(line);
            }
            Change::UpdateSaleHeader {
                mut header,
                expected_version,
            } => {
                let slot = self
                    .sale_headers
                    .get_mut(&header.id)
                    .ok_or_else(|| StoreError::MissingRow(format!("sale {}", header.id)))?;
                if !expected_version.matches(slot.version) {
                    return Err(StoreError::Concurrency(format!(
                        "sale {}: expected {expected_version:?}, found {}",
                        header.id, slot.version
                    )));
                }
                header.version = slot.version + 1;
                *slot = header;
            }
            Change::DeleteSaleLines(sale_id) => {
                self.sale_lines.remove(&sale_id);
            }
            Change::DeleteSaleHeader(sale_id) => {
                if self.sale_lines.get(&sale_id).is_some_and(|l| !l.is_empty()) {
                    return Err(StoreError::Integrity(format!(
                        "sale {sale_id} still owns line items"
                    )));
                }
                self.sale_headers
                    .remove(&sale_id)
                    .ok_or_else(|| StoreError::MissingRow(format!("sale {sale_id}")))?;
            }
        }
        Ok(())
    }

    fn sale(&self, id: SaleId) -> Option<SaleTransaction> {
        let header = self.sale_headers.get(&id)?.clone();
        let lines = self.sale_lines.get(&id).cloned().unwrap_or_default();
        Some(SaleTransaction::from_parts(header, lines))
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Not optimized for performance: every commit stages its
/// changes on a copy of the tables and swaps it in only when all of them applied.
///
/// Supports one-shot fault injection per [`ChangeKind`] to exercise rollback paths.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
    faults: Mutex<Vec<ChangeKind>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next change of `kind` fail with a backend error, aborting its commit.
    pub fn fail_next(&self, kind: ChangeKind) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(kind);
        }
    }

    /// Every movement in append order (oldest first).
    pub fn all_movements(&self) -> Vec<MovementRecord> {
        self.tables
            .read()
            .map(|t| t.movements.clone())
            .unwrap_or_default()
    }

    /// Number of stored line items, across all sales.
    pub fn sale_line_count(&self) -> usize {
        self.tables
            .read()
            .map(|t| t.sale_lines.values().map(Vec::len).sum())
            .unwrap_or_default()
    }

    fn take_fault(&self, kind: ChangeKind) -> bool {
        let Ok(mut faults) = self.faults.lock() else {
            return false;
        };
        match faults.iter().position(|k| *k == kind) {
            Some(idx) => {
                faults.remove(idx);
                true
            }
            None => false,
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn stock_level(
        &self,
        location_id: LocationId,
        item_id: ItemId,
    ) -> Result<Option<StockLevel>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .stock_index
            .get(&(location_id, item_id))
            .and_then(|id| tables.stock_levels.get(id))
            .cloned())
    }

    fn stock_level_by_id(&self, id: StockLevelId) -> Result<Option<StockLevel>, StoreError> {
        Ok(self.read()?.stock_levels.get(&id).cloned())
    }

    fn stock_levels_at(&self, location_id: LocationId) -> Result<Vec<StockLevel>, StoreError> {
        let tables = self.read()?;
        let mut levels: Vec<StockLevel> = tables
            .stock_levels
            .values()
            .filter(|l| l.location_id() == location_id)
            .cloned()
            .collect();
        levels.sort_by_key(|l| l.item_id());
        Ok(levels)
    }

    fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let tables = self.read()?;
        let mut matching: Vec<(usize, &MovementRecord)> = tables
            .movements
            .iter()
            .enumerate()
            .filter(|(_, m)| filter.matches(m))
            .collect();
        // Newest first; later appends win ties.
        matching.sort_by(|(ia, a), (ib, b)| {
            b.occurred_at().cmp(&a.occurred_at()).then(ib.cmp(ia))
        });

        let ordered = matching.into_iter().map(|(_, m)| m.clone()).collect();
        let (movements, total, has_more) = pagination.apply(ordered);
        Ok(MovementPage {
            movements,
            total,
            pagination,
            has_more,
        })
    }

    fn sale(&self, id: SaleId) -> Result<Option<SaleTransaction>, StoreError> {
        Ok(self.read()?.sale(id))
    }

    fn sales(&self, filter: &SaleFilter, pagination: Pagination) -> Result<SalePage, StoreError> {
        let tables = self.read()?;
        let mut matching: Vec<SaleTransaction> = tables
            .sale_headers
            .keys()
            .filter_map(|id| tables.sale(*id))
            .filter(|s| filter.matches(s))
            .collect();
        matching.sort_by(|a, b| {
            b.header()
                .created_at
                .cmp(&a.header().created_at)
                .then(b.id().cmp(&a.id()))
        });

        let (sales, total, has_more) = pagination.apply(matching);
        Ok(SalePage {
            sales,
            total,
            pagination,
            has_more,
        })
    }

    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError> {
        if work.is_empty() {
            return Ok(());
        }

        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let mut staged = tables.clone();
        for change in work.into_changes() {
            if self.take_fault(change.kind()) {
                return Err(StoreError::Backend(format!(
                    "injected failure on {:?}",
                    change.kind()
                )));
            }
            staged.apply(change)?;
        }

        *tables = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use stockbook_core::{ExpectedVersion, UserId, Versioned};
    use stockbook_inventory::{AdjustStock, MovementType, NegativeStockPolicy, OpenStockLevel};

    use super::*;

    fn open(store: &InMemoryLedgerStore, quantity: i64) -> StockLevel {
        let cmd = OpenStockLevel {
            initial_quantity: quantity,
            ..OpenStockLevel::empty(LocationId::new(), ItemId::new(), UserId::new(), Utc::now())
        };
        let (level, opening) = StockLevel::open(StockLevelId::new(), &cmd).unwrap();
        let mut work = UnitOfWork::new();
        work.create_stock_level(level.clone());
        if let Some(m) = opening {
            work.append_movement(m);
        }
        store.commit(work).unwrap();
        level
    }

    fn adjustment_work(level: &StockLevel, delta: i64) -> UnitOfWork {
        let plan = level
            .plan_adjustment(
                &AdjustStock {
                    location_id: level.location_id(),
                    item_id: level.item_id(),
                    delta,
                    movement_type: MovementType::Adjustment,
                    reference: None,
                    notes: None,
                    actor: UserId::new(),
                    occurred_at: Utc::now(),
                },
                NegativeStockPolicy::Allow,
            )
            .unwrap();
        let mut work = UnitOfWork::new();
        work.set_quantity(
            plan.stock_level.id(),
            plan.expected_version,
            plan.stock_level.quantity(),
            plan.stock_level.updated_at(),
        )
        .append_movement(plan.movement);
        work
    }

    #[test]
    fn second_stock_level_for_same_pair_is_duplicate() {
        let store = InMemoryLedgerStore::new();
        let level = open(&store, 0);

        let cmd = OpenStockLevel::empty(level.location_id(), level.item_id(), UserId::new(), Utc::now());
        let (dup, _) = StockLevel::open(StockLevelId::new(), &cmd).unwrap();
        let mut work = UnitOfWork::new();
        work.create_stock_level(dup);
        assert!(matches!(store.commit(work), Err(StoreError::Duplicate(_))));
    }

    #[test]
    fn set_quantity_bumps_version() {
        let store = InMemoryLedgerStore::new();
        let level = open(&store, 5);
        store.commit(adjustment_work(&level, 3)).unwrap();

        let stored = store.stock_level_by_id(level.id()).unwrap().unwrap();
        assert_eq!(stored.quantity(), 8);
        assert_eq!(stored.version(), 2);
    }

    #[test]
    fn stale_version_is_a_concurrency_error() {
        let store = InMemoryLedgerStore::new();
        let level = open(&store, 5);
        store.commit(adjustment_work(&level, 1)).unwrap();

        let err = store.commit(adjustment_work(&level, 1)).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(store.stock_level_by_id(level.id()).unwrap().unwrap().quantity(), 6);
    }

    #[test]
    fn injected_failure_rolls_back_the_whole_unit() {
        let store = InMemoryLedgerStore::new();
        let level = open(&store, 5);
        let before = store.all_movements().len();

        store.fail_next(ChangeKind::AppendMovement);
        let err = store.commit(adjustment_work(&level, 4)).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        assert_eq!(store.stock_level_by_id(level.id()).unwrap().unwrap().quantity(), 5);
        assert_eq!(store.all_movements().len(), before);

        // One-shot: the next commit goes through.
        store.commit(adjustment_work(&level, 4)).unwrap();
        assert_eq!(store.stock_level_by_id(level.id()).unwrap().unwrap().quantity(), 9);
    }

    #[test]
    fn any_version_skips_the_guard() {
        let store = InMemoryLedgerStore::new();
        let level = open(&store, 5);
        let mut work = UnitOfWork::new();
        work.set_quantity(level.id(), ExpectedVersion::Any, 1, Utc::now());
        store.commit(work).unwrap();
        assert_eq!(store.stock_level_by_id(level.id()).unwrap().unwrap().quantity(), 1);
    }

    #[test]
    fn stock_levels_at_only_returns_that_location() {
        let store = InMemoryLedgerStore::new();
        let level = open(&store, 1);
        open(&store, 2);

        let levels = store.stock_levels_at(level.location_id()).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].id(), level.id());
        assert!(store.stock_levels_at(LocationId::new()).unwrap().is_empty());
    }

    #[test]
    fn movement_pages_are_newest_first() {
        let store = InMemoryLedgerStore::new();
        let mut level = open(&store, 1);
        for delta in [2, 3, 4] {
            store.commit(adjustment_work(&level, delta)).unwrap();
            level = store.stock_level_by_id(level.id()).unwrap().unwrap();
        }

        let filter = MovementFilter::for_stock_level(level.id());
        let page = store.movements(&filter, Pagination::new(Some(2), None)).unwrap();
        assert_eq!(page.total, 4);
        assert!(page.has_more);
        let after: Vec<i64> = page.movements.iter().map(|m| m.quantity_after()).collect();
        assert_eq!(after, vec![10, 6]);

        let rest = store.movements(&filter, Pagination::new(Some(2), Some(2))).unwrap();
        assert!(!rest.has_more);
        assert_eq!(rest.movements.last().map(|m| m.quantity_after()), Some(1));
    }

    #[test]
    fn movement_for_unknown_stock_level_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let other = InMemoryLedgerStore::new();
        let level = open(&other, 5);
        let err = store.commit(adjustment_work(&level, 1)).unwrap_err();
        assert!(matches!(err, StoreError::MissingRow(_)));
    }
}
