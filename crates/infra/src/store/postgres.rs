//! Postgres-backed ledger store.
//!
//! A unit of work runs inside one SQL transaction, so partial writes never become
//! visible. The movement table is append-only at the database level as well: a
//! trigger rejects every `UPDATE` and `DELETE` on it.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Second stock level for a location/item, reused id |
//! | Database (foreign key violation) | `23503` | `MissingRow` | Movement or line pointing at a missing parent |
//! | Database (check constraint violation) | `23514` | `Integrity` | Row outside its declared domain |
//! | Database (serialization failure) | `40001` | `Concurrency` | Concurrent transaction won |
//! | Database (object state) | `55000` | `Integrity` | Attempt to rewrite the movement log |
//! | Database (other) / PoolClosed / Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresLedgerStore` is `Send + Sync`; the SQLx pool handles connection sharing.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tokio::runtime::RuntimeFlavor;
use tracing::{Span, instrument};

use stockbook_core::{
    CustomerId, ExpectedVersion, ItemId, LocationId, MovementId, SaleId, SaleLineId, StockLevelId,
    UserId,
};
use stockbook_inventory::{MovementParts, MovementRecord, StockLevel, StockLevelParts, StockThresholds};
use stockbook_sales::{Percent, SaleHeader, SaleLineItem, SaleTransaction};

use super::query::{MovementFilter, MovementPage, Pagination, SaleFilter, SalePage};
use super::r#trait::{Change, LedgerStore, StoreError, UnitOfWork};

/// Schema for the ledger tables (idempotent).
pub const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

/// Postgres-backed ledger store.
///
/// ## Optimistic Concurrency
///
/// `SetQuantity` is an `UPDATE ... WHERE id = $1 AND version = $2`. When no row is
/// affected the store checks whether the row exists at all, reporting `MissingRow`
/// or `Concurrency` accordingly, and the whole transaction is rolled back.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    /// Create a new PostgresLedgerStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the ledger tables and the append-only trigger if they are missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(location_id = %location_id, item_id = %item_id),
        err
    )]
    pub async fn load_stock_level(
        &self,
        location_id: LocationId,
        item_id: ItemId,
    ) -> Result<Option<StockLevel>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_LEVEL_COLUMNS} FROM stock_levels WHERE location_id = $1 AND item_id = $2"
        ))
        .bind(location_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stock_level", e))?;

        row.map(|r| decode::<StockLevelRow>(&r).map(StockLevel::from))
            .transpose()
    }

    #[instrument(skip(self), fields(stock_level_id = %id), err)]
    pub async fn load_stock_level_by_id(
        &self,
        id: StockLevelId,
    ) -> Result<Option<StockLevel>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_LEVEL_COLUMNS} FROM stock_levels WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stock_level_by_id", e))?;

        row.map(|r| decode::<StockLevelRow>(&r).map(StockLevel::from))
            .transpose()
    }

    #[instrument(
        skip(self),
        fields(location_id = %location_id, level_count = tracing::field::Empty),
        err
    )]
    pub async fn load_stock_levels_at(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockLevel>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {STOCK_LEVEL_COLUMNS} FROM stock_levels WHERE location_id = $1 ORDER BY item_id"
        ))
        .bind(location_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stock_levels_at", e))?;

        let levels = rows
            .iter()
            .map(|r| decode::<StockLevelRow>(r).map(StockLevel::from))
            .collect::<Result<Vec<_>, _>>()?;
        Span::current().record("level_count", levels.len());
        Ok(levels)
    }

    /// Movements matching `filter`, newest first.
    #[instrument(
        skip(self, filter),
        fields(
            limit = pagination.limit,
            offset = pagination.offset,
            movement_count = tracing::field::Empty
        ),
        err
    )]
    pub async fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR stock_level_id = $1)
                AND ($2::uuid IS NULL OR location_id = $2)
                AND ($3::uuid IS NULL OR item_id = $3)
                AND ($4::text IS NULL OR movement_type = $4)
                AND ($5::text IS NULL OR reference = $5)
                AND ($6::timestamptz IS NULL OR occurred_at > $6)
                AND ($7::timestamptz IS NULL OR occurred_at < $7)
        "#;

        let stock_level_id = filter.stock_level_id.map(|id| *id.as_uuid());
        let location_id = filter.location_id.map(|id| *id.as_uuid());
        let item_id = filter.item_id.map(|id| *id.as_uuid());
        let movement_type = filter.movement_type.map(|t| t.as_str());
        let reference = filter.reference.as_deref();

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM stock_movements {WHERE}"))
            .bind(stock_level_id)
            .bind(location_id)
            .bind(item_id)
            .bind(movement_type)
            .bind(reference)
            .bind(filter.occurred_after)
            .bind(filter.occurred_before)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements {WHERE} \
             ORDER BY occurred_at DESC, seq DESC LIMIT $8 OFFSET $9"
        ))
        .bind(stock_level_id)
        .bind(location_id)
        .bind(item_id)
        .bind(movement_type)
        .bind(reference)
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .bind(i64::from(pagination.limit()))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_movements", e))?;

        let movements = rows
            .iter()
            .map(|r| decode::<MovementRow>(r).and_then(MovementRecord::try_from))
            .collect::<Result<Vec<_>, _>>()?;

        let total = total.max(0) as u64;
        let has_more = u64::from(pagination.offset) + (movements.len() as u64) < total;
        Span::current().record("movement_count", movements.len());
        Ok(MovementPage {
            movements,
            total,
            pagination,
            has_more,
        })
    }

    #[instrument(skip(self), fields(sale_id = %id), err)]
    pub async fn load_sale(&self, id: SaleId) -> Result<Option<SaleTransaction>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_sale", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let header = SaleHeader::try_from(decode::<SaleHeaderRow>(&row)?)?;
        let mut lines = self.load_lines(&[*id.as_uuid()]).await?;
        Ok(Some(SaleTransaction::from_parts(
            header,
            lines.remove(&id).unwrap_or_default(),
        )))
    }

    /// Sales matching `filter`, newest first.
    #[instrument(skip(self, filter), fields(limit = pagination.limit, offset = pagination.offset), err)]
    pub async fn query_sales(
        &self,
        filter: &SaleFilter,
        pagination: Pagination,
    ) -> Result<SalePage, StoreError> {
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR location_id = $1)
                AND ($2::uuid IS NULL OR cashier_id = $2)
                AND ($3::uuid IS NULL OR customer_id = $3)
                AND ($4::text IS NULL OR status = $4)
                AND ($5::timestamptz IS NULL OR created_at > $5)
                AND ($6::timestamptz IS NULL OR created_at < $6)
        "#;

        let location_id = filter.location_id.map(|id| *id.as_uuid());
        let cashier_id = filter.cashier_id.map(|id| *id.as_uuid());
        let customer_id = filter.customer_id.map(|id| *id.as_uuid());
        let status = filter.status.map(|s| s.as_str());

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM sales {WHERE}"))
            .bind(location_id)
            .bind(cashier_id)
            .bind(customer_id)
            .bind(status)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_sales", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_sales", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {SALE_COLUMNS} FROM sales {WHERE} \
             ORDER BY created_at DESC, id DESC LIMIT $7 OFFSET $8"
        ))
        .bind(location_id)
        .bind(cashier_id)
        .bind(customer_id)
        .bind(status)
        .bind(filter.created_after)
        .bind(filter.created_before)
        .bind(i64::from(pagination.limit()))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_sales", e))?;

        let headers = rows
            .iter()
            .map(|r| decode::<SaleHeaderRow>(r).and_then(SaleHeader::try_from))
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<uuid::Uuid> = headers.iter().map(|h| *h.id.as_uuid()).collect();
        let mut lines = self.load_lines(&ids).await?;

        let sales: Vec<SaleTransaction> = headers
            .into_iter()
            .map(|h| {
                let owned = lines.remove(&h.id).unwrap_or_default();
                SaleTransaction::from_parts(h, owned)
            })
            .collect();

        let total = total.max(0) as u64;
        let has_more = u64::from(pagination.offset) + (sales.len() as u64) < total;
        Ok(SalePage {
            sales,
            total,
            pagination,
            has_more,
        })
    }

    async fn load_lines(
        &self,
        sale_ids: &[uuid::Uuid],
    ) -> Result<std::collections::HashMap<SaleId, Vec<SaleLineItem>>, StoreError> {
        let mut grouped = std::collections::HashMap::new();
        if sale_ids.is_empty() {
            return Ok(grouped);
        }

        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM sale_line_items WHERE sale_id = ANY($1) ORDER BY line_no"
        ))
        .bind(sale_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_lines", e))?;

        for row in &rows {
            let line = SaleLineItem::try_from(decode::<SaleLineRow>(row)?)?;
            grouped.entry(line.sale_id).or_insert_with(Vec::new).push(line);
        }
        Ok(grouped)
    }

    /// Apply every change in one transaction; any failure rolls all of them back.
    #[instrument(skip(self, work), fields(change_count = work.len()), err)]
    pub async fn commit_work(&self, work: UnitOfWork) -> Result<(), StoreError> {
        if work.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for change in work.into_changes() {
            let kind = change.kind();
            if let Err(err) = apply_change(&mut tx, change).await {
                tracing::debug!(change = ?kind, error = %err, "rolling back unit of work");
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(err);
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

async fn apply_change(
    tx: &mut Transaction<'_, Postgres>,
    change: Change,
) -> Result<(), StoreError> {
    match change {
        Change::CreateStockLevel(level) => {
            let t = level.thresholds();
            sqlx::query(
                r#"
                INSERT INTO stock_levels (
                    id, location_id, item_id, quantity,
                    minimum_quantity, maximum_quantity, reorder_point, reorder_quantity,
                    lot_number, expires_at, version, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(level.id().as_uuid())
            .bind(level.location_id().as_uuid())
            .bind(level.item_id().as_uuid())
            .bind(level.quantity())
            .bind(t.minimum)
            .bind(t.maximum)
            .bind(t.reorder_point)
            .bind(t.reorder_quantity)
            .bind(level.lot_number())
            .bind(level.expires_at())
            .bind(version_param(stockbook_core::Versioned::version(&level))?)
            .bind(level.created_at())
            .bind(level.updated_at())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_stock_level", e))?;
        }
        Change::SetQuantity {
            stock_level_id,
            expected_version,
            quantity,
            updated_at,
        } => {
            let expected = match expected_version {
                ExpectedVersion::Any => None,
                ExpectedVersion::Exact(v) => Some(version_param(v)?),
            };
            let result = sqlx::query(
                r#"
                UPDATE stock_levels
                SET quantity = $1, version = version + 1, updated_at = $2
                WHERE id = $3 AND ($4::bigint IS NULL OR version = $4)
                "#,
            )
            .bind(quantity)
            .bind(updated_at)
            .bind(stock_level_id.as_uuid())
            .bind(expected)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("set_quantity", e))?;

            if result.rows_affected() == 0 {
                let found: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM stock_levels WHERE id = $1")
                        .bind(stock_level_id.as_uuid())
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(|e| map_sqlx_error("check_version", e))?;
                return Err(match found {
                    None => StoreError::MissingRow(format!("stock level {stock_level_id}")),
                    Some(v) => StoreError::Concurrency(format!(
                        "stock level {stock_level_id}: expected {expected_version:?}, found {v}"
                    )),
                });
            }
        }
        Change::AppendMovement(m) => {
            let magnitude = i64::try_from(m.quantity()).map_err(|_| {
                StoreError::Integrity(format!("movement {} magnitude out of range", m.id()))
            })?;
            sqlx::query(
                r#"
                INSERT INTO stock_movements (
                    id, stock_level_id, location_id, item_id, quantity, movement_type,
                    quantity_after, reference, notes, actor_id, occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(m.id().as_uuid())
            .bind(m.stock_level_id().as_uuid())
            .bind(m.location_id().as_uuid())
            .bind(m.item_id().as_uuid())
            .bind(magnitude)
            .bind(m.movement_type().as_str())
            .bind(m.quantity_after())
            .bind(m.reference())
            .bind(m.notes())
            .bind(m.actor().as_uuid())
            .bind(m.occurred_at())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("append_movement", e))?;
        }
        Change::InsertSaleHeader(h) => {
            sqlx::query(
                r#"
                INSERT INTO sales (
                    id, customer_id, cashier_id, location_id, payment_method, status,
                    discount_pct, tax_pct, total_amount, notes, version, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(h.id.as_uuid())
            .bind(h.customer_id.map(|c| *c.as_uuid()))
            .bind(h.cashier_id.as_uuid())
            .bind(h.location_id.as_uuid())
            .bind(h.payment_method.as_str())
            .bind(h.status.as_str())
            .bind(h.discount_pct.value())
            .bind(h.tax_pct.value())
            .bind(h.total_amount)
            .bind(h.notes.as_deref())
            .bind(version_param(h.version)?)
            .bind(h.created_at)
            .bind(h.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_sale", e))?;
        }
        Change::InsertSaleLine(l) => {
            sqlx::query(
                r#"
                INSERT INTO sale_line_items (
                    id, sale_id, line_no, item_id, quantity, unit_price,
                    discount_pct, tax_rate, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(l.id.as_uuid())
            .bind(l.sale_id.as_uuid())
            .bind(l.line_no as i32)
            .bind(l.item_id.as_uuid())
            .bind(l.quantity)
            .bind(l.unit_price)
            .bind(l.discount_pct.value())
            .bind(l.tax_rate.map(Percent::value))
            .bind(l.line_total)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_sale_line", e))?;
        }
        Change::UpdateSaleHeader {
            header: h,
            expected_version,
        } => {
            let expected = match expected_version {
                ExpectedVersion::Any => None,
                ExpectedVersion::Exact(v) => Some(version_param(v)?),
            };
            let result = sqlx::query(
                r#"
                UPDATE sales
                SET customer_id = $2, payment_method = $3, status = $4, notes = $5,
                    updated_at = $6, version = version + 1
                WHERE id = $1 AND ($7::bigint IS NULL OR version = $7)
                "#,
            )
            .bind(h.id.as_uuid())
            .bind(h.customer_id.map(|c| *c.as_uuid()))
            .bind(h.payment_method.as_str())
            .bind(h.status.as_str())
            .bind(h.notes.as_deref())
            .bind(h.updated_at)
            .bind(expected)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_sale", e))?;

            if result.rows_affected() == 0 {
                let found: Option<i64> = sqlx::query_scalar("SELECT version FROM sales WHERE id = $1")
                    .bind(h.id.as_uuid())
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("check_sale_version", e))?;
                return Err(match found {
                    None => StoreError::MissingRow(format!("sale {}", h.id)),
                    Some(v) => StoreError::Concurrency(format!(
                        "sale {}: expected {expected_version:?}, found {v}",
                        h.id
                    )),
                });
            }
        }
        Change::DeleteSaleLines(sale_id) => {
            sqlx::query("DELETE FROM sale_line_items WHERE sale_id = $1")
                .bind(sale_id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_sale_lines", e))?;
        }
        Change::DeleteSaleHeader(sale_id) => {
            let result = sqlx::query("DELETE FROM sales WHERE id = $1")
                .bind(sale_id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| match map_sqlx_error("delete_sale", e) {
                    // Lines still reference the header.
                    StoreError::MissingRow(msg) => StoreError::Integrity(msg),
                    other => other,
                })?;
            if result.rows_affected() == 0 {
                return Err(StoreError::MissingRow(format!("sale {sale_id}")));
            }
        }
    }
    Ok(())
}

/// Run a store future from the synchronous [`LedgerStore`] surface.
///
/// Requires a multi-threaded tokio runtime on the calling thread; anything else is a
/// `Backend` error rather than a panic inside `block_in_place`.
fn block_on<T>(fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Backend(
            "PostgresLedgerStore requires a tokio runtime; call it from within one".to_string(),
        )
    })?;
    if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
        return Err(StoreError::Backend(
            "PostgresLedgerStore requires a multi-threaded tokio runtime".to_string(),
        ));
    }
    tokio::task::block_in_place(|| handle.block_on(fut))
}

fn version_param(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Integrity(format!("version {version} out of range")))
}

impl LedgerStore for PostgresLedgerStore {
    fn stock_level(
        &self,
        location_id: LocationId,
        item_id: ItemId,
    ) -> Result<Option<StockLevel>, StoreError> {
        block_on(self.load_stock_level(location_id, item_id))
    }

    fn stock_level_by_id(&self, id: StockLevelId) -> Result<Option<StockLevel>, StoreError> {
        block_on(self.load_stock_level_by_id(id))
    }

    fn stock_levels_at(&self, location_id: LocationId) -> Result<Vec<StockLevel>, StoreError> {
        block_on(self.load_stock_levels_at(location_id))
    }

    fn movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        block_on(self.query_movements(filter, pagination))
    }

    fn sale(&self, id: SaleId) -> Result<Option<SaleTransaction>, StoreError> {
        block_on(self.load_sale(id))
    }

    fn sales(&self, filter: &SaleFilter, pagination: Pagination) -> Result<SalePage, StoreError> {
        block_on(self.query_sales(filter, pagination))
    }

    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError> {
        block_on(self.commit_work(work))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") => StoreError::MissingRow(msg),
                Some("23514") | Some("55000") => StoreError::Integrity(msg),
                Some("40001") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn decode<'r, T: FromRow<'r, PgRow>>(row: &'r PgRow) -> Result<T, StoreError> {
    T::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}

fn percent(value: f64, column: &str) -> Result<Percent, StoreError> {
    Percent::new(value).map_err(|e| StoreError::Backend(format!("{column}: {e}")))
}

// SQLx row types

const STOCK_LEVEL_COLUMNS: &str = "id, location_id, item_id, quantity, minimum_quantity, \
    maximum_quantity, reorder_point, reorder_quantity, lot_number, expires_at, version, \
    created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, stock_level_id, location_id, item_id, quantity, \
    movement_type, quantity_after, reference, notes, actor_id, occurred_at";

const SALE_COLUMNS: &str = "id, customer_id, cashier_id, location_id, payment_method, status, \
    discount_pct, tax_pct, total_amount, notes, version, created_at, updated_at";

const LINE_COLUMNS: &str = "id, sale_id, line_no, item_id, quantity, unit_price, discount_pct, \
    tax_rate, line_total";

#[derive(Debug)]
struct StockLevelRow {
    id: uuid::Uuid,
    location_id: uuid::Uuid,
    item_id: uuid::Uuid,
    quantity: i64,
    minimum_quantity: i64,
    maximum_quantity: Option<i64>,
    reorder_point: i64,
    reorder_quantity: i64,
    lot_number: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockLevelRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockLevelRow {
            id: row.try_get("id")?,
            location_id: row.try_get("location_id")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            minimum_quantity: row.try_get("minimum_quantity")?,
            maximum_quantity: row.try_get("maximum_quantity")?,
            reorder_point: row.try_get("reorder_point")?,
            reorder_quantity: row.try_get("reorder_quantity")?,
            lot_number: row.try_get("lot_number")?,
            expires_at: row.try_get("expires_at")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<StockLevelRow> for StockLevel {
    fn from(row: StockLevelRow) -> Self {
        StockLevel::restore(StockLevelParts {
            id: StockLevelId::from_uuid(row.id),
            location_id: LocationId::from_uuid(row.location_id),
            item_id: ItemId::from_uuid(row.item_id),
            quantity: row.quantity,
            thresholds: StockThresholds {
                minimum: row.minimum_quantity,
                maximum: row.maximum_quantity,
                reorder_point: row.reorder_point,
                reorder_quantity: row.reorder_quantity,
            },
            lot_number: row.lot_number,
            expires_at: row.expires_at,
            version: row.version as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct MovementRow {
    id: uuid::Uuid,
    stock_level_id: uuid::Uuid,
    location_id: uuid::Uuid,
    item_id: uuid::Uuid,
    quantity: i64,
    movement_type: String,
    quantity_after: i64,
    reference: Option<String>,
    notes: Option<String>,
    actor_id: uuid::Uuid,
    occurred_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            stock_level_id: row.try_get("stock_level_id")?,
            location_id: row.try_get("location_id")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            movement_type: row.try_get("movement_type")?,
            quantity_after: row.try_get("quantity_after")?,
            reference: row.try_get("reference")?,
            notes: row.try_get("notes")?,
            actor_id: row.try_get("actor_id")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl TryFrom<MovementRow> for MovementRecord {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = row
            .movement_type
            .parse()
            .map_err(|e| StoreError::Backend(format!("movement_type: {e}")))?;
        Ok(MovementRecord::restore(MovementParts {
            id: MovementId::from_uuid(row.id),
            stock_level_id: StockLevelId::from_uuid(row.stock_level_id),
            location_id: LocationId::from_uuid(row.location_id),
            item_id: ItemId::from_uuid(row.item_id),
            quantity: u64::try_from(row.quantity)
                .map_err(|_| StoreError::Backend(format!("negative movement quantity {}", row.quantity)))?,
            movement_type,
            quantity_after: row.quantity_after,
            reference: row.reference,
            notes: row.notes,
            actor: UserId::from_uuid(row.actor_id),
            occurred_at: row.occurred_at,
        }))
    }
}

#[derive(Debug)]
struct SaleHeaderRow {
    id: uuid::Uuid,
    customer_id: Option<uuid::Uuid>,
    cashier_id: uuid::Uuid,
    location_id: uuid::Uuid,
    payment_method: String,
    status: String,
    discount_pct: f64,
    tax_pct: f64,
    total_amount: f64,
    notes: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SaleHeaderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SaleHeaderRow {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            cashier_id: row.try_get("cashier_id")?,
            location_id: row.try_get("location_id")?,
            payment_method: row.try_get("payment_method")?,
            status: row.try_get("status")?,
            discount_pct: row.try_get("discount_pct")?,
            tax_pct: row.try_get("tax_pct")?,
            total_amount: row.try_get("total_amount")?,
            notes: row.try_get("notes")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<SaleHeaderRow> for SaleHeader {
    type Error = StoreError;

    fn try_from(row: SaleHeaderRow) -> Result<Self, Self::Error> {
        Ok(SaleHeader {
            id: SaleId::from_uuid(row.id),
            customer_id: row.customer_id.map(CustomerId::from_uuid),
            cashier_id: UserId::from_uuid(row.cashier_id),
            location_id: LocationId::from_uuid(row.location_id),
            payment_method: row
                .payment_method
                .parse()
                .map_err(|e| StoreError::Backend(format!("payment_method: {e}")))?,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Backend(format!("status: {e}")))?,
            discount_pct: percent(row.discount_pct, "discount_pct")?,
            tax_pct: percent(row.tax_pct, "tax_pct")?,
            total_amount: row.total_amount,
            notes: row.notes,
            version: u64::try_from(row.version)
                .map_err(|_| StoreError::Backend(format!("negative sale version {}", row.version)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct SaleLineRow {
    id: uuid::Uuid,
    sale_id: uuid::Uuid,
    line_no: i32,
    item_id: uuid::Uuid,
    quantity: i64,
    unit_price: f64,
    discount_pct: f64,
    tax_rate: Option<f64>,
    line_total: f64,
}

impl<'r> FromRow<'r, PgRow> for SaleLineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SaleLineRow {
            id: row.try_get("id")?,
            sale_id: row.try_get("sale_id")?,
            line_no: row.try_get("line_no")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            discount_pct: row.try_get("discount_pct")?,
            tax_rate: row.try_get("tax_rate")?,
            line_total: row.try_get("line_total")?,
        })
    }
}

impl TryFrom<SaleLineRow> for SaleLineItem {
    type Error = StoreError;

    fn try_from(row: SaleLineRow) -> Result<Self, Self::Error> {
        Ok(SaleLineItem {
            id: SaleLineId::from_uuid(row.id),
            sale_id: SaleId::from_uuid(row.sale_id),
            line_no: row.line_no as u32,
            item_id: ItemId::from_uuid(row.item_id),
            quantity: row.quantity,
            unit_price: row.unit_price,
            discount_pct: percent(row.discount_pct, "discount_pct")?,
            tax_rate: row.tax_rate.map(|t| percent(t, "tax_rate")).transpose()?,
            line_total: row.line_total,
        })
    }
}
