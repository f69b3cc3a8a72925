//! Postgres-backed stock store.
//!
//! Quantities live in `catalog_items.current_stock` (`NUMERIC(18,3)`); ledger
//! entries are appended to `ledger_entries` with their detail lines embedded as
//! a JSONB array.
//!
//! ## Conditional writes
//!
//! `conditional_adjust` is a single
//! `UPDATE ... WHERE current_stock = $expected RETURNING current_stock`. Postgres
//! re-evaluates the predicate after waiting on a concurrent row lock, so a
//! stale `expected` matches zero rows and is reported as a concurrency error.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StockStoreError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (serialization failure) | `40001` | `Concurrency` |
//! | Database (deadlock detected) | `40P01` | `Concurrency` |
//! | Database (check constraint violation) | `23514` | `InvalidData` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::{debug, instrument};
use uuid::Uuid;

use mixledger_core::{ItemId, LedgerEntryId, Quantity};
use mixledger_inventory::{CatalogItem, ItemKind, ItemRef, LedgerEntry};

use crate::ledger_query::{LedgerFilter, LedgerQuery, LedgerQueryResult, Pagination};

use super::r#trait::{StockStore, StockStoreError, StockTransaction};

/// Tables used by [`PostgresStockStore`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_items (
    id UUID NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('material', 'fragrance')),
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    unit TEXT NOT NULL,
    current_stock NUMERIC(18, 3) NOT NULL DEFAULT 0 CHECK (current_stock >= 0),
    safety_stock_level NUMERIC(18, 3) NOT NULL DEFAULT 0,
    cost_per_unit NUMERIC NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (kind, id),
    UNIQUE (kind, code)
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    seq BIGSERIAL PRIMARY KEY,
    id UUID NOT NULL UNIQUE,
    change_date TIMESTAMPTZ NOT NULL,
    change_reason TEXT NOT NULL
        CHECK (change_reason IN ('purchase', 'workorder', 'inventory_check', 'manual_adjustment')),
    operator_id UUID NOT NULL,
    operator_name TEXT NOT NULL,
    remarks TEXT,
    related_document_id UUID,
    related_document_type TEXT CHECK (related_document_type IN ('purchase_order', 'work_order')),
    details JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS ledger_entries_change_date_idx ON ledger_entries (change_date DESC, seq DESC);
CREATE INDEX IF NOT EXISTS ledger_entries_details_idx ON ledger_entries USING GIN (details jsonb_path_ops);
CREATE INDEX IF NOT EXISTS ledger_entries_related_document_idx ON ledger_entries (related_document_id);
"#;

const ITEM_COLUMNS: &str =
    "id, kind, code, name, unit, current_stock, safety_stock_level, cost_per_unit";

const ENTRY_COLUMNS: &str = "id, change_date, change_reason, operator_id, operator_name, remarks, \
     related_document_id, related_document_type, details";

/// Postgres-backed stock store.
///
/// `Send + Sync`; all access goes through the SQLx pool. The synchronous
/// [`StockStore`] methods need a tokio runtime context on a thread that may
/// block, e.g. inside `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if missing.
    pub async fn migrate(&self) -> Result<(), StockStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Seed a catalog item with its opening stock.
    #[instrument(skip(self, item), fields(item = %item.item_ref(), code = %item.code), err)]
    pub async fn insert_item(&self, item: &CatalogItem) -> Result<(), StockStoreError> {
        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, kind, code, name, unit, current_stock, safety_stock_level, cost_per_unit
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.kind.as_str())
        .bind(&item.code)
        .bind(&item.name)
        .bind(&item.unit)
        .bind(item.current_stock.value())
        .bind(item.safety_stock_level.value())
        .bind(item.cost_per_unit)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(item = %item), err)]
    pub async fn load_item(&self, item: ItemRef) -> Result<CatalogItem, StockStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items WHERE kind = $1 AND id = $2"
        ))
        .bind(item.kind.as_str())
        .bind(item.id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_item", e))?;

        match row {
            Some(row) => item_from_row(&row),
            None => Err(StockStoreError::item_not_found(&item)),
        }
    }

    pub async fn load_items(
        &self,
        kind: Option<ItemKind>,
    ) -> Result<Vec<CatalogItem>, StockStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items \
             WHERE ($1::text IS NULL OR kind = $1) ORDER BY code ASC, kind ASC"
        ))
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    pub async fn search_item(
        &self,
        kind: ItemKind,
        query: &str,
    ) -> Result<Option<CatalogItem>, StockStoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items \
             WHERE kind = $1 AND (strpos(upper(code), upper($2)) > 0 OR strpos(name, $2) > 0) \
             ORDER BY code ASC LIMIT 1"
        ))
        .bind(kind.as_str())
        .bind(query)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), fields(item = %item, expected = %expected_current, delta = %delta), err)]
    pub async fn adjust(
        &self,
        item: ItemRef,
        expected_current: Quantity,
        delta: Quantity,
    ) -> Result<Quantity, StockStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let after = compare_and_set(&mut tx, item, expected_current, delta).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(after)
    }

    pub async fn load_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StockStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_entry", e))?;

        row.as_ref().map(entry_from_row).transpose()
    }
}

fn runtime() -> Result<Handle, StockStoreError> {
    Handle::try_current().map_err(|_| {
        StockStoreError::Backend(
            "PostgresStockStore requires async runtime (tokio). Call it from within a tokio runtime context."
                .to_string(),
        )
    })
}

async fn compare_and_set(
    tx: &mut Transaction<'static, Postgres>,
    item: ItemRef,
    expected_current: Quantity,
    delta: Quantity,
) -> Result<Quantity, StockStoreError> {
    let row = sqlx::query(
        r#"
        UPDATE catalog_items
        SET current_stock = current_stock + $4, updated_at = NOW()
        WHERE kind = $1 AND id = $2 AND current_stock = $3
        RETURNING current_stock
        "#,
    )
    .bind(item.kind.as_str())
    .bind(item.id.as_uuid())
    .bind(expected_current.value())
    .bind(delta.value())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("conditional_adjust", e))?;

    if let Some(row) = row {
        let after: Decimal = row
            .try_get("current_stock")
            .map_err(|e| StockStoreError::InvalidData(format!("failed to read current_stock: {e}")))?;
        return Ok(Quantity::new(after));
    }

    let exists = sqlx::query("SELECT 1 FROM catalog_items WHERE kind = $1 AND id = $2")
        .bind(item.kind.as_str())
        .bind(item.id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("conditional_adjust", e))?;

    match exists {
        Some(_) => Err(StockStoreError::Concurrency(format!(
            "stock of {item} no longer equals {expected_current}"
        ))),
        None => Err(StockStoreError::item_not_found(&item)),
    }
}

impl StockStore for PostgresStockStore {
    fn get_stock(&self, item: &ItemRef) -> Result<Quantity, StockStoreError> {
        self.get_item(item).map(|i| i.current_stock)
    }

    fn get_item(&self, item: &ItemRef) -> Result<CatalogItem, StockStoreError> {
        runtime()?.block_on(self.load_item(*item))
    }

    fn list_items(&self, kind: Option<ItemKind>) -> Result<Vec<CatalogItem>, StockStoreError> {
        runtime()?.block_on(self.load_items(kind))
    }

    fn find_item_by_code_or_name(
        &self,
        kind: ItemKind,
        query: &str,
    ) -> Result<Option<CatalogItem>, StockStoreError> {
        runtime()?.block_on(self.search_item(kind, query))
    }

    fn conditional_adjust(
        &self,
        item: &ItemRef,
        expected_current: Quantity,
        delta: Quantity,
    ) -> Result<Quantity, StockStoreError> {
        runtime()?.block_on(self.adjust(*item, expected_current, delta))
    }

    fn begin(&self) -> Result<Box<dyn StockTransaction + '_>, StockStoreError> {
        let handle = runtime()?;
        let tx = handle
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTransaction { tx, handle }))
    }

    fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StockStoreError> {
        runtime()?.block_on(self.load_entry(id))
    }
}

/// One SQL transaction. Dropping it without `commit` rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    handle: Handle,
}

impl StockTransaction for PostgresTransaction {
    fn get_item(&mut self, item: &ItemRef) -> Result<CatalogItem, StockStoreError> {
        let row = self
            .handle
            .block_on(
                sqlx::query(&format!(
                    "SELECT {ITEM_COLUMNS} FROM catalog_items WHERE kind = $1 AND id = $2"
                ))
                .bind(item.kind.as_str())
                .bind(item.id.as_uuid())
                .fetch_optional(&mut *self.tx),
            )
            .map_err(|e| map_sqlx_error("get_item", e))?;

        match row {
            Some(row) => item_from_row(&row),
            None => Err(StockStoreError::item_not_found(item)),
        }
    }

    fn conditional_adjust(
        &mut self,
        item: &ItemRef,
        expected_current: Quantity,
        delta: Quantity,
    ) -> Result<Quantity, StockStoreError> {
        self.handle
            .block_on(compare_and_set(&mut self.tx, *item, expected_current, delta))
    }

    fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StockStoreError> {
        let details = serde_json::to_value(entry.details())
            .map_err(|e| StockStoreError::InvalidData(format!("details serialization failed: {e}")))?;
        let related = entry.related_document();

        self.handle
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO ledger_entries (
                        id,
                        change_date,
                        change_reason,
                        operator_id,
                        operator_name,
                        remarks,
                        related_document_id,
                        related_document_type,
                        details
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(entry.id_typed().as_uuid())
                .bind(entry.change_date())
                .bind(entry.change_reason().as_str())
                .bind(entry.operator_id().as_uuid())
                .bind(entry.operator_name())
                .bind(entry.remarks())
                .bind(related.map(|d| *d.id.as_uuid()))
                .bind(related.map(|d| d.kind.as_str()))
                .bind(&details)
                .execute(&mut *self.tx),
            )
            .map_err(|e| map_sqlx_error("append_entry", e))?;

        debug!(entry_id = %entry.id_typed(), details = entry.details().len(), "ledger entry staged");
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StockStoreError> {
        let PostgresTransaction { tx, handle } = *self;
        handle
            .block_on(tx.commit())
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[async_trait::async_trait]
impl LedgerQuery for PostgresStockStore {
    async fn query_entries(
        &self,
        filter: LedgerFilter,
        pagination: Pagination,
    ) -> Result<LedgerQueryResult, StockStoreError> {
        let item_id_param: Option<String> = filter.item.map(|i| i.id.to_string());
        let item_type_param: Option<&str> = filter.item.map(|i| i.kind.as_str());
        let reason_param: Option<&str> = filter.reason.map(|r| r.as_str());
        let document_param: Option<Uuid> = filter.related_document.map(|d| *d.as_uuid());

        const WHERE: &str = r#"
            WHERE ($1::text IS NULL
                    OR details @> jsonb_build_array(jsonb_build_object('item_id', $1::text, 'item_type', $2::text)))
                AND ($3::text IS NULL OR change_reason = $3)
                AND ($4::uuid IS NULL OR related_document_id = $4)
                AND ($5::timestamptz IS NULL OR change_date >= $5)
                AND ($6::timestamptz IS NULL OR change_date <= $6)
        "#;

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM ledger_entries {WHERE}"))
            .bind(item_id_param.as_deref())
            .bind(item_type_param)
            .bind(reason_param)
            .bind(document_param)
            .bind(filter.changed_after)
            .bind(filter.changed_before)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_entries", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StockStoreError::InvalidData(format!("failed to read count: {e}")))?;

        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries {WHERE} \
             ORDER BY change_date DESC, seq DESC LIMIT $7 OFFSET $8"
        ))
        .bind(item_id_param.as_deref())
        .bind(item_type_param)
        .bind(reason_param)
        .bind(document_param)
        .bind(filter.changed_after)
        .bind(filter.changed_before)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_entries", e))?;

        let entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LedgerQueryResult::new(entries, total.max(0) as u64, pagination))
    }
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<CatalogItem, StockStoreError> {
    let decode = |e: sqlx::Error| StockStoreError::InvalidData(format!("failed to decode item row: {e}"));

    let kind: String = row.try_get("kind").map_err(decode)?;
    let kind: ItemKind = kind
        .parse()
        .map_err(|e| StockStoreError::InvalidData(format!("{e}")))?;
    let id: Uuid = row.try_get("id").map_err(decode)?;
    let current_stock: Decimal = row.try_get("current_stock").map_err(decode)?;
    let safety_stock_level: Decimal = row.try_get("safety_stock_level").map_err(decode)?;

    Ok(CatalogItem {
        id: ItemId::from_uuid(id),
        kind,
        code: row.try_get("code").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        unit: row.try_get("unit").map_err(decode)?,
        current_stock: Quantity::new(current_stock),
        safety_stock_level: Quantity::new(safety_stock_level),
        cost_per_unit: row.try_get("cost_per_unit").map_err(decode)?,
    })
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, StockStoreError> {
    let decode = |e: sqlx::Error| StockStoreError::InvalidData(format!("failed to decode ledger row: {e}"));

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let change_date: DateTime<Utc> = row.try_get("change_date").map_err(decode)?;
    let change_reason: String = row.try_get("change_reason").map_err(decode)?;
    let operator_id: Uuid = row.try_get("operator_id").map_err(decode)?;
    let operator_name: String = row.try_get("operator_name").map_err(decode)?;
    let remarks: Option<String> = row.try_get("remarks").map_err(decode)?;
    let related_id: Option<Uuid> = row.try_get("related_document_id").map_err(decode)?;
    let related_type: Option<String> = row.try_get("related_document_type").map_err(decode)?;
    let details: serde_json::Value = row.try_get("details").map_err(decode)?;

    let related_document = match (related_id, related_type) {
        (Some(id), Some(kind)) => serde_json::json!({ "id": id, "kind": kind }),
        _ => serde_json::Value::Null,
    };

    // Entries are only ever built through `LedgerEntryBuilder`; decoding goes
    // through serde so the private fields stay private.
    serde_json::from_value(serde_json::json!({
        "id": id,
        "change_date": change_date,
        "change_reason": change_reason,
        "operator_id": operator_id,
        "operator_name": operator_name,
        "remarks": remarks,
        "related_document": related_document,
        "details": details,
    }))
    .map_err(|e| StockStoreError::InvalidData(format!("failed to decode ledger entry {id}: {e}")))
}

/// Map SQLx errors to StockStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StockStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            error_for_sqlstate(db_err.code().as_deref(), msg)
        }
        sqlx::Error::RowNotFound => {
            StockStoreError::NotFound(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StockStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StockStoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Unique violations, serialization failures and deadlock victims are all
/// retryable `Concurrency` errors.
fn error_for_sqlstate(code: Option<&str>, msg: String) -> StockStoreError {
    match code {
        Some("23505" | "40001" | "40P01") => StockStoreError::Concurrency(msg),
        Some("23514") => StockStoreError::InvalidData(msg),
        _ => StockStoreError::Backend(msg),
    }
}
