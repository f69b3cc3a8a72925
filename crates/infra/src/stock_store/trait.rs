use std::sync::Arc;

use thiserror::Error;

use mixledger_core::{LedgerEntryId, Quantity};
use mixledger_inventory::{CatalogItem, ItemKind, ItemRef, LedgerEntry};

/// Stock store operation error.
///
/// These are storage failures as opposed to domain errors (validation, stock
/// policy). `Concurrency` is the only variant the adjustment engine retries.
#[derive(Debug, Error)]
pub enum StockStoreError {
    /// A conditional write found a different current value than expected.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data could not be decoded or violates a store-level constraint.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The backend itself failed (connection, lock poisoning, runtime).
    #[error("backend failure: {0}")]
    Backend(String),
}

impl StockStoreError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, StockStoreError::Concurrency(_))
    }

    pub(crate) fn item_not_found(item: &ItemRef) -> Self {
        StockStoreError::NotFound(format!("catalog item {item}"))
    }
}

/// Current on-hand quantities plus the append-only ledger.
///
/// ## Write protocol
///
/// Every stock change goes through a conditional write: the caller states the
/// quantity it read and the delta it wants, and the store applies the delta
/// only if the stored quantity still equals what was read. A mismatch is
/// reported as [`StockStoreError::Concurrency`]; nothing is written.
///
/// Multi-item changes use [`StockStore::begin`]. All conditional writes and the
/// ledger append made through one [`StockTransaction`] become visible together
/// on `commit`, or not at all.
///
/// ## Implementations
///
/// - `InMemoryStockStore`: tests/dev; writes are staged and re-validated at commit.
/// - `PostgresStockStore`: row-level compare-and-set inside one SQL transaction.
pub trait StockStore: Send + Sync {
    /// Current quantity of one item.
    fn get_stock(&self, item: &ItemRef) -> Result<Quantity, StockStoreError>;

    fn get_item(&self, item: &ItemRef) -> Result<CatalogItem, StockStoreError>;

    /// Items ordered by code, optionally restricted to one kind.
    fn list_items(&self, kind: Option<ItemKind>) -> Result<Vec<CatalogItem>, StockStoreError>;

    /// First item (by code) whose code contains `query` ignoring case, or whose
    /// name contains `query`.
    fn find_item_by_code_or_name(
        &self,
        kind: ItemKind,
        query: &str,
    ) -> Result<Option<CatalogItem>, StockStoreError>;

    /// Single-item conditional write outside any transaction. Returns the new
    /// quantity.
    fn conditional_adjust(
        &self,
        item: &ItemRef,
        expected_current: Quantity,
        delta: Quantity,
    ) -> Result<Quantity, StockStoreError>;

    /// Open a transaction scope. Dropping it without `commit` discards it.
    fn begin(&self) -> Result<Box<dyn StockTransaction + '_>, StockStoreError>;

    fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StockStoreError>;
}

/// One atomic unit of stock writes plus its ledger entry.
pub trait StockTransaction: Send {
    /// Item as seen by this transaction, including its own uncommitted writes.
    fn get_item(&mut self, item: &ItemRef) -> Result<CatalogItem, StockStoreError>;

    fn get_stock(&mut self, item: &ItemRef) -> Result<Quantity, StockStoreError> {
        Ok(self.get_item(item)?.current_stock)
    }

    fn conditional_adjust(
        &mut self,
        item: &ItemRef,
        expected_current: Quantity,
        delta: Quantity,
    ) -> Result<Quantity, StockStoreError>;

    fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StockStoreError>;

    fn commit(self: Box<Self>) -> Result<(), StockStoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn get_stock(&self, item: &ItemRef) -> Result<Quantity, StockStoreError> {
        (**self).get_stock(item)
    }

    fn get_item(&self, item: &ItemRef) -> Result<CatalogItem, StockStoreError> {
        (**self).get_item(item)
    }

    fn list_items(&self, kind: Option<ItemKind>) -> Result<Vec<CatalogItem>, StockStoreError> {
        (**self).list_items(kind)
    }

    fn find_item_by_code_or_name(
        &self,
        kind: ItemKind,
        query: &str,
    ) -> Result<Option<CatalogItem>, StockStoreError> {
        (**self).find_item_by_code_or_name(kind, query)
    }

    fn conditional_adjust(
        &self,
        item: &ItemRef,
        expected_current: Quantity,
        delta: Quantity,
    ) -> Result<Quantity, StockStoreError> {
        (**self).conditional_adjust(item, expected_current, delta)
    }

    fn begin(&self) -> Result<Box<dyn StockTransaction + '_>, StockStoreError> {
        (**self).begin()
    }

    fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StockStoreError> {
        (**self).get_entry(id)
    }
}
