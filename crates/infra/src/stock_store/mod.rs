//! Stock store boundary: on-hand quantities, conditional writes and the
//! append-only ledger.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryStockStore, InMemoryTransaction};
pub use postgres::{PostgresStockStore, PostgresTransaction, SCHEMA};
pub use r#trait::{StockStore, StockStoreError, StockTransaction};

use std::cell::RefCell;

use mixledger_inventory::{CatalogItem, CatalogLookup, ItemKind, ItemRef};

/// [`CatalogLookup`] view over any [`StockStore`], for BOM planning.
///
/// The lookup trait has no error channel, so a store failure other than
/// `NotFound` is answered with `None` and kept. Callers must check
/// [`StoreCatalog::take_failure`] before trusting the lookups they made.
pub struct StoreCatalog<'a, S: ?Sized> {
    store: &'a S,
    failure: RefCell<Option<StockStoreError>>,
}

impl<'a, S: ?Sized> StoreCatalog<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            failure: RefCell::new(None),
        }
    }

    /// First store failure seen since construction, if any.
    pub fn take_failure(&self) -> Option<StockStoreError> {
        self.failure.borrow_mut().take()
    }

    fn record<T>(&self, result: Result<Option<T>, StockStoreError>) -> Option<T> {
        match result {
            Ok(found) => found,
            Err(StockStoreError::NotFound(_)) => None,
            Err(err) => {
                tracing::warn!(error = %err, "catalog lookup failed");
                self.failure.borrow_mut().get_or_insert(err);
                None
            }
        }
    }
}

impl<S> CatalogLookup for StoreCatalog<'_, S>
where
    S: StockStore + ?Sized,
{
    fn get_item(&self, item: &ItemRef) -> Option<CatalogItem> {
        self.record(StockStore::get_item(self.store, item).map(Some))
    }

    fn find_item_by_code_or_name(&self, kind: ItemKind, query: &str) -> Option<CatalogItem> {
        self.record(StockStore::find_item_by_code_or_name(self.store, kind, query))
    }
}
