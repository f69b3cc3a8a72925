use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use mixledger_core::{LedgerEntryId, Quantity};
use mixledger_inventory::{CatalogItem, CatalogLookup, ItemKind, ItemRef, LedgerEntry};

use crate::ledger_query::{LedgerFilter, LedgerQuery, LedgerQueryResult, Pagination};

use super::r#trait::{StockStore, StockStoreError, StockTransaction};

#[derive(Debug, Default)]
struct Inner {
    items: HashMap<ItemRef, CatalogItem>,
    /// Append order.
    entries: Vec<LedgerEntry>,
}

/// In-memory stock store.
///
/// Intended for tests/dev. Transactions stage their writes and re-check every
/// observed quantity under the write lock at commit, so two transactions that
/// read the same item cannot both commit.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    inner: RwLock<Inner>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a catalog item with its opening stock.
    ///
    /// Codes are unique within a kind.
    pub fn insert_item(&self, item: CatalogItem) -> Result<(), StockStoreError> {
        if item.current_stock.is_negative() {
            return Err(StockStoreError::InvalidData(format!(
                "item '{}' cannot start with negative stock",
                item.code
            )));
        }

        let mut inner = self.write()?;
        if inner.items.contains_key(&item.item_ref()) {
            return Err(StockStoreError::InvalidData(format!(
                "item {} already exists",
                item.item_ref()
            )));
        }
        if inner
            .items
            .values()
            .any(|existing| existing.kind == item.kind && existing.code == item.code)
        {
            return Err(StockStoreError::InvalidData(format!(
                "{} code '{}' is already in use",
                item.kind, item.code
            )));
        }

        inner.items.insert(item.item_ref(), item);
        Ok(())
    }

    pub fn with_items(items: impl IntoIterator<Item = CatalogItem>) -> Result<Self, StockStoreError> {
        let store = Self::new();
        for item in items {
            store.insert_item(item)?;
        }
        Ok(store)
    }

    /// All ledger entries in append order.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, StockStoreError> {
        Ok(self.read()?.entries.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StockStoreError> {
        self.inner
            .read()
            .map_err(|_| StockStoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StockStoreError> {
        self.inner
            .write()
            .map_err(|_| StockStoreError::Backend("lock poisoned".to_string()))
    }
}

fn next_quantity(
    item: &CatalogItem,
    current: Quantity,
    expected: Quantity,
    delta: Quantity,
) -> Result<Quantity, StockStoreError> {
    if current != expected {
        return Err(StockStoreError::Concurrency(format!(
            "stock of '{}' is {current}, expected {expected}",
            item.code
        )));
    }
    let next = expected.checked_add(delta).ok_or_else(|| {
        StockStoreError::InvalidData(format!("stock of '{}' overflows", item.code))
    })?;
    if next.is_negative() {
        return Err(StockStoreError::InvalidData(format!(
            "stock of '{}' cannot be set below zero ({next})",
            item.code
        )));
    }
    Ok(next)
}

impl StockStore for InMemoryStockStore {
    fn get_stock(&self, item: &ItemRef) -> Result<Quantity, StockStoreError> {
        StockStore::get_item(self, item).map(|i| i.current_stock)
    }

    fn get_item(&self, item: &ItemRef) -> Result<CatalogItem, StockStoreError> {
        self.read()?
            .items
            .get(item)
            .cloned()
            .ok_or_else(|| StockStoreError::item_not_found(item))
    }

    fn list_items(&self, kind: Option<ItemKind>) -> Result<Vec<CatalogItem>, StockStoreError> {
        let inner = self.read()?;
        let mut items: Vec<CatalogItem> = inner
            .items
            .values()
            .filter(|i| kind.is_none_or(|k| i.kind == k))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.code.cmp(&b.code).then(a.kind.cmp(&b.kind)));
        Ok(items)
    }

    fn find_item_by_code_or_name(
        &self,
        kind: ItemKind,
        query: &str,
    ) -> Result<Option<CatalogItem>, StockStoreError> {
        let inner = self.read()?;
        Ok(inner
            .items
            .values()
            .filter(|i| i.kind == kind && i.matches_code_or_name(query))
            .min_by(|a, b| a.code.cmp(&b.code))
            .cloned())
    }

    fn conditional_adjust(
        &self,
        item: &ItemRef,
        expected_current: Quantity,
        delta: Quantity,
    ) -> Result<Quantity, StockStoreError> {
        let mut inner = self.write()?;
        let stored = inner
            .items
            .get_mut(item)
            .ok_or_else(|| StockStoreError::item_not_found(item))?;
        let next = next_quantity(stored, stored.current_stock, expected_current, delta)?;
        stored.current_stock = next;
        Ok(next)
    }

    fn begin(&self) -> Result<Box<dyn StockTransaction + '_>, StockStoreError> {
        Ok(Box::new(InMemoryTransaction {
            store: self,
            staged: Vec::new(),
            entry: None,
        }))
    }

    fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StockStoreError> {
        Ok(self
            .read()?
            .entries
            .iter()
            .find(|e| e.id_typed() == id)
            .cloned())
    }
}

#[derive(Debug)]
struct StagedWrite {
    item: ItemRef,
    /// Committed quantity seen when the item was first written.
    observed: Quantity,
    value: Quantity,
}

/// Optimistic transaction over [`InMemoryStockStore`].
#[derive(Debug)]
pub struct InMemoryTransaction<'a> {
    store: &'a InMemoryStockStore,
    staged: Vec<StagedWrite>,
    entry: Option<LedgerEntry>,
}

impl InMemoryTransaction<'_> {
    fn staged(&self, item: &ItemRef) -> Option<&StagedWrite> {
        self.staged.iter().find(|w| w.item == *item)
    }
}

impl StockTransaction for InMemoryTransaction<'_> {
    fn get_item(&mut self, item: &ItemRef) -> Result<CatalogItem, StockStoreError> {
        let mut found = StockStore::get_item(self.store, item)?;
        if let Some(write) = self.staged(item) {
            found.current_stock = write.value;
        }
        Ok(found)
    }

    fn conditional_adjust(
        &mut self,
        item: &ItemRef,
        expected_current: Quantity,
        delta: Quantity,
    ) -> Result<Quantity, StockStoreError> {
        let committed = StockStore::get_item(self.store, item)?;
        let current = self
            .staged(item)
            .map(|w| w.value)
            .unwrap_or(committed.current_stock);
        let next = next_quantity(&committed, current, expected_current, delta)?;

        match self.staged.iter_mut().find(|w| w.item == *item) {
            Some(write) => write.value = next,
            None => self.staged.push(StagedWrite {
                item: *item,
                observed: committed.current_stock,
                value: next,
            }),
        }
        Ok(next)
    }

    fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StockStoreError> {
        if self.entry.is_some() {
            return Err(StockStoreError::InvalidData(
                "transaction already carries a ledger entry".to_string(),
            ));
        }
        self.entry = Some(entry.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StockStoreError> {
        let InMemoryTransaction {
            store,
            staged,
            entry,
        } = *self;
        let mut inner = store.write()?;

        for write in &staged {
            let stored = inner
                .items
                .get(&write.item)
                .ok_or_else(|| StockStoreError::item_not_found(&write.item))?;
            if stored.current_stock != write.observed {
                return Err(StockStoreError::Concurrency(format!(
                    "stock of '{}' changed from {} to {} before commit",
                    stored.code, write.observed, stored.current_stock
                )));
            }
        }

        if let Some(entry) = &entry {
            if inner.entries.iter().any(|e| e.id_typed() == entry.id_typed()) {
                return Err(StockStoreError::InvalidData(format!(
                    "ledger entry {} already exists",
                    entry.id_typed()
                )));
            }
        }

        for write in &staged {
            if let Some(stored) = inner.items.get_mut(&write.item) {
                stored.current_stock = write.value;
            }
        }
        if let Some(entry) = entry {
            inner.entries.push(entry);
        }
        Ok(())
    }
}

impl CatalogLookup for InMemoryStockStore {
    fn get_item(&self, item: &ItemRef) -> Option<CatalogItem> {
        StockStore::get_item(self, item).ok()
    }

    fn find_item_by_code_or_name(&self, kind: ItemKind, query: &str) -> Option<CatalogItem> {
        StockStore::find_item_by_code_or_name(self, kind, query)
            .ok()
            .flatten()
    }
}

#[async_trait::async_trait]
impl LedgerQuery for InMemoryStockStore {
    async fn query_entries(
        &self,
        filter: LedgerFilter,
        pagination: Pagination,
    ) -> Result<LedgerQueryResult, StockStoreError> {
        let inner = self.read()?;
        let mut matching: Vec<(usize, &LedgerEntry)> = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| filter.matches(e))
            .collect();
        // Newest first; append order breaks ties.
        matching.sort_by(|(ia, a), (ib, b)| {
            b.change_date()
                .cmp(&a.change_date())
                .then(ib.cmp(ia))
        });

        let total = matching.len() as u64;
        let entries = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .map(|(_, e)| e.clone())
            .collect();

        Ok(LedgerQueryResult::new(entries, total, pagination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mixledger_core::OperatorId;
    use mixledger_inventory::{ChangeReason, LedgerEntryBuilder, Operator};

    fn seeded(code: &str, stock: i64) -> (InMemoryStockStore, CatalogItem) {
        let item = CatalogItem::new(ItemKind::Material, code, code, "kg")
            .unwrap()
            .with_opening_stock(Quantity::from_i64(stock))
            .unwrap();
        let store = InMemoryStockStore::with_items([item.clone()]).unwrap();
        (store, item)
    }

    fn entry_for(item: &CatalogItem, before: i64, after: i64) -> LedgerEntry {
        let mut builder = LedgerEntryBuilder::new(
            ChangeReason::ManualAdjustment,
            Operator::new(OperatorId::new(), "tester"),
            Utc::now(),
        );
        builder
            .record(item, Quantity::from_i64(before), Quantity::from_i64(after))
            .unwrap();
        builder.build(LedgerEntryId::new()).unwrap()
    }

    #[test]
    fn get_stock_is_idempotent() {
        let (store, item) = seeded("PG-01", 12);
        let r = item.item_ref();
        assert_eq!(store.get_stock(&r).unwrap(), store.get_stock(&r).unwrap());
        assert_eq!(store.get_stock(&r).unwrap(), Quantity::from_i64(12));
    }

    #[test]
    fn unknown_item_is_not_found() {
        let store = InMemoryStockStore::new();
        let missing = ItemRef::material(mixledger_core::ItemId::new());
        assert!(matches!(store.get_stock(&missing), Err(StockStoreError::NotFound(_))));
    }

    #[test]
    fn duplicate_code_within_kind_is_rejected() {
        let (store, _) = seeded("PG-01", 0);
        let dup = CatalogItem::new(ItemKind::Material, "PG-01", "other", "kg").unwrap();
        assert!(store.insert_item(dup).is_err());

        let fragrance = CatalogItem::new(ItemKind::Fragrance, "PG-01", "same code", "kg").unwrap();
        assert!(store.insert_item(fragrance).is_ok());
    }

    #[test]
    fn conditional_adjust_checks_expected_value() {
        let (store, item) = seeded("PG-01", 10);
        let r = item.item_ref();

        let err = store
            .conditional_adjust(&r, Quantity::from_i64(9), Quantity::from_i64(1))
            .unwrap_err();
        assert!(err.is_concurrency());
        assert_eq!(store.get_stock(&r).unwrap(), Quantity::from_i64(10));

        let after = store
            .conditional_adjust(&r, Quantity::from_i64(10), Quantity::from_i64(-4))
            .unwrap();
        assert_eq!(after, Quantity::from_i64(6));
    }

    #[test]
    fn transaction_writes_are_invisible_until_commit() {
        let (store, item) = seeded("PG-01", 10);
        let r = item.item_ref();

        let mut tx = store.begin().unwrap();
        tx.conditional_adjust(&r, Quantity::from_i64(10), Quantity::from_i64(5))
            .unwrap();
        assert_eq!(tx.get_stock(&r).unwrap(), Quantity::from_i64(15));
        assert_eq!(store.get_stock(&r).unwrap(), Quantity::from_i64(10));

        tx.append_entry(&entry_for(&item, 10, 15)).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.get_stock(&r).unwrap(), Quantity::from_i64(15));
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let (store, item) = seeded("PG-01", 10);
        let r = item.item_ref();
        {
            let mut tx = store.begin().unwrap();
            tx.conditional_adjust(&r, Quantity::from_i64(10), Quantity::from_i64(5))
                .unwrap();
            tx.append_entry(&entry_for(&item, 10, 15)).unwrap();
        }
        assert_eq!(store.get_stock(&r).unwrap(), Quantity::from_i64(10));
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn commit_fails_when_observed_stock_moved() {
        let (store, item) = seeded("PG-01", 10);
        let r = item.item_ref();

        let mut tx = store.begin().unwrap();
        tx.conditional_adjust(&r, Quantity::from_i64(10), Quantity::from_i64(5))
            .unwrap();
        tx.append_entry(&entry_for(&item, 10, 15)).unwrap();

        store
            .conditional_adjust(&r, Quantity::from_i64(10), Quantity::from_i64(1))
            .unwrap();

        assert!(tx.commit().unwrap_err().is_concurrency());
        assert_eq!(store.get_stock(&r).unwrap(), Quantity::from_i64(11));
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn lookup_prefers_lowest_code() {
        let store = InMemoryStockStore::new();
        for code in ["VG-02", "VG-01"] {
            store
                .insert_item(CatalogItem::new(ItemKind::Material, code, "Glycerin", "kg").unwrap())
                .unwrap();
        }
        let found = StockStore::find_item_by_code_or_name(&store, ItemKind::Material, "vg")
            .unwrap()
            .unwrap();
        assert_eq!(found.code, "VG-01");
    }
}
