//! Ledger query interface for audit screens and stock reconstruction.
//!
//! Read-only. Entries come back newest first and are paginated by default.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mixledger_core::{DocumentId, LedgerEntryId, Quantity};
use mixledger_inventory::{ChangeReason, ItemRef, LedgerEntry};

use crate::stock_store::StockStoreError;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    /// 0-based.
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    fn next(self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }
}

/// Filter criteria; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    /// Entries with a detail line for this item.
    pub item: Option<ItemRef>,
    pub reason: Option<ChangeReason>,
    pub related_document: Option<DocumentId>,
    /// Inclusive lower bound on `change_date`.
    pub changed_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `change_date`.
    pub changed_before: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn for_item(item: ItemRef) -> Self {
        Self {
            item: Some(item),
            ..Default::default()
        }
    }

    pub fn for_document(id: DocumentId) -> Self {
        Self {
            related_document: Some(id),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: ChangeReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.changed_after = Some(from);
        self.changed_before = Some(to);
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.item.is_none_or(|item| entry.touches(&item))
            && self.reason.is_none_or(|r| entry.change_reason() == r)
            && self
                .related_document
                .is_none_or(|id| entry.related_document().is_some_and(|d| d.id == id))
            && self.changed_after.is_none_or(|t| entry.change_date() >= t)
            && self.changed_before.is_none_or(|t| entry.change_date() <= t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerQueryResult {
    pub entries: Vec<LedgerEntry>,
    /// Matching entries across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl LedgerQueryResult {
    pub fn new(entries: Vec<LedgerEntry>, total: u64, pagination: Pagination) -> Self {
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);
        Self {
            entries,
            total,
            pagination,
            has_more,
        }
    }
}

/// One item's line from one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub entry_id: LedgerEntryId,
    pub change_date: DateTime<Utc>,
    pub change_reason: ChangeReason,
    pub quantity_change: Quantity,
    pub quantity_after: Quantity,
}

impl StockMovement {
    pub fn quantity_before(&self) -> Quantity {
        self.quantity_after - self.quantity_change
    }
}

/// Summed change of one item over the entries a filter selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetChange {
    pub item: ItemRef,
    pub item_code: String,
    pub net_change: Quantity,
    pub movements: usize,
}

/// Async query interface over the stock ledger.
#[async_trait::async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Entries matching `filter`, ordered by `change_date` descending (append
    /// order descending for equal dates).
    async fn query_entries(
        &self,
        filter: LedgerFilter,
        pagination: Pagination,
    ) -> Result<LedgerQueryResult, StockStoreError>;

    /// Every matching entry, fetched page by page.
    async fn collect_entries(&self, filter: LedgerFilter) -> Result<Vec<LedgerEntry>, StockStoreError> {
        let mut page = Pagination::new(Some(MAX_PAGE_LIMIT), None);
        let mut all = Vec::new();
        loop {
            let result = self.query_entries(filter.clone(), page).await?;
            all.extend(result.entries);
            if !result.has_more {
                return Ok(all);
            }
            page = page.next();
        }
    }

    /// Movements of one item, newest first.
    async fn stock_history(
        &self,
        item: ItemRef,
        pagination: Option<Pagination>,
    ) -> Result<Vec<StockMovement>, StockStoreError> {
        let result = self
            .query_entries(LedgerFilter::for_item(item), pagination.unwrap_or_default())
            .await?;
        Ok(result
            .entries
            .iter()
            .filter_map(|e| movement_of(e, &item))
            .collect())
    }

    /// Quantity of `item` right after the last change at or before `at`.
    ///
    /// With no change before `at`, the quantity before the first later change is
    /// returned. `None` if the item has no ledger history at all.
    async fn stock_as_of(
        &self,
        item: ItemRef,
        at: DateTime<Utc>,
    ) -> Result<Option<Quantity>, StockStoreError> {
        let entries = self.collect_entries(LedgerFilter::for_item(item)).await?;
        // Newest first: the first entry at or before `at` is the one we want.
        if let Some(m) = entries
            .iter()
            .filter(|e| e.change_date() <= at)
            .find_map(|e| movement_of(e, &item))
        {
            return Ok(Some(m.quantity_after));
        }
        Ok(entries
            .iter()
            .rev()
            .find_map(|e| movement_of(e, &item))
            .map(|m| m.quantity_before()))
    }

    /// Net change per item over the selected entries, ordered by item code.
    ///
    /// When the filter names an item, only that item is reported.
    async fn net_change(&self, filter: LedgerFilter) -> Result<Vec<NetChange>, StockStoreError> {
        let only = filter.item;
        let entries = self.collect_entries(filter).await?;

        let mut by_item: BTreeMap<(String, ItemRef), (Quantity, usize)> = BTreeMap::new();
        for entry in &entries {
            for detail in entry.details() {
                let item = detail.item_ref();
                if only.is_some_and(|o| o != item) {
                    continue;
                }
                let slot = by_item
                    .entry((detail.item_code.clone(), item))
                    .or_insert((Quantity::ZERO, 0));
                slot.0 = slot.0.checked_add(detail.quantity_change).ok_or_else(|| {
                    StockStoreError::InvalidData(format!("net change of {item} overflows"))
                })?;
                slot.1 += 1;
            }
        }

        Ok(by_item
            .into_iter()
            .map(|((item_code, item), (net_change, movements))| NetChange {
                item,
                item_code,
                net_change,
                movements,
            })
            .collect())
    }
}

fn movement_of(entry: &LedgerEntry, item: &ItemRef) -> Option<StockMovement> {
    entry.detail_for(item).map(|d| StockMovement {
        entry_id: entry.id_typed(),
        change_date: entry.change_date(),
        change_reason: entry.change_reason(),
        quantity_change: d.quantity_change,
        quantity_after: d.quantity_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixledger_core::OperatorId;
    use mixledger_inventory::{CatalogItem, ItemKind, LedgerEntryBuilder, Operator};
    use rust_decimal::Decimal;

    /// Fixed entry list, returned whole whatever the filter.
    struct FixedLedger(Vec<LedgerEntry>);

    #[async_trait::async_trait]
    impl LedgerQuery for FixedLedger {
        async fn query_entries(
            &self,
            _filter: LedgerFilter,
            pagination: Pagination,
        ) -> Result<LedgerQueryResult, StockStoreError> {
            Ok(LedgerQueryResult::new(self.0.clone(), self.0.len() as u64, pagination))
        }
    }

    fn receipt(item: &CatalogItem, before: Quantity, after: Quantity) -> LedgerEntry {
        let operator = Operator::new(OperatorId::new(), "importer");
        let mut builder = LedgerEntryBuilder::new(ChangeReason::ManualAdjustment, operator, Utc::now());
        builder.record(item, before, after).unwrap();
        builder.build(LedgerEntryId::new()).unwrap()
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn net_change_sums_per_item() {
        let item = CatalogItem::new(ItemKind::Material, "VG-01", "Glycerin", "kg").unwrap();
        let ledger = FixedLedger(vec![
            receipt(&item, Quantity::from_i64(10), Quantity::from_i64(4)),
            receipt(&item, Quantity::ZERO, Quantity::from_i64(10)),
        ]);

        let net = block_on(ledger.net_change(LedgerFilter::default())).unwrap();
        assert_eq!(net.len(), 1);
        assert_eq!(net[0].item_code, "VG-01");
        assert_eq!(net[0].net_change, Quantity::from_i64(4));
        assert_eq!(net[0].movements, 2);
    }

    #[test]
    fn net_change_overflow_is_an_error() {
        let item = CatalogItem::new(ItemKind::Material, "VG-01", "Glycerin", "kg").unwrap();
        let huge = Quantity::new(Decimal::MAX);
        let ledger = FixedLedger(vec![
            receipt(&item, Quantity::ZERO, huge),
            receipt(&item, Quantity::ZERO, huge),
        ]);

        let err = block_on(ledger.net_change(LedgerFilter::default())).unwrap_err();
        assert!(matches!(err, StockStoreError::InvalidData(_)));
    }

    #[test]
    fn pagination_is_capped() {
        let p = Pagination::new(Some(5000), Some(10));
        assert_eq!(p.limit, MAX_PAGE_LIMIT);
        assert_eq!(p.offset, 10);
        assert_eq!(Pagination::new(Some(0), None).limit, 1);
        assert_eq!(Pagination::default().limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn has_more_accounts_for_offset() {
        let r = LedgerQueryResult::new(vec![], 120, Pagination::new(Some(50), Some(50)));
        assert!(r.has_more);
        let r = LedgerQueryResult::new(vec![], 100, Pagination::new(Some(50), Some(50)));
        assert!(!r.has_more);
    }
}
