//! Change-event execution pipeline.
//!
//! The `InventoryAdjustmentEngine` is the only writer of stock. One call turns
//! one change event into one ledger entry:
//!
//! ```text
//! ChangeEvent
//!   ↓
//! 1. Validate (closed reason, >= 1 item, no duplicates, document kind)
//!   ↓
//! 2. Begin store transaction
//!   ↓
//! 3. Read every item (NotFound aborts before anything is written)
//!   ↓
//! 4. Resolve target quantities (negative-stock policy)
//!   ↓
//! 5. Conditional write per item, in caller order
//!   ↓
//! 6. Build + append the ledger entry, commit
//! ```
//!
//! A `Concurrency` failure anywhere in steps 2-6 drops the transaction and
//! restarts from step 2 with fresh reads, up to `max_attempts` times. Every
//! other failure aborts immediately.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use mixledger_core::{AccessDenied, DomainError, DomainResult, LedgerEntryId, Quantity};
use mixledger_inventory::{
    resolve_target, CatalogItem, ChangeEvent, ChangeReason, ItemRef, LedgerEntry,
    LedgerEntryBuilder, Operator, RelatedDocument,
};

use crate::stock_store::{StockStore, StockStoreError};

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Error surfaced by the engine and the processors built on it.
///
/// `line` is the 0-based index of the failing item in the request, when the
/// failure belongs to one item.
#[derive(Debug, Error)]
pub enum AdjustmentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {what}")]
    NotFound { what: String, line: Option<usize> },

    #[error(
        "insufficient stock for '{item_code}': requested change {requested}, current stock {available}"
    )]
    InsufficientStock {
        item_code: String,
        requested: Quantity,
        available: Quantity,
        line: Option<usize>,
    },

    /// Optimistic retries exhausted (or a conflict outside the retry loop).
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Non-retryable storage failure.
    #[error("stock store failure: {0}")]
    Store(StockStoreError),
}

impl AdjustmentError {
    /// Attach the failing line index to item-level errors.
    pub fn at_line(self, idx: usize) -> Self {
        match self {
            AdjustmentError::NotFound { what, .. } => AdjustmentError::NotFound {
                what,
                line: Some(idx),
            },
            AdjustmentError::InsufficientStock {
                item_code,
                requested,
                available,
                ..
            } => AdjustmentError::InsufficientStock {
                item_code,
                requested,
                available,
                line: Some(idx),
            },
            AdjustmentError::Validation(msg) => {
                AdjustmentError::Validation(format!("line {}: {msg}", idx + 1))
            }
            other => other,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            AdjustmentError::NotFound { line, .. }
            | AdjustmentError::InsufficientStock { line, .. } => *line,
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, AdjustmentError::Store(e) if e.is_concurrency())
    }
}

impl From<StockStoreError> for AdjustmentError {
    fn from(value: StockStoreError) -> Self {
        match value {
            StockStoreError::NotFound(what) => AdjustmentError::NotFound { what, line: None },
            StockStoreError::InvalidData(msg) => AdjustmentError::Validation(msg),
            other => AdjustmentError::Store(other),
        }
    }
}

impl From<DomainError> for AdjustmentError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                AdjustmentError::Validation(msg)
            }
            DomainError::NotFound(what) => AdjustmentError::NotFound { what, line: None },
            DomainError::InsufficientStock {
                item_code,
                requested,
                available,
            } => AdjustmentError::InsufficientStock {
                item_code,
                requested,
                available,
                line: None,
            },
            DomainError::ConcurrentModification(msg) => AdjustmentError::ConcurrentModification(msg),
            DomainError::Unauthorized(msg) => AdjustmentError::Unauthorized(msg),
        }
    }
}

impl From<AccessDenied> for AdjustmentError {
    fn from(value: AccessDenied) -> Self {
        AdjustmentError::Unauthorized(value.to_string())
    }
}

/// Header fields shared by every line of one change.
#[derive(Debug, Clone)]
pub(crate) struct EventHeader<'a> {
    pub reason: ChangeReason,
    pub operator: &'a Operator,
    pub remarks: Option<&'a str>,
    pub related_document: Option<RelatedDocument>,
}

impl<'a> From<&'a ChangeEvent> for EventHeader<'a> {
    fn from(event: &'a ChangeEvent) -> Self {
        Self {
            reason: event.reason,
            operator: &event.operator,
            remarks: event.remarks.as_deref(),
            related_document: event.related_document,
        }
    }
}

/// Sole writer of stock: applies change events atomically with bounded
/// optimistic retry.
#[derive(Debug)]
pub struct InventoryAdjustmentEngine<S> {
    store: S,
    max_attempts: u32,
}

impl<S> InventoryAdjustmentEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }

    /// Attempts per event, including the first. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S> InventoryAdjustmentEngine<S>
where
    S: StockStore,
{
    /// Apply one change event: every item or none, exactly one ledger entry.
    #[instrument(
        skip(self, event),
        fields(reason = %event.reason, items = event.items.len(), operator = %event.operator.id),
        err
    )]
    pub fn apply_change_event(&self, event: &ChangeEvent) -> Result<LedgerEntry, AdjustmentError> {
        event.validate()?;
        let items: Vec<ItemRef> = event.items.iter().map(|adj| adj.item).collect();

        self.execute(EventHeader::from(event), &items, |idx, item| {
            resolve_target(&item.code, item.current_stock, &event.items[idx])
        })
    }

    /// Shared write path.
    ///
    /// `target_for` gets the line index and the item as read inside the
    /// transaction and returns the stock level to write.
    pub(crate) fn execute<F>(
        &self,
        header: EventHeader<'_>,
        items: &[ItemRef],
        mut target_for: F,
    ) -> Result<LedgerEntry, AdjustmentError>
    where
        F: FnMut(usize, &CatalogItem) -> DomainResult<Quantity>,
    {
        let mut attempt = 1;
        loop {
            match self.try_execute(&header, items, &mut target_for) {
                Ok(entry) => {
                    info!(
                        entry_id = %entry.id_typed(),
                        reason = %entry.change_reason(),
                        items = entry.details().len(),
                        attempt,
                        "change event committed"
                    );
                    return Ok(entry);
                }
                Err(err) if err.is_retryable() => {
                    if attempt >= self.max_attempts {
                        warn!(attempt, error = %err, "giving up after optimistic conflicts");
                        return Err(AdjustmentError::ConcurrentModification(format!(
                            "stock changed concurrently on {attempt} attempt(s): {err}"
                        )));
                    }
                    warn!(attempt, error = %err, "optimistic conflict, retrying with fresh reads");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn try_execute<F>(
        &self,
        header: &EventHeader<'_>,
        items: &[ItemRef],
        target_for: &mut F,
    ) -> Result<LedgerEntry, AdjustmentError>
    where
        F: FnMut(usize, &CatalogItem) -> DomainResult<Quantity>,
    {
        let mut tx = self.store.begin()?;

        // Read everything first so an unknown item fails before any write.
        let mut current = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let found = tx
                .get_item(item)
                .map_err(|e| AdjustmentError::from(e).at_line(idx))?;
            current.push(found);
        }

        let mut builder = LedgerEntryBuilder::new(header.reason, header.operator.clone(), Utc::now())
            .remarks(header.remarks.map(str::to_owned))
            .related_document(header.related_document);

        for (idx, item) in current.iter().enumerate() {
            let target = target_for(idx, item).map_err(|e| AdjustmentError::from(e).at_line(idx))?;
            let before = item.current_stock;
            let after = tx
                .conditional_adjust(&item.item_ref(), before, target - before)
                .map_err(|e| AdjustmentError::from(e).at_line(idx))?;

            let detail = builder
                .record(item, before, after)
                .map_err(|e| AdjustmentError::from(e).at_line(idx))?;
            debug!(
                line = idx,
                code = %detail.item_code,
                change = %detail.quantity_change,
                after = %detail.quantity_after,
                "stock line staged"
            );
        }

        let entry = builder.build(LedgerEntryId::new())?;
        tx.append_entry(&entry)?;
        tx.commit()?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixledger_core::OperatorId;
    use mixledger_inventory::{ItemKind, StockAdjustment};

    use crate::stock_store::InMemoryStockStore;

    fn operator() -> Operator {
        Operator::new(OperatorId::new(), "warehouse")
    }

    fn item(code: &str, stock: i64) -> CatalogItem {
        CatalogItem::new(ItemKind::Material, code, code, "kg")
            .unwrap()
            .with_opening_stock(Quantity::from_i64(stock))
            .unwrap()
    }

    #[test]
    fn manual_adjustment_records_change_and_after() {
        let pg = item("PG-01", 50);
        let engine = InventoryAdjustmentEngine::new(InMemoryStockStore::with_items([pg.clone()]).unwrap());

        let event = ChangeEvent::new(
            ChangeReason::ManualAdjustment,
            operator(),
            vec![StockAdjustment::strict(pg.item_ref(), Quantity::from_i64(50))],
        );
        let entry = engine.apply_change_event(&event).unwrap();

        let detail = &entry.details()[0];
        assert_eq!(detail.quantity_change, Quantity::from_i64(50));
        assert_eq!(detail.quantity_after, Quantity::from_i64(100));
        assert_eq!(engine.store().get_stock(&pg.item_ref()).unwrap(), Quantity::from_i64(100));
    }

    #[test]
    fn insufficient_stock_reports_line_and_writes_nothing() {
        let a = item("A", 10);
        let b = item("B", 5);
        let engine =
            InventoryAdjustmentEngine::new(InMemoryStockStore::with_items([a.clone(), b.clone()]).unwrap());

        let event = ChangeEvent::new(
            ChangeReason::ManualAdjustment,
            operator(),
            vec![
                StockAdjustment::strict(a.item_ref(), Quantity::from_i64(-3)),
                StockAdjustment::strict(b.item_ref(), Quantity::from_i64(-6)),
            ],
        );
        let err = engine.apply_change_event(&event).unwrap_err();
        match err {
            AdjustmentError::InsufficientStock {
                ref item_code,
                requested,
                available,
                line,
            } => {
                assert_eq!(item_code, "B");
                assert_eq!(requested, Quantity::from_i64(-6));
                assert_eq!(available, Quantity::from_i64(5));
                assert_eq!(line, Some(1));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(engine.store().get_stock(&a.item_ref()).unwrap(), Quantity::from_i64(10));
        assert!(engine.store().entries().unwrap().is_empty());
    }

    #[test]
    fn clamped_correction_records_effective_delta() {
        let a = item("A", 20);
        let engine = InventoryAdjustmentEngine::new(InMemoryStockStore::with_items([a.clone()]).unwrap());

        let event = ChangeEvent::new(
            ChangeReason::InventoryCheck,
            operator(),
            vec![StockAdjustment::clamped(a.item_ref(), Quantity::from_i64(-30))],
        );
        let entry = engine.apply_change_event(&event).unwrap();
        let detail = &entry.details()[0];
        assert_eq!(detail.quantity_after, Quantity::ZERO);
        assert_eq!(detail.quantity_change, Quantity::from_i64(-20));
    }

    #[test]
    fn unknown_item_is_not_found_with_line() {
        let a = item("A", 20);
        let engine = InventoryAdjustmentEngine::new(InMemoryStockStore::with_items([a.clone()]).unwrap());
        let missing = ItemRef::material(mixledger_core::ItemId::new());

        let event = ChangeEvent::new(
            ChangeReason::ManualAdjustment,
            operator(),
            vec![
                StockAdjustment::strict(a.item_ref(), Quantity::from_i64(1)),
                StockAdjustment::strict(missing, Quantity::from_i64(1)),
            ],
        );
        let err = engine.apply_change_event(&event).unwrap_err();
        assert!(matches!(err, AdjustmentError::NotFound { line: Some(1), .. }));
        assert_eq!(engine.store().get_stock(&a.item_ref()).unwrap(), Quantity::from_i64(20));
    }

    #[test]
    fn duplicate_items_fail_validation() {
        let a = item("A", 20);
        let engine = InventoryAdjustmentEngine::new(InMemoryStockStore::with_items([a.clone()]).unwrap());
        let event = ChangeEvent::new(
            ChangeReason::ManualAdjustment,
            operator(),
            vec![
                StockAdjustment::strict(a.item_ref(), Quantity::from_i64(1)),
                StockAdjustment::strict(a.item_ref(), Quantity::from_i64(2)),
            ],
        );
        assert!(matches!(
            engine.apply_change_event(&event),
            Err(AdjustmentError::Validation(_))
        ));
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let engine = InventoryAdjustmentEngine::new(InMemoryStockStore::new()).with_max_attempts(0);
        assert_eq!(engine.max_attempts(), 1);
    }
}
