//! Stock-take reconciliation and manual corrections.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use mixledger_core::Quantity;
use mixledger_inventory::{
    ensure_distinct_items, ChangeEvent, ChangeReason, ItemRef, LedgerEntry, Operator,
    StockAdjustment,
};

use crate::adjustment_engine::{AdjustmentError, EventHeader, InventoryAdjustmentEngine};
use crate::stock_store::StockStore;

/// Physically counted quantity of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCount {
    pub item: ItemRef,
    pub counted_quantity: Quantity,
}

impl StockCount {
    pub fn new(item: ItemRef, counted_quantity: Quantity) -> Self {
        Self {
            item,
            counted_quantity,
        }
    }
}

#[derive(Debug)]
pub struct InventoryCorrection<'a, S> {
    engine: &'a InventoryAdjustmentEngine<S>,
}

impl<'a, S> InventoryCorrection<'a, S>
where
    S: StockStore,
{
    pub fn new(engine: &'a InventoryAdjustmentEngine<S>) -> Self {
        Self { engine }
    }

    /// Set each item to its counted quantity (`inventory_check`).
    ///
    /// The delta is `counted - current`, with `current` read inside the same
    /// transaction, so a retry after a conflict recomputes it. Items whose
    /// count matches still get a zero-change detail line.
    #[instrument(skip(self, operator, counts, remarks), fields(items = counts.len()), err)]
    pub fn reconcile_counts(
        &self,
        operator: &Operator,
        counts: &[StockCount],
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        if counts.is_empty() {
            return Err(AdjustmentError::Validation(
                "a stock count needs at least one item".to_string(),
            ));
        }
        for (idx, count) in counts.iter().enumerate() {
            if count.counted_quantity.is_negative() {
                return Err(AdjustmentError::Validation(format!(
                    "line {}: counted quantity for {} cannot be negative ({})",
                    idx + 1,
                    count.item,
                    count.counted_quantity
                )));
            }
        }
        ensure_distinct_items(counts.iter().map(|c| c.item))?;

        let items: Vec<ItemRef> = counts.iter().map(|c| c.item).collect();
        let header = EventHeader {
            reason: ChangeReason::InventoryCheck,
            operator,
            remarks,
            related_document: None,
        };
        self.engine
            .execute(header, &items, |idx, _| Ok(counts[idx].counted_quantity))
    }

    /// Apply explicit deltas (`manual_adjustment`).
    pub fn manual_adjust(
        &self,
        operator: &Operator,
        items: Vec<StockAdjustment>,
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        let mut event = ChangeEvent::new(ChangeReason::ManualAdjustment, operator.clone(), items);
        if let Some(remarks) = remarks {
            event = event.with_remarks(remarks);
        }
        self.engine.apply_change_event(&event)
    }
}
