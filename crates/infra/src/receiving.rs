//! Purchase-order receipts.
//!
//! Receiving only ever adds stock. Purchase-order status is owned by the
//! purchasing workflow; this module reports variances but never changes it.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use mixledger_core::{DocumentId, Quantity};
use mixledger_inventory::{
    ChangeEvent, ChangeReason, ItemRef, LedgerEntry, Operator, RelatedDocument, StockAdjustment,
};

use crate::adjustment_engine::{AdjustmentError, InventoryAdjustmentEngine};
use crate::stock_store::StockStore;

/// One received line of a purchase order.
///
/// `code` and `name` are the purchase order's snapshot, used in messages only;
/// the ledger records the catalog's current values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub item: ItemRef,
    pub code: String,
    pub name: String,
    pub received_quantity: Quantity,
}

impl ReceiptLine {
    pub fn new(
        item: ItemRef,
        code: impl Into<String>,
        name: impl Into<String>,
        received_quantity: Quantity,
    ) -> Self {
        Self {
            item,
            code: code.into(),
            name: name.into(),
            received_quantity,
        }
    }
}

/// Ordered vs received for one purchase-order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedReceipt {
    pub item: ItemRef,
    pub code: String,
    pub name: String,
    pub ordered_quantity: Quantity,
    pub received_quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingPlan {
    pub purchase_order_id: DocumentId,
    pub lines: Vec<PlannedReceipt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptVariance {
    pub item: ItemRef,
    pub code: String,
    pub ordered_quantity: Quantity,
    pub received_quantity: Quantity,
    /// `received - ordered`; negative means short-shipped.
    pub difference: Quantity,
}

impl ReceivingPlan {
    pub fn new(purchase_order_id: DocumentId) -> Self {
        Self {
            purchase_order_id,
            lines: Vec::new(),
        }
    }

    pub fn with_line(mut self, line: PlannedReceipt) -> Self {
        self.lines.push(line);
        self
    }

    /// Lines whose received quantity differs from the ordered one.
    pub fn variances(&self) -> Vec<ReceiptVariance> {
        self.lines
            .iter()
            .filter(|l| l.received_quantity != l.ordered_quantity)
            .map(|l| ReceiptVariance {
                item: l.item,
                code: l.code.clone(),
                ordered_quantity: l.ordered_quantity,
                received_quantity: l.received_quantity,
                difference: l.received_quantity - l.ordered_quantity,
            })
            .collect()
    }

    /// Every line received at least as ordered.
    pub fn is_fully_received(&self) -> bool {
        self.lines
            .iter()
            .all(|l| l.received_quantity >= l.ordered_quantity)
    }

    pub fn receipt_lines(&self) -> Vec<ReceiptLine> {
        self.lines
            .iter()
            .map(|l| ReceiptLine::new(l.item, l.code.clone(), l.name.clone(), l.received_quantity))
            .collect()
    }
}

/// Applies purchase-order receipts through the adjustment engine.
#[derive(Debug)]
pub struct ReceivingProcessor<'a, S> {
    engine: &'a InventoryAdjustmentEngine<S>,
}

impl<'a, S> ReceivingProcessor<'a, S>
where
    S: StockStore,
{
    pub fn new(engine: &'a InventoryAdjustmentEngine<S>) -> Self {
        Self { engine }
    }

    /// Receive goods against a purchase order.
    ///
    /// Zero-quantity lines stay in the entry with a zero change. A negative
    /// quantity fails validation before the store is touched.
    #[instrument(skip(self, operator, lines, remarks), fields(purchase_order = %purchase_order_id, lines = lines.len()), err)]
    pub fn receive(
        &self,
        purchase_order_id: DocumentId,
        operator: &Operator,
        lines: &[ReceiptLine],
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        if lines.is_empty() {
            return Err(AdjustmentError::Validation(
                "a receipt needs at least one line".to_string(),
            ));
        }

        let mut items = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            if line.received_quantity.is_negative() {
                return Err(AdjustmentError::Validation(format!(
                    "line {}: received quantity for '{}' cannot be negative ({})",
                    idx + 1,
                    line.code,
                    line.received_quantity
                )));
            }
            items.push(StockAdjustment::strict(line.item, line.received_quantity));
        }

        let mut event = ChangeEvent::new(ChangeReason::Purchase, operator.clone(), items)
            .with_related_document(RelatedDocument::purchase_order(purchase_order_id));
        if let Some(remarks) = remarks {
            event = event.with_remarks(remarks);
        }

        self.engine.apply_change_event(&event)
    }

    /// Receive every line of a plan at its received quantity.
    pub fn receive_plan(
        &self,
        plan: &ReceivingPlan,
        operator: &Operator,
        remarks: Option<&str>,
    ) -> Result<LedgerEntry, AdjustmentError> {
        self.receive(plan.purchase_order_id, operator, &plan.receipt_lines(), remarks)
    }
}
