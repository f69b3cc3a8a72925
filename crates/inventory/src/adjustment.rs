//! Change events and the negative-stock policy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use mixledger_core::{DomainError, DomainResult, Quantity};

use crate::catalog::ItemRef;
use crate::ledger::{ChangeReason, Operator, RelatedDocument};

/// One requested stock change inside a change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub item: ItemRef,
    /// Signed delta requested by the caller.
    pub quantity_change: Quantity,
    /// `true`: a below-zero result is clamped to zero (stock-take style).
    /// `false`: a below-zero result is rejected as insufficient stock.
    pub allow_negative: bool,
}

impl StockAdjustment {
    pub fn new(item: ItemRef, quantity_change: Quantity, allow_negative: bool) -> Self {
        Self {
            item,
            quantity_change,
            allow_negative,
        }
    }

    /// Strict adjustment: never lets stock go below zero.
    pub fn strict(item: ItemRef, quantity_change: Quantity) -> Self {
        Self::new(item, quantity_change, false)
    }

    /// Depleting adjustment (production consumption).
    pub fn deplete(item: ItemRef, quantity: Quantity) -> Self {
        Self::new(item, -quantity.abs(), false)
    }

    /// Correction that clamps at zero.
    pub fn clamped(item: ItemRef, quantity_change: Quantity) -> Self {
        Self::new(item, quantity_change, true)
    }
}

/// One logical change: many items, one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub reason: ChangeReason,
    pub operator: Operator,
    pub items: Vec<StockAdjustment>,
    pub remarks: Option<String>,
    pub related_document: Option<RelatedDocument>,
}

impl ChangeEvent {
    pub fn new(reason: ChangeReason, operator: Operator, items: Vec<StockAdjustment>) -> Self {
        Self {
            reason,
            operator,
            items,
            remarks: None,
            related_document: None,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn with_related_document(mut self, related: RelatedDocument) -> Self {
        self.related_document = Some(related);
        self
    }

    /// Structural checks done before any store access.
    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("a change event needs at least one item"));
        }

        ensure_distinct_items(self.items.iter().map(|adj| adj.item))?;

        if let (Some(expected), Some(doc)) =
            (self.reason.expected_document_kind(), self.related_document)
        {
            if doc.kind != expected {
                return Err(DomainError::validation(format!(
                    "reason '{}' cannot reference a {}",
                    self.reason,
                    doc.kind.as_str()
                )));
            }
        }

        Ok(())
    }
}

/// Reject a batch that names the same item twice.
pub fn ensure_distinct_items(items: impl IntoIterator<Item = ItemRef>) -> DomainResult<()> {
    let mut seen: HashMap<ItemRef, usize> = HashMap::new();
    for (idx, item) in items.into_iter().enumerate() {
        if let Some(first) = seen.insert(item, idx) {
            return Err(DomainError::validation(format!(
                "item {item} appears more than once (lines {} and {})",
                first + 1,
                idx + 1
            )));
        }
    }
    Ok(())
}

/// Apply the negative-stock policy and return the stock level to write.
///
/// The effective delta (`target - current`) may differ from the requested one
/// when a clamping correction floors at zero.
pub fn resolve_target(
    item_code: &str,
    current: Quantity,
    adjustment: &StockAdjustment,
) -> DomainResult<Quantity> {
    let target = current
        .checked_add(adjustment.quantity_change)
        .ok_or_else(|| {
            DomainError::validation(format!(
                "quantity change {} for '{item_code}' is out of range",
                adjustment.quantity_change
            ))
        })?;

    if !target.is_negative() {
        return Ok(target);
    }

    if adjustment.allow_negative {
        Ok(Quantity::ZERO)
    } else {
        Err(DomainError::insufficient_stock(
            item_code,
            adjustment.quantity_change,
            current,
        ))
    }
}
