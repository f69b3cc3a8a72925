//! Stock ledger entries ("inventory records").
//!
//! A [`LedgerEntry`] is the immutable audit record of one change event. Entries
//! are never edited; a correction is a new entry. The only way to produce one is
//! [`LedgerEntryBuilder`], which derives every `quantity_change` from the
//! before/after pair the store actually wrote, so the ledger cannot drift from
//! the stock it describes.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mixledger_core::{
    DocumentId, DomainError, DomainResult, Entity, ItemId, LedgerEntryId, OperatorId, Quantity,
};

use crate::catalog::{CatalogItem, ItemKind, ItemRef};

/// Why stock changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeReason {
    #[serde(rename = "purchase")]
    Purchase,
    #[serde(rename = "workorder")]
    WorkOrder,
    #[serde(rename = "inventory_check")]
    InventoryCheck,
    #[serde(rename = "manual_adjustment")]
    ManualAdjustment,
}

impl ChangeReason {
    pub const ALL: [ChangeReason; 4] = [
        ChangeReason::Purchase,
        ChangeReason::WorkOrder,
        ChangeReason::InventoryCheck,
        ChangeReason::ManualAdjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::Purchase => "purchase",
            ChangeReason::WorkOrder => "workorder",
            ChangeReason::InventoryCheck => "inventory_check",
            ChangeReason::ManualAdjustment => "manual_adjustment",
        }
    }

    /// Document kind a back-reference must have for this reason, if constrained.
    pub fn expected_document_kind(&self) -> Option<DocumentKind> {
        match self {
            ChangeReason::Purchase => Some(DocumentKind::PurchaseOrder),
            ChangeReason::WorkOrder => Some(DocumentKind::WorkOrder),
            ChangeReason::InventoryCheck | ChangeReason::ManualAdjustment => None,
        }
    }
}

impl core::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeReason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown change reason '{s}'")))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PurchaseOrder,
    WorkOrder,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::WorkOrder => "work_order",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase_order" => Ok(DocumentKind::PurchaseOrder),
            "work_order" => Ok(DocumentKind::WorkOrder),
            other => Err(DomainError::validation(format!("unknown document type '{other}'"))),
        }
    }
}

/// Non-owning back-reference to the document that caused a change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub id: DocumentId,
    pub kind: DocumentKind,
}

impl RelatedDocument {
    pub fn purchase_order(id: DocumentId) -> Self {
        Self {
            id,
            kind: DocumentKind::PurchaseOrder,
        }
    }

    pub fn work_order(id: DocumentId) -> Self {
        Self {
            id,
            kind: DocumentKind::WorkOrder,
        }
    }
}

/// Who performed a change (denormalized into the entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub name: String,
}

impl Operator {
    pub fn new(id: OperatorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Per-item delta inside an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDetail {
    pub item_id: ItemId,
    pub item_type: ItemKind,
    pub item_code: String,
    pub item_name: String,
    /// Signed delta actually applied.
    pub quantity_change: Quantity,
    /// Stock after the change, for point-in-time reconstruction.
    pub quantity_after: Quantity,
}

impl LedgerDetail {
    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.item_type, self.item_id)
    }

    pub fn quantity_before(&self) -> Quantity {
        self.quantity_after - self.quantity_change
    }
}

/// Immutable audit record of one change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    id: LedgerEntryId,
    change_date: DateTime<Utc>,
    change_reason: ChangeReason,
    operator_id: OperatorId,
    operator_name: String,
    remarks: Option<String>,
    related_document: Option<RelatedDocument>,
    details: Vec<LedgerDetail>,
}

impl LedgerEntry {
    pub fn id_typed(&self) -> LedgerEntryId {
        self.id
    }

    pub fn change_date(&self) -> DateTime<Utc> {
        self.change_date
    }

    pub fn change_reason(&self) -> ChangeReason {
        self.change_reason
    }

    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }

    pub fn operator_name(&self) -> &str {
        &self.operator_name
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn related_document(&self) -> Option<RelatedDocument> {
        self.related_document
    }

    pub fn details(&self) -> &[LedgerDetail] {
        &self.details
    }

    pub fn detail_for(&self, item: &ItemRef) -> Option<&LedgerDetail> {
        self.details.iter().find(|d| d.item_ref() == *item)
    }

    pub fn touches(&self, item: &ItemRef) -> bool {
        self.detail_for(item).is_some()
    }
}

impl Entity for LedgerEntry {
    type Id = LedgerEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// The single construction path for [`LedgerEntry`].
#[derive(Debug, Clone)]
pub struct LedgerEntryBuilder {
    change_reason: ChangeReason,
    operator: Operator,
    change_date: DateTime<Utc>,
    remarks: Option<String>,
    related_document: Option<RelatedDocument>,
    details: Vec<LedgerDetail>,
}

impl LedgerEntryBuilder {
    pub fn new(change_reason: ChangeReason, operator: Operator, change_date: DateTime<Utc>) -> Self {
        Self {
            change_reason,
            operator,
            change_date,
            remarks: None,
            related_document: None,
            details: Vec::new(),
        }
    }

    pub fn remarks(mut self, remarks: Option<String>) -> Self {
        self.remarks = remarks.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn related_document(mut self, related: Option<RelatedDocument>) -> Self {
        self.related_document = related;
        self
    }

    /// Record one item's stock transition, `quantity_after` being the value the
    /// store returned from its conditional write.
    pub fn record(
        &mut self,
        item: &CatalogItem,
        quantity_before: Quantity,
        quantity_after: Quantity,
    ) -> DomainResult<&LedgerDetail> {
        if quantity_after.is_negative() {
            return Err(DomainError::validation(format!(
                "stock for '{}' cannot be recorded below zero ({quantity_after})",
                item.code
            )));
        }
        if self.details.iter().any(|d| d.item_ref() == item.item_ref()) {
            return Err(DomainError::validation(format!(
                "item '{}' already recorded in this entry",
                item.code
            )));
        }

        self.details.push(LedgerDetail {
            item_id: item.id,
            item_type: item.kind,
            item_code: item.code.clone(),
            item_name: item.name.clone(),
            quantity_change: quantity_after - quantity_before,
            quantity_after,
        });
        Ok(&self.details[self.details.len() - 1])
    }

    pub fn build(self, id: LedgerEntryId) -> DomainResult<LedgerEntry> {
        if self.details.is_empty() {
            return Err(DomainError::validation("a ledger entry needs at least one detail"));
        }
        if let (Some(expected), Some(doc)) = (
            self.change_reason.expected_document_kind(),
            self.related_document,
        ) {
            if doc.kind != expected {
                return Err(DomainError::validation(format!(
                    "reason '{}' cannot reference a {}",
                    self.change_reason,
                    doc.kind.as_str()
                )));
            }
        }

        Ok(LedgerEntry {
            id,
            change_date: self.change_date,
            change_reason: self.change_reason,
            operator_id: self.operator.id,
            operator_name: self.operator.name,
            remarks: self.remarks,
            related_document: self.related_document,
            details: self.details,
        })
    }
}
