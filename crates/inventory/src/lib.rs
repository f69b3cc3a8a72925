//! Inventory domain module: catalog items and the stock ledger.
//!
//! This crate contains business rules for stock changes, implemented purely as
//! deterministic domain logic (no IO, no storage). Stores and the adjustment
//! engine live in `mixledger-infra`.

pub mod adjustment;
pub mod catalog;
pub mod ledger;

pub use adjustment::{ensure_distinct_items, resolve_target, ChangeEvent, StockAdjustment};
pub use catalog::{CatalogItem, CatalogLookup, ItemKind, ItemRef};
pub use ledger::{
    ChangeReason, DocumentKind, LedgerDetail, LedgerEntry, LedgerEntryBuilder, Operator,
    RelatedDocument,
};
